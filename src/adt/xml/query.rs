//! Data-preview decoding for table and free-style SQL queries.
//!
//! The response is column-major: one `columns` element per column, each
//! holding the column metadata and a `dataSet` with one `data` value per
//! row. Rows are transposed out of that, and each value is decoded
//! according to the column's declared ABAP type kind.

use serde_json::{Map, Value};

use crate::adt::xml::Element;
use crate::error::AdtError;

/// Column metadata from the data-preview response.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ColumnInfo {
    pub name: String,
    /// ABAP type kind as declared by the backend (`C`, `N`, `I`, `P`, …).
    #[serde(rename = "type")]
    pub type_kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_key: bool,
}

/// Decoded query result.
#[derive(Debug, Clone, serde::Serialize, Default)]
pub struct TableContents {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
}

/// Decode a `tableData` envelope.
pub fn parse_table_contents(body: &str) -> Result<TableContents, AdtError> {
    let root = Element::parse(body)?;

    let total_rows = root
        .child_text("totalRows")
        .and_then(|t| t.parse::<u64>().ok());

    let mut columns = Vec::new();
    let mut value_columns: Vec<Vec<Value>> = Vec::new();
    let mut row_count = 0usize;

    for column in root.children_named("columns") {
        let metadata = column.child("metadata").ok_or_else(|| {
            AdtError::Protocol("data preview column without metadata".to_string())
        })?;
        let info = ColumnInfo {
            name: metadata.require_attr("name")?.to_string(),
            type_kind: metadata.attr("type").unwrap_or("C").to_string(),
            description: metadata.attr("description").map(str::to_string),
            is_key: metadata
                .attr("keyAttribute")
                .map(|k| k == "true")
                .unwrap_or(false),
        };

        let values: Vec<Value> = column
            .child("dataSet")
            .map(|set| {
                set.children_named("data")
                    .map(|cell| decode_value(&info.type_kind, &cell.text))
                    .collect()
            })
            .unwrap_or_default();

        row_count = row_count.max(values.len());
        columns.push(info);
        value_columns.push(values);
    }

    let mut rows = Vec::with_capacity(row_count);
    for row_idx in 0..row_count {
        let mut row = Map::new();
        for (col_idx, info) in columns.iter().enumerate() {
            let value = value_columns[col_idx]
                .get(row_idx)
                .cloned()
                .unwrap_or(Value::Null);
            row.insert(info.name.clone(), value);
        }
        rows.push(row);
    }

    Ok(TableContents {
        columns,
        rows,
        total_rows,
    })
}

/// Map a cell onto a JSON value using the column's declared type kind.
fn decode_value(type_kind: &str, raw: &str) -> Value {
    match type_kind {
        // Integer kinds.
        "I" | "b" | "s" | "8" | "INT1" | "INT2" | "INT4" | "INT8" => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        // Packed and floating kinds.
        "P" | "F" | "a" | "e" | "DEC" | "FLTP" => raw
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        // Everything else (character, numeric text, dats, tims, raw) stays a
        // string; leading zeros are significant there.
        _ => Value::String(raw.to_string()),
    }
}
