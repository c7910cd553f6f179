//! Tabular data access through the data-preview service.

use crate::adt::sources::SOURCE_CONTENT_TYPE;
use crate::adt::xml::query::{parse_table_contents, TableContents};
use crate::adt::AdtClient;
use crate::error::AdtError;

const DATA_PREVIEW_PATH: &str = "/sap/bc/adt/datapreview/freestyle";

const XML_ACCEPT: &str = "application/xml";

/// Default row limit when the caller does not pass one.
pub const DEFAULT_ROW_LIMIT: u32 = 100;

/// A bare identifier is sugar for `SELECT * FROM <identifier>`.
pub fn expand_query(query: &str) -> String {
    let trimmed = query.trim();
    if is_bare_identifier(trimmed) {
        format!("SELECT * FROM {}", trimmed.to_uppercase())
    } else {
        trimmed.to_string()
    }
}

fn is_bare_identifier(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl AdtClient {
    /// Run a free-style SQL statement and decode the column/row response.
    pub async fn run_query(&self, sql: &str, max_rows: u32) -> Result<TableContents, AdtError> {
        let sql = expand_query(sql);
        if sql.is_empty() {
            return Err(AdtError::Validation("query must not be empty".into()));
        }
        let rows = max_rows.max(1).to_string();
        let response = self
            .transport()
            .post(
                DATA_PREVIEW_PATH,
                &[("rowNumber", rows.as_str())],
                XML_ACCEPT,
                SOURCE_CONTENT_TYPE,
                sql.into_bytes(),
            )
            .await?;
        parse_table_contents(&response.text())
    }

    /// Read table contents, optionally through a caller-supplied SELECT.
    pub async fn table_contents(
        &self,
        table: &str,
        max_rows: u32,
        sql: Option<&str>,
    ) -> Result<TableContents, AdtError> {
        match sql {
            Some(sql) if !sql.trim().is_empty() => self.run_query(sql, max_rows).await,
            _ => self.run_query(table, max_rows).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_table_name_expands() {
        assert_eq!(expand_query("T000"), "SELECT * FROM T000");
        assert_eq!(expand_query("t000"), "SELECT * FROM T000");
        assert_eq!(expand_query("  usr02  "), "SELECT * FROM USR02");
        assert_eq!(expand_query("_private"), "SELECT * FROM _PRIVATE");
    }

    #[test]
    fn sql_statements_pass_through() {
        assert_eq!(
            expand_query("SELECT * FROM T000 WHERE MANDT = '001'"),
            "SELECT * FROM T000 WHERE MANDT = '001'"
        );
        // Not a bare identifier: contains a slash (namespaced names go
        // through as SQL and the backend decides).
        assert_eq!(expand_query("/NSP/TABLE"), "/NSP/TABLE");
    }

    #[test]
    fn leading_digit_is_not_an_identifier() {
        assert_eq!(expand_query("42"), "42");
    }
}
