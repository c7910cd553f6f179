//! Activation and syntax-check dialects.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::adt::xml::{Element, XmlBuilder};
use crate::error::AdtError;

/// Message severity as reported by activation and check runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    fn from_code(code: &str) -> Severity {
        match code {
            "E" | "A" | "X" => Severity::Error,
            "W" => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

/// One activation or syntax-check message.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckMessage {
    pub severity: Severity,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Outcome of an activation run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActivationResult {
    pub success: bool,
    pub messages: Vec<CheckMessage>,
}

/// Build the activation request: a list of object references.
pub fn activation_body(references: &[(String, String)]) -> String {
    let mut builder = XmlBuilder::new().start(
        "adtcore:objectReferences",
        &[("xmlns:adtcore", crate::adt::catalog::ObjectKind::adtcore_ns())],
    );
    for (uri, name) in references {
        builder = builder.empty(
            "adtcore:objectReference",
            &[("adtcore:uri", uri.as_str()), ("adtcore:name", name.as_str())],
        );
    }
    builder.end().finish()
}

/// Decode an activation response (`chkl:messages` envelope). An empty body
/// means the server had nothing to report.
pub fn parse_activation_result(body: &str) -> Result<ActivationResult, AdtError> {
    if body.trim().is_empty() {
        return Ok(ActivationResult {
            success: true,
            messages: Vec::new(),
        });
    }
    let root = Element::parse(body)?;
    let mut raw = Vec::new();
    root.descendants("msg", &mut raw);

    let messages: Vec<CheckMessage> = raw
        .into_iter()
        .map(|msg| {
            let text = msg
                .find("txt")
                .map(|t| t.text.clone())
                .or_else(|| msg.attr("shortText").map(str::to_string))
                .unwrap_or_default();
            CheckMessage {
                severity: Severity::from_code(msg.attr("type").unwrap_or("")),
                line: msg.attr("line").and_then(|l| l.parse().ok()),
                text,
            }
        })
        .collect();

    let success = !messages.iter().any(|m| m.severity == Severity::Error);
    Ok(ActivationResult { success, messages })
}

/// Build a syntax-check request. The candidate source travels inline,
/// base64-encoded, as an artifact of the object's main source URI.
pub fn syntax_check_body(object_uri: &str, source_uri: &str, source: &str) -> String {
    let encoded = BASE64.encode(source.as_bytes());
    XmlBuilder::new()
        .start(
            "chkrun:checkObjectList",
            &[
                ("xmlns:chkrun", "http://www.sap.com/adt/checkrun"),
                ("xmlns:adtcore", crate::adt::catalog::ObjectKind::adtcore_ns()),
            ],
        )
        .start(
            "chkrun:checkObject",
            &[("adtcore:uri", object_uri), ("chkrun:version", "active")],
        )
        .start("chkrun:artifacts", &[])
        .start(
            "chkrun:artifact",
            &[
                ("chkrun:contentType", "text/plain; charset=utf-8"),
                ("chkrun:uri", source_uri),
            ],
        )
        .text_element("chkrun:content", &encoded)
        .end()
        .end()
        .end()
        .end()
        .finish()
}

/// Decode a check-run report into messages. Line numbers come from the
/// `#start=line,column` fragment of the message URI.
pub fn parse_syntax_messages(body: &str) -> Result<Vec<CheckMessage>, AdtError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let root = Element::parse(body)?;
    let mut raw = Vec::new();
    root.descendants("checkMessage", &mut raw);
    Ok(raw
        .into_iter()
        .map(|msg| CheckMessage {
            severity: Severity::from_code(msg.attr("type").unwrap_or("")),
            line: msg.attr("uri").and_then(line_from_fragment),
            text: msg.attr("shortText").unwrap_or("").to_string(),
        })
        .collect())
}

fn line_from_fragment(uri: &str) -> Option<u32> {
    let fragment = uri.split('#').nth(1)?;
    let start = fragment
        .split(';')
        .find_map(|part| part.strip_prefix("start="))?;
    start.split(',').next()?.parse().ok()
}
