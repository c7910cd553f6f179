//! XML encode/decode for the ADT dialects.
//!
//! ADT responses mix namespace declarations onto elements inconsistently
//! across dialects, so decoding never relies on namespace-aware matching:
//! element and attribute prefixes are stripped and `xmlns` declarations are
//! dropped while the tree is built, and every decoder binds by local name
//! only. Unknown attributes and elements are ignored; missing required
//! fields surface as protocol errors.

pub mod aunit;
pub mod cds;
pub mod checks;
pub mod create;
pub mod objects;
pub mod query;
pub mod usages;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::AdtError;

/// Nesting guard for decoded documents. The server never emits trees this
/// deep; anything beyond it is a malformed or adversarial payload.
const MAX_DEPTH: usize = 200;

/// A decoded XML element with prefixes and namespace declarations stripped.
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    /// Parse a document into its root element.
    pub fn parse(xml: &str) -> Result<Element, AdtError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => {
                    if stack.len() >= MAX_DEPTH {
                        return Err(AdtError::Protocol(format!(
                            "XML nesting exceeds {MAX_DEPTH} levels"
                        )));
                    }
                    stack.push(element_from_start(&start)?);
                }
                Ok(Event::Empty(start)) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack.pop().ok_or_else(|| {
                        AdtError::Protocol("unbalanced XML end tag".to_string())
                    })?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(text)) => {
                    if let Some(parent) = stack.last_mut() {
                        let decoded = text
                            .unescape()
                            .map_err(|e| AdtError::Protocol(format!("XML text decode: {e}")))?;
                        parent.text.push_str(&decoded);
                    }
                }
                Ok(Event::CData(data)) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(AdtError::Protocol(format!("XML decode: {e}"))),
            }
        }

        root.ok_or_else(|| AdtError::Protocol("empty XML document".to_string()))
    }

    /// Attribute lookup by local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute that must be present.
    pub fn require_attr(&self, name: &str) -> Result<&str, AdtError> {
        self.attr(name).ok_or_else(|| {
            AdtError::Protocol(format!(
                "element <{}> is missing required attribute '{}'",
                self.name, name
            ))
        })
    }

    /// First direct child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text content of a direct child, when present and non-empty.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
    }

    /// Depth-first collection of all descendants (including self) with the
    /// given local name.
    pub fn descendants<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        if self.name == name {
            out.push(self);
        }
        for child in &self.children {
            child.descendants(name, out);
        }
    }

    /// First descendant with the given local name, depth-first.
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), AdtError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_none() {
        *root = Some(element);
    } else {
        return Err(AdtError::Protocol(
            "multiple root elements in XML document".to_string(),
        ));
    }
    Ok(())
}

fn element_from_start(start: &quick_xml::events::BytesStart<'_>) -> Result<Element, AdtError> {
    let name = local_name(start.name().as_ref());
    let mut attrs = Vec::new();
    for attr in start.attributes().with_checks(false) {
        let attr = attr.map_err(|e| AdtError::Protocol(format!("XML attribute decode: {e}")))?;
        let key = attr.key.as_ref();
        // Drop namespace declarations entirely.
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let value = attr
            .unescape_value()
            .map_err(|e| AdtError::Protocol(format!("XML attribute decode: {e}")))?;
        attrs.push((local_name(key), value.into_owned()));
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
        text: String::new(),
    })
}

/// Strip a `prefix:` from an element or attribute name.
fn local_name(raw: &[u8]) -> String {
    let bytes = match raw.iter().rposition(|b| *b == b':') {
        Some(idx) => &raw[idx + 1..],
        None => raw,
    };
    String::from_utf8_lossy(bytes).into_owned()
}

/// Minimal XML writer for request bodies. Attribute values are escaped;
/// elements must be closed in order.
#[derive(Debug, Default)]
pub struct XmlBuilder {
    buf: String,
    open: Vec<String>,
}

impl XmlBuilder {
    pub fn new() -> Self {
        Self {
            buf: String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"),
            open: Vec::new(),
        }
    }

    pub fn start(mut self, name: &str, attrs: &[(&str, &str)]) -> Self {
        self.write_tag(name, attrs, false);
        self.open.push(name.to_string());
        self
    }

    pub fn empty(mut self, name: &str, attrs: &[(&str, &str)]) -> Self {
        self.write_tag(name, attrs, true);
        self
    }

    pub fn text_element(mut self, name: &str, text: &str) -> Self {
        self.buf.push('<');
        self.buf.push_str(name);
        self.buf.push('>');
        self.buf.push_str(&escape(text));
        self.buf.push_str("</");
        self.buf.push_str(name);
        self.buf.push('>');
        self
    }

    pub fn end(mut self) -> Self {
        let name = self.open.pop().expect("XmlBuilder::end without open element");
        self.buf.push_str("</");
        self.buf.push_str(&name);
        self.buf.push('>');
        self
    }

    pub fn finish(self) -> String {
        debug_assert!(self.open.is_empty(), "unclosed elements: {:?}", self.open);
        self.buf
    }

    fn write_tag(&mut self, name: &str, attrs: &[(&str, &str)], self_closing: bool) {
        self.buf.push('<');
        self.buf.push_str(name);
        for (key, value) in attrs {
            self.buf.push(' ');
            self.buf.push_str(key);
            self.buf.push_str("=\"");
            self.buf.push_str(&escape(value));
            self.buf.push('"');
        }
        if self_closing {
            self.buf.push('/');
        }
        self.buf.push('>');
    }
}

fn escape(raw: &str) -> String {
    quick_xml::escape::escape(raw).into_owned()
}

/// Parse an ADT exception envelope (`exc:exception`), when the body is one.
pub fn parse_adt_exception(body: &str) -> Option<(String, String)> {
    let root = Element::parse(body).ok()?;
    if root.name != "exception" {
        return None;
    }
    let kind = root
        .child("type")
        .and_then(|t| t.attr("id"))
        .unwrap_or("Exception")
        .to_string();
    let message = root
        .child_text("message")
        .or_else(|| root.child_text("localizedMessage"))
        .unwrap_or("")
        .to_string();
    Some((kind, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_elements_by_local_name() {
        let xml = r#"<?xml version="1.0"?>
            <aunit:runResult xmlns:aunit="http://www.sap.com/adt/aunit">
              <program adtcore:name="ZTEST" xmlns:adtcore="http://www.sap.com/adt/core"/>
            </aunit:runResult>"#;
        let root = Element::parse(xml).unwrap();
        assert_eq!(root.name, "runResult");
        assert!(root.attrs.is_empty(), "xmlns declarations must be dropped");
        let program = root.child("program").unwrap();
        assert_eq!(program.attr("name"), Some("ZTEST"));
    }

    #[test]
    fn text_and_entities_are_decoded() {
        let xml = "<msg><txt>a &amp; b &lt;c&gt;</txt></msg>";
        let root = Element::parse(xml).unwrap();
        assert_eq!(root.child_text("txt"), Some("a & b <c>"));
    }

    #[test]
    fn rejects_empty_document() {
        assert!(Element::parse("").is_err());
        assert!(Element::parse("   ").is_err());
    }

    #[test]
    fn depth_guard_trips_on_pathological_nesting() {
        let mut xml = String::new();
        for _ in 0..300 {
            xml.push_str("<n>");
        }
        for _ in 0..300 {
            xml.push_str("</n>");
        }
        let err = Element::parse(&xml).unwrap_err();
        assert!(err.to_string().contains("nesting"));
    }

    #[test]
    fn find_descends_depth_first() {
        let xml = "<a><b><c k=\"1\"/></b><c k=\"2\"/></a>";
        let root = Element::parse(xml).unwrap();
        assert_eq!(root.find("c").unwrap().attr("k"), Some("1"));
        let mut all = Vec::new();
        root.descendants("c", &mut all);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn builder_escapes_attribute_values() {
        let xml = XmlBuilder::new()
            .start("pak:package", &[("adtcore:description", "a \"quoted\" & <desc>")])
            .end()
            .finish();
        assert!(xml.contains("&quot;quoted&quot;"));
        assert!(xml.contains("&amp;"));
        assert!(xml.contains("&lt;desc&gt;"));
        assert!(xml.ends_with("</pak:package>"));
    }

    #[test]
    fn adt_exception_envelope_parses() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
            <exc:exception xmlns:exc="http://www.sap.com/abapxml/types/communicationframework">
              <namespace id="com.sap.adt"/>
              <type id="ExceptionResourceNotFound"/>
              <message lang="EN">Resource PROGRAM ZNOPE does not exist</message>
            </exc:exception>"#;
        let (kind, message) = parse_adt_exception(xml).unwrap();
        assert_eq!(kind, "ExceptionResourceNotFound");
        assert!(message.contains("ZNOPE"));
    }

    #[test]
    fn non_exception_body_yields_none() {
        assert!(parse_adt_exception("<ok/>").is_none());
        assert!(parse_adt_exception("not xml at all").is_none());
    }
}
