//! Where-used lists and navigation targets.

use crate::adt::xml::{Element, XmlBuilder};
use crate::error::AdtError;

/// One usage record from a where-used query.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UsageReference {
    pub uri: String,
    #[serde(rename = "type")]
    pub object_type: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    /// Free-text context, e.g. the snippet the symbol occurs in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_context: Option<String>,
}

/// Build a usage-references request body.
pub fn usage_references_body() -> String {
    XmlBuilder::new()
        .start(
            "usagereferences:usageReferenceRequest",
            &[(
                "xmlns:usagereferences",
                "http://www.sap.com/adt/ris/usageReferences",
            )],
        )
        .empty("usagereferences:affectedObjects", &[])
        .end()
        .finish()
}

/// Decode a usage-references response.
pub fn parse_usage_references(body: &str) -> Result<Vec<UsageReference>, AdtError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let root = Element::parse(body)?;
    let mut referenced = Vec::new();
    root.descendants("referencedObject", &mut referenced);
    Ok(referenced
        .into_iter()
        .filter_map(|reference| {
            let object = reference.child("adtObject")?;
            let name = object.attr("name")?.to_string();
            Some(UsageReference {
                uri: reference.attr("uri").unwrap_or("").to_string(),
                object_type: object.attr("type").unwrap_or("").to_string(),
                name,
                package: object.attr("packageName").map(str::to_string),
                usage_context: reference
                    .find("usageInformation")
                    .map(|info| info.text.clone())
                    .filter(|t| !t.is_empty()),
            })
        })
        .collect())
}

/// A resolved navigation target (find-definition).
#[derive(Debug, Clone, serde::Serialize)]
pub struct NavigationTarget {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
}

/// Decode a navigation-target response: a single object reference.
pub fn parse_navigation_target(body: &str) -> Result<NavigationTarget, AdtError> {
    let root = Element::parse(body)?;
    let reference = root
        .find("objectReference")
        .ok_or_else(|| AdtError::NotFound("no definition at this position".to_string()))?;
    Ok(NavigationTarget {
        uri: reference.require_attr("uri")?.to_string(),
        name: reference.attr("name").map(str::to_string),
        object_type: reference.attr("type").map(str::to_string),
    })
}
