//! Lock results, repository search results and node-structure listings.

use crate::adt::xml::Element;
use crate::error::AdtError;

/// Result of declaring an edit intent.
#[derive(Debug, Clone)]
pub struct LockResult {
    /// Opaque handle, valid only inside the session that obtained it.
    pub handle: String,
    /// True when the object sits on a local workbench request.
    pub is_local: bool,
    /// Transport request number when the object is assigned to one.
    pub transport: Option<String>,
}

/// Decode a lock response (`asx:abap` envelope with a `DATA` record).
pub fn parse_lock_result(body: &str) -> Result<LockResult, AdtError> {
    let root = Element::parse(body)?;
    let data = root.find("DATA").ok_or_else(|| {
        AdtError::Protocol("lock response is missing the DATA record".to_string())
    })?;
    let handle = data
        .child_text("LOCK_HANDLE")
        .ok_or_else(|| AdtError::Protocol("lock response is missing LOCK_HANDLE".to_string()))?
        .to_string();
    let is_local = data
        .child_text("IS_LOCAL")
        .map(|v| v == "X")
        .unwrap_or(false);
    let transport = data
        .child_text("CORRNR")
        .map(str::to_string)
        .filter(|t| !t.is_empty());
    Ok(LockResult {
        handle,
        is_local,
        transport,
    })
}

/// One repository object, as returned by search and listing endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ObjectInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub object_type: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Decode quick-search results (`adtcore:objectReferences`).
pub fn parse_search_results(body: &str) -> Result<Vec<ObjectInfo>, AdtError> {
    let root = Element::parse(body)?;
    let mut references = Vec::new();
    root.descendants("objectReference", &mut references);
    references
        .into_iter()
        .map(|reference| {
            Ok(ObjectInfo {
                name: reference.require_attr("name")?.to_string(),
                object_type: reference.attr("type").unwrap_or("").to_string(),
                uri: reference.require_attr("uri")?.to_string(),
                package: reference.attr("packageName").map(str::to_string),
                description: reference.attr("description").map(str::to_string),
            })
        })
        .collect()
}

/// Decode a repository node-structure listing (`SEU_ADT_REPOSITORY_OBJ_NODE`
/// records inside an `asx:abap` envelope).
pub fn parse_node_structure(body: &str) -> Result<Vec<ObjectInfo>, AdtError> {
    let root = Element::parse(body)?;
    let mut nodes = Vec::new();
    root.descendants("SEU_ADT_REPOSITORY_OBJ_NODE", &mut nodes);
    Ok(nodes
        .into_iter()
        .filter_map(|node| {
            // Category rows carry no object name; skip them.
            let name = node.child_text("OBJECT_NAME")?.to_string();
            Some(ObjectInfo {
                name,
                object_type: node.child_text("OBJECT_TYPE").unwrap_or("").to_string(),
                uri: node.child_text("OBJECT_URI").unwrap_or("").to_string(),
                package: None,
                description: node.child_text("DESCRIPTION").map(str::to_string),
            })
        })
        .collect())
}

/// Package metadata together with its direct contents.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PackageInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sub_packages: Vec<ObjectInfo>,
    pub objects: Vec<ObjectInfo>,
}

impl PackageInfo {
    /// Split a node-structure listing into sub-packages and other objects.
    pub fn from_contents(name: &str, description: Option<String>, contents: Vec<ObjectInfo>) -> Self {
        let (sub_packages, objects): (Vec<_>, Vec<_>) = contents
            .into_iter()
            .partition(|o| o.object_type.starts_with("DEVC"));
        PackageInfo {
            name: name.to_uppercase(),
            description,
            sub_packages,
            objects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCK_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
        <asx:abap xmlns:asx="http://www.sap.com/abapxml" version="1.0">
          <asx:values>
            <DATA>
              <LOCK_HANDLE>4A5C7DEF2B1E4F</LOCK_HANDLE>
              <CORRNR/>
              <CORRUSER>DEVELOPER</CORRUSER>
              <CORRTEXT/>
              <IS_LOCAL>X</IS_LOCAL>
              <IS_LINK_UP/>
              <MODIFICATION_SUPPORT/>
            </DATA>
          </asx:values>
        </asx:abap>"#;

    #[test]
    fn lock_result_parses_handle_and_local_marker() {
        let lock = parse_lock_result(LOCK_BODY).unwrap();
        assert_eq!(lock.handle, "4A5C7DEF2B1E4F");
        assert!(lock.is_local);
        assert!(lock.transport.is_none());
    }

    #[test]
    fn lock_result_with_transport_request() {
        let body = LOCK_BODY
            .replace("<CORRNR/>", "<CORRNR>A4HK900042</CORRNR>")
            .replace("<IS_LOCAL>X</IS_LOCAL>", "<IS_LOCAL/>");
        let lock = parse_lock_result(&body).unwrap();
        assert!(!lock.is_local);
        assert_eq!(lock.transport.as_deref(), Some("A4HK900042"));
    }

    #[test]
    fn lock_result_without_handle_is_a_protocol_error() {
        let body = "<asx:abap xmlns:asx=\"x\"><asx:values><DATA/></asx:values></asx:abap>";
        assert!(matches!(
            parse_lock_result(body),
            Err(AdtError::Protocol(_))
        ));
    }

    #[test]
    fn search_results_parse() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
            <adtcore:objectReferences xmlns:adtcore="http://www.sap.com/adt/core">
              <adtcore:objectReference adtcore:uri="/sap/bc/adt/oo/classes/cl_abap_typedescr"
                adtcore:type="CLAS/OC" adtcore:name="CL_ABAP_TYPEDESCR"
                adtcore:packageName="SABP_TYPES" adtcore:description="Runtime type services"/>
              <adtcore:objectReference adtcore:uri="/sap/bc/adt/programs/programs/cl_demo"
                adtcore:type="PROG/P" adtcore:name="CL_DEMO"/>
            </adtcore:objectReferences>"#;
        let results = parse_search_results(body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "CL_ABAP_TYPEDESCR");
        assert_eq!(results[0].object_type, "CLAS/OC");
        assert_eq!(results[0].package.as_deref(), Some("SABP_TYPES"));
        assert!(results[1].description.is_none());
    }

    #[test]
    fn empty_search_result_is_an_empty_list() {
        let body = r#"<adtcore:objectReferences xmlns:adtcore="http://www.sap.com/adt/core"/>"#;
        assert!(parse_search_results(body).unwrap().is_empty());
    }

    #[test]
    fn node_structure_listing_parses_and_skips_category_rows() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
            <asx:abap xmlns:asx="http://www.sap.com/abapxml" version="1.0">
              <asx:values>
                <DATA>
                  <TREE_CONTENT>
                    <SEU_ADT_REPOSITORY_OBJ_NODE>
                      <OBJECT_TYPE>DEVC/K</OBJECT_TYPE>
                      <OBJECT_NAME>$ZMCP_SUB</OBJECT_NAME>
                      <OBJECT_URI>/sap/bc/adt/packages/%24zmcp_sub</OBJECT_URI>
                      <DESCRIPTION>sub package</DESCRIPTION>
                    </SEU_ADT_REPOSITORY_OBJ_NODE>
                    <SEU_ADT_REPOSITORY_OBJ_NODE>
                      <OBJECT_TYPE>PROG/P</OBJECT_TYPE>
                      <OBJECT_NAME>ZMCP_REPORT</OBJECT_NAME>
                      <OBJECT_URI>/sap/bc/adt/programs/programs/zmcp_report</OBJECT_URI>
                    </SEU_ADT_REPOSITORY_OBJ_NODE>
                    <SEU_ADT_REPOSITORY_OBJ_NODE>
                      <OBJECT_TYPE/>
                      <DESCRIPTION>Source Code Library</DESCRIPTION>
                    </SEU_ADT_REPOSITORY_OBJ_NODE>
                  </TREE_CONTENT>
                </DATA>
              </asx:values>
            </asx:abap>"#;
        let nodes = parse_node_structure(body).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].name, "$ZMCP_SUB");
        assert_eq!(nodes[1].object_type, "PROG/P");
    }

    #[test]
    fn package_info_partitions_contents() {
        let contents = vec![
            ObjectInfo {
                name: "$ZMCP_SUB".into(),
                object_type: "DEVC/K".into(),
                uri: String::new(),
                package: None,
                description: None,
            },
            ObjectInfo {
                name: "ZMCP_REPORT".into(),
                object_type: "PROG/P".into(),
                uri: String::new(),
                package: None,
                description: None,
            },
        ];
        let info = PackageInfo::from_contents("$zmcp_test", None, contents);
        assert_eq!(info.name, "$ZMCP_TEST");
        assert_eq!(info.sub_packages.len(), 1);
        assert_eq!(info.objects.len(), 1);
    }
}
