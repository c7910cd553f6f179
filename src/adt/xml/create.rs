//! Object and package creation request bodies.

use crate::adt::catalog::ObjectKind;
use crate::adt::xml::XmlBuilder;
use crate::error::AdtError;

/// Everything needed to create a repository object.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub kind: ObjectKind,
    pub name: String,
    pub description: String,
    pub package: String,
    /// Enclosing function group for function modules.
    pub parent: Option<String>,
    /// Transport request; not required for local (`$`) packages.
    pub transport: Option<String>,
    pub responsible: String,
}

/// Build the kind-specific create body.
///
/// The root element, its namespace and the type code all come from the
/// catalogue; packages get their own child layout (see
/// [`package_create_body`]), every other kind shares the generic shape with
/// a `packageRef` child.
pub fn create_body(request: &CreateRequest) -> Result<String, AdtError> {
    if request.kind == ObjectKind::Package {
        return package_create_body(request);
    }

    let name = request.name.to_uppercase();
    let package = request.package.to_uppercase();
    let xmlns_attr = xmlns_attr_name(request.kind.xml_root());

    let mut builder = XmlBuilder::new().start(
        request.kind.xml_root(),
        &[
            (&xmlns_attr, request.kind.xml_ns()),
            ("xmlns:adtcore", ObjectKind::adtcore_ns()),
            ("adtcore:type", request.kind.type_code()),
            ("adtcore:name", &name),
            ("adtcore:description", &request.description),
            ("adtcore:responsible", &request.responsible),
        ],
    );
    if let Some(parent) = &request.parent {
        let group = parent.to_uppercase();
        let uri = ObjectKind::FunctionGroup.object_uri(&group, None)?;
        builder = builder.empty(
            "adtcore:containerRef",
            &[
                ("adtcore:name", group.as_str()),
                ("adtcore:type", ObjectKind::FunctionGroup.type_code()),
                ("adtcore:uri", uri.as_str()),
            ],
        );
    }
    builder = builder.empty("adtcore:packageRef", &[("adtcore:name", package.as_str())]);
    Ok(builder.end().finish())
}

/// Package creation body.
///
/// The server validates child ordering strictly: `attributes`,
/// `superPackage`, `applicationComponent`, `transport` (with
/// `softwareComponent` and `transportLayer`), `translation`, `useAccesses`,
/// `packageInterfaces`, `subPackages`.
fn package_create_body(request: &CreateRequest) -> Result<String, AdtError> {
    let name = request.name.to_uppercase();
    let super_package = request.package.to_uppercase();
    let software_component = if name.starts_with('$') { "LOCAL" } else { "HOME" };

    let builder = XmlBuilder::new()
        .start(
            "pak:package",
            &[
                ("xmlns:pak", ObjectKind::Package.xml_ns()),
                ("xmlns:adtcore", ObjectKind::adtcore_ns()),
                ("adtcore:type", ObjectKind::Package.type_code()),
                ("adtcore:name", &name),
                ("adtcore:description", &request.description),
                ("adtcore:responsible", &request.responsible),
            ],
        )
        .empty("pak:attributes", &[("pak:packageType", "development")])
        .empty("pak:superPackage", &[("adtcore:name", super_package.as_str())])
        .empty("pak:applicationComponent", &[])
        .start("pak:transport", &[])
        .empty(
            "pak:softwareComponent",
            &[("pak:name", software_component)],
        )
        .empty("pak:transportLayer", &[("pak:name", "")])
        .end()
        .empty("pak:translation", &[])
        .empty("pak:useAccesses", &[])
        .empty("pak:packageInterfaces", &[])
        .empty("pak:subPackages", &[]);

    Ok(builder.end().finish())
}

/// `pak:package` -> `xmlns:pak`, `program:abapProgram` -> `xmlns:program`.
fn xmlns_attr_name(xml_root: &str) -> String {
    let prefix = xml_root.split(':').next().unwrap_or(xml_root);
    format!("xmlns:{prefix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adt::xml::Element;

    fn program_request() -> CreateRequest {
        CreateRequest {
            kind: ObjectKind::Program,
            name: "zmcp_demo".to_string(),
            description: "Demo report".to_string(),
            package: "$tmp".to_string(),
            parent: None,
            transport: None,
            responsible: "DEVELOPER".to_string(),
        }
    }

    #[test]
    fn program_body_carries_type_code_and_package_ref() {
        let body = create_body(&program_request()).unwrap();
        let root = Element::parse(&body).unwrap();
        assert_eq!(root.name, "abapProgram");
        assert_eq!(root.attr("type"), Some("PROG/P"));
        assert_eq!(root.attr("name"), Some("ZMCP_DEMO"));
        assert_eq!(root.attr("responsible"), Some("DEVELOPER"));
        assert_eq!(root.child("packageRef").unwrap().attr("name"), Some("$TMP"));
    }

    #[test]
    fn raw_body_uses_declared_namespaces() {
        let body = create_body(&program_request()).unwrap();
        assert!(body.contains("xmlns:program=\"http://www.sap.com/adt/programs/programs\""));
        assert!(body.contains("xmlns:adtcore=\"http://www.sap.com/adt/core\""));
        assert!(body.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    }

    #[test]
    fn function_module_body_references_its_group() {
        let request = CreateRequest {
            kind: ObjectKind::FunctionModule,
            name: "Z_MCP_FUNC".to_string(),
            parent: Some("zmcp_group".to_string()),
            ..program_request()
        };
        let body = create_body(&request).unwrap();
        let root = Element::parse(&body).unwrap();
        assert_eq!(root.attr("type"), Some("FUGR/FF"));
        let container = root.child("containerRef").unwrap();
        assert_eq!(container.attr("name"), Some("ZMCP_GROUP"));
        assert_eq!(
            container.attr("uri"),
            Some("/sap/bc/adt/functions/groups/ZMCP_GROUP")
        );
    }

    #[test]
    fn package_body_child_ordering_is_exact() {
        let request = CreateRequest {
            kind: ObjectKind::Package,
            name: "$zmcp_test".to_string(),
            package: "$TMP".to_string(),
            ..program_request()
        };
        let body = create_body(&request).unwrap();
        let root = Element::parse(&body).unwrap();
        assert_eq!(root.name, "package");
        let order: Vec<&str> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "attributes",
                "superPackage",
                "applicationComponent",
                "transport",
                "translation",
                "useAccesses",
                "packageInterfaces",
                "subPackages",
            ]
        );
        let transport = root.child("transport").unwrap();
        let transport_children: Vec<&str> =
            transport.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(transport_children, vec!["softwareComponent", "transportLayer"]);
        assert_eq!(
            transport.child("softwareComponent").unwrap().attr("name"),
            Some("LOCAL")
        );
    }

    #[test]
    fn non_local_package_gets_home_software_component() {
        let request = CreateRequest {
            kind: ObjectKind::Package,
            name: "ZREAL".to_string(),
            package: "ZPARENT".to_string(),
            ..program_request()
        };
        let body = create_body(&request).unwrap();
        assert!(body.contains("pak:name=\"HOME\""));
    }
}
