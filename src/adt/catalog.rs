//! Static catalogue of ABAP repository object kinds.
//!
//! Every URL the client constructs is driven by this table: ADT path layout,
//! creation endpoint, XML root element and namespace, create content type,
//! source sub-path and capability flags per kind.

use std::str::FromStr;

use crate::error::AdtError;

/// ABAP repository object kinds in scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Program,
    Class,
    Interface,
    Include,
    FunctionGroup,
    FunctionModule,
    Table,
    Structure,
    DataElement,
    Domain,
    Transaction,
    Package,
    CdsDdl,
}

/// Class source is split into independently addressable include sections.
pub const CLASS_INCLUDES: &[&str] = &["definitions", "implementations", "macros", "testclasses"];

/// One row of the catalogue.
struct KindSpec {
    /// URL prefix under which objects of this kind live.
    prefix: &'static str,
    /// Workbench type code (`PROG/P`, `CLAS/OC`, …).
    type_code: &'static str,
    /// XML root element for create requests, with prefix.
    xml_root: &'static str,
    /// Namespace URI bound to the root element's prefix.
    xml_ns: &'static str,
    /// Content type for create requests.
    create_content_type: &'static str,
    /// Source sub-path, for kinds that carry source.
    source_path: Option<&'static str>,
    is_lockable: bool,
    is_activatable: bool,
    requires_parent: bool,
}

const ADTCORE_NS: &str = "http://www.sap.com/adt/core";

impl ObjectKind {
    fn spec(self) -> &'static KindSpec {
        match self {
            ObjectKind::Program => &KindSpec {
                prefix: "/sap/bc/adt/programs/programs",
                type_code: "PROG/P",
                xml_root: "program:abapProgram",
                xml_ns: "http://www.sap.com/adt/programs/programs",
                create_content_type: "application/vnd.sap.adt.programs.programs.v2+xml",
                source_path: Some("source/main"),
                is_lockable: true,
                is_activatable: true,
                requires_parent: false,
            },
            ObjectKind::Class => &KindSpec {
                prefix: "/sap/bc/adt/oo/classes",
                type_code: "CLAS/OC",
                xml_root: "class:abapClass",
                xml_ns: "http://www.sap.com/adt/oo/classes",
                create_content_type: "application/vnd.sap.adt.oo.classes.v2+xml",
                source_path: Some("source/main"),
                is_lockable: true,
                is_activatable: true,
                requires_parent: false,
            },
            ObjectKind::Interface => &KindSpec {
                prefix: "/sap/bc/adt/oo/interfaces",
                type_code: "INTF/OI",
                xml_root: "intf:abapInterface",
                xml_ns: "http://www.sap.com/adt/oo/interfaces",
                create_content_type: "application/vnd.sap.adt.oo.interfaces.v2+xml",
                source_path: Some("source/main"),
                is_lockable: true,
                is_activatable: true,
                requires_parent: false,
            },
            ObjectKind::Include => &KindSpec {
                prefix: "/sap/bc/adt/programs/includes",
                type_code: "PROG/I",
                xml_root: "include:abapInclude",
                xml_ns: "http://www.sap.com/adt/programs/includes",
                create_content_type: "application/vnd.sap.adt.programs.includes.v2+xml",
                source_path: Some("source/main"),
                is_lockable: true,
                is_activatable: true,
                requires_parent: false,
            },
            ObjectKind::FunctionGroup => &KindSpec {
                prefix: "/sap/bc/adt/functions/groups",
                type_code: "FUGR/F",
                xml_root: "group:abapFunctionGroup",
                xml_ns: "http://www.sap.com/adt/functions/groups",
                create_content_type: "application/vnd.sap.adt.functions.groups.v2+xml",
                source_path: Some("source/main"),
                is_lockable: true,
                is_activatable: true,
                requires_parent: false,
            },
            ObjectKind::FunctionModule => &KindSpec {
                prefix: "/sap/bc/adt/functions/groups",
                type_code: "FUGR/FF",
                xml_root: "fmodule:abapFunctionModule",
                xml_ns: "http://www.sap.com/adt/functions/fmodules",
                create_content_type: "application/vnd.sap.adt.functions.fmodules.v2+xml",
                source_path: Some("source/main"),
                is_lockable: true,
                is_activatable: true,
                requires_parent: true,
            },
            ObjectKind::Table => &KindSpec {
                prefix: "/sap/bc/adt/ddic/tables",
                type_code: "TABL/DT",
                xml_root: "blue:blueSource",
                xml_ns: "http://www.sap.com/wbobj/blue",
                create_content_type: "application/vnd.sap.adt.tables.v2+xml",
                source_path: Some("source/main"),
                is_lockable: true,
                is_activatable: true,
                requires_parent: false,
            },
            ObjectKind::Structure => &KindSpec {
                prefix: "/sap/bc/adt/ddic/structures",
                type_code: "TABL/DS",
                xml_root: "blue:blueSource",
                xml_ns: "http://www.sap.com/wbobj/blue",
                create_content_type: "application/vnd.sap.adt.structures.v2+xml",
                source_path: Some("source/main"),
                is_lockable: true,
                is_activatable: true,
                requires_parent: false,
            },
            ObjectKind::DataElement => &KindSpec {
                prefix: "/sap/bc/adt/ddic/dataelements",
                type_code: "DTEL/DE",
                xml_root: "dtel:dataElement",
                xml_ns: "http://www.sap.com/adt/dictionary/dataelements",
                create_content_type: "application/vnd.sap.adt.dataelements.v1+xml",
                source_path: None,
                is_lockable: true,
                is_activatable: true,
                requires_parent: false,
            },
            ObjectKind::Domain => &KindSpec {
                prefix: "/sap/bc/adt/ddic/domains",
                type_code: "DOMA/DD",
                xml_root: "doma:domain",
                xml_ns: "http://www.sap.com/adt/dictionary/domains",
                create_content_type: "application/vnd.sap.adt.domains.v1+xml",
                source_path: None,
                is_lockable: true,
                is_activatable: true,
                requires_parent: false,
            },
            ObjectKind::Transaction => &KindSpec {
                prefix: "/sap/bc/adt/transactions",
                type_code: "TRAN/T",
                xml_root: "tran:transaction",
                xml_ns: "http://www.sap.com/adt/transactions",
                create_content_type: "application/vnd.sap.adt.transactions.v1+xml",
                source_path: None,
                is_lockable: false,
                is_activatable: false,
                requires_parent: false,
            },
            ObjectKind::Package => &KindSpec {
                prefix: "/sap/bc/adt/packages",
                type_code: "DEVC/K",
                xml_root: "pak:package",
                xml_ns: "http://www.sap.com/adt/packages",
                create_content_type: "application/vnd.sap.adt.packages.v1+xml",
                source_path: None,
                is_lockable: true,
                is_activatable: false,
                requires_parent: false,
            },
            ObjectKind::CdsDdl => &KindSpec {
                prefix: "/sap/bc/adt/ddic/ddl/sources",
                type_code: "DDLS/DF",
                xml_root: "ddl:ddlSource",
                xml_ns: "http://www.sap.com/adt/ddic/ddlsources",
                create_content_type: "application/vnd.sap.adt.ddlSource.v2+xml",
                source_path: Some("source/main"),
                is_lockable: true,
                is_activatable: true,
                requires_parent: false,
            },
        }
    }

    /// Workbench type code (`PROG/P`, `CLAS/OC`, …).
    pub fn type_code(self) -> &'static str {
        self.spec().type_code
    }

    /// XML root element name for create requests, including its prefix.
    pub fn xml_root(self) -> &'static str {
        self.spec().xml_root
    }

    /// Namespace URI for the create root element.
    pub fn xml_ns(self) -> &'static str {
        self.spec().xml_ns
    }

    /// `adtcore` namespace URI, shared by every dialect.
    pub fn adtcore_ns() -> &'static str {
        ADTCORE_NS
    }

    /// Content type for create requests.
    pub fn create_content_type(self) -> &'static str {
        self.spec().create_content_type
    }

    pub fn is_lockable(self) -> bool {
        self.spec().is_lockable
    }

    pub fn is_activatable(self) -> bool {
        self.spec().is_activatable
    }

    pub fn supports_source(self) -> bool {
        self.spec().source_path.is_some()
    }

    pub fn requires_parent(self) -> bool {
        self.spec().requires_parent
    }

    /// ADT URI of an object of this kind.
    ///
    /// `parent` is the enclosing function group for function modules and is
    /// ignored for every other kind.
    pub fn object_uri(self, name: &str, parent: Option<&str>) -> Result<String, AdtError> {
        let name = escape_name(name)?;
        match self {
            ObjectKind::FunctionModule => {
                let group = parent.ok_or_else(|| {
                    AdtError::Validation(
                        "function modules require the enclosing function group".into(),
                    )
                })?;
                Ok(format!(
                    "{}/{}/fmodules/{}",
                    self.spec().prefix,
                    escape_name(group)?,
                    name
                ))
            }
            _ => Ok(format!("{}/{}", self.spec().prefix, name)),
        }
    }

    /// Creation endpoint (collection URL) for this kind.
    pub fn create_uri(self, parent: Option<&str>) -> Result<String, AdtError> {
        match self {
            ObjectKind::FunctionModule => {
                let group = parent.ok_or_else(|| {
                    AdtError::Validation(
                        "function modules require the enclosing function group".into(),
                    )
                })?;
                Ok(format!(
                    "{}/{}/fmodules",
                    self.spec().prefix,
                    escape_name(group)?
                ))
            }
            _ => Ok(self.spec().prefix.to_string()),
        }
    }

    /// URI of a source include section.
    ///
    /// For classes, `include` selects one of [`CLASS_INCLUDES`]; `None` or
    /// `"main"` addresses the full class source. Other kinds accept only
    /// `None`/`"main"`.
    pub fn source_uri(
        self,
        name: &str,
        parent: Option<&str>,
        include: Option<&str>,
    ) -> Result<String, AdtError> {
        let sub_path = self.spec().source_path.ok_or_else(|| {
            AdtError::Validation(format!("{} objects have no editable source", self.as_str()))
        })?;
        let object_uri = self.object_uri(name, parent)?;
        match include {
            None | Some("main") => Ok(format!("{}/{}", object_uri, sub_path)),
            Some(section) => {
                if self != ObjectKind::Class {
                    return Err(AdtError::Validation(format!(
                        "include sections are only addressable on classes, not {}",
                        self.as_str()
                    )));
                }
                if !CLASS_INCLUDES.contains(&section) {
                    return Err(AdtError::Validation(format!(
                        "unknown class include '{}'; expected one of {}",
                        section,
                        CLASS_INCLUDES.join(", ")
                    )));
                }
                Ok(format!("{}/includes/{}", object_uri, section))
            }
        }
    }

    /// Lower-case kind name used in tool parameters and messages.
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Program => "program",
            ObjectKind::Class => "class",
            ObjectKind::Interface => "interface",
            ObjectKind::Include => "include",
            ObjectKind::FunctionGroup => "function_group",
            ObjectKind::FunctionModule => "function_module",
            ObjectKind::Table => "table",
            ObjectKind::Structure => "structure",
            ObjectKind::DataElement => "data_element",
            ObjectKind::Domain => "domain",
            ObjectKind::Transaction => "transaction",
            ObjectKind::Package => "package",
            ObjectKind::CdsDdl => "cds",
        }
    }

    /// All kinds, catalogue order.
    pub fn all() -> &'static [ObjectKind] {
        &[
            ObjectKind::Program,
            ObjectKind::Class,
            ObjectKind::Interface,
            ObjectKind::Include,
            ObjectKind::FunctionGroup,
            ObjectKind::FunctionModule,
            ObjectKind::Table,
            ObjectKind::Structure,
            ObjectKind::DataElement,
            ObjectKind::Domain,
            ObjectKind::Transaction,
            ObjectKind::Package,
            ObjectKind::CdsDdl,
        ]
    }
}

impl FromStr for ObjectKind {
    type Err = AdtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "program" | "prog" => Ok(ObjectKind::Program),
            "class" | "clas" => Ok(ObjectKind::Class),
            "interface" | "intf" => Ok(ObjectKind::Interface),
            "include" => Ok(ObjectKind::Include),
            "function_group" | "fugr" => Ok(ObjectKind::FunctionGroup),
            "function_module" | "function" => Ok(ObjectKind::FunctionModule),
            "table" | "tabl" => Ok(ObjectKind::Table),
            "structure" => Ok(ObjectKind::Structure),
            "data_element" | "dtel" => Ok(ObjectKind::DataElement),
            "domain" | "doma" => Ok(ObjectKind::Domain),
            "transaction" | "tran" => Ok(ObjectKind::Transaction),
            "package" | "devc" => Ok(ObjectKind::Package),
            "cds" | "ddls" | "cds_ddl" => Ok(ObjectKind::CdsDdl),
            other => Err(AdtError::Validation(format!(
                "unknown object kind '{other}'"
            ))),
        }
    }
}

/// Upper-case and percent-encode an object name for use in a URI path
/// segment. Namespaced objects (`/NS/NAME`) encode their slashes.
fn escape_name(name: &str) -> Result<String, AdtError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AdtError::Validation("object name must not be empty".into()));
    }
    Ok(urlencoding::encode(&trimmed.to_uppercase()).into_owned())
}
