//! Repository navigation: search, package contents, where-used, definition
//! lookup, CDS dependencies and object property reads.

use serde_json::{Map, Value};

use crate::adt::catalog::ObjectKind;
use crate::adt::xml::cds::{parse_dependency_tree, DependencyNode};
use crate::adt::xml::objects::{
    parse_node_structure, parse_search_results, ObjectInfo, PackageInfo,
};
use crate::adt::xml::usages::{
    parse_navigation_target, parse_usage_references, usage_references_body, NavigationTarget,
    UsageReference,
};
use crate::adt::xml::Element;
use crate::adt::AdtClient;
use crate::error::AdtError;

const XML_ACCEPT: &str = "application/xml";

const SEARCH_PATH: &str = "/sap/bc/adt/repository/informationsystem/search";
const NODESTRUCTURE_PATH: &str = "/sap/bc/adt/repository/nodestructure";
const USAGES_PATH: &str = "/sap/bc/adt/repository/informationsystem/usageReferences";
const NAVIGATION_PATH: &str = "/sap/bc/adt/navigation/target";

/// Verified CDS dependency endpoint. Discovery documents disagree between
/// systems, so the first call probes and the answer is cached for the
/// process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdsEndpoint {
    /// `/sap/bc/adt/cds/dependencies?name=…`
    Dedicated,
    /// `/sap/bc/adt/ddic/ddl/sources/<name>/dependencies`
    PerSource,
}

/// Dependency traversal depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DependencyLevel {
    /// Direct dependencies only.
    #[default]
    Unit,
    /// Full transitive hierarchy.
    Hierarchy,
}

impl DependencyLevel {
    pub fn parse(raw: Option<&str>) -> Result<Self, AdtError> {
        match raw {
            None => Ok(DependencyLevel::default()),
            Some(level) => match level.to_ascii_lowercase().as_str() {
                "unit" => Ok(DependencyLevel::Unit),
                "hierarchy" => Ok(DependencyLevel::Hierarchy),
                other => Err(AdtError::Validation(format!(
                    "dependency level must be 'unit' or 'hierarchy', got '{other}'"
                ))),
            },
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            DependencyLevel::Unit => "unit",
            DependencyLevel::Hierarchy => "hierarchy",
        }
    }
}

impl AdtClient {
    /// Quick search over the repository. `*` wildcards pass through.
    pub async fn search_objects(
        &self,
        pattern: &str,
        max_results: u32,
    ) -> Result<Vec<ObjectInfo>, AdtError> {
        if pattern.trim().is_empty() {
            return Err(AdtError::Validation("search pattern must not be empty".into()));
        }
        let max = max_results.max(1).to_string();
        let response = self
            .transport()
            .get(
                SEARCH_PATH,
                &[
                    ("operation", "quickSearch"),
                    ("query", &pattern.to_uppercase()),
                    ("maxResults", &max),
                ],
                XML_ACCEPT,
            )
            .await?;
        parse_search_results(&response.text())
    }

    /// Direct children of a repository node (package, function group,
    /// program, …).
    pub async fn node_contents(
        &self,
        parent_type: &str,
        parent_name: &str,
    ) -> Result<Vec<ObjectInfo>, AdtError> {
        let response = self
            .transport()
            .post(
                NODESTRUCTURE_PATH,
                &[
                    ("parent_type", parent_type),
                    ("parent_name", &parent_name.to_uppercase()),
                    ("withShortDescriptions", "true"),
                ],
                XML_ACCEPT,
                XML_ACCEPT,
                Vec::new(),
            )
            .await?;
        parse_node_structure(&response.text())
    }

    /// Package metadata together with its direct contents.
    pub async fn get_package(&self, name: &str) -> Result<PackageInfo, AdtError> {
        let path = ObjectKind::Package.object_uri(name, None)?;
        let response = self.transport().get(&path, &[], XML_ACCEPT).await?;
        let description = Element::parse(&response.text())
            .ok()
            .and_then(|root| root.attr("description").map(str::to_string));
        let contents = self
            .node_contents(ObjectKind::Package.type_code(), name)
            .await?;
        Ok(PackageInfo::from_contents(name, description, contents))
    }

    /// Function modules and includes of a function group.
    pub async fn function_group_contents(&self, name: &str) -> Result<Vec<ObjectInfo>, AdtError> {
        self.node_contents(ObjectKind::FunctionGroup.type_code(), name)
            .await
    }

    /// Includes referenced by a program.
    pub async fn includes_list(&self, program: &str) -> Result<Vec<ObjectInfo>, AdtError> {
        let contents = self
            .node_contents(ObjectKind::Program.type_code(), program)
            .await?;
        Ok(contents
            .into_iter()
            .filter(|o| o.object_type.starts_with("PROG/I"))
            .collect())
    }

    /// Structural children of an arbitrary object.
    pub async fn object_structure(
        &self,
        kind: ObjectKind,
        name: &str,
    ) -> Result<Vec<ObjectInfo>, AdtError> {
        self.node_contents(kind.type_code(), name).await
    }

    /// Where-used list for an object, optionally anchored on a source
    /// position for symbol-level queries.
    pub async fn find_references(
        &self,
        kind: ObjectKind,
        name: &str,
        parent: Option<&str>,
        position: Option<(u32, u32)>,
    ) -> Result<Vec<UsageReference>, AdtError> {
        let uri = match position {
            Some((line, column)) => {
                let source_uri = kind.source_uri(name, parent, None)?;
                format!("{source_uri}#start={line},{column}")
            }
            None => kind.object_uri(name, parent)?,
        };
        self.find_references_by_uri(&uri).await
    }

    /// Where-used list anchored on a raw ADT URI.
    pub async fn find_references_by_uri(
        &self,
        uri: &str,
    ) -> Result<Vec<UsageReference>, AdtError> {
        let body = usage_references_body();
        let response = self
            .transport()
            .post(
                USAGES_PATH,
                &[("uri", uri)],
                XML_ACCEPT,
                "application/vnd.sap.adt.repository.usagereferences.request.v1+xml",
                body.into_bytes(),
            )
            .await?;
        parse_usage_references(&response.text())
    }

    /// Resolve the definition of the symbol at a source position.
    pub async fn find_definition(
        &self,
        kind: ObjectKind,
        name: &str,
        parent: Option<&str>,
        line: u32,
        column: u32,
    ) -> Result<NavigationTarget, AdtError> {
        let source_uri = kind.source_uri(name, parent, None)?;
        let uri = format!("{source_uri}#start={line},{column}");
        let response = self
            .transport()
            .post(
                NAVIGATION_PATH,
                &[("uri", uri.as_str())],
                XML_ACCEPT,
                XML_ACCEPT,
                Vec::new(),
            )
            .await?;
        parse_navigation_target(&response.text())
    }

    /// CDS dependency tree for a DDL source.
    ///
    /// The endpoint differs between releases; the first call probes the
    /// dedicated resource and falls back to the per-source one on 404,
    /// remembering the outcome.
    pub async fn cds_dependencies(
        &self,
        ddl_source: &str,
        level: DependencyLevel,
        with_associations: bool,
    ) -> Result<DependencyNode, AdtError> {
        match self.cds_dependency_base.get() {
            Some(CdsEndpoint::Dedicated) => {
                self.cds_dependencies_dedicated(ddl_source, level, with_associations)
                    .await
            }
            Some(CdsEndpoint::PerSource) => {
                self.cds_dependencies_per_source(ddl_source, level).await
            }
            None => {
                match self
                    .cds_dependencies_dedicated(ddl_source, level, with_associations)
                    .await
                {
                    Ok(tree) => {
                        let _ = self.cds_dependency_base.set(CdsEndpoint::Dedicated);
                        Ok(tree)
                    }
                    Err(AdtError::NotFound(_)) => {
                        let tree = self.cds_dependencies_per_source(ddl_source, level).await?;
                        let _ = self.cds_dependency_base.set(CdsEndpoint::PerSource);
                        Ok(tree)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn cds_dependencies_dedicated(
        &self,
        ddl_source: &str,
        level: DependencyLevel,
        with_associations: bool,
    ) -> Result<DependencyNode, AdtError> {
        let name = ddl_source.to_uppercase();
        let associations = if with_associations { "true" } else { "false" };
        let response = self
            .transport()
            .get(
                "/sap/bc/adt/cds/dependencies",
                &[
                    ("name", name.as_str()),
                    ("level", level.as_str()),
                    ("withAssociations", associations),
                ],
                XML_ACCEPT,
            )
            .await?;
        parse_dependency_tree(&response.text())
    }

    async fn cds_dependencies_per_source(
        &self,
        ddl_source: &str,
        level: DependencyLevel,
    ) -> Result<DependencyNode, AdtError> {
        let base = ObjectKind::CdsDdl.object_uri(ddl_source, None)?;
        let path = format!("{base}/dependencies");
        let response = self
            .transport()
            .get(&path, &[("level", level.as_str())], XML_ACCEPT)
            .await?;
        parse_dependency_tree(&response.text())
    }

    /// Read the XML properties of an object that has no editable source
    /// (domains, data elements, transactions) as a flat attribute map.
    pub async fn read_object_properties(
        &self,
        kind: ObjectKind,
        name: &str,
    ) -> Result<Value, AdtError> {
        let path = kind.object_uri(name, None)?;
        let response = self.transport().get(&path, &[], XML_ACCEPT).await?;
        let root = Element::parse(&response.text())?;
        let mut properties = Map::new();
        for (key, value) in &root.attrs {
            properties.insert(key.clone(), Value::String(value.clone()));
        }
        for child in &root.children {
            if child.children.is_empty() && !child.text.is_empty() {
                properties
                    .entry(child.name.clone())
                    .or_insert_with(|| Value::String(child.text.clone()));
            }
        }
        Ok(Value::Object(properties))
    }
}
