//! MCP server implementation with the ABAP ADT tool surface.
//!
//! Two registrations exist: the focused set (curated for agent ergonomics)
//! and the expert set (focused plus every atomic and composite operation).
//! Focused tools delegate to the same client functions as their expert
//! counterparts; the mode flag changes surface area only.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{
        CallToolResult, Content, ErrorCode, ErrorData as McpError, Implementation,
        ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    schemars::{self, JsonSchema},
    tool, tool_handler, tool_router, ServerHandler,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::adt::catalog::ObjectKind;
use crate::adt::navigation::DependencyLevel;
use crate::adt::query::DEFAULT_ROW_LIMIT;
use crate::adt::xml::aunit::{Durations, RiskLevels, UnitTestFlags};
use crate::adt::xml::create::CreateRequest;
use crate::adt::AdtClient;
use crate::config::ToolMode;
use crate::debug::DebugLogger;
use crate::error::AdtError;

/// Default object cap for package-wide greps.
const GREP_PACKAGE_DEFAULT_LIMIT: usize = 50;

/// ABAP ADT MCP Server.
#[derive(Clone)]
pub struct AbapAdtServer {
    client: Arc<AdtClient>,
    debug: Arc<DebugLogger>,
    tool_router: ToolRouter<Self>,
}

impl AbapAdtServer {
    pub fn new(client: Arc<AdtClient>, mode: ToolMode, debug: Arc<DebugLogger>) -> Self {
        let tool_router = match mode {
            ToolMode::Focused => Self::focused_tools(),
            ToolMode::Expert => Self::focused_tools() + Self::expert_tools(),
        };
        Self {
            client,
            debug,
            tool_router,
        }
    }

    /// Number of registered tools, as reported to clients.
    pub fn tool_count(&self) -> usize {
        self.tool_router.list_all().len()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Map an operational error onto the MCP error payload: machine-readable
/// code plus the human message.
fn to_mcp_error(e: AdtError) -> McpError {
    let code = match e {
        AdtError::Validation(_) => ErrorCode::INVALID_PARAMS,
        _ => ErrorCode::INTERNAL_ERROR,
    };
    McpError {
        code,
        message: Cow::from(e.to_string()),
        data: Some(json!({ "code": e.code() })),
    }
}

fn validation_error(message: impl Into<String>) -> McpError {
    to_mcp_error(AdtError::Validation(message.into()))
}

fn parse_kind(raw: &str) -> Result<ObjectKind, McpError> {
    raw.parse::<ObjectKind>().map_err(to_mcp_error)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Create,
    Update,
}

/// `mode` is deliberately explicit: an accidental create of an existing
/// object is a destructive mistake pattern, so there is no implicit upsert.
fn resolve_write_mode(mode: Option<&str>) -> Result<WriteMode, McpError> {
    match mode {
        None => Err(validation_error("mode is required: 'create' or 'update'")),
        Some("create") => Ok(WriteMode::Create),
        Some("update") => Ok(WriteMode::Update),
        Some(other) => Err(validation_error(format!(
            "mode must be 'create' or 'update', got '{other}'"
        ))),
    }
}

fn text_result(text: String) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text)])
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| McpError {
        code: ErrorCode::INTERNAL_ERROR,
        message: Cow::from(format!("result serialization failed: {e}")),
        data: None,
    })?;
    Ok(text_result(json))
}

/// One grep hit: location plus the matched line.
#[derive(Debug, Serialize)]
struct GrepMatch {
    object: String,
    line: u32,
    text: String,
}

fn grep_source(object: &str, source: &str, regex: &Regex, out: &mut Vec<GrepMatch>) {
    for (idx, line) in source.lines().enumerate() {
        if regex.is_match(line) {
            out.push(GrepMatch {
                object: object.to_string(),
                line: (idx + 1) as u32,
                text: line.to_string(),
            });
        }
    }
}

/// Object types in package listings that carry readable source.
fn kind_for_node_type(node_type: &str) -> Option<ObjectKind> {
    match node_type.split('/').next().unwrap_or("") {
        "PROG" if node_type == "PROG/I" => Some(ObjectKind::Include),
        "PROG" => Some(ObjectKind::Program),
        "CLAS" => Some(ObjectKind::Class),
        "INTF" => Some(ObjectKind::Interface),
        "DDLS" => Some(ObjectKind::CdsDdl),
        _ => None,
    }
}

// ============================================================================
// Tool Parameter Structs
// ============================================================================

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchObjectParams {
    /// Search pattern; `*` wildcards are supported (e.g. "CL_ABAP*")
    pub pattern: String,
    /// Maximum number of results (default 100)
    pub max_results: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GrepObjectParams {
    /// Object kind: program, class, interface, include, function_module, table, cds
    pub kind: String,
    /// Object name
    pub name: String,
    /// Enclosing function group (function modules only)
    pub parent: Option<String>,
    /// Class include section: definitions, implementations, macros, testclasses
    pub include: Option<String>,
    /// Regular expression matched against each source line
    pub pattern: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GrepPackageParams {
    /// Package name (e.g. "$TMP" or "ZDEMO")
    pub package: String,
    /// Regular expression matched against each source line
    pub pattern: String,
    /// Maximum number of objects to scan (default 50)
    pub max_objects: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetSourceParams {
    /// Object kind: program, class, interface, include, function_module, table, cds
    pub kind: String,
    /// Object name
    pub name: String,
    /// Enclosing function group (function modules only)
    pub parent: Option<String>,
    /// Class include section: definitions, implementations, macros, testclasses
    pub include: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct NameParams {
    /// Object name
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetCdsDependenciesParams {
    /// DDL source name of the CDS entity
    pub name: String,
    /// Traversal depth: "unit" (direct) or "hierarchy" (transitive); default unit
    pub level: Option<String>,
    /// Include association targets in the tree
    pub with_associations: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct QueryDataParams {
    /// A table name (expands to SELECT * FROM <name>) or a full SQL statement
    pub query: String,
    /// Maximum number of rows (default 100)
    pub max_rows: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EditSourceParams {
    /// Object kind: program, class, interface, include, function_module, cds
    pub kind: String,
    /// Object name
    pub name: String,
    /// Enclosing function group (function modules only)
    pub parent: Option<String>,
    /// Class include section to edit
    pub include: Option<String>,
    /// Regular expression to replace
    pub pattern: String,
    /// Replacement text; capture groups as $1, $2, …
    pub replacement: String,
    /// Replace at most this many matches (default: all)
    pub max_replacements: Option<u32>,
    /// Transport request number (non-local packages)
    pub transport: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct WriteSourceParams {
    /// Object kind: program, class, interface, include, function_module, cds
    pub kind: String,
    /// Object name
    pub name: String,
    /// Full new source text
    pub source: String,
    /// Required: "create" (object must not exist yet) or "update"
    pub mode: Option<String>,
    /// Enclosing function group (function modules only)
    pub parent: Option<String>,
    /// Class include section to write
    pub include: Option<String>,
    /// Target package (required for mode=create)
    pub package: Option<String>,
    /// Object description (mode=create)
    pub description: Option<String>,
    /// Transport request number (non-local packages)
    pub transport: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FindDefinitionParams {
    /// Object kind of the source being inspected
    pub kind: String,
    /// Object name
    pub name: String,
    /// Enclosing function group (function modules only)
    pub parent: Option<String>,
    /// 1-based source line of the symbol
    pub line: u32,
    /// 0-based column of the symbol
    pub column: u32,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FindReferencesParams {
    /// Object kind: program, class, interface, include, function_module, table, cds
    pub kind: String,
    /// Object name
    pub name: String,
    /// Enclosing function group (function modules only)
    pub parent: Option<String>,
    /// 1-based source line, for symbol-level queries
    pub line: Option<u32>,
    /// 0-based column, for symbol-level queries
    pub column: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RunUnitTestsParams {
    /// Object kind (default class)
    pub kind: Option<String>,
    /// Object name
    pub name: String,
    /// Enclosing function group (function modules only)
    pub parent: Option<String>,
    /// Risk levels to admit; default: harmless only
    pub risk_levels: Option<RiskLevels>,
    /// Durations to admit; default: short and medium
    pub durations: Option<Durations>,
    /// Measure coverage
    pub coverage: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SyntaxCheckParams {
    /// Object kind the source belongs to
    pub kind: String,
    /// Object name
    pub name: String,
    /// Enclosing function group (function modules only)
    pub parent: Option<String>,
    /// Candidate source to check (not saved)
    pub source: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LockObjectParams {
    /// Object kind
    pub kind: String,
    /// Object name
    pub name: String,
    /// Enclosing function group (function modules only)
    pub parent: Option<String>,
    /// Access mode (default MODIFY)
    pub access_mode: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UnlockObjectParams {
    /// Object kind
    pub kind: String,
    /// Object name
    pub name: String,
    /// Enclosing function group (function modules only)
    pub parent: Option<String>,
    /// Lock handle obtained from lock_object
    pub lock_handle: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetClassIncludeParams {
    /// Class name
    pub name: String,
    /// Include section: definitions, implementations, macros, testclasses
    pub include: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetFunctionParams {
    /// Function module name
    pub name: String,
    /// Enclosing function group
    pub group: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetTableContentsParams {
    /// Table name
    pub name: String,
    /// Maximum number of rows (default 100)
    pub max_rows: Option<u32>,
    /// Optional full SELECT statement overriding the plain table read
    pub sql: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RunQueryParams {
    /// SQL statement to execute
    pub sql: String,
    /// Maximum number of rows (default 100)
    pub max_rows: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetTypeInfoParams {
    /// Data element or domain name
    pub name: String,
    /// "data_element" (default) or "domain"
    pub kind: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetObjectStructureParams {
    /// Object kind
    pub kind: String,
    /// Object name
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetWhereUsedParams {
    /// Raw ADT URI to anchor the where-used query on (may carry a
    /// `#start=line,column` fragment)
    pub uri: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateObjectParams {
    /// Object kind: program, class, interface, include, function_group, function_module
    pub kind: String,
    /// Object name
    pub name: String,
    /// Object description
    pub description: Option<String>,
    /// Target package
    pub package: String,
    /// Enclosing function group (function modules only)
    pub parent: Option<String>,
    /// Transport request number (non-local packages)
    pub transport: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreatePackageParams {
    /// Package name; must start with '$' (local packages only)
    pub name: String,
    /// Package description
    pub description: Option<String>,
    /// Parent package (default $TMP)
    pub parent: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeleteObjectParams {
    /// Object kind
    pub kind: String,
    /// Object name
    pub name: String,
    /// Enclosing function group (function modules only)
    pub parent: Option<String>,
    /// Lock handle obtained from lock_object
    pub lock_handle: String,
    /// Transport request number (non-local packages)
    pub transport: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdateSourceParams {
    /// Object kind
    pub kind: String,
    /// Object name
    pub name: String,
    /// Enclosing function group (function modules only)
    pub parent: Option<String>,
    /// Class include section to write
    pub include: Option<String>,
    /// Full new source text
    pub source: String,
    /// Lock handle obtained from lock_object
    pub lock_handle: String,
    /// Transport request number (non-local packages)
    pub transport: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ActivateObjectParams {
    /// Object kind
    pub kind: String,
    /// Object name
    pub name: String,
    /// Enclosing function group (function modules only)
    pub parent: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PrettyPrintParams {
    /// Source text to format
    pub source: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateAndActivateParams {
    /// Object kind
    pub kind: String,
    /// Object name
    pub name: String,
    /// Object description
    pub description: Option<String>,
    /// Target package
    pub package: String,
    /// Enclosing function group (function modules only)
    pub parent: Option<String>,
    /// Initial source to write after creation
    pub source: Option<String>,
    /// Transport request number (non-local packages)
    pub transport: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateClassWithTestsParams {
    /// Class name
    pub name: String,
    /// Class description
    pub description: Option<String>,
    /// Target package
    pub package: String,
    /// Main class source (definition + implementation)
    pub source: String,
    /// Test classes include source
    pub test_source: String,
    /// Transport request number (non-local packages)
    pub transport: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RenameObjectParams {
    /// Object kind
    pub kind: String,
    /// Current object name
    pub old_name: String,
    /// New object name
    pub new_name: String,
    /// Target package for the copy
    pub package: String,
    /// Description of the copy
    pub description: Option<String>,
    /// Enclosing function group (function modules only)
    pub parent: Option<String>,
    /// Transport request number (non-local packages)
    pub transport: Option<String>,
}

// ============================================================================
// Focused Tool Set
// ============================================================================

#[tool_router(router = focused_tools)]
impl AbapAdtServer {
    #[tool(description = "Search repository objects by pattern (quick search, * wildcards).")]
    async fn search_object(
        &self,
        Parameters(params): Parameters<SearchObjectParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("search_object", &json!(params));
        let results = self
            .client
            .search_objects(&params.pattern, params.max_results.unwrap_or(100))
            .await
            .map_err(to_mcp_error)?;
        json_result(&results)
    }

    #[tool(description = "Scan one object's source with a regular expression; returns matching lines with line numbers. Far cheaper than reading the full source.")]
    async fn grep_object(
        &self,
        Parameters(params): Parameters<GrepObjectParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("grep_object", &json!(params));
        let kind = parse_kind(&params.kind)?;
        let regex = Regex::new(&params.pattern)
            .map_err(|e| validation_error(format!("invalid pattern: {e}")))?;
        let source = self
            .client
            .read_source(
                kind,
                &params.name,
                params.parent.as_deref(),
                params.include.as_deref(),
            )
            .await
            .map_err(to_mcp_error)?;
        let mut matches = Vec::new();
        grep_source(&params.name.to_uppercase(), &source, &regex, &mut matches);
        json_result(&matches)
    }

    #[tool(description = "Scan the sources of every object in a package with a regular expression.")]
    async fn grep_package(
        &self,
        Parameters(params): Parameters<GrepPackageParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("grep_package", &json!(params));
        let regex = Regex::new(&params.pattern)
            .map_err(|e| validation_error(format!("invalid pattern: {e}")))?;
        let package = self
            .client
            .get_package(&params.package)
            .await
            .map_err(to_mcp_error)?;

        let limit = params
            .max_objects
            .map(|m| m as usize)
            .unwrap_or(GREP_PACKAGE_DEFAULT_LIMIT);
        let mut matches = Vec::new();
        let mut scanned = 0usize;
        for object in &package.objects {
            if scanned >= limit {
                break;
            }
            let Some(kind) = kind_for_node_type(&object.object_type) else {
                continue;
            };
            scanned += 1;
            match self.client.read_source(kind, &object.name, None, None).await {
                Ok(source) => grep_source(&object.name, &source, &regex, &mut matches),
                Err(AdtError::NotFound(_)) => {}
                Err(e) => return Err(to_mcp_error(e)),
            }
        }
        json_result(&json!({
            "scanned_objects": scanned,
            "matches": matches,
        }))
    }

    #[tool(description = "Read the source of a repository object. Classes accept an include section (definitions, implementations, macros, testclasses).")]
    async fn get_source(
        &self,
        Parameters(params): Parameters<GetSourceParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_source", &json!(params));
        let kind = parse_kind(&params.kind)?;
        let source = self
            .client
            .read_source(
                kind,
                &params.name,
                params.parent.as_deref(),
                params.include.as_deref(),
            )
            .await
            .map_err(to_mcp_error)?;
        Ok(text_result(source))
    }

    #[tool(description = "List the function modules and includes of a function group.")]
    async fn get_function_group(
        &self,
        Parameters(params): Parameters<NameParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_function_group", &json!(params));
        let contents = self
            .client
            .function_group_contents(&params.name)
            .await
            .map_err(to_mcp_error)?;
        json_result(&contents)
    }

    #[tool(description = "Read package metadata with its sub-packages and objects.")]
    async fn get_package(
        &self,
        Parameters(params): Parameters<NameParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_package", &json!(params));
        let package = self
            .client
            .get_package(&params.name)
            .await
            .map_err(to_mcp_error)?;
        json_result(&package)
    }

    #[tool(description = "Read the DDL source of a database table.")]
    async fn get_table(
        &self,
        Parameters(params): Parameters<NameParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_table", &json!(params));
        let source = self
            .client
            .read_source(ObjectKind::Table, &params.name, None, None)
            .await
            .map_err(to_mcp_error)?;
        Ok(text_result(source))
    }

    #[tool(description = "Dependency tree of a CDS view: referenced tables, views and functions with their join relations.")]
    async fn get_cds_dependencies(
        &self,
        Parameters(params): Parameters<GetCdsDependenciesParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_cds_dependencies", &json!(params));
        let level = DependencyLevel::parse(params.level.as_deref()).map_err(to_mcp_error)?;
        let tree = self
            .client
            .cds_dependencies(
                &params.name,
                level,
                params.with_associations.unwrap_or(false),
            )
            .await
            .map_err(to_mcp_error)?;
        json_result(&tree)
    }

    #[tool(description = "Query table data. Pass a bare table name (SELECT * is implied) or a full SQL statement.")]
    async fn query_data(
        &self,
        Parameters(params): Parameters<QueryDataParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("query_data", &json!(params));
        let contents = self
            .client
            .run_query(&params.query, params.max_rows.unwrap_or(DEFAULT_ROW_LIMIT))
            .await
            .map_err(to_mcp_error)?;
        json_result(&contents)
    }

    #[tool(description = "Regex-edit an object's source: read, substitute, then lock/update/unlock/activate. A non-matching pattern is a no-op without side effects.")]
    async fn edit_source(
        &self,
        Parameters(params): Parameters<EditSourceParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("edit_source", &json!(params));
        let kind = parse_kind(&params.kind)?;
        let outcome = self
            .client
            .edit_source_workflow(
                kind,
                &params.name,
                params.parent.as_deref(),
                params.include.as_deref(),
                &params.pattern,
                &params.replacement,
                params.max_replacements.map(|m| m as usize),
                params.transport.as_deref(),
            )
            .await
            .map_err(to_mcp_error)?;
        json_result(&outcome)
    }

    #[tool(description = "Write full object source. mode is required: 'create' makes the object first, 'update' rewrites an existing one. Runs lock/update/unlock/activate; activation messages are returned, not raised.")]
    async fn write_source(
        &self,
        Parameters(params): Parameters<WriteSourceParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("write_source", &json!(params));
        let kind = parse_kind(&params.kind)?;

        match resolve_write_mode(params.mode.as_deref())? {
            WriteMode::Update => {
                let outcome = self
                    .client
                    .write_source_workflow(
                        kind,
                        &params.name,
                        params.parent.as_deref(),
                        params.include.as_deref(),
                        &params.source,
                        params.transport.as_deref(),
                    )
                    .await
                    .map_err(to_mcp_error)?;
                json_result(&outcome)
            }
            WriteMode::Create => {
                let package = params
                    .package
                    .as_deref()
                    .ok_or_else(|| validation_error("mode=create requires 'package'"))?;
                let request = CreateRequest {
                    kind,
                    name: params.name.clone(),
                    description: params.description.clone().unwrap_or_default(),
                    package: package.to_string(),
                    parent: params.parent.clone(),
                    transport: params.transport.clone(),
                    responsible: self.client.responsible_user().to_string(),
                };
                let outcome = self
                    .client
                    .create_and_activate_workflow(&request, Some(&params.source))
                    .await
                    .map_err(to_mcp_error)?;
                json_result(&outcome)
            }
        }
    }

    #[tool(description = "Resolve the definition of the symbol at a source position.")]
    async fn find_definition(
        &self,
        Parameters(params): Parameters<FindDefinitionParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("find_definition", &json!(params));
        let kind = parse_kind(&params.kind)?;
        let target = self
            .client
            .find_definition(
                kind,
                &params.name,
                params.parent.as_deref(),
                params.line,
                params.column,
            )
            .await
            .map_err(to_mcp_error)?;
        json_result(&target)
    }

    #[tool(description = "Where-used list for an object, or for the symbol at a source position when line/column are given.")]
    async fn find_references(
        &self,
        Parameters(params): Parameters<FindReferencesParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("find_references", &json!(params));
        let kind = parse_kind(&params.kind)?;
        let position = match (params.line, params.column) {
            (Some(line), Some(column)) => Some((line, column)),
            (None, None) => None,
            _ => {
                return Err(validation_error(
                    "line and column must be given together",
                ))
            }
        };
        let usages = self
            .client
            .find_references(kind, &params.name, params.parent.as_deref(), position)
            .await
            .map_err(to_mcp_error)?;
        json_result(&usages)
    }

    #[tool(description = "Run the ABAP Unit tests of an object; returns classes, methods and failure alerts.")]
    async fn run_unit_tests(
        &self,
        Parameters(params): Parameters<RunUnitTestsParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("run_unit_tests", &json!(params));
        let kind = match params.kind.as_deref() {
            Some(raw) => parse_kind(raw)?,
            None => ObjectKind::Class,
        };
        let defaults = UnitTestFlags::default();
        let flags = UnitTestFlags {
            risk_levels: params.risk_levels.unwrap_or(defaults.risk_levels),
            durations: params.durations.unwrap_or(defaults.durations),
            coverage: params.coverage.unwrap_or(defaults.coverage),
        };
        let result = self
            .client
            .run_unit_tests(kind, &params.name, params.parent.as_deref(), &flags)
            .await
            .map_err(to_mcp_error)?;
        json_result(&result)
    }

    #[tool(description = "Syntax-check a candidate source against an object without saving it.")]
    async fn syntax_check(
        &self,
        Parameters(params): Parameters<SyntaxCheckParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("syntax_check", &json!(params));
        let kind = parse_kind(&params.kind)?;
        let messages = self
            .client
            .syntax_check(kind, &params.name, params.parent.as_deref(), &params.source)
            .await
            .map_err(to_mcp_error)?;
        json_result(&messages)
    }

    #[tool(description = "Advanced: lock an object and return the lock handle. The session turns stateful so the handle stays valid across calls.")]
    async fn lock_object(
        &self,
        Parameters(params): Parameters<LockObjectParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("lock_object", &json!(params));
        let kind = parse_kind(&params.kind)?;
        let lock = self
            .client
            .lock_object(
                kind,
                &params.name,
                params.parent.as_deref(),
                params.access_mode.as_deref().unwrap_or("MODIFY"),
            )
            .await
            .map_err(to_mcp_error)?;
        json_result(&json!({
            "lock_handle": lock.handle,
            "is_local": lock.is_local,
            "transport": lock.transport,
        }))
    }

    #[tool(description = "Advanced: release a lock handle. Releasing an unknown handle succeeds.")]
    async fn unlock_object(
        &self,
        Parameters(params): Parameters<UnlockObjectParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("unlock_object", &json!(params));
        let kind = parse_kind(&params.kind)?;
        self.client
            .unlock_object(
                kind,
                &params.name,
                params.parent.as_deref(),
                &params.lock_handle,
            )
            .await
            .map_err(to_mcp_error)?;
        json_result(&json!({ "unlocked": true }))
    }
}

// ============================================================================
// Expert Tool Set (additions on top of the focused set)
// ============================================================================

#[tool_router(router = expert_tools)]
impl AbapAdtServer {
    #[tool(description = "Read the source of an ABAP program.")]
    async fn get_program(
        &self,
        Parameters(params): Parameters<NameParams>,
    ) -> Result<CallToolResult, McpError> {
        self.read_source_tool("get_program", ObjectKind::Program, &params.name, None, None)
            .await
    }

    #[tool(description = "Read all source sections of a class, keyed by section name (main plus the populated includes).")]
    async fn get_class(
        &self,
        Parameters(params): Parameters<NameParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_class", &json!(params));
        let sections = self
            .client
            .read_class_sections(&params.name)
            .await
            .map_err(to_mcp_error)?;
        json_result(&sections)
    }

    #[tool(description = "Read one include section of a class.")]
    async fn get_class_include(
        &self,
        Parameters(params): Parameters<GetClassIncludeParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_class_include", &json!(params));
        let source = self
            .client
            .read_source(
                ObjectKind::Class,
                &params.name,
                None,
                Some(params.include.as_str()),
            )
            .await
            .map_err(to_mcp_error)?;
        Ok(text_result(source))
    }

    #[tool(description = "Read the source of an interface.")]
    async fn get_interface(
        &self,
        Parameters(params): Parameters<NameParams>,
    ) -> Result<CallToolResult, McpError> {
        self.read_source_tool(
            "get_interface",
            ObjectKind::Interface,
            &params.name,
            None,
            None,
        )
        .await
    }

    #[tool(description = "Read the source of an include.")]
    async fn get_include(
        &self,
        Parameters(params): Parameters<NameParams>,
    ) -> Result<CallToolResult, McpError> {
        self.read_source_tool("get_include", ObjectKind::Include, &params.name, None, None)
            .await
    }

    #[tool(description = "Read the source of a function module.")]
    async fn get_function(
        &self,
        Parameters(params): Parameters<GetFunctionParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_function", &json!(params));
        let source = self
            .client
            .read_source(
                ObjectKind::FunctionModule,
                &params.name,
                Some(params.group.as_str()),
                None,
            )
            .await
            .map_err(to_mcp_error)?;
        Ok(text_result(source))
    }

    #[tool(description = "Read the main include source of a function group.")]
    async fn get_function_group_source(
        &self,
        Parameters(params): Parameters<NameParams>,
    ) -> Result<CallToolResult, McpError> {
        self.read_source_tool(
            "get_function_group_source",
            ObjectKind::FunctionGroup,
            &params.name,
            None,
            None,
        )
        .await
    }

    #[tool(description = "Read the DDL source of a structure.")]
    async fn get_structure(
        &self,
        Parameters(params): Parameters<NameParams>,
    ) -> Result<CallToolResult, McpError> {
        self.read_source_tool(
            "get_structure",
            ObjectKind::Structure,
            &params.name,
            None,
            None,
        )
        .await
    }

    #[tool(description = "Read transaction properties.")]
    async fn get_transaction(
        &self,
        Parameters(params): Parameters<NameParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_transaction", &json!(params));
        let properties = self
            .client
            .read_object_properties(ObjectKind::Transaction, &params.name)
            .await
            .map_err(to_mcp_error)?;
        json_result(&properties)
    }

    #[tool(description = "Read the properties of a data element or domain.")]
    async fn get_type_info(
        &self,
        Parameters(params): Parameters<GetTypeInfoParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_type_info", &json!(params));
        let kind = match params.kind.as_deref() {
            None | Some("data_element") => ObjectKind::DataElement,
            Some("domain") => ObjectKind::Domain,
            Some(other) => {
                return Err(validation_error(format!(
                    "kind must be 'data_element' or 'domain', got '{other}'"
                )))
            }
        };
        let properties = self
            .client
            .read_object_properties(kind, &params.name)
            .await
            .map_err(to_mcp_error)?;
        json_result(&properties)
    }

    #[tool(description = "Read the DDL source of a CDS entity.")]
    async fn get_cds_source(
        &self,
        Parameters(params): Parameters<NameParams>,
    ) -> Result<CallToolResult, McpError> {
        self.read_source_tool("get_cds_source", ObjectKind::CdsDdl, &params.name, None, None)
            .await
    }

    #[tool(description = "Read table contents, optionally filtered by a full SELECT statement.")]
    async fn get_table_contents(
        &self,
        Parameters(params): Parameters<GetTableContentsParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_table_contents", &json!(params));
        let contents = self
            .client
            .table_contents(
                &params.name,
                params.max_rows.unwrap_or(DEFAULT_ROW_LIMIT),
                params.sql.as_deref(),
            )
            .await
            .map_err(to_mcp_error)?;
        json_result(&contents)
    }

    #[tool(description = "Execute a free-style SQL query.")]
    async fn run_query(
        &self,
        Parameters(params): Parameters<RunQueryParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("run_query", &json!(params));
        let contents = self
            .client
            .run_query(&params.sql, params.max_rows.unwrap_or(DEFAULT_ROW_LIMIT))
            .await
            .map_err(to_mcp_error)?;
        json_result(&contents)
    }

    #[tool(description = "List the includes referenced by a program.")]
    async fn get_includes_list(
        &self,
        Parameters(params): Parameters<NameParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_includes_list", &json!(params));
        let includes = self
            .client
            .includes_list(&params.name)
            .await
            .map_err(to_mcp_error)?;
        json_result(&includes)
    }

    #[tool(description = "List the structural children of an object (repository node structure).")]
    async fn get_object_structure(
        &self,
        Parameters(params): Parameters<GetObjectStructureParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_object_structure", &json!(params));
        let kind = parse_kind(&params.kind)?;
        let children = self
            .client
            .object_structure(kind, &params.name)
            .await
            .map_err(to_mcp_error)?;
        json_result(&children)
    }

    #[tool(description = "Where-used list anchored on a raw ADT URI.")]
    async fn get_where_used(
        &self,
        Parameters(params): Parameters<GetWhereUsedParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_where_used", &json!(params));
        let usages = self
            .client
            .find_references_by_uri(&params.uri)
            .await
            .map_err(to_mcp_error)?;
        json_result(&usages)
    }

    #[tool(description = "Create a repository object (no source written).")]
    async fn create_object(
        &self,
        Parameters(params): Parameters<CreateObjectParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("create_object", &json!(params));
        let kind = parse_kind(&params.kind)?;
        let request = CreateRequest {
            kind,
            name: params.name.clone(),
            description: params.description.clone().unwrap_or_default(),
            package: params.package.clone(),
            parent: params.parent.clone(),
            transport: params.transport.clone(),
            responsible: self.client.responsible_user().to_string(),
        };
        self.client
            .create_object(&request)
            .await
            .map_err(to_mcp_error)?;
        json_result(&json!({ "created": params.name.to_uppercase() }))
    }

    #[tool(description = "Create a local package (name must start with '$').")]
    async fn create_package(
        &self,
        Parameters(params): Parameters<CreatePackageParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("create_package", &json!(params));
        if !params.name.starts_with('$') {
            return Err(validation_error(
                "only local packages (names starting with '$') can be created",
            ));
        }
        let request = CreateRequest {
            kind: ObjectKind::Package,
            name: params.name.clone(),
            description: params.description.clone().unwrap_or_default(),
            package: params.parent.clone().unwrap_or_else(|| "$TMP".to_string()),
            parent: None,
            transport: None,
            responsible: self.client.responsible_user().to_string(),
        };
        self.client
            .create_object(&request)
            .await
            .map_err(to_mcp_error)?;
        json_result(&json!({ "created": params.name.to_uppercase() }))
    }

    #[tool(description = "Delete an object under a held lock.")]
    async fn delete_object(
        &self,
        Parameters(params): Parameters<DeleteObjectParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("delete_object", &json!(params));
        let kind = parse_kind(&params.kind)?;
        self.client
            .delete_object(
                kind,
                &params.name,
                params.parent.as_deref(),
                &params.lock_handle,
                params.transport.as_deref(),
            )
            .await
            .map_err(to_mcp_error)?;
        json_result(&json!({ "deleted": params.name.to_uppercase() }))
    }

    #[tool(description = "Replace a source include section under a held lock (no activation).")]
    async fn update_source(
        &self,
        Parameters(params): Parameters<UpdateSourceParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("update_source", &json!(params));
        let kind = parse_kind(&params.kind)?;
        self.client
            .update_source(
                kind,
                &params.name,
                params.parent.as_deref(),
                params.include.as_deref(),
                &params.source,
                &params.lock_handle,
                params.transport.as_deref(),
            )
            .await
            .map_err(to_mcp_error)?;
        json_result(&json!({ "updated": true }))
    }

    #[tool(description = "Activate an object; returns success plus activation messages. The object must be unlocked.")]
    async fn activate_object(
        &self,
        Parameters(params): Parameters<ActivateObjectParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("activate_object", &json!(params));
        let kind = parse_kind(&params.kind)?;
        let result = self
            .client
            .activate_object(kind, &params.name, params.parent.as_deref())
            .await
            .map_err(to_mcp_error)?;
        json_result(&result)
    }

    #[tool(description = "Format source with the backend pretty printer.")]
    async fn pretty_print(
        &self,
        Parameters(params): Parameters<PrettyPrintParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("pretty_print", &json!({}));
        let formatted = self
            .client
            .pretty_print(&params.source)
            .await
            .map_err(to_mcp_error)?;
        Ok(text_result(formatted))
    }

    #[tool(description = "Create an object and write its initial source through the full write lifecycle.")]
    async fn create_and_activate(
        &self,
        Parameters(params): Parameters<CreateAndActivateParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("create_and_activate", &json!(params));
        let kind = parse_kind(&params.kind)?;
        let request = CreateRequest {
            kind,
            name: params.name.clone(),
            description: params.description.clone().unwrap_or_default(),
            package: params.package.clone(),
            parent: params.parent.clone(),
            transport: params.transport.clone(),
            responsible: self.client.responsible_user().to_string(),
        };
        let outcome = self
            .client
            .create_and_activate_workflow(&request, params.source.as_deref())
            .await
            .map_err(to_mcp_error)?;
        json_result(&json!({
            "created": params.name.to_uppercase(),
            "write": outcome,
        }))
    }

    #[tool(description = "Create a class with a local test classes include; activates once at the end.")]
    async fn create_class_with_tests(
        &self,
        Parameters(params): Parameters<CreateClassWithTestsParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug
            .log_tool_call("create_class_with_tests", &json!(params));
        let request = CreateRequest {
            kind: ObjectKind::Class,
            name: params.name.clone(),
            description: params.description.clone().unwrap_or_default(),
            package: params.package.clone(),
            parent: None,
            transport: params.transport.clone(),
            responsible: self.client.responsible_user().to_string(),
        };
        let outcome = self
            .client
            .create_class_with_tests_workflow(&request, &params.source, &params.test_source)
            .await
            .map_err(to_mcp_error)?;
        json_result(&outcome)
    }

    #[tool(description = "Rename an object by create-copy-delete inside one stateful session.")]
    async fn rename_object(
        &self,
        Parameters(params): Parameters<RenameObjectParams>,
    ) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("rename_object", &json!(params));
        let kind = parse_kind(&params.kind)?;
        let outcome = self
            .client
            .rename_workflow(
                kind,
                &params.old_name,
                &params.new_name,
                params.parent.as_deref(),
                &params.package,
                params.description.as_deref().unwrap_or(""),
                params.transport.as_deref(),
            )
            .await
            .map_err(to_mcp_error)?;
        json_result(&outcome)
    }
}

impl AbapAdtServer {
    async fn read_source_tool(
        &self,
        tool_name: &str,
        kind: ObjectKind,
        name: &str,
        parent: Option<&str>,
        include: Option<&str>,
    ) -> Result<CallToolResult, McpError> {
        self.debug
            .log_tool_call(tool_name, &json!({ "name": name }));
        let source = self
            .client
            .read_source(kind, name, parent, include)
            .await
            .map_err(to_mcp_error)?;
        Ok(text_result(source))
    }
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl ServerHandler for AbapAdtServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "ABAP ADT MCP Server - read, edit, activate and test ABAP repository \
                objects over SAP ADT. Prefer grep_object/grep_package plus edit_source \
                over full-source round trips."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_mode_is_required_and_closed() {
        assert!(resolve_write_mode(None).is_err());
        let err = resolve_write_mode(None).unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert_eq!(resolve_write_mode(Some("create")).unwrap(), WriteMode::Create);
        assert_eq!(resolve_write_mode(Some("update")).unwrap(), WriteMode::Update);
        assert!(resolve_write_mode(Some("upsert")).is_err());
    }

    #[test]
    fn validation_errors_use_invalid_params() {
        let error = to_mcp_error(AdtError::Validation("mode is required".into()));
        assert_eq!(error.code, ErrorCode::INVALID_PARAMS);
        assert_eq!(error.data.unwrap()["code"], "validation_error");
    }

    #[test]
    fn operational_errors_use_internal_error() {
        let error = to_mcp_error(AdtError::NotFound("ZFOO".into()));
        assert_eq!(error.code, ErrorCode::INTERNAL_ERROR);
        assert_eq!(error.data.unwrap()["code"], "not_found");
    }

    #[test]
    fn grep_reports_one_based_line_numbers() {
        let regex = Regex::new("WRITE").unwrap();
        let mut matches = Vec::new();
        grep_source(
            "ZDEMO",
            "REPORT zdemo.\nWRITE 'a'.\nWRITE 'b'.\n",
            &regex,
            &mut matches,
        );
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].line, 2);
        assert_eq!(matches[1].line, 3);
        assert_eq!(matches[0].object, "ZDEMO");
    }

    #[test]
    fn node_types_map_to_source_kinds() {
        assert_eq!(kind_for_node_type("PROG/P"), Some(ObjectKind::Program));
        assert_eq!(kind_for_node_type("PROG/I"), Some(ObjectKind::Include));
        assert_eq!(kind_for_node_type("CLAS/OC"), Some(ObjectKind::Class));
        assert_eq!(kind_for_node_type("INTF/OI"), Some(ObjectKind::Interface));
        assert_eq!(kind_for_node_type("DDLS/DF"), Some(ObjectKind::CdsDdl));
        assert_eq!(kind_for_node_type("DEVC/K"), None);
        assert_eq!(kind_for_node_type("TABL/DT"), None);
    }
}
