//! Process entrypoint: flag/environment parsing, client construction and
//! the MCP stdio serve loop.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use rmcp::{transport::stdio, ServiceExt};

use mcp_abap_adt::adt::AdtClient;
use mcp_abap_adt::config::{Config, ConfigOptions};
use mcp_abap_adt::debug::DebugLogger;
use mcp_abap_adt::server::AbapAdtServer;

/// Exit code for configuration errors.
const EXIT_CONFIG: u8 = 1;
/// Exit code for unrecoverable transport failures at startup.
const EXIT_TRANSPORT: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "mcp-abap-adt")]
#[command(author, version, about = "ABAP ADT MCP Server", long_about = None)]
struct Args {
    /// Root URL of the ADT service (e.g. https://host:44300)
    #[arg(long, env = "SAP_URL")]
    url: Option<String>,

    /// Basic-auth user
    #[arg(long, env = "SAP_USER")]
    user: Option<String>,

    /// Basic-auth password
    #[arg(long, env = "SAP_PASSWORD")]
    password: Option<String>,

    /// Netscape-format cookie file (alternative to basic auth)
    #[arg(long, env = "SAP_COOKIE_FILE")]
    cookie_file: Option<String>,

    /// Literal "name=value; name=value" cookie string (alternative auth)
    #[arg(long, env = "SAP_COOKIES")]
    cookies: Option<String>,

    /// SAP client code
    #[arg(long, env = "SAP_CLIENT")]
    client: Option<String>,

    /// SAP logon language
    #[arg(long, env = "SAP_LANGUAGE")]
    language: Option<String>,

    /// Disable TLS certificate verification
    #[arg(long, env = "SAP_INSECURE")]
    insecure: bool,

    /// Bind all calls into one stateful server session
    #[arg(long, env = "SAP_STATEFUL")]
    stateful: bool,

    /// Tool surface: "focused" (default) or "expert"
    #[arg(long, env = "MCP_MODE")]
    mode: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "SAP_TIMEOUT")]
    timeout: Option<u64>,

    /// Log MCP traffic and ADT round trips to stderr and a trace file
    #[arg(short, long, env = "MCP_DEBUG")]
    debug: bool,
}

impl From<Args> for ConfigOptions {
    fn from(args: Args) -> Self {
        ConfigOptions {
            base_url: args.url,
            user: args.user,
            password: args.password,
            cookie_file: args.cookie_file,
            cookie_string: args.cookies,
            sap_client: args.client,
            sap_language: args.language,
            insecure: args.insecure,
            stateful: args.stateful,
            mode: args.mode,
            timeout_seconds: args.timeout,
            debug: args.debug,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::resolve(args.into()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let debug = Arc::new(DebugLogger::new(config.debug));
    if config.debug {
        debug.log("ABAP ADT MCP Server starting...");
        debug.log(&format!("Base URL: {}", config.base_url));
        debug.log(&format!(
            "SAP client: {} | language: {}",
            config.sap_client, config.sap_language
        ));
        debug.log(&format!("Mode: {:?}", config.mode));
        if let Some(path) = debug.trace_path() {
            eprintln!("[DEBUG] Trace file: {}", path.display());
        }
    }

    let client = match AdtClient::new(&config, debug.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("Transport error: {e}");
            return ExitCode::from(EXIT_TRANSPORT);
        }
    };

    let server = AbapAdtServer::new(client, config.mode, debug.clone());
    if config.debug {
        debug.log(&format!(
            "{} tools registered, starting MCP server on stdio transport...",
            server.tool_count()
        ));
    }

    let service = match server.serve(stdio()).await {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Failed to start MCP server: {e}");
            return ExitCode::from(EXIT_TRANSPORT);
        }
    };

    if let Err(e) = service.waiting().await {
        eprintln!("Server error: {e}");
        return ExitCode::from(EXIT_TRANSPORT);
    }

    if config.debug {
        debug.log("MCP server shutting down");
    }
    ExitCode::SUCCESS
}
