//! Configuration for the ABAP ADT MCP Server.
//!
//! Values come from environment variables with command-line flags taking
//! precedence; `main.rs` feeds the merged values in as [`ConfigOptions`] and
//! validation happens here.

use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::auth::{parse_cookie_file, parse_cookie_string, AuthMethod};
use crate::error::ConfigError;

/// Default SAP client code.
pub const DEFAULT_SAP_CLIENT: &str = "001";

/// Default SAP logon language.
pub const DEFAULT_SAP_LANGUAGE: &str = "EN";

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Tool-surface size selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolMode {
    /// Curated tool set for agent ergonomics.
    #[default]
    Focused,
    /// Focused set plus every atomic and composite operation.
    Expert,
}

impl FromStr for ToolMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "focused" => Ok(ToolMode::Focused),
            "expert" => Ok(ToolMode::Expert),
            other => Err(ConfigError::Invalid(format!(
                "mode must be 'focused' or 'expert', got '{other}'"
            ))),
        }
    }
}

/// Raw option values as collected by the command line / environment.
#[derive(Debug, Default)]
pub struct ConfigOptions {
    pub base_url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub cookie_file: Option<String>,
    pub cookie_string: Option<String>,
    pub sap_client: Option<String>,
    pub sap_language: Option<String>,
    pub insecure: bool,
    pub stateful: bool,
    pub mode: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub debug: bool,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Url,
    pub auth: AuthMethod,
    pub sap_client: String,
    pub sap_language: String,
    pub insecure: bool,
    pub stateful: bool,
    pub mode: ToolMode,
    pub timeout_seconds: u64,
    pub debug: bool,
}

impl Config {
    /// Resolve and validate the raw option values.
    pub fn resolve(opts: ConfigOptions) -> Result<Self, ConfigError> {
        let base_url = match opts.base_url {
            None => return Err(ConfigError::MissingField("base URL (SAP_URL)".into())),
            Some(u) if u.trim().is_empty() => {
                return Err(ConfigError::MissingField("base URL (SAP_URL)".into()))
            }
            Some(ref u) => Url::parse(u.trim_end_matches('/'))
                .map_err(|e| ConfigError::Invalid(format!("base URL: {e}")))?,
        };
        if base_url.host_str().is_none() {
            return Err(ConfigError::Invalid(
                "base URL must contain a host".to_string(),
            ));
        }

        let auth = Self::resolve_auth(&opts)?;

        let mode = match opts.mode.as_deref() {
            None => ToolMode::default(),
            Some(m) => m.parse()?,
        };

        let timeout_seconds = opts.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        if timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "request timeout must be at least 1 second".to_string(),
            ));
        }

        Ok(Config {
            base_url,
            auth,
            sap_client: opts
                .sap_client
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_SAP_CLIENT.to_string()),
            sap_language: opts
                .sap_language
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| DEFAULT_SAP_LANGUAGE.to_string()),
            insecure: opts.insecure,
            stateful: opts.stateful,
            mode,
            timeout_seconds,
            debug: opts.debug,
        })
    }

    /// At most one authentication method may be active.
    fn resolve_auth(opts: &ConfigOptions) -> Result<AuthMethod, ConfigError> {
        let has_basic = opts.user.is_some() || opts.password.is_some();
        let has_cookie_file = opts.cookie_file.is_some();
        let has_cookie_string = opts.cookie_string.is_some();

        let active = [has_basic, has_cookie_file, has_cookie_string]
            .iter()
            .filter(|x| **x)
            .count();
        if active > 1 {
            let mut names = Vec::new();
            if has_basic {
                names.push("basic credentials");
            }
            if has_cookie_file {
                names.push("cookie file");
            }
            if has_cookie_string {
                names.push("cookie string");
            }
            return Err(ConfigError::ConflictingAuth(names.join(" and ")));
        }

        if has_basic {
            let user = match &opts.user {
                Some(u) if !u.is_empty() => u.clone(),
                _ => return Err(ConfigError::MissingField("user (SAP_USER)".into())),
            };
            let password = match &opts.password {
                Some(p) if !p.is_empty() => p.clone(),
                _ => return Err(ConfigError::MissingField("password (SAP_PASSWORD)".into())),
            };
            return Ok(AuthMethod::Basic { user, password });
        }
        if let Some(path) = &opts.cookie_file {
            let cookies = parse_cookie_file(std::path::Path::new(path))?;
            if cookies.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "cookie file {path} contains no cookies"
                )));
            }
            return Ok(AuthMethod::Cookies(cookies));
        }
        if let Some(raw) = &opts.cookie_string {
            return Ok(AuthMethod::Cookies(parse_cookie_string(raw)?));
        }

        Err(ConfigError::MissingField(
            "authentication (SAP_USER/SAP_PASSWORD, SAP_COOKIE_FILE or SAP_COOKIES)".into(),
        ))
    }

    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}
