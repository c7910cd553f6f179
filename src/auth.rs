//! Authentication methods for the SAP backend.
//!
//! Exactly one method is active per process: HTTP Basic credentials, or a
//! set of session cookies supplied as a Netscape-format file or a literal
//! `name=value; name=value` string. Server-assigned cookies merge into the
//! same jar either way.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::ConfigError;

/// A cookie taken from a cookie file or cookie string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub domain: Option<String>,
    pub path: String,
    pub secure: bool,
    pub name: String,
    pub value: String,
}

impl SessionCookie {
    fn bare(name: &str, value: &str) -> Self {
        Self {
            domain: None,
            path: "/".to_string(),
            secure: false,
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    /// Render as a `Set-Cookie` line scoped to the given host, suitable for
    /// seeding a cookie jar.
    pub fn to_set_cookie(&self, fallback_domain: &str) -> String {
        let domain = self.domain.as_deref().unwrap_or(fallback_domain);
        let mut line = format!(
            "{}={}; Domain={}; Path={}",
            self.name, self.value, domain, self.path
        );
        if self.secure {
            line.push_str("; Secure");
        }
        line
    }
}

/// The authentication method selected at startup.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    Basic { user: String, password: String },
    Cookies(Vec<SessionCookie>),
}

impl AuthMethod {
    /// Pre-rendered `Authorization` header value, when basic auth is active.
    pub fn basic_header(&self) -> Option<String> {
        match self {
            AuthMethod::Basic { user, password } => {
                let credentials = format!("{}:{}", user, password);
                Some(format!("Basic {}", BASE64.encode(credentials.as_bytes())))
            }
            AuthMethod::Cookies(_) => None,
        }
    }

    /// The user name the backend authenticates as, when known. Cookie-only
    /// auth carries no user echo, so this is `None` there.
    pub fn user_name(&self) -> Option<&str> {
        match self {
            AuthMethod::Basic { user, .. } => Some(user.as_str()),
            AuthMethod::Cookies(_) => None,
        }
    }

    pub fn cookies(&self) -> &[SessionCookie] {
        match self {
            AuthMethod::Basic { .. } => &[],
            AuthMethod::Cookies(cookies) => cookies,
        }
    }
}

/// Parse a Netscape-format cookie file.
///
/// Seven tab-separated fields per line: domain, include-subdomains flag,
/// path, secure, expiration (0 = session cookie), name, value. `#` comment
/// lines and blank lines are skipped. A line containing `name=value` without
/// tabs is accepted as a convenience.
pub fn parse_cookie_file(path: &Path) -> Result<Vec<SessionCookie>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_cookie_lines(&content).map_err(|(line, reason)| ConfigError::CookieFile {
        path: path.display().to_string(),
        line,
        reason,
    })
}

/// Parse a literal `name=value; name2=value2` cookie string.
pub fn parse_cookie_string(raw: &str) -> Result<Vec<SessionCookie>, ConfigError> {
    let mut cookies = Vec::new();
    for part in raw.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, value) = part.split_once('=').ok_or_else(|| {
            ConfigError::Invalid(format!("cookie string entry without '=': {part:?}"))
        })?;
        cookies.push(SessionCookie::bare(name.trim(), value.trim()));
    }
    if cookies.is_empty() {
        return Err(ConfigError::Invalid("cookie string is empty".to_string()));
    }
    Ok(cookies)
}

fn parse_cookie_lines(content: &str) -> Result<Vec<SessionCookie>, (usize, String)> {
    let mut cookies = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if !trimmed.contains('\t') {
            // Convenience form: bare name=value.
            let (name, value) = trimmed
                .split_once('=')
                .ok_or_else(|| (line_no, "expected 7 tab-separated fields or name=value".into()))?;
            cookies.push(SessionCookie::bare(name.trim(), value.trim()));
            continue;
        }
        let fields: Vec<&str> = trimmed.split('\t').collect();
        if fields.len() != 7 {
            return Err((
                line_no,
                format!("expected 7 tab-separated fields, found {}", fields.len()),
            ));
        }
        let domain = fields[0].trim_start_matches('.');
        cookies.push(SessionCookie {
            domain: if domain.is_empty() {
                None
            } else {
                Some(domain.to_string())
            },
            path: if fields[2].is_empty() {
                "/".to_string()
            } else {
                fields[2].to_string()
            },
            secure: fields[3].eq_ignore_ascii_case("true"),
            name: fields[5].to_string(),
            value: fields[6].to_string(),
        });
    }
    Ok(cookies)
}
