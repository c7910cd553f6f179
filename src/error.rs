//! Unified error types for the ABAP ADT MCP Server.

use thiserror::Error;

/// Configuration-related errors. These abort startup with exit code 1.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing required setting: {0}")]
    MissingField(String),

    #[error("Conflicting authentication methods: {0}")]
    ConflictingAuth(String),

    #[error("Malformed cookie file {path}, line {line}: {reason}")]
    CookieFile {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Operational errors raised by the ADT client and the tool surface.
///
/// Every variant maps to a short machine-readable code carried in the MCP
/// error payload; the server never terminates on one of these.
#[derive(Debug, Error)]
pub enum AdtError {
    #[error("request timed out")]
    Timeout,

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed (HTTP {status})")]
    Authentication { status: u16 },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("ADT exception [{kind}]: {message}")]
    Adt {
        kind: String,
        message: String,
        status: u16,
    },

    #[error("lock conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid parameters: {0}")]
    Validation(String),
}

impl AdtError {
    /// Short machine-readable code for the MCP error payload.
    pub fn code(&self) -> &'static str {
        match self {
            AdtError::Timeout => "timeout",
            AdtError::Tls(_) => "tls_error",
            AdtError::Network(_) => "network_error",
            AdtError::Authentication { .. } => "authentication_error",
            AdtError::Protocol(_) => "protocol_error",
            AdtError::Adt { .. } => "adt_exception",
            AdtError::Conflict(_) => "conflict",
            AdtError::NotFound(_) => "not_found",
            AdtError::Validation(_) => "validation_error",
        }
    }
}

impl From<reqwest::Error> for AdtError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AdtError::Timeout
        } else if e.is_connect() {
            // reqwest folds certificate failures into connect errors; keep the
            // full chain so the cause stays visible.
            let mut chain = e.to_string();
            let mut source = std::error::Error::source(&e);
            while let Some(s) = source {
                chain.push_str(": ");
                chain.push_str(&s.to_string());
                source = s.source();
            }
            let lowered = chain.to_lowercase();
            if lowered.contains("certificate") || lowered.contains("tls") || lowered.contains("ssl")
            {
                AdtError::Tls(chain)
            } else {
                AdtError::Network(chain)
            }
        } else {
            AdtError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_conflicting_auth_display() {
        let error = ConfigError::ConflictingAuth("basic and cookie file".to_string());
        assert_eq!(
            error.to_string(),
            "Conflicting authentication methods: basic and cookie file"
        );
    }

    #[test]
    fn config_error_cookie_file_display() {
        let error = ConfigError::CookieFile {
            path: "/tmp/cookies.txt".to_string(),
            line: 3,
            reason: "expected 7 fields".to_string(),
        };
        let display = error.to_string();
        assert!(display.contains("cookies.txt"));
        assert!(display.contains("line 3"));
        assert!(display.contains("expected 7 fields"));
    }

    #[test]
    fn config_error_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let config_err: ConfigError = io_err.into();
        assert!(config_err.to_string().contains("IO error"));
    }

    #[test]
    fn adt_error_codes_are_stable() {
        assert_eq!(AdtError::Timeout.code(), "timeout");
        assert_eq!(
            AdtError::Validation("mode is required".into()).code(),
            "validation_error"
        );
        assert_eq!(AdtError::NotFound("ZFOO".into()).code(), "not_found");
        assert_eq!(
            AdtError::Adt {
                kind: "ExceptionResourceNoAccess".into(),
                message: "no access".into(),
                status: 403,
            }
            .code(),
            "adt_exception"
        );
    }

    #[test]
    fn adt_exception_display_carries_kind_and_message() {
        let error = AdtError::Adt {
            kind: "DEBUGGEE_CONTEXT_LOCKED_BY_ME".into(),
            message: "Debuggee context already locked".into(),
            status: 400,
        };
        let display = error.to_string();
        assert!(display.contains("DEBUGGEE_CONTEXT_LOCKED_BY_ME"));
        assert!(display.contains("Debuggee context already locked"));
    }

    #[test]
    fn conflict_display() {
        let error = AdtError::Conflict("locked by user DEVELOPER".into());
        assert!(error.to_string().contains("lock conflict"));
    }
}
