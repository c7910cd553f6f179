//! ADT client: the HTTP/XML protocol engine for the SAP backend.
//!
//! `AdtClient` owns the shared [`transport::Transport`] and exposes one
//! method per ADT operation, spread over the operation modules. Multi-step
//! lifecycles (lock → update → unlock → activate) live in [`workflows`].

pub mod catalog;
pub mod navigation;
pub mod objects;
pub mod query;
pub mod sources;
pub mod testing;
pub mod transport;
pub mod workflows;
pub mod xml;

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::config::Config;
use crate::debug::DebugLogger;
use crate::error::ConfigError;

pub use catalog::ObjectKind;
pub use transport::Transport;

/// Responsible user recorded on created objects when the authenticated user
/// is unknown (cookie-only auth carries no user echo).
const FALLBACK_RESPONSIBLE: &str = "DDIC";

/// Client for one SAP backend.
pub struct AdtClient {
    transport: Arc<Transport>,
    responsible_user: String,
    /// Resolved CDS dependency endpoint; probed on first use.
    cds_dependency_base: OnceCell<navigation::CdsEndpoint>,
}

impl AdtClient {
    /// Build the production client.
    pub fn new(config: &Config, debug: Arc<DebugLogger>) -> Result<Self, ConfigError> {
        let transport = Arc::new(Transport::new(config, debug)?);
        Ok(Self::with_transport(transport, config))
    }

    /// Build a client over an existing transport (tests inject scripted
    /// HTTP backends this way).
    pub fn with_transport(transport: Arc<Transport>, config: &Config) -> Self {
        let responsible_user = config
            .auth
            .user_name()
            .map(|u| u.to_uppercase())
            .unwrap_or_else(|| FALLBACK_RESPONSIBLE.to_string());
        Self {
            transport,
            responsible_user,
            cds_dependency_base: OnceCell::new(),
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// User recorded as responsible on created objects.
    pub fn responsible_user(&self) -> &str {
        &self.responsible_user
    }
}

impl std::fmt::Debug for AdtClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdtClient")
            .field("transport", &self.transport)
            .field("responsible_user", &self.responsible_user)
            .finish()
    }
}
