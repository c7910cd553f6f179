//! Source read/write and pretty printing.

use std::collections::BTreeMap;

use crate::adt::catalog::{ObjectKind, CLASS_INCLUDES};
use crate::adt::AdtClient;
use crate::error::AdtError;

/// Content type of ABAP source bodies; ADT uses no XML wrapping for source.
pub const SOURCE_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

const SOURCE_ACCEPT: &str = "text/plain";

impl AdtClient {
    /// Read one source include section. `include` defaults to the main
    /// source; classes additionally expose `definitions`,
    /// `implementations`, `macros` and `testclasses`.
    pub async fn read_source(
        &self,
        kind: ObjectKind,
        name: &str,
        parent: Option<&str>,
        include: Option<&str>,
    ) -> Result<String, AdtError> {
        let path = kind.source_uri(name, parent, include)?;
        let response = self
            .transport()
            .get(&path, &[("version", "active")], SOURCE_ACCEPT)
            .await?;
        Ok(response.text())
    }

    /// Read every include section of a class, keyed by section name. The
    /// `main` entry is always present; sections the class does not have
    /// (404 on the sub-include) are simply absent.
    pub async fn read_class_sections(
        &self,
        name: &str,
    ) -> Result<BTreeMap<String, String>, AdtError> {
        let mut sections = BTreeMap::new();
        let main = self
            .read_source(ObjectKind::Class, name, None, None)
            .await?;
        sections.insert("main".to_string(), main);
        for section in CLASS_INCLUDES {
            match self
                .read_source(ObjectKind::Class, name, None, Some(section))
                .await
            {
                Ok(source) if !source.trim().is_empty() => {
                    sections.insert((*section).to_string(), source);
                }
                Ok(_) => {}
                Err(AdtError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(sections)
    }

    /// Replace a source include section under a held lock. Returns no body
    /// on success.
    pub async fn update_source(
        &self,
        kind: ObjectKind,
        name: &str,
        parent: Option<&str>,
        include: Option<&str>,
        source: &str,
        lock_handle: &str,
        transport_request: Option<&str>,
    ) -> Result<(), AdtError> {
        if lock_handle.is_empty() {
            return Err(AdtError::Validation(
                "source updates require a lock handle".into(),
            ));
        }
        let path = kind.source_uri(name, parent, include)?;
        let mut query = vec![("lockHandle", lock_handle)];
        if let Some(transport_request) = transport_request {
            query.push(("corrNr", transport_request));
        }
        self.transport()
            .put(
                &path,
                &query,
                SOURCE_ACCEPT,
                SOURCE_CONTENT_TYPE,
                source.as_bytes().to_vec(),
            )
            .await?;
        Ok(())
    }

    /// Run the backend pretty printer over a piece of source.
    pub async fn pretty_print(&self, source: &str) -> Result<String, AdtError> {
        let response = self
            .transport()
            .post(
                "/sap/bc/adt/abapsource/prettyprinter",
                &[],
                SOURCE_ACCEPT,
                SOURCE_CONTENT_TYPE,
                source.as_bytes().to_vec(),
            )
            .await?;
        Ok(response.text())
    }
}
