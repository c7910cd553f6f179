//! Multi-step compositions with compensation semantics.
//!
//! A workflow owns its lock table: every lock acquired inside one is either
//! released on the way out or released best-effort when a later step fails.
//! An unlock failure during compensation is logged and never masks the
//! original error.

use std::collections::HashMap;

use regex::Regex;

use crate::adt::catalog::ObjectKind;
use crate::adt::xml::checks::ActivationResult;
use crate::adt::xml::create::CreateRequest;
use crate::adt::AdtClient;
use crate::error::AdtError;

/// A lock held on behalf of a running workflow.
#[derive(Debug, Clone)]
struct HeldLock {
    kind: ObjectKind,
    name: String,
    parent: Option<String>,
    handle: String,
    #[allow(dead_code)]
    access_mode: String,
}

/// Per-workflow bookkeeping of held locks, keyed by object URI. Lives for
/// the duration of one workflow and is never shared across invocations.
#[derive(Debug, Default)]
struct LockTable {
    entries: HashMap<String, HeldLock>,
}

impl LockTable {
    fn insert(&mut self, uri: String, lock: HeldLock) {
        self.entries.insert(uri, lock);
    }

    fn take(&mut self, uri: &str) -> Option<HeldLock> {
        self.entries.remove(uri)
    }

    fn drain(&mut self) -> Vec<HeldLock> {
        self.entries.drain().map(|(_, lock)| lock).collect()
    }
}

/// Outcome of a write-source workflow. Activation problems are reported
/// here rather than raised: the update itself already happened.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WriteOutcome {
    pub updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivationResult>,
}

/// Outcome of an edit-source workflow.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EditOutcome {
    pub replacements: usize,
    /// Absent when the pattern did not match; nothing was written then.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write: Option<WriteOutcome>,
}

/// Outcome of a rename workflow.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RenameOutcome {
    pub old_name: String,
    pub new_name: String,
    pub deleted_old: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivationResult>,
}

impl AdtClient {
    /// Write source with the full correct lifecycle:
    /// lock → update → unlock → activate.
    ///
    /// The unlock always runs, also when the update failed. Activation
    /// happens only after a successful update and always targets the object
    /// URI (for classes: the class, never a sub-include).
    pub async fn write_source_workflow(
        &self,
        kind: ObjectKind,
        name: &str,
        parent: Option<&str>,
        include: Option<&str>,
        source: &str,
        transport_request: Option<&str>,
    ) -> Result<WriteOutcome, AdtError> {
        if !kind.supports_source() {
            return Err(AdtError::Validation(format!(
                "{} objects have no editable source",
                kind.as_str()
            )));
        }
        // Fail on an unknown include section before acquiring any lock.
        let uri = kind.object_uri(name, parent)?;
        kind.source_uri(name, parent, include)?;

        let mut locks = LockTable::default();
        let lock = self.lock_object(kind, name, parent, "MODIFY").await?;
        locks.insert(
            uri.clone(),
            HeldLock {
                kind,
                name: name.to_string(),
                parent: parent.map(str::to_string),
                handle: lock.handle.clone(),
                access_mode: "MODIFY".to_string(),
            },
        );

        let update_result = self
            .update_source(
                kind,
                name,
                parent,
                include,
                source,
                &lock.handle,
                transport_request,
            )
            .await;

        // Unlock unconditionally; ADT rejects activation on a locked object.
        let held = locks.take(&uri);
        let unlock_result = match held {
            Some(held) => {
                self.unlock_object(held.kind, &held.name, held.parent.as_deref(), &held.handle)
                    .await
            }
            None => Ok(()),
        };

        if let Err(update_err) = update_result {
            if let Err(unlock_err) = unlock_result {
                self.transport().debug().log(&format!(
                    "compensating unlock of {uri} failed: {unlock_err}"
                ));
            }
            return Err(update_err);
        }
        unlock_result?;

        let activation = if kind.is_activatable() {
            Some(self.activate_object(kind, name, parent).await?)
        } else {
            None
        };

        Ok(WriteOutcome {
            updated: true,
            activation,
        })
    }

    /// Read, substitute, write. A pattern that does not match leaves the
    /// object untouched and acquires no lock.
    pub async fn edit_source_workflow(
        &self,
        kind: ObjectKind,
        name: &str,
        parent: Option<&str>,
        include: Option<&str>,
        pattern: &str,
        replacement: &str,
        max_replacements: Option<usize>,
        transport_request: Option<&str>,
    ) -> Result<EditOutcome, AdtError> {
        let regex = Regex::new(pattern)
            .map_err(|e| AdtError::Validation(format!("invalid pattern: {e}")))?;

        let current = self.read_source(kind, name, parent, include).await?;
        let match_count = regex.find_iter(&current).count();
        if match_count == 0 {
            return Ok(EditOutcome {
                replacements: 0,
                write: None,
            });
        }

        let limit = max_replacements.unwrap_or(0); // 0 = all, regex convention
        let replaced = regex.replacen(&current, limit, replacement).into_owned();
        let replacements = if limit == 0 {
            match_count
        } else {
            match_count.min(limit)
        };

        let write = self
            .write_source_workflow(kind, name, parent, include, &replaced, transport_request)
            .await?;
        Ok(EditOutcome {
            replacements,
            write: Some(write),
        })
    }

    /// Create an object and, when initial source is supplied, run the
    /// write-source workflow on it.
    pub async fn create_and_activate_workflow(
        &self,
        request: &CreateRequest,
        initial_source: Option<&str>,
    ) -> Result<Option<WriteOutcome>, AdtError> {
        self.create_object(request).await?;
        match initial_source {
            Some(source) if request.kind.supports_source() => {
                let outcome = self
                    .write_source_workflow(
                        request.kind,
                        &request.name,
                        request.parent.as_deref(),
                        None,
                        source,
                        request.transport.as_deref(),
                    )
                    .await?;
                Ok(Some(outcome))
            }
            _ => Ok(None),
        }
    }

    /// Create a class together with its local test classes include,
    /// activating once at the end.
    pub async fn create_class_with_tests_workflow(
        &self,
        request: &CreateRequest,
        class_source: &str,
        test_source: &str,
    ) -> Result<WriteOutcome, AdtError> {
        if request.kind != ObjectKind::Class {
            return Err(AdtError::Validation(
                "class-with-tests requires kind 'class'".into(),
            ));
        }
        self.create_object(request).await?;

        let name = request.name.as_str();
        let transport_request = request.transport.as_deref();
        let uri = ObjectKind::Class.object_uri(name, None)?;

        let mut locks = LockTable::default();
        let lock = self
            .lock_object(ObjectKind::Class, name, None, "MODIFY")
            .await?;
        locks.insert(
            uri.clone(),
            HeldLock {
                kind: ObjectKind::Class,
                name: name.to_string(),
                parent: None,
                handle: lock.handle.clone(),
                access_mode: "MODIFY".to_string(),
            },
        );

        let result = self
            .write_class_sections(name, class_source, test_source, &lock.handle, transport_request)
            .await;

        let unlock_result = match locks.take(&uri) {
            Some(held) => {
                self.unlock_object(held.kind, &held.name, None, &held.handle)
                    .await
            }
            None => Ok(()),
        };
        if let Err(step_err) = result {
            if let Err(unlock_err) = unlock_result {
                self.transport().debug().log(&format!(
                    "compensating unlock of {uri} failed: {unlock_err}"
                ));
            }
            return Err(step_err);
        }
        unlock_result?;

        let activation = self.activate_object(ObjectKind::Class, name, None).await?;
        Ok(WriteOutcome {
            updated: true,
            activation: Some(activation),
        })
    }

    async fn write_class_sections(
        &self,
        name: &str,
        class_source: &str,
        test_source: &str,
        lock_handle: &str,
        transport_request: Option<&str>,
    ) -> Result<(), AdtError> {
        self.update_source(
            ObjectKind::Class,
            name,
            None,
            None,
            class_source,
            lock_handle,
            transport_request,
        )
        .await?;
        self.update_source(
            ObjectKind::Class,
            name,
            None,
            Some("testclasses"),
            test_source,
            lock_handle,
            transport_request,
        )
        .await
    }

    /// Rename by create-copy-delete inside one stateful session, so that
    /// nothing session-scoped is lost between the steps.
    pub async fn rename_workflow(
        &self,
        kind: ObjectKind,
        old_name: &str,
        new_name: &str,
        parent: Option<&str>,
        package: &str,
        description: &str,
        transport_request: Option<&str>,
    ) -> Result<RenameOutcome, AdtError> {
        if !kind.supports_source() {
            return Err(AdtError::Validation(format!(
                "{} objects cannot be renamed by copy",
                kind.as_str()
            )));
        }
        self.transport().set_stateful(true);

        let source = self.read_source(kind, old_name, parent, None).await?;

        let request = CreateRequest {
            kind,
            name: new_name.to_string(),
            description: description.to_string(),
            package: package.to_string(),
            parent: parent.map(str::to_string),
            transport: transport_request.map(str::to_string),
            responsible: self.responsible_user().to_string(),
        };
        self.create_object(&request).await?;
        let write = self
            .write_source_workflow(kind, new_name, parent, None, &source, transport_request)
            .await?;

        // Delete the old object under its own lock; the copy stays either way.
        let mut locks = LockTable::default();
        let old_uri = kind.object_uri(old_name, parent)?;
        let lock = self.lock_object(kind, old_name, parent, "MODIFY").await?;
        locks.insert(
            old_uri.clone(),
            HeldLock {
                kind,
                name: old_name.to_string(),
                parent: parent.map(str::to_string),
                handle: lock.handle.clone(),
                access_mode: "MODIFY".to_string(),
            },
        );
        let delete_result = self
            .delete_object(kind, old_name, parent, &lock.handle, transport_request)
            .await;
        let deleted_old = match delete_result {
            Ok(()) => {
                locks.take(&old_uri);
                true
            }
            Err(delete_err) => {
                for held in locks.drain() {
                    if let Err(unlock_err) = self
                        .unlock_object(held.kind, &held.name, held.parent.as_deref(), &held.handle)
                        .await
                    {
                        self.transport().debug().log(&format!(
                            "compensating unlock of {old_uri} failed: {unlock_err}"
                        ));
                    }
                }
                return Err(delete_err);
            }
        };

        Ok(RenameOutcome {
            old_name: old_name.to_uppercase(),
            new_name: new_name.to_uppercase(),
            deleted_old,
            activation: write.activation,
        })
    }
}
