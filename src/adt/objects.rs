//! Repository object mutations: lock, unlock, create, delete, activate.

use crate::adt::catalog::ObjectKind;
use crate::adt::xml::checks::{activation_body, parse_activation_result, ActivationResult};
use crate::adt::xml::create::{create_body, CreateRequest};
use crate::adt::xml::objects::{parse_lock_result, LockResult};
use crate::adt::AdtClient;
use crate::error::AdtError;

const XML_ACCEPT: &str = "application/xml";

/// Accept header for lock results; the handle arrives in an `asx:abap`
/// serialization named by the dataname parameter.
const LOCK_ACCEPT: &str =
    "application/vnd.sap.as+xml;charset=UTF-8;dataname=com.sap.adt.lock.result";

impl AdtClient {
    /// Declare an edit intent on an object and return the lock handle.
    ///
    /// Locks only survive inside the server session that granted them, so
    /// acquiring one switches the transport stateful for the rest of the
    /// process.
    pub async fn lock_object(
        &self,
        kind: ObjectKind,
        name: &str,
        parent: Option<&str>,
        access_mode: &str,
    ) -> Result<LockResult, AdtError> {
        if !kind.is_lockable() {
            return Err(AdtError::Validation(format!(
                "{} objects cannot be locked",
                kind.as_str()
            )));
        }
        let path = kind.object_uri(name, parent)?;
        self.transport().set_stateful(true);
        let response = self
            .transport()
            .post(
                &path,
                &[("_action", "LOCK"), ("accessMode", access_mode)],
                LOCK_ACCEPT,
                XML_ACCEPT,
                Vec::new(),
            )
            .await?;
        parse_lock_result(&response.text())
    }

    /// Release a lock. Idempotent: releasing a handle the server no longer
    /// knows is reported as success.
    pub async fn unlock_object(
        &self,
        kind: ObjectKind,
        name: &str,
        parent: Option<&str>,
        lock_handle: &str,
    ) -> Result<(), AdtError> {
        let path = kind.object_uri(name, parent)?;
        let result = self
            .transport()
            .post(
                &path,
                &[("_action", "UNLOCK"), ("lockHandle", lock_handle)],
                XML_ACCEPT,
                XML_ACCEPT,
                Vec::new(),
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            // The server rejects stale or foreign handles with an ADT
            // exception; the post-condition (object not locked by us) holds
            // either way.
            Err(AdtError::Adt { .. }) | Err(AdtError::Conflict(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Create a repository object. 201 on success; structured ADT
    /// exceptions surface as errors.
    pub async fn create_object(&self, request: &CreateRequest) -> Result<(), AdtError> {
        validate_create(request)?;
        let path = request.kind.create_uri(request.parent.as_deref())?;
        let body = create_body(request)?;
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(transport_request) = request.transport.as_deref() {
            query.push(("corrNr", transport_request));
        }
        self.transport()
            .post(
                &path,
                &query,
                XML_ACCEPT,
                request.kind.create_content_type(),
                body.into_bytes(),
            )
            .await?;
        Ok(())
    }

    /// Delete an object under a held lock.
    pub async fn delete_object(
        &self,
        kind: ObjectKind,
        name: &str,
        parent: Option<&str>,
        lock_handle: &str,
        transport_request: Option<&str>,
    ) -> Result<(), AdtError> {
        if lock_handle.is_empty() {
            return Err(AdtError::Validation("deletion requires a lock handle".into()));
        }
        let path = kind.object_uri(name, parent)?;
        let mut query = vec![("lockHandle", lock_handle)];
        if let Some(transport_request) = transport_request {
            query.push(("corrNr", transport_request));
        }
        self.transport().delete(&path, &query, XML_ACCEPT).await?;
        Ok(())
    }

    /// Activate an object.
    ///
    /// Activation always targets the object URI; classes are never activated
    /// through a sub-include URI. The object must be unlocked first.
    pub async fn activate_object(
        &self,
        kind: ObjectKind,
        name: &str,
        parent: Option<&str>,
    ) -> Result<ActivationResult, AdtError> {
        if !kind.is_activatable() {
            return Err(AdtError::Validation(format!(
                "{} objects cannot be activated",
                kind.as_str()
            )));
        }
        let uri = kind.object_uri(name, parent)?;
        let body = activation_body(&[(uri, name.to_uppercase())]);
        let response = self
            .transport()
            .post(
                "/sap/bc/adt/activation",
                &[("method", "activate"), ("preauditRequested", "true")],
                XML_ACCEPT,
                XML_ACCEPT,
                body.into_bytes(),
            )
            .await?;
        parse_activation_result(&response.text())
    }
}

/// Creation preconditions shared by the atomic and the tool surface.
fn validate_create(request: &CreateRequest) -> Result<(), AdtError> {
    if request.name.trim().is_empty() {
        return Err(AdtError::Validation("object name must not be empty".into()));
    }
    if request.kind == ObjectKind::Package && !request.name.starts_with('$') {
        return Err(AdtError::Validation(
            "only local packages (names starting with '$') can be created".into(),
        ));
    }
    if request.kind.requires_parent() && request.parent.is_none() {
        return Err(AdtError::Validation(format!(
            "{} objects require a parent",
            request.kind.as_str()
        )));
    }
    // Local packages need no transport request; everything else does.
    let target_is_local = request.package.starts_with('$');
    if !target_is_local && request.transport.is_none() && request.kind != ObjectKind::Package {
        return Err(AdtError::Validation(format!(
            "package {} is not local; a transport request is required",
            request.package
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: ObjectKind, name: &str, package: &str) -> CreateRequest {
        CreateRequest {
            kind,
            name: name.to_string(),
            description: "test".to_string(),
            package: package.to_string(),
            parent: None,
            transport: None,
            responsible: "DEVELOPER".to_string(),
        }
    }

    #[test]
    fn non_local_package_creation_is_rejected() {
        let err = validate_create(&request(ObjectKind::Package, "ZREAL", "$TMP")).unwrap_err();
        assert!(matches!(err, AdtError::Validation(_)));
        assert!(validate_create(&request(ObjectKind::Package, "$ZMCP", "$TMP")).is_ok());
    }

    #[test]
    fn transport_required_outside_local_packages() {
        let err = validate_create(&request(ObjectKind::Program, "ZPROG", "ZPKG")).unwrap_err();
        assert!(matches!(err, AdtError::Validation(_)));

        let mut with_transport = request(ObjectKind::Program, "ZPROG", "ZPKG");
        with_transport.transport = Some("A4HK900042".into());
        assert!(validate_create(&with_transport).is_ok());

        assert!(validate_create(&request(ObjectKind::Program, "ZPROG", "$TMP")).is_ok());
    }

    #[test]
    fn function_module_without_group_is_rejected() {
        let err =
            validate_create(&request(ObjectKind::FunctionModule, "Z_FN", "$TMP")).unwrap_err();
        assert!(matches!(err, AdtError::Validation(_)));
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(validate_create(&request(ObjectKind::Program, "  ", "$TMP")).is_err());
    }
}
