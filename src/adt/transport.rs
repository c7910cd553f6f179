//! HTTP conversation with the SAP backend.
//!
//! One transport per process. Every outbound request runs through the same
//! pipeline: auth header or session cookies, `sap-client`/`sap-language`
//! query parameters, CSRF token handling and the stateful-session marker.
//! The CSRF cache is guarded by a mutex held across the fetch, so a burst of
//! mutating requests after an expiry triggers exactly one refresh.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::debug::DebugLogger;
use crate::error::{AdtError, ConfigError};

/// Discovery document; cheap target for the CSRF fetch.
const DISCOVERY_PATH: &str = "/sap/bc/adt/discovery";

const CSRF_HEADER: &str = "x-csrf-token";
const SESSION_TYPE_HEADER: &str = "X-sap-adt-sessiontype";

/// An outbound request as seen by the HTTP backend.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// A decoded response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Seam between the transport pipeline and the actual HTTP stack. Tests
/// inject scripted implementations; production uses [`ReqwestExec`].
#[async_trait]
pub trait HttpExec: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AdtError>;
}

/// Production backend: a shared `reqwest` client with a cookie jar.
pub struct ReqwestExec {
    client: reqwest::Client,
}

impl ReqwestExec {
    fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let jar = Arc::new(reqwest::cookie::Jar::default());

        // Pre-seed the jar with user-supplied cookies; server-assigned
        // session cookies merge into the same jar later.
        let fallback_domain = config.base_url.host_str().unwrap_or_default().to_string();
        for cookie in config.auth.cookies() {
            jar.add_cookie_str(&cookie.to_set_cookie(&fallback_domain), &config.base_url);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.insecure)
            .cookie_provider(jar)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpExec for ReqwestExec {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AdtError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// The shared transport.
pub struct Transport {
    exec: Arc<dyn HttpExec>,
    base_url: Url,
    sap_client: String,
    sap_language: String,
    basic_auth: Option<String>,
    csrf: Mutex<Option<String>>,
    stateful: AtomicBool,
    debug: Arc<DebugLogger>,
}

impl Transport {
    /// Build the production transport from validated configuration.
    pub fn new(config: &Config, debug: Arc<DebugLogger>) -> Result<Self, ConfigError> {
        let exec = Arc::new(ReqwestExec::from_config(config)?);
        Ok(Self::with_exec(exec, config, debug))
    }

    /// Build a transport over an arbitrary HTTP backend.
    pub fn with_exec(exec: Arc<dyn HttpExec>, config: &Config, debug: Arc<DebugLogger>) -> Self {
        Self {
            exec,
            base_url: config.base_url.clone(),
            sap_client: config.sap_client.clone(),
            sap_language: config.sap_language.clone(),
            basic_auth: config.auth.basic_header(),
            csrf: Mutex::new(None),
            stateful: AtomicBool::new(config.stateful),
            debug,
        }
    }

    /// Switch the process into stateful mode. Locks, debugger contexts and
    /// similar session-scoped server state then persist across calls.
    pub fn set_stateful(&self, stateful: bool) {
        self.stateful.store(stateful, Ordering::SeqCst);
    }

    pub fn is_stateful(&self) -> bool {
        self.stateful.load(Ordering::SeqCst)
    }

    pub fn debug(&self) -> &DebugLogger {
        &self.debug
    }

    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        accept: &str,
    ) -> Result<HttpResponse, AdtError> {
        self.request(Method::GET, path, query, accept, None, None)
            .await
    }

    pub async fn post(
        &self,
        path: &str,
        query: &[(&str, &str)],
        accept: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<HttpResponse, AdtError> {
        self.request(
            Method::POST,
            path,
            query,
            accept,
            Some(content_type),
            Some(body),
        )
        .await
    }

    pub async fn put(
        &self,
        path: &str,
        query: &[(&str, &str)],
        accept: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<HttpResponse, AdtError> {
        self.request(
            Method::PUT,
            path,
            query,
            accept,
            Some(content_type),
            Some(body),
        )
        .await
    }

    pub async fn delete(
        &self,
        path: &str,
        query: &[(&str, &str)],
        accept: &str,
    ) -> Result<HttpResponse, AdtError> {
        self.request(Method::DELETE, path, query, accept, None, None)
            .await
    }

    /// The uniform request pipeline.
    ///
    /// Mutating requests acquire a CSRF token first and retry exactly once
    /// when the backend rejects the cached token with 403 and
    /// `X-CSRF-Token: Required`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        accept: &str,
        content_type: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse, AdtError> {
        let url = self.build_url(path, query)?;
        let mutating = method != Method::GET && method != Method::HEAD;
        let mut refreshed = false;

        loop {
            let token = if mutating {
                Some(self.ensure_csrf().await?)
            } else {
                self.cached_csrf().await
            };

            let mut headers = self.base_headers(accept, content_type)?;
            match &token {
                Some(token) => insert_header(&mut headers, CSRF_HEADER, token)?,
                None => insert_header(&mut headers, CSRF_HEADER, "Fetch")?,
            }

            self.debug.log_http_request(method.as_str(), url.as_str());
            let response = self
                .exec
                .send(HttpRequest {
                    method: method.clone(),
                    url: url.clone(),
                    headers,
                    body: body.clone(),
                })
                .await?;
            self.debug.log_http_response(
                response.status.as_u16(),
                response.content_type(),
                response.body.len(),
            );

            if mutating
                && !refreshed
                && response.status == StatusCode::FORBIDDEN
                && response
                    .header(CSRF_HEADER)
                    .map(|v| v.eq_ignore_ascii_case("required"))
                    .unwrap_or(false)
            {
                refreshed = true;
                self.invalidate_csrf().await;
                continue;
            }

            if response.status.is_success() {
                self.capture_token(&response).await;
                return Ok(response);
            }
            return Err(classify_failure(path, &response));
        }
    }

    fn build_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, AdtError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{path}"))
            .map_err(|e| AdtError::Protocol(format!("invalid request URL for {path}: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("sap-client", &self.sap_client);
            pairs.append_pair("sap-language", &self.sap_language);
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn base_headers(
        &self,
        accept: &str,
        content_type: Option<&str>,
    ) -> Result<HeaderMap, AdtError> {
        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "accept", accept)?;
        if let Some(content_type) = content_type {
            insert_header(&mut headers, "content-type", content_type)?;
        }
        if let Some(basic) = &self.basic_auth {
            insert_header(&mut headers, "authorization", basic)?;
        }
        if self.is_stateful() {
            insert_header(&mut headers, SESSION_TYPE_HEADER, "stateful")?;
        }
        Ok(headers)
    }

    async fn cached_csrf(&self) -> Option<String> {
        self.csrf.lock().await.clone()
    }

    async fn invalidate_csrf(&self) {
        *self.csrf.lock().await = None;
    }

    /// Opportunistically cache a token returned on a regular response.
    async fn capture_token(&self, response: &HttpResponse) {
        if let Some(token) = response.header(CSRF_HEADER) {
            if !token.eq_ignore_ascii_case("required") && !token.eq_ignore_ascii_case("fetch") {
                let mut guard = self.csrf.lock().await;
                if guard.is_none() {
                    *guard = Some(token.to_string());
                }
            }
        }
    }

    /// Return the cached CSRF token, fetching one if necessary. The cache
    /// mutex is held across the fetch: concurrent callers wait for the one
    /// in-flight refresh instead of stampeding the backend.
    async fn ensure_csrf(&self) -> Result<String, AdtError> {
        let mut guard = self.csrf.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }

        let url = self.build_url(DISCOVERY_PATH, &[])?;
        let mut headers = self.base_headers("application/atomsvc+xml", None)?;
        insert_header(&mut headers, CSRF_HEADER, "Fetch")?;

        self.debug.log_http_request("GET", url.as_str());
        let response = self
            .exec
            .send(HttpRequest {
                method: Method::GET,
                url,
                headers,
                body: None,
            })
            .await?;
        self.debug.log_http_response(
            response.status.as_u16(),
            response.content_type(),
            response.body.len(),
        );

        if response.status == StatusCode::UNAUTHORIZED || response.status == StatusCode::FORBIDDEN {
            return Err(AdtError::Authentication {
                status: response.status.as_u16(),
            });
        }
        let token = response
            .header(CSRF_HEADER)
            .filter(|t| !t.eq_ignore_ascii_case("required"))
            .ok_or_else(|| {
                AdtError::Protocol("backend did not return a CSRF token".to_string())
            })?
            .to_string();
        *guard = Some(token.clone());
        Ok(token)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url.as_str())
            .field("sap_client", &self.sap_client)
            .field("stateful", &self.is_stateful())
            .finish()
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), AdtError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| AdtError::Protocol(format!("invalid header name {name}: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| AdtError::Protocol(format!("invalid header value: {e}")))?;
    headers.insert(name, value);
    Ok(())
}

/// Map a non-success response onto the error taxonomy.
fn classify_failure(path: &str, response: &HttpResponse) -> AdtError {
    let status = response.status;
    let body = response.text();
    let exception = crate::adt::xml::parse_adt_exception(&body);

    if status == StatusCode::NOT_FOUND {
        return match exception {
            Some((_, message)) if !message.is_empty() => AdtError::NotFound(message),
            _ => AdtError::NotFound(path.to_string()),
        };
    }
    if status == StatusCode::UNAUTHORIZED {
        return AdtError::Authentication {
            status: status.as_u16(),
        };
    }

    if let Some((kind, message)) = exception {
        let lowered = format!("{kind} {message}").to_lowercase();
        if lowered.contains("locked") && !kind.contains("DEBUGGEE") {
            return AdtError::Conflict(if message.is_empty() { kind } else { message });
        }
        return AdtError::Adt {
            kind,
            message,
            status: status.as_u16(),
        };
    }

    if status == StatusCode::FORBIDDEN {
        return AdtError::Authentication {
            status: status.as_u16(),
        };
    }

    AdtError::Protocol(format!(
        "unexpected HTTP {} for {}: {}",
        status.as_u16(),
        path,
        body.chars().take(200).collect::<String>()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthMethod;
    use crate::config::{Config, ToolMode};

    fn test_config() -> Config {
        Config {
            base_url: Url::parse("https://sap.example.com:44300").unwrap(),
            auth: AuthMethod::Basic {
                user: "developer".into(),
                password: "secret".into(),
            },
            sap_client: "001".into(),
            sap_language: "EN".into(),
            insecure: false,
            stateful: false,
            mode: ToolMode::Focused,
            timeout_seconds: 30,
            debug: false,
        }
    }

    struct NoopExec;

    #[async_trait]
    impl HttpExec for NoopExec {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, AdtError> {
            Ok(HttpResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Vec::new(),
            })
        }
    }

    fn test_transport() -> Transport {
        Transport::with_exec(
            Arc::new(NoopExec),
            &test_config(),
            Arc::new(DebugLogger::new(false)),
        )
    }

    #[test]
    fn urls_carry_sap_client_and_language() {
        let transport = test_transport();
        let url = transport
            .build_url("/sap/bc/adt/programs/programs/ZMCP", &[("version", "active")])
            .unwrap();
        let s = url.as_str();
        assert!(s.starts_with(
            "https://sap.example.com:44300/sap/bc/adt/programs/programs/ZMCP?"
        ));
        assert!(s.contains("sap-client=001"));
        assert!(s.contains("sap-language=EN"));
        assert!(s.contains("version=active"));
    }

    #[test]
    fn query_values_are_escaped() {
        let transport = test_transport();
        let url = transport
            .build_url(
                "/sap/bc/adt/datapreview/freestyle",
                &[("rowNumber", "10"), ("query", "SELECT * FROM T000")],
            )
            .unwrap();
        assert!(!url.as_str().contains(' '));
    }

    #[test]
    fn stateful_flag_adds_session_header() {
        let transport = test_transport();
        let headers = transport.base_headers("application/xml", None).unwrap();
        assert!(headers.get(SESSION_TYPE_HEADER).is_none());

        transport.set_stateful(true);
        let headers = transport.base_headers("application/xml", None).unwrap();
        assert_eq!(
            headers.get(SESSION_TYPE_HEADER).unwrap().to_str().unwrap(),
            "stateful"
        );
    }

    #[test]
    fn basic_auth_header_is_attached() {
        let transport = test_transport();
        let headers = transport.base_headers("application/xml", None).unwrap();
        let auth = headers.get("authorization").unwrap().to_str().unwrap();
        assert!(auth.starts_with("Basic "));
    }

    #[test]
    fn not_found_classification() {
        let response = HttpResponse {
            status: StatusCode::NOT_FOUND,
            headers: HeaderMap::new(),
            body: Vec::new(),
        };
        assert!(matches!(
            classify_failure("/sap/bc/adt/programs/programs/ZNOPE", &response),
            AdtError::NotFound(_)
        ));
    }

    #[test]
    fn lock_exception_classifies_as_conflict() {
        let body = r#"<exc:exception xmlns:exc="http://www.sap.com/abapxml/types/communicationframework">
            <type id="ExceptionResourceAlreadyLocked"/>
            <message lang="EN">Object locked by user DEVELOPER2</message>
        </exc:exception>"#;
        let response = HttpResponse {
            status: StatusCode::CONFLICT,
            headers: HeaderMap::new(),
            body: body.as_bytes().to_vec(),
        };
        match classify_failure("/x", &response) {
            AdtError::Conflict(message) => assert!(message.contains("DEVELOPER2")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn debuggee_lock_exception_stays_an_adt_exception() {
        let body = r#"<exc:exception xmlns:exc="x">
            <type id="DEBUGGEE_CONTEXT_LOCKED_BY_ME"/>
            <message lang="EN">Debuggee context already locked by me</message>
        </exc:exception>"#;
        let response = HttpResponse {
            status: StatusCode::BAD_REQUEST,
            headers: HeaderMap::new(),
            body: body.as_bytes().to_vec(),
        };
        match classify_failure("/x", &response) {
            AdtError::Adt { kind, .. } => assert_eq!(kind, "DEBUGGEE_CONTEXT_LOCKED_BY_ME"),
            other => panic!("expected adt exception, got {other:?}"),
        }
    }

    #[test]
    fn plain_401_is_an_authentication_error() {
        let response = HttpResponse {
            status: StatusCode::UNAUTHORIZED,
            headers: HeaderMap::new(),
            body: Vec::new(),
        };
        assert!(matches!(
            classify_failure("/x", &response),
            AdtError::Authentication { status: 401 }
        ));
    }

    #[test]
    fn unexpected_5xx_is_a_protocol_error() {
        let response = HttpResponse {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers: HeaderMap::new(),
            body: b"<html>dump</html>".to_vec(),
        };
        assert!(matches!(
            classify_failure("/x", &response),
            AdtError::Protocol(_)
        ));
    }
}
