//! Scripted HTTP backend for driving the client without a live system.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};

use mcp_abap_adt::adt::transport::{HttpExec, HttpRequest, HttpResponse, Transport};
use mcp_abap_adt::adt::AdtClient;
use mcp_abap_adt::auth::AuthMethod;
use mcp_abap_adt::config::{Config, ToolMode};
use mcp_abap_adt::debug::DebugLogger;
use mcp_abap_adt::error::AdtError;

/// One observed request.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub method: String,
    pub path: String,
    pub query: String,
    pub csrf_header: Option<String>,
    pub session_type: Option<String>,
    pub body: String,
}

impl RequestRecord {
    pub fn query_contains(&self, needle: &str) -> bool {
        self.query.contains(needle)
    }
}

/// Responses are served strictly in the order they were scripted; every
/// request is recorded for later assertions.
#[derive(Default)]
pub struct ScriptedExec {
    responses: Mutex<Vec<HttpResponse>>,
    log: Mutex<Vec<RequestRecord>>,
}

impl ScriptedExec {
    pub fn new(responses: Vec<HttpResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
            log: Mutex::new(Vec::new()),
        })
    }

    /// A backend that fails the test if any request reaches it.
    pub fn deny_all() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn requests(&self) -> Vec<RequestRecord> {
        self.log.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpExec for ScriptedExec {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AdtError> {
        let record = RequestRecord {
            method: request.method.to_string(),
            path: request.url.path().to_string(),
            query: request.url.query().unwrap_or("").to_string(),
            csrf_header: header_value(&request.headers, "x-csrf-token"),
            session_type: header_value(&request.headers, "X-sap-adt-sessiontype"),
            body: request
                .body
                .as_deref()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default(),
        };
        self.log.lock().unwrap().push(record);

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(AdtError::Protocol(format!(
                "no scripted response left for {} {}",
                request.method,
                request.url.path()
            )));
        }
        Ok(responses.remove(0))
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Response constructors
// ---------------------------------------------------------------------------

pub fn response(status: u16, headers: &[(&str, &str)], body: &str) -> HttpResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(
            reqwest::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
            value.parse().unwrap(),
        );
    }
    HttpResponse {
        status: StatusCode::from_u16(status).unwrap(),
        headers: map,
        body: body.as_bytes().to_vec(),
    }
}

/// Discovery response handing out a CSRF token.
pub fn csrf_fetch_ok(token: &str) -> HttpResponse {
    response(200, &[("x-csrf-token", token)], "<service/>")
}

/// 403 telling the client its token went stale.
pub fn csrf_rejected() -> HttpResponse {
    response(403, &[("x-csrf-token", "Required")], "CSRF token validation failed")
}

pub fn ok_empty() -> HttpResponse {
    response(200, &[], "")
}

pub fn ok_text(body: &str) -> HttpResponse {
    response(200, &[("content-type", "text/plain; charset=utf-8")], body)
}

pub fn ok_xml(body: &str) -> HttpResponse {
    response(200, &[("content-type", "application/xml")], body)
}

pub fn created() -> HttpResponse {
    response(201, &[], "")
}

pub fn not_found() -> HttpResponse {
    response(404, &[], "")
}

pub fn adt_exception(status: u16, kind: &str, message: &str) -> HttpResponse {
    let body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
        <exc:exception xmlns:exc="http://www.sap.com/abapxml/types/communicationframework">
          <namespace id="com.sap.adt"/>
          <type id="{kind}"/>
          <message lang="EN">{message}</message>
        </exc:exception>"#
    );
    response(status, &[("content-type", "application/xml")], &body)
}

/// Canned lock response.
pub fn lock_granted(handle: &str) -> HttpResponse {
    let body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
        <asx:abap xmlns:asx="http://www.sap.com/abapxml" version="1.0">
          <asx:values>
            <DATA>
              <LOCK_HANDLE>{handle}</LOCK_HANDLE>
              <CORRNR/>
              <CORRUSER>DEVELOPER</CORRUSER>
              <CORRTEXT/>
              <IS_LOCAL>X</IS_LOCAL>
            </DATA>
          </asx:values>
        </asx:abap>"#
    );
    ok_xml(&body)
}

// ---------------------------------------------------------------------------
// Client construction
// ---------------------------------------------------------------------------

pub fn test_config() -> Config {
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
        mode: ToolMode::Expert,
        timeout_seconds: 30,
        debug: false,
    }
}

pub fn client_with(exec: Arc<ScriptedExec>) -> AdtClient {
    let config = test_config();
    let transport = Arc::new(Transport::with_exec(
        exec,
        &config,
        Arc::new(DebugLogger::new(false)),
    ));
    AdtClient::with_transport(transport, &config)
}
