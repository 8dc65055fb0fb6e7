//! C10 — Sequence Executor.
//!
//! Drives a planned chain through an injected [`Transport`], threading
//! a per-run runtime map between steps and auto-promoting
//! session-scoped response headers (CSRF/auth/request-id) so later
//! steps in the same run can pick them up.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chain::plan_chain_for_target;
use crate::correlation::CorrelationGraph;
use crate::error::Result as PipelineResult;
use crate::prepare::{prepare_request_for_step, require_step_exists, PreparedRequest, StepResponseRuntime};
use crate::session::CapturedExchange;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportResult {
    pub status: i32,
    pub headers: HashMap<String, String>,
    #[serde(rename = "bodyText")]
    pub body_text: String,
    #[serde(rename = "contentType")]
    pub content_type: Option<String>,
}

/// The narrow contract C10/C11 drive requests through (spec §6). A
/// direct HTTP client, a browser `page.evaluate(fetch)` bridge, or a
/// managed-browser control channel can all implement it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResult, String>;
}

/// Default concrete transport backed by `reqwest`.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResult, String> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| e.to_string())?;
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body_text {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16() as i32;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let body_text = response.text().await.map_err(|e| e.to_string())?;

        Ok(TransportResult {
            status,
            headers,
            body_text,
            content_type,
        })
    }
}

/// In-memory transport for tests: maps a request's `(method, url)` to a
/// canned result.
#[derive(Default)]
pub struct MockTransport {
    responses: std::sync::Mutex<HashMap<(String, String), TransportResult>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stub(&self, method: &str, url: &str, result: TransportResult) {
        self.responses.lock().unwrap().insert((method.to_string(), url.to_string()), result);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResult, String> {
        self.responses
            .lock()
            .unwrap()
            .get(&(request.method.clone(), request.url.clone()))
            .cloned()
            .ok_or_else(|| format!("no stubbed response for {} {}", request.method, request.url))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    #[serde(rename = "stepIndex")]
    pub step_index: usize,
    pub status: i32,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub chain: Vec<usize>,
    pub final_result: Option<TransportResult>,
    #[serde(rename = "perStep")]
    pub per_step: Vec<StepResult>,
    #[serde(rename = "sessionHeaders")]
    pub session_headers: HashMap<String, String>,
}

fn default_promote_header_names() -> Vec<&'static str> {
    vec![
        "x-csrf-token",
        "x-xsrf-token",
        "csrf-token",
        "x-auth-token",
        "x-access-token",
        "authorization",
        "x-request-id",
        "x-session-id",
        "x-transaction-id",
    ]
}

fn parse_body_json(body_text: &str, content_type: Option<&str>) -> Option<serde_json::Value> {
    let looks_json = content_type.map(|ct| ct.to_lowercase().contains("json")).unwrap_or(false)
        || body_text.trim_start().starts_with('{')
        || body_text.trim_start().starts_with('[');
    if looks_json {
        serde_json::from_str(body_text).ok()
    } else {
        None
    }
}

/// Implements spec §4.10's `executeChainForTarget`.
///
/// Fails fast with [`crate::error::PipelineError::InvariantViolation`]
/// when `target_index` isn't a request the correlation graph or the
/// exchange set knows about — there's nothing to replay.
pub async fn execute_chain_for_target(
    exchanges: &[CapturedExchange],
    graph: &CorrelationGraph,
    target_index: usize,
    transport: &dyn Transport,
    initial_session_headers: Option<HashMap<String, String>>,
    body_override_text: Option<&str>,
    promote_header_names: Option<&[&str]>,
) -> PipelineResult<ExecutionResult> {
    let chain = plan_chain_for_target(graph, target_index)?;
    require_step_exists(exchanges, target_index)?;
    let mut runtime_by_index: HashMap<usize, StepResponseRuntime> = HashMap::new();
    let mut per_step = Vec::new();
    let mut session_headers = initial_session_headers.unwrap_or_default();
    let promote_names: Vec<String> = promote_header_names
        .map(|names| names.iter().map(|s| s.to_lowercase()).collect())
        .unwrap_or_else(|| default_promote_header_names().iter().map(|s| s.to_string()).collect());

    for &step_index in &chain {
        let override_for_step = if step_index == target_index { body_override_text } else { None };

        let Some(mut prepared) = prepare_request_for_step(exchanges, graph, step_index, &runtime_by_index, &session_headers, override_for_step) else {
            continue;
        };

        if prepared.body_text.is_none() && matches!(prepared.method.as_str(), "POST" | "PUT" | "PATCH") {
            prepared.body_text = Some("{}".to_string());
        }

        let send_result = transport.send(prepared).await;

        let (status, headers, body_text, content_type) = match &send_result {
            Ok(result) => (result.status, result.headers.clone(), result.body_text.clone(), result.content_type.clone()),
            Err(_) => (0, HashMap::new(), String::new(), None),
        };

        for (name, value) in &headers {
            if promote_names.contains(&name.to_lowercase()) {
                session_headers.insert(name.to_lowercase(), value.clone());
            }
        }

        let body_json = parse_body_json(&body_text, content_type.as_deref());

        runtime_by_index.insert(
            step_index,
            StepResponseRuntime {
                status,
                headers,
                body_text,
                content_type,
                body_json,
            },
        );

        per_step.push(StepResult {
            step_index,
            status,
            ok: (200..300).contains(&status),
        });
    }

    let final_result = runtime_by_index.get(&target_index).map(|runtime| TransportResult {
        status: runtime.status,
        headers: runtime.headers.clone(),
        body_text: runtime.body_text.clone(),
        content_type: runtime.content_type.clone(),
    });

    Ok(ExecutionResult {
        chain,
        final_result,
        per_step,
        session_headers,
    })
}
