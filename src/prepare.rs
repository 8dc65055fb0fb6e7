//! C9 — Request Preparer.
//!
//! Synthesizes a ready-to-send request for one chain step from its
//! captured template plus runtime outputs recorded from earlier steps,
//! injecting correlated values into headers, query params, or body.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::correlation::{CorrelationGraph, ValueLocation};
use crate::error::{PipelineError, Result as PipelineResult};
use crate::session::CapturedExchange;

/// What a prior step's transport call actually returned, keyed by step
/// index in the executor's `runtimeByIndex` map.
#[derive(Debug, Clone, Default)]
pub struct StepResponseRuntime {
    pub status: i32,
    pub headers: HashMap<String, String>,
    pub body_text: String,
    pub content_type: Option<String>,
    pub body_json: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    #[serde(rename = "bodyText", skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
}

const STRIPPED_REQUEST_HEADERS: &[&str] = &["host", "connection", "content-length", "transfer-encoding", "cookie"];

fn base_headers(exchange: &CapturedExchange) -> HashMap<String, String> {
    exchange
        .request
        .headers
        .iter()
        .filter(|(name, _)| {
            let lower = name.to_lowercase();
            !lower.starts_with(':') && !STRIPPED_REQUEST_HEADERS.contains(&lower.as_str())
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn header_value_case_insensitive<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a String> {
    let lower = name.to_lowercase();
    headers.iter().find(|(k, _)| k.to_lowercase() == lower).map(|(_, v)| v)
}

fn get_json_path<'a>(value: &'a serde_json::Value, dotted_path: &str) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for segment in dotted_path.split('.') {
        if segment == "[]" {
            return None;
        }
        current = current.get(segment)?;
    }
    Some(current)
}

fn set_json_path(value: &mut serde_json::Value, dotted_path: &str, new_value: serde_json::Value) {
    let segments: Vec<&str> = dotted_path.split('.').collect();
    let mut current = value;
    for (i, segment) in segments.iter().enumerate() {
        if *segment == "[]" {
            return;
        }
        if i == segments.len() - 1 {
            if !current.is_object() {
                *current = serde_json::json!({});
            }
            current.as_object_mut().unwrap().insert(segment.to_string(), new_value);
            return;
        }
        if !current.is_object() {
            *current = serde_json::json!({});
        }
        current = current
            .as_object_mut()
            .unwrap()
            .entry(segment.to_string())
            .or_insert_with(|| serde_json::json!({}));
    }
}

fn resolve_runtime_value(runtime: &StepResponseRuntime, location: ValueLocation, path: &str) -> Option<String> {
    match location {
        ValueLocation::Header => {
            let name = path.strip_prefix("header.").unwrap_or(path);
            header_value_case_insensitive(&runtime.headers, name).cloned()
        }
        ValueLocation::Body => {
            let dotted = path.strip_prefix("body.").unwrap_or(path);
            if dotted.contains("[]") {
                return None;
            }
            let parsed = runtime
                .body_json
                .clone()
                .or_else(|| serde_json::from_str(&runtime.body_text).ok())?;
            get_json_path(&parsed, dotted).and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                serde_json::Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
        }
        ValueLocation::Cookie | ValueLocation::Url | ValueLocation::Query => None,
    }
}

fn apply_query_injection(url: &mut Url, target_path: &str, value: &str) {
    let rest = target_path.strip_prefix("query.").unwrap_or(target_path);
    match rest.split_once('.') {
        None => {
            let param = rest;
            let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
            if let Some(existing) = pairs.iter_mut().find(|(k, _)| k == param) {
                existing.1 = value.to_string();
            } else {
                pairs.push((param.to_string(), value.to_string()));
            }
            let mut new_query = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in &pairs {
                new_query.append_pair(k, v);
            }
            url.set_query(Some(&new_query.finish()));
        }
        Some((param, nested_path)) => {
            let existing_raw = url
                .query_pairs()
                .find(|(k, _)| k == param)
                .map(|(_, v)| v.into_owned())
                .unwrap_or_else(|| "{}".to_string());
            let mut parsed: serde_json::Value = serde_json::from_str(&existing_raw).unwrap_or_else(|_| serde_json::json!({}));
            set_json_path(&mut parsed, nested_path, serde_json::Value::String(value.to_string()));
            let serialized = parsed.to_string();

            let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
            if let Some(existing) = pairs.iter_mut().find(|(k, _)| k == param) {
                existing.1 = serialized;
            } else {
                pairs.push((param.to_string(), serialized));
            }
            let mut new_query = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in &pairs {
                new_query.append_pair(k, v);
            }
            url.set_query(Some(&new_query.finish()));
        }
    }
}

/// Hard precondition for C10: a step central to the replay (the target
/// itself) must correspond to a captured exchange. Prerequisite steps
/// missing from the exchange set are tolerated by
/// `prepare_request_for_step` below (it returns `None` and the executor
/// skips them); the target step missing is not recoverable.
pub fn require_step_exists(exchanges: &[CapturedExchange], step_index: usize) -> PipelineResult<()> {
    if exchanges.iter().any(|e| e.index == step_index) {
        Ok(())
    } else {
        Err(PipelineError::InvariantViolation(step_index))
    }
}

/// Implements spec §4.9's `prepareRequestForStep`.
pub fn prepare_request_for_step(
    exchanges: &[CapturedExchange],
    graph: &CorrelationGraph,
    step_index: usize,
    runtime_by_index: &HashMap<usize, StepResponseRuntime>,
    session_headers: &HashMap<String, String>,
    body_override_text: Option<&str>,
) -> Option<PreparedRequest> {
    let exchange = exchanges.iter().find(|e| e.index == step_index)?;

    let mut headers = base_headers(exchange);
    for (k, v) in session_headers {
        headers.insert(k.clone(), v.clone());
    }

    let mut url = Url::parse(&exchange.request.url).ok()?;
    let mut body_text = body_override_text
        .map(|s| s.to_string())
        .or_else(|| exchange.request.body_raw.clone())
        .or_else(|| exchange.request.body.as_ref().map(|b| b.to_string()));

    for link in graph.links.iter().filter(|l| l.target_request_index == step_index) {
        let Some(runtime) = runtime_by_index.get(&link.source_request_index) else { continue };
        let Some(value) = resolve_runtime_value(runtime, link.source_location, &link.source_path) else { continue };

        match link.target_location {
            ValueLocation::Header => {
                let name = link.target_path.strip_prefix("header.").unwrap_or(&link.target_path);
                if let Some(existing_name) = headers.keys().find(|k| k.to_lowercase() == name.to_lowercase()).cloned() {
                    headers.insert(existing_name, value);
                } else {
                    headers.insert(name.to_string(), value);
                }
            }
            ValueLocation::Query => {
                apply_query_injection(&mut url, &link.target_path, &value);
            }
            ValueLocation::Body => {
                let Some(dotted) = link.target_path.strip_prefix("body.") else { continue };
                let Some(text) = body_text.as_ref() else { continue };
                let Ok(mut parsed) = serde_json::from_str::<serde_json::Value>(text) else { continue };
                set_json_path(&mut parsed, dotted, serde_json::Value::String(value));
                body_text = Some(parsed.to_string());
            }
            ValueLocation::Cookie | ValueLocation::Url => {}
        }
    }

    Some(PreparedRequest {
        method: exchange.request.method.clone(),
        url: url.to_string(),
        headers,
        body_text,
    })
}
