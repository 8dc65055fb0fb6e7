//! C11 — Endpoint Prober (optional).
//!
//! Given an `ApiData` with known endpoints, generates speculative
//! follow-on requests — CRUD completion, sub-resources, collection
//! operations, `/me`, doc paths, version neighbors, health checks — and
//! scores responses for "this is probably a real endpoint" signal.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::executor::{Transport, TransportResult};
use crate::har::ApiData;
use crate::prepare::PreparedRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbeCategory {
    CrudCompletion,
    SubResource,
    CollectionOp,
    UserContext,
    Documentation,
    VersionNeighbor,
    HealthCheck,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Probe {
    pub method: String,
    pub url: String,
    pub category: ProbeCategory,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub probe: Probe,
    pub status: i32,
    pub discovered: bool,
}

const SUB_RESOURCES: &[&str] = &["comments", "history", "status", "notes", "attachments", "items", "events"];
const COLLECTION_OPS: &[&str] = &["search", "count", "export", "bulk", "batch"];
const DOC_PATHS: &[&str] = &["/docs", "/openapi.json", "/swagger.json", "/api-docs", "/.well-known/openapi.json"];
const HEALTH_PATHS: &[&str] = &["/health", "/healthz", "/status", "/ping"];
const DEFAULT_PROBE_CAP: usize = 50;
const DEFAULT_CONCURRENCY: usize = 3;

fn param_segment_re() -> Regex {
    Regex::new(r"^[0-9]+$|^[0-9a-fA-F-]{8,}$|^\{.+\}$").unwrap()
}

/// Generate speculative probes for every observed base URL + path in
/// `api_data`, capped at `DEFAULT_PROBE_CAP`.
pub fn generate_probes(api_data: &ApiData) -> Vec<Probe> {
    let param_re = param_segment_re();
    let mut probes = Vec::new();
    let mut seen_urls: HashSet<String> = HashSet::new();

    let mut resource_bases: HashSet<(String, String)> = HashSet::new();
    let mut version_roots: HashSet<String> = HashSet::new();

    for (key, requests) in &api_data.endpoints {
        let Some((domain, path)) = key.split_once(':') else { continue };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        if let Some(last) = segments.last() {
            if param_re.is_match(last) && segments.len() >= 2 {
                let base = format!("/{}", segments[..segments.len() - 1].join("/"));
                resource_bases.insert((domain.to_string(), base));
            } else if !segments.is_empty() {
                resource_bases.insert((domain.to_string(), format!("/{}", segments.join("/"))));
            }
        }

        if let Some(first) = segments.first() {
            if first.starts_with('v') && first[1..].chars().all(|c| c.is_ascii_digit()) {
                version_roots.insert(domain.to_string());
            }
        }

        let _ = requests;
    }

    for (domain, base) in &resource_bases {
        for sub in SUB_RESOURCES {
            let url = format!("https://{domain}{base}/{sub}");
            if seen_urls.insert(url.clone()) {
                probes.push(Probe {
                    method: "GET".to_string(),
                    url,
                    category: ProbeCategory::SubResource,
                    reason: format!("sub-resource of observed base {base}"),
                });
            }
        }
        for op in COLLECTION_OPS {
            let url = format!("https://{domain}{base}/{op}");
            if seen_urls.insert(url.clone()) {
                probes.push(Probe {
                    method: "GET".to_string(),
                    url,
                    category: ProbeCategory::CollectionOp,
                    reason: format!("collection operation on {base}"),
                });
            }
        }
        let me_url = format!("https://{domain}/me");
        if seen_urls.insert(me_url.clone()) {
            probes.push(Probe {
                method: "GET".to_string(),
                url: me_url,
                category: ProbeCategory::UserContext,
                reason: "common user-context endpoint".to_string(),
            });
        }
    }

    for domain in resource_bases.iter().map(|(d, _)| d.clone()).collect::<HashSet<_>>() {
        for doc in DOC_PATHS {
            let url = format!("https://{domain}{doc}");
            if seen_urls.insert(url.clone()) {
                probes.push(Probe {
                    method: "GET".to_string(),
                    url,
                    category: ProbeCategory::Documentation,
                    reason: "api documentation path".to_string(),
                });
            }
        }
        for health in HEALTH_PATHS {
            let url = format!("https://{domain}{health}");
            if seen_urls.insert(url.clone()) {
                probes.push(Probe {
                    method: "GET".to_string(),
                    url,
                    category: ProbeCategory::HealthCheck,
                    reason: "health/status endpoint".to_string(),
                });
            }
        }
    }

    for domain in version_roots {
        for v in 1..=3 {
            let url = format!("https://{domain}/v{v}/");
            if seen_urls.insert(url.clone()) {
                probes.push(Probe {
                    method: "GET".to_string(),
                    url,
                    category: ProbeCategory::VersionNeighbor,
                    reason: format!("version neighbor v{v}"),
                });
            }
        }
    }

    probes.truncate(DEFAULT_PROBE_CAP);
    probes
}

fn is_trivial_body(body: &str) -> bool {
    matches!(body.trim(), "" | "ok" | "true" | "null" | "{}" | "[]")
}

fn classify_discovery(result: &TransportResult) -> bool {
    if !(200..300).contains(&result.status) {
        return false;
    }
    let body = result.body_text.trim();
    if is_trivial_body(body) {
        return false;
    }
    let looks_html = result.content_type.as_deref().map(|ct| ct.contains("text/html")).unwrap_or(false);
    if looks_html {
        return false;
    }
    let parses_with_content = serde_json::from_str::<serde_json::Value>(body)
        .map(|v| !matches!(v, serde_json::Value::Null) && v.to_string() != "{}" && v.to_string() != "[]")
        .unwrap_or(false);
    parses_with_content || body.len() > 20
}

/// Execute probes with bounded concurrency via `JoinSet`, per spec §5's
/// resource model (default concurrency 3).
pub async fn execute_probes(probes: Vec<Probe>, transport: std::sync::Arc<dyn Transport>, concurrency: Option<usize>) -> Vec<ProbeResult> {
    let limit = concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1);
    let mut results = Vec::with_capacity(probes.len());
    let mut pending = probes.into_iter();
    let mut in_flight: JoinSet<ProbeResult> = JoinSet::new();

    for probe in pending.by_ref().take(limit) {
        spawn_probe(&mut in_flight, probe, transport.clone());
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Ok(result) = joined {
            results.push(result);
        }
        if let Some(probe) = pending.next() {
            spawn_probe(&mut in_flight, probe, transport.clone());
        }
    }

    results
}

fn spawn_probe(set: &mut JoinSet<ProbeResult>, probe: Probe, transport: std::sync::Arc<dyn Transport>) {
    set.spawn(async move {
        let prepared = PreparedRequest {
            method: probe.method.clone(),
            url: probe.url.clone(),
            headers: Default::default(),
            body_text: None,
        };
        match transport.send(prepared).await {
            Ok(result) => {
                let discovered = classify_discovery(&result);
                ProbeResult {
                    probe,
                    status: result.status,
                    discovered,
                }
            }
            Err(_) => ProbeResult {
                probe,
                status: 0,
                discovered: false,
            },
        }
    });
}
