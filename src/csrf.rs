//! C5 — CSRF Provenance Engine.
//!
//! For request headers that look like a CSRF/XSRF token, find the
//! source (cookie, storage, meta, or another header) whose value
//! exactly matches, and emit a rule table so a replayer can regenerate
//! the header from its true source instead of replaying a stale value.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CarrierKind {
    Cookie,
    #[serde(rename = "localStorage")]
    LocalStorage,
    #[serde(rename = "sessionStorage")]
    SessionStorage,
    Meta,
    Header,
}

impl CarrierKind {
    fn base_confidence(self) -> f64 {
        match self {
            CarrierKind::Cookie => 0.95,
            CarrierKind::LocalStorage | CarrierKind::SessionStorage | CarrierKind::Meta => 0.9,
            CarrierKind::Header => 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfRule {
    #[serde(rename = "targetHeader")]
    pub target_header: String,
    #[serde(rename = "sourceType")]
    pub source_type: CarrierKind,
    #[serde(rename = "sourceKey")]
    pub source_key: String,
    pub confidence: f64,
    #[serde(rename = "observedAt")]
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CsrfProvenance {
    pub rules: Vec<CsrfRule>,
}

/// Input bundle for `infer_csrf_provenance` — mirrors the carrier maps a
/// caller might have gathered from browser storage during capture.
#[derive(Debug, Clone, Default)]
pub struct CsrfSources<'a> {
    pub auth_headers: &'a HashMap<String, String>,
    pub cookies: &'a HashMap<String, String>,
    pub local_storage: &'a HashMap<String, String>,
    pub session_storage: &'a HashMap<String, String>,
    pub meta_tokens: &'a HashMap<String, String>,
    pub auth_info: &'a HashMap<String, String>,
}

fn find_exact_match<'a>(map: &'a HashMap<String, String>, target_value: &str) -> Option<&'a String> {
    map.keys().find(|k| map.get(*k).map(|v| v.trim()) == Some(target_value))
}

fn csrf_candidates(sources: &CsrfSources) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = sources
        .auth_headers
        .iter()
        .filter(|(name, _)| {
            let lower = name.to_lowercase();
            lower.contains("csrf") || lower.contains("xsrf")
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    if out.is_empty() {
        out = sources
            .auth_info
            .iter()
            .filter_map(|(key, value)| {
                let residual = key.strip_prefix("request_header_")?;
                let lower = residual.to_lowercase();
                if lower.contains("csrf") || lower.contains("xsrf") {
                    Some((residual.to_string(), value.clone()))
                } else {
                    None
                }
            })
            .collect();
    }

    out
}

/// Implements spec §4.5's `inferCsrfProvenance`.
pub fn infer_csrf_provenance(sources: &CsrfSources, existing: Option<&CsrfProvenance>, now: DateTime<Utc>) -> Option<CsrfProvenance> {
    let candidates = csrf_candidates(sources);
    if candidates.is_empty() {
        return existing.cloned();
    }

    let mut rules: HashMap<String, CsrfRule> = existing
        .map(|p| p.rules.iter().map(|r| (r.target_header.to_lowercase(), r.clone())).collect())
        .unwrap_or_default();

    for (header_name, value) in candidates {
        let trimmed = value.trim();
        let found = find_exact_match(sources.cookies, trimmed)
            .map(|k| (CarrierKind::Cookie, k.clone()))
            .or_else(|| find_exact_match(sources.local_storage, trimmed).map(|k| (CarrierKind::LocalStorage, k.clone())))
            .or_else(|| find_exact_match(sources.session_storage, trimmed).map(|k| (CarrierKind::SessionStorage, k.clone())))
            .or_else(|| find_exact_match(sources.meta_tokens, trimmed).map(|k| (CarrierKind::Meta, k.clone())))
            .unwrap_or((CarrierKind::Header, header_name.clone()));

        let rule = CsrfRule {
            target_header: header_name.to_lowercase(),
            source_type: found.0,
            source_key: found.1,
            confidence: found.0.base_confidence(),
            observed_at: now,
        };

        let key = rule.target_header.clone();
        match rules.get(&key) {
            Some(existing_rule) if existing_rule.confidence >= rule.confidence => {}
            _ => {
                rules.insert(key, rule);
            }
        }
    }

    let mut rules: Vec<CsrfRule> = rules.into_values().collect();
    rules.sort_by(|a, b| a.target_header.cmp(&b.target_header));
    Some(CsrfProvenance { rules })
}

pub struct AppliedCsrf {
    pub auth_headers: HashMap<String, String>,
    pub applied: Vec<String>,
}

/// Implements spec §4.5's `applyCsrfProvenance`.
pub fn apply_csrf_provenance(sources: &CsrfSources, provenance: &CsrfProvenance) -> AppliedCsrf {
    let mut auth_headers = sources.auth_headers.clone();
    let mut applied = Vec::new();

    for rule in &provenance.rules {
        let carrier_map = match rule.source_type {
            CarrierKind::Cookie => sources.cookies,
            CarrierKind::LocalStorage => sources.local_storage,
            CarrierKind::SessionStorage => sources.session_storage,
            CarrierKind::Meta => sources.meta_tokens,
            CarrierKind::Header => sources.auth_headers,
        };
        if let Some(value) = carrier_map.get(&rule.source_key) {
            if let Some(existing_name) = auth_headers.keys().find(|k| k.to_lowercase() == rule.target_header).cloned() {
                auth_headers.insert(existing_name, value.clone());
            } else {
                auth_headers.insert(rule.target_header.clone(), value.clone());
            }
            applied.push(format!(
                "{}⇐{}:{}",
                rule.target_header,
                carrier_label(rule.source_type),
                rule.source_key
            ));
        }
    }

    AppliedCsrf { auth_headers, applied }
}

fn carrier_label(kind: CarrierKind) -> &'static str {
    match kind {
        CarrierKind::Cookie => "cookie",
        CarrierKind::LocalStorage => "localStorage",
        CarrierKind::SessionStorage => "sessionStorage",
        CarrierKind::Meta => "meta",
        CarrierKind::Header => "header",
    }
}
