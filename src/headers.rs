//! C3 — Header Profiler.
//!
//! Builds a per-domain profile of the "boring but necessary" headers a
//! replayer needs to resend (locale, user agent, accept headers), kept
//! separate from the volatile auth/protocol headers C4/C9 already own.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::har::filters;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderCategory {
    App,
    Context,
    Auth,
    Browser,
    Protocol,
}

/// Classify a header name (lowercase, first match wins, per spec §4.3).
pub fn classify_header(name_lower: &str) -> HeaderCategory {
    const PROTOCOL: &[&str] = &["host", "connection", "content-length", "transfer-encoding", "te", "upgrade", "expect"];
    const BROWSER: &[&str] = &["accept-encoding", "upgrade-insecure-requests", "dnt"];
    const CONTEXT: &[&str] = &["accept", "accept-language", "user-agent", "referer", "origin"];

    if filters::is_http2_pseudo_header(name_lower) || PROTOCOL.contains(&name_lower) {
        return HeaderCategory::Protocol;
    }
    if filters::is_auth_like_header(name_lower) && !filters::is_standard_header(name_lower) {
        return HeaderCategory::Auth;
    }
    if name_lower.starts_with("sec-") || BROWSER.contains(&name_lower) {
        return HeaderCategory::Browser;
    }
    if CONTEXT.contains(&name_lower) {
        return HeaderCategory::Context;
    }
    HeaderCategory::App
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedHeader {
    #[serde(rename = "originalName")]
    pub original_name: String,
    pub value: String,
    pub category: HeaderCategory,
    #[serde(rename = "seenCount")]
    pub seen_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainProfile {
    #[serde(rename = "commonHeaders")]
    pub common_headers: HashMap<String, ObservedHeader>,
    #[serde(rename = "requestCount")]
    pub request_count: u32,
    #[serde(rename = "capturedAt")]
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HeaderProfile {
    pub domains: HashMap<String, DomainProfile>,
    #[serde(rename = "endpointOverrides")]
    pub endpoint_overrides: HashMap<String, HashMap<String, String>>,
}

/// Minimum fraction of requests to a domain a header must appear on to be
/// promoted into that domain's `app` common-header set.
const APP_HEADER_FREQUENCY_THRESHOLD: f64 = 0.5;

/// Build a `HeaderProfile` from raw per-request header lists, one list per
/// observed request to `domain`. Headers falling in the `app` category are
/// kept only when they clear the frequency threshold; every other category
/// is recorded unconditionally so `resolve_headers` can still find auth /
/// context / browser / protocol entries when deciding what to layer.
pub fn build_domain_profile(domain_requests: &[Vec<(String, String)>], now: DateTime<Utc>) -> DomainProfile {
    let request_count = domain_requests.len() as u32;
    let mut counts: HashMap<String, (String, String, HeaderCategory, u32)> = HashMap::new();

    for headers in domain_requests {
        let mut seen_this_request: std::collections::HashSet<String> = std::collections::HashSet::new();
        for (name, value) in headers {
            let lower = name.to_lowercase();
            if filters::is_http2_pseudo_header(&lower) {
                continue;
            }
            let category = classify_header(&lower);
            let entry = counts
                .entry(lower.clone())
                .or_insert_with(|| (name.clone(), value.clone(), category, 0));
            entry.1 = value.clone();
            if seen_this_request.insert(lower) {
                entry.3 += 1;
            }
        }
    }

    let mut common_headers = HashMap::new();
    for (lower, (original_name, value, category, seen_count)) in counts {
        let frequency = if request_count == 0 {
            0.0
        } else {
            seen_count as f64 / request_count as f64
        };
        if category == HeaderCategory::App && frequency < APP_HEADER_FREQUENCY_THRESHOLD {
            continue;
        }
        common_headers.insert(
            lower,
            ObservedHeader {
                original_name,
                value,
                category,
                seen_count,
            },
        );
    }

    DomainProfile {
        common_headers,
        request_count,
        captured_at: now,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    Node,
    Browser,
}

/// Produce the effective header map for a replay (spec §4.3 `resolveHeaders`).
pub fn resolve_headers(
    profile: Option<&HeaderProfile>,
    domain: &str,
    method: &str,
    path: &str,
    auth_headers: &HashMap<String, String>,
    cookies: &HashMap<String, String>,
    mode: ReplayMode,
) -> HashMap<String, String> {
    let mut out: HashMap<String, String> = HashMap::new();

    if let Some(domain_profile) = profile.and_then(|p| p.domains.get(domain)) {
        for header in domain_profile.common_headers.values() {
            match header.category {
                HeaderCategory::App => {
                    out.insert(header.original_name.clone(), header.value.clone());
                }
                HeaderCategory::Context if mode == ReplayMode::Browser => {
                    out.insert(header.original_name.clone(), header.value.clone());
                }
                _ => {}
            }
        }
    }

    if let Some(profile) = profile {
        let override_key = format!("{} {}", method.to_uppercase(), path);
        if let Some(overrides) = profile.endpoint_overrides.get(&override_key) {
            for (k, v) in overrides {
                out.insert(k.clone(), v.clone());
            }
        }
    }

    for (k, v) in auth_headers {
        out.insert(k.clone(), v.clone());
    }

    if !cookies.is_empty() {
        let mut pairs: Vec<String> = cookies.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();
        out.insert("Cookie".to_string(), pairs.join("; "));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_header_categories() {
        assert_eq!(classify_header("host"), HeaderCategory::Protocol);
        assert_eq!(classify_header("authorization"), HeaderCategory::Auth);
        assert_eq!(classify_header("sec-fetch-mode"), HeaderCategory::Browser);
        assert_eq!(classify_header("accept-language"), HeaderCategory::Context);
        assert_eq!(classify_header("x-request-metadata"), HeaderCategory::App);
    }

    #[test]
    fn app_headers_below_threshold_are_dropped() {
        let requests = vec![
            vec![("X-Tenant".to_string(), "a".to_string())],
            vec![],
            vec![],
        ];
        let profile = build_domain_profile(&requests, Utc::now());
        assert!(!profile.common_headers.contains_key("x-tenant"));
    }

    #[test]
    fn resolve_headers_layers_auth_over_app_and_appends_cookie() {
        let mut domains = HashMap::new();
        let mut common = HashMap::new();
        common.insert(
            "x-app".to_string(),
            ObservedHeader {
                original_name: "X-App".to_string(),
                value: "v1".to_string(),
                category: HeaderCategory::App,
                seen_count: 3,
            },
        );
        domains.insert(
            "api.acme.test".to_string(),
            DomainProfile {
                common_headers: common,
                request_count: 3,
                captured_at: Utc::now(),
            },
        );
        let profile = HeaderProfile {
            domains,
            endpoint_overrides: HashMap::new(),
        };

        let mut auth = HashMap::new();
        auth.insert("Authorization".to_string(), "Bearer xyz".to_string());
        let mut cookies = HashMap::new();
        cookies.insert("session".to_string(), "abc".to_string());

        let resolved = resolve_headers(
            Some(&profile),
            "api.acme.test",
            "GET",
            "/v1/users",
            &auth,
            &cookies,
            ReplayMode::Node,
        );

        assert_eq!(resolved.get("X-App").unwrap(), "v1");
        assert_eq!(resolved.get("Authorization").unwrap(), "Bearer xyz");
        assert_eq!(resolved.get("Cookie").unwrap(), "session=abc");
    }

    #[test]
    fn node_mode_excludes_context_headers() {
        let mut domains = HashMap::new();
        let mut common = HashMap::new();
        common.insert(
            "user-agent".to_string(),
            ObservedHeader {
                original_name: "User-Agent".to_string(),
                value: "test-agent".to_string(),
                category: HeaderCategory::Context,
                seen_count: 5,
            },
        );
        domains.insert(
            "api.acme.test".to_string(),
            DomainProfile {
                common_headers: common,
                request_count: 5,
                captured_at: Utc::now(),
            },
        );
        let profile = HeaderProfile {
            domains,
            endpoint_overrides: HashMap::new(),
        };

        let resolved = resolve_headers(
            Some(&profile),
            "api.acme.test",
            "GET",
            "/v1/users",
            &HashMap::new(),
            &HashMap::new(),
            ReplayMode::Node,
        );
        assert!(!resolved.contains_key("User-Agent"));
    }
}
