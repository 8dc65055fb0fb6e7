//! C2 — HAR Parser.
//!
//! Turns a raw HAR log into an [`ApiData`] bundle: the noise (static
//! assets, third-party beacons, HTML navigations) filtered out, auth
//! headers and cookies pulled aside, and surviving requests grouped by
//! `"domain:path"`. Grounded on `native-src-parser-har.rs` from the
//! retrieval pack's `other_examples/`, adapted to spec §4.2's filter
//! ordering.

pub mod filters;
pub mod wire;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::{detect_refresh_endpoint, AuthInfo, RefreshConfig};
use crate::csrf::CsrfProvenance;
use crate::headers::HeaderProfile;
use wire::{Har, HarEntry};

/// One surviving request/response exchange, trimmed of the noise HAR
/// captures carry (redirects-as-separate-entries, raw header casing,
/// cache-busting query junk is left untouched — only domain/path-level
/// filtering happens here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedRequest {
    pub method: String,
    pub url: String,
    pub path: String,
    pub domain: String,
    pub status: i32,
    #[serde(rename = "responseContentType")]
    pub response_content_type: Option<String>,
    #[serde(rename = "fromSpec")]
    pub from_spec: bool,
}

/// The bundle produced by C2 (and later enriched in place by C3/C4/C5
/// through the pipeline orchestrator): everything downstream replay
/// planning needs to know about one captured API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiData {
    pub service: String,
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    #[serde(rename = "baseUrls")]
    pub base_urls: Vec<String>,
    #[serde(rename = "authHeaders")]
    pub auth_headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    /// Raw header/cookie provenance strings, keyed e.g.
    /// `"request_header_authorization"`, `"response_setcookie_session"`.
    #[serde(rename = "authInfo")]
    pub auth_info: HashMap<String, String>,
    pub endpoints: HashMap<String, Vec<ParsedRequest>>,
    #[serde(rename = "headerProfile", skip_serializing_if = "Option::is_none")]
    pub header_profile: Option<HeaderProfile>,
    #[serde(rename = "csrfProvenance", skip_serializing_if = "Option::is_none")]
    pub csrf_provenance: Option<CsrfProvenance>,
    #[serde(rename = "generatedAuthInfo", skip_serializing_if = "Option::is_none")]
    pub generated_auth_info: Option<AuthInfo>,
    /// First refresh-exchange observed among the surviving entries, if
    /// any (see [`detect_refresh_endpoint`]); carried through to
    /// [`crate::auth::generate_auth_info`]'s `refresh` field.
    #[serde(rename = "refreshCandidate", skip_serializing_if = "Option::is_none")]
    pub refresh_candidate: Option<RefreshConfig>,
}

/// Degraded fallback for a capture whose HAR structure couldn't be
/// parsed at all (spec §7 `MalformedCapture`): an otherwise-empty
/// [`ApiData`] tagged with a placeholder service name instead of a hard
/// failure, so the rest of the pipeline still has something to write.
pub fn malformed_capture_fallback() -> ApiData {
    ApiData {
        service: "unknown-api".to_string(),
        base_url: String::new(),
        base_urls: Vec::new(),
        auth_headers: HashMap::new(),
        cookies: HashMap::new(),
        auth_info: HashMap::new(),
        endpoints: HashMap::new(),
        header_profile: None,
        csrf_provenance: None,
        generated_auth_info: None,
        refresh_candidate: None,
    }
}

fn url_domain(url_str: &str) -> Option<String> {
    Url::parse(url_str).ok().and_then(|u| u.host_str().map(|h| h.to_string()))
}

fn url_path(url_str: &str) -> String {
    Url::parse(url_str).map(|u| u.path().to_string()).unwrap_or_default()
}

/// Parse a `Set-Cookie` value into `(name, value)` by splitting at the
/// *first* `=` and truncating at the *first* `;` — never by comma, since
/// `Expires=...GMT` attributes themselves contain commas.
fn parse_set_cookie(raw: &str) -> Option<(String, String)> {
    let first_segment = raw.split(';').next()?.trim();
    let eq = first_segment.find('=')?;
    let (name, value) = first_segment.split_at(eq);
    let name = name.trim();
    let value = value[1..].trim();
    if name.is_empty() {
        None
    } else {
        Some((name.to_string(), value.to_string()))
    }
}

/// Decide which of a capture's seen domains to treat as the primary
/// service: prefer the seed URL's domain when given and present, else
/// the domain with the most surviving entries.
fn pick_primary_domain(domain_counts: &HashMap<String, usize>, seed_url: Option<&str>) -> String {
    if let Some(seed) = seed_url.and_then(url_domain) {
        if domain_counts.contains_key(&seed) {
            return seed;
        }
    }
    domain_counts
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(domain, _)| domain.clone())
        .unwrap_or_default()
}

/// Implements spec §4.2's five-rule filter, in order, then extracts
/// auth headers/cookies and groups surviving requests by
/// `"domain:path"`.
pub fn parse_har(har: &Har, seed_url: Option<&str>) -> ApiData {
    let mut auth_headers: HashMap<String, String> = HashMap::new();
    let mut cookies: HashMap<String, String> = HashMap::new();
    let mut auth_info: HashMap<String, String> = HashMap::new();
    let mut endpoints: HashMap<String, Vec<ParsedRequest>> = HashMap::new();
    let mut domain_counts: HashMap<String, usize> = HashMap::new();
    let mut seen_domains: HashSet<String> = HashSet::new();
    let mut target_domains: HashSet<String> = HashSet::new();
    let mut refresh_candidate: Option<RefreshConfig> = None;
    let seed_domain = seed_url.and_then(url_domain);

    for entry in &har.log.entries {
        // Rule 2: drop entries with an unparseable request URL.
        let Some(domain) = url_domain(&entry.request.url) else {
            continue;
        };
        let path = url_path(&entry.request.url);
        let path_lower = path.to_lowercase();
        let url_lower = entry.request.url.to_lowercase();
        let method = entry.request.method.to_uppercase();

        // Rule 1: drop static assets by extension/prefix.
        if filters::is_static_asset(&path_lower) {
            continue;
        }
        // Rule 3: drop known third-party/analytics domains.
        if filters::is_skipped_domain(&domain) {
            continue;
        }

        let response_content_type = entry
            .response
            .content
            .as_ref()
            .and_then(|c| c.mime_type.clone());

        // Rule 4: drop HTML navigations (GET + text/html response).
        if method == "GET" {
            if let Some(ct) = &response_content_type {
                if filters::is_html_content_type(ct) {
                    continue;
                }
            }
        }

        // Rule 5: keep only requests that look API-like, except before any
        // target-domain entry has been accepted (bootstrap/grandfather
        // exception per spec §4.2 rule 5) — a domain already accepted, or
        // sharing the seed URL's root domain, is always treated as a target.
        let is_seed_related = seed_domain.as_deref().map(|sd| filters::is_same_root_domain(&domain, sd)).unwrap_or(false);
        let is_target_domain = target_domains.contains(&domain) || is_seed_related;
        let is_api_like = filters::is_api_like(&url_lower, &method, &domain, response_content_type.as_deref());
        if !is_api_like && !target_domains.is_empty() && !is_target_domain {
            continue;
        }

        target_domains.insert(domain.clone());
        seen_domains.insert(domain.clone());
        *domain_counts.entry(domain.clone()).or_insert(0) += 1;

        collect_auth_and_cookies(entry, &mut auth_headers, &mut cookies, &mut auth_info);

        if refresh_candidate.is_none() {
            let request_body = entry.request.post_data.as_ref().and_then(|p| p.text.as_deref());
            let response_body = entry.response.content.as_ref().and_then(|c| c.text.as_deref());
            refresh_candidate = detect_refresh_endpoint(&entry.request.url, &method, request_body, response_body);
        }

        let key = format!("{domain}:{path}");
        endpoints.entry(key).or_default().push(ParsedRequest {
            method,
            url: entry.request.url.clone(),
            path,
            domain,
            status: entry.response.status,
            response_content_type,
            from_spec: false,
        });
    }

    let primary_domain = pick_primary_domain(&domain_counts, seed_url);
    let service = filters::derive_service_name(&primary_domain);
    let scheme = seed_url
        .and_then(|u| Url::parse(u).ok())
        .map(|u| u.scheme().to_string())
        .unwrap_or_else(|| "https".to_string());
    let base_url = if primary_domain.is_empty() {
        String::new()
    } else {
        format!("{scheme}://{primary_domain}")
    };

    let mut base_urls: Vec<String> = seen_domains
        .iter()
        .filter(|d| filters::is_same_root_domain(d, &primary_domain))
        .map(|d| format!("{scheme}://{d}"))
        .collect();
    base_urls.sort();
    base_urls.dedup();

    ApiData {
        service,
        base_url,
        base_urls,
        auth_headers,
        cookies,
        auth_info,
        endpoints,
        header_profile: None,
        csrf_provenance: None,
        generated_auth_info: None,
        refresh_candidate,
    }
}

fn collect_auth_and_cookies(
    entry: &HarEntry,
    auth_headers: &mut HashMap<String, String>,
    cookies: &mut HashMap<String, String>,
    auth_info: &mut HashMap<String, String>,
) {
    for h in &entry.request.headers {
        if filters::is_http2_pseudo_header(&h.name) {
            continue;
        }
        let lower = h.name.to_lowercase();
        if filters::is_auth_like_header(&lower) && !filters::is_standard_header(&lower) {
            auth_headers.insert(h.name.clone(), h.value.clone());
            auth_info.insert(format!("request_header_{lower}"), h.value.clone());
        } else if filters::CONTEXT_HEADER_NAMES.contains(lower.as_str()) {
            auth_info.insert(format!("request_header_{lower}"), h.value.clone());
        }
        // Catch-all: any non-standard `x-` header carries account/tenant
        // context even when it matches neither the auth-pattern matcher nor
        // the small context-name allowlist above.
        if lower.starts_with("x-") && !filters::is_standard_header(&lower) && !h.value.is_empty() {
            auth_info.entry(format!("request_header_{lower}")).or_insert_with(|| h.value.clone());
        }
        if lower == "cookie" {
            for pair in h.value.split(';') {
                if let Some((name, value)) = parse_set_cookie(&format!("{};", pair.trim())) {
                    cookies.insert(name.clone(), value.clone());
                    auth_info.insert(format!("request_cookie_{name}"), value);
                }
            }
        }
    }

    for c in &entry.request.cookies {
        cookies.insert(c.name.clone(), c.value.clone());
    }

    for h in &entry.response.headers {
        let lower = h.name.to_lowercase();
        if lower == "set-cookie" {
            if let Some((name, value)) = parse_set_cookie(&h.value) {
                cookies.insert(name.clone(), value.clone());
                auth_info.insert(format!("response_setcookie_{name}"), value);
            }
        } else if filters::is_auth_like_header(&lower) && !filters::is_standard_header(&lower) {
            auth_info.insert(format!("response_header_{lower}"), h.value.clone());
        }
    }
}

/// Merge endpoint entries discovered separately (e.g. from an OpenAPI
/// document) into an existing `ApiData`'s endpoint map, tagging each
/// with `fromSpec = true` and adding only paths not already present
/// under the same domain — HAR-derived entries always win.
pub fn merge_open_api_endpoints(api_data: &mut ApiData, spec_endpoints: Vec<ParsedRequest>) {
    for mut req in spec_endpoints {
        req.from_spec = true;
        let key = format!("{}:{}", req.domain, req.path);
        if !api_data.endpoints.contains_key(&key) {
            api_data.endpoints.entry(key).or_default().push(req);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wire::{HarContent, HarHeader, HarLog, HarRequest, HarResponse};

    fn entry(method: &str, url: &str, status: i32, content_type: Option<&str>) -> HarEntry {
        HarEntry {
            request: HarRequest {
                method: method.to_string(),
                url: url.to_string(),
                headers: vec![],
                cookies: vec![],
                query_string: vec![],
                post_data: None,
            },
            response: HarResponse {
                status,
                headers: vec![],
                content: content_type.map(|ct| HarContent {
                    mime_type: Some(ct.to_string()),
                    text: None,
                    size: None,
                }),
            },
            time: None,
        }
    }

    #[test]
    fn missing_log_entries_parses_as_an_empty_unknown_api() {
        let har: Har = serde_json::from_str("{}").expect("Har::log and HarLog::entries both default");
        let data = parse_har(&har, None);
        assert_eq!(data.service, "unknown-api");
        assert!(data.endpoints.is_empty());
    }

    #[test]
    fn filters_analytics_html_and_keeps_api_json() {
        let har = Har {
            log: HarLog {
                entries: vec![
                    entry(
                        "GET",
                        "https://www.google-analytics.com/collect?x=1",
                        200,
                        Some("image/gif"),
                    ),
                    entry(
                        "GET",
                        "https://acme.test/dashboard",
                        200,
                        Some("text/html; charset=utf-8"),
                    ),
                    entry(
                        "GET",
                        "https://api.acme.test/v1/users",
                        200,
                        Some("application/json"),
                    ),
                ],
            },
        };

        let data = parse_har(&har, Some("https://api.acme.test/v1/users"));

        assert_eq!(data.endpoints.len(), 1);
        assert!(data.endpoints.contains_key("api.acme.test:/v1/users"));
        assert_eq!(data.service, "acme");
    }

    #[test]
    fn non_api_like_entry_kept_before_any_target_domain_accepted() {
        // No seed URL, and the first entry on the domain doesn't look
        // API-like by itself — it must still be kept (bootstrap exception),
        // since no target-domain entry has been accepted yet.
        let har = Har {
            log: HarLog {
                entries: vec![entry("GET", "https://app.acme.test/dashboard-data", 200, Some("application/octet-stream"))],
            },
        };
        let data = parse_har(&har, None);
        assert_eq!(data.endpoints.len(), 1);
    }

    #[test]
    fn non_api_like_entry_on_an_untrusted_domain_dropped_once_a_target_domain_exists() {
        // First entry establishes "api.acme.test" as a target domain; a
        // later non-API-like entry on an unrelated, never-accepted domain
        // is then dropped instead of grandfathered in.
        let har = Har {
            log: HarLog {
                entries: vec![
                    entry("GET", "https://api.acme.test/v1/users", 200, Some("application/json")),
                    entry("GET", "https://other.example.test/dashboard-data", 200, Some("application/octet-stream")),
                ],
            },
        };
        let data = parse_har(&har, None);
        assert_eq!(data.endpoints.len(), 1);
        assert!(data.endpoints.contains_key("api.acme.test:/v1/users"));
    }

    #[test]
    fn non_standard_x_header_is_caught_into_auth_info() {
        let mut har_entry = entry("GET", "https://api.acme.test/v1/orders", 200, Some("application/json"));
        har_entry.request.headers.push(HarHeader {
            name: "X-Outlet-Id".to_string(),
            value: "outlet-42".to_string(),
        });

        let mut auth_headers = HashMap::new();
        let mut cookies = HashMap::new();
        let mut auth_info = HashMap::new();
        collect_auth_and_cookies(&har_entry, &mut auth_headers, &mut cookies, &mut auth_info);

        assert!(!auth_headers.contains_key("X-Outlet-Id"));
        assert_eq!(auth_info.get("request_header_x-outlet-id").unwrap(), "outlet-42");
    }

    #[test]
    fn parse_har_surfaces_the_first_refresh_candidate() {
        let mut refresh_entry = entry("POST", "https://api.acme.test/oauth/token", 200, Some("application/json"));
        refresh_entry.request.post_data = Some(wire::HarPostData {
            mime_type: Some("application/x-www-form-urlencoded".to_string()),
            text: Some("grant_type=refresh_token&refresh_token=abc".to_string()),
        });
        refresh_entry.response.content = Some(HarContent {
            mime_type: Some("application/json".to_string()),
            text: Some(r#"{"access_token":"xyz","expires_in":3600}"#.to_string()),
            size: None,
        });

        let har = Har {
            log: HarLog {
                entries: vec![entry("GET", "https://api.acme.test/v1/users", 200, Some("application/json")), refresh_entry],
            },
        };
        let data = parse_har(&har, None);
        let refresh = data.refresh_candidate.expect("expected a refresh candidate");
        assert_eq!(refresh.endpoint, "https://api.acme.test/oauth/token");
        assert_eq!(refresh.token_path.as_deref(), Some("access_token"));
    }

    #[test]
    fn set_cookie_split_at_first_equals_not_comma() {
        let parsed = parse_set_cookie("session=abc==; Expires=Wed, 09 Jun 2026 10:18:14 GMT; Path=/");
        assert_eq!(parsed, Some(("session".to_string(), "abc==".to_string())));
    }

    #[test]
    fn auth_header_collected_into_auth_headers_and_info() {
        let mut har_entry = entry("POST", "https://api.acme.test/v1/login", 200, Some("application/json"));
        har_entry.request.headers.push(HarHeader {
            name: "Authorization".to_string(),
            value: "Bearer abc.def.ghi".to_string(),
        });

        let mut auth_headers = HashMap::new();
        let mut cookies = HashMap::new();
        let mut auth_info = HashMap::new();
        collect_auth_and_cookies(&har_entry, &mut auth_headers, &mut cookies, &mut auth_info);

        assert_eq!(auth_headers.get("Authorization").unwrap(), "Bearer abc.def.ghi");
        assert!(auth_info.contains_key("request_header_authorization"));
    }

    #[test]
    fn merge_open_api_endpoints_tags_from_spec() {
        let mut data = ApiData {
            service: "acme".into(),
            base_url: "https://api.acme.test".into(),
            base_urls: vec![],
            auth_headers: HashMap::new(),
            cookies: HashMap::new(),
            auth_info: HashMap::new(),
            endpoints: HashMap::new(),
            header_profile: None,
            csrf_provenance: None,
            generated_auth_info: None,
            refresh_candidate: None,
        };

        merge_open_api_endpoints(
            &mut data,
            vec![ParsedRequest {
                method: "GET".into(),
                url: "https://api.acme.test/v1/orders".into(),
                path: "/v1/orders".into(),
                domain: "api.acme.test".into(),
                status: 0,
                response_content_type: None,
                from_spec: false,
            }],
        );

        let reqs = data.endpoints.get("api.acme.test:/v1/orders").unwrap();
        assert!(reqs[0].from_spec);
    }
}
