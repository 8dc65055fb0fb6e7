//! C6 — Capture Session Materializer.
//!
//! Converts raw HAR entries into normalized, index-stable
//! `CapturedExchange` records that the correlation engine (C7) and
//! request preparer (C9) consume instead of touching HAR wire types
//! directly.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::har::filters;
use crate::har::wire::HarEntry;
use crate::schema::{infer_schema, safe_parse_json, InferredSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    Json,
    Form,
    Text,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestBag {
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub query: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(rename = "bodyRaw", skip_serializing_if = "Option::is_none")]
    pub body_raw: Option<String>,
    #[serde(rename = "bodyFormat")]
    pub body_format: BodyFormat,
    pub method: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseBag {
    pub status: i32,
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(rename = "bodyRaw", skip_serializing_if = "Option::is_none")]
    pub body_raw: Option<String>,
    #[serde(rename = "bodyFormat")]
    pub body_format: BodyFormat,
    /// C1-derived shape of `body`, for display (e.g. `skillforge analyze`'s
    /// summary) without re-running inference downstream.
    #[serde(rename = "bodySchema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<InferredSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedExchange {
    pub index: usize,
    pub request: RequestBag,
    pub response: ResponseBag,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSession {
    pub version: u32,
    #[serde(rename = "capturedAt")]
    pub captured_at: DateTime<Utc>,
    #[serde(rename = "seedUrl", skip_serializing_if = "Option::is_none")]
    pub seed_url: Option<String>,
    pub exchanges: Vec<CapturedExchange>,
}

#[derive(Debug, Clone, Copy)]
pub struct MaterializeOptions {
    pub max_request_body_chars: usize,
    pub max_response_body_chars: usize,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            max_request_body_chars: 100_000,
            max_response_body_chars: 100_000,
        }
    }
}

fn detect_body_format(content_type: Option<&str>) -> BodyFormat {
    let Some(ct) = content_type else { return BodyFormat::Unknown };
    let ct = ct.to_lowercase();
    if ct.contains("application/json") || ct.contains("+json") {
        BodyFormat::Json
    } else if ct.contains("application/x-www-form-urlencoded") {
        BodyFormat::Form
    } else if ct.contains("text/") || ct.contains("xml") {
        BodyFormat::Text
    } else {
        BodyFormat::Unknown
    }
}

fn parse_form_body(text: &str) -> Option<serde_json::Value> {
    let map: HashMap<String, String> = url::form_urlencoded::parse(text.as_bytes())
        .into_owned()
        .collect();
    Some(serde_json::to_value(map).ok()?)
}

fn truncate(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        text.to_string()
    } else {
        text.chars().take(cap).collect()
    }
}

fn header_map(headers: &[crate::har::wire::HarHeader]) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for h in headers {
        if filters::is_http2_pseudo_header(&h.name) {
            continue;
        }
        out.insert(h.name.to_lowercase(), h.value.clone());
    }
    out
}

fn parse_query(url_str: &str, fallback: &[crate::har::wire::HarHeader]) -> HashMap<String, String> {
    match Url::parse(url_str) {
        Ok(url) => url.query_pairs().into_owned().collect(),
        Err(_) => fallback.iter().map(|h| (h.name.clone(), h.value.clone())).collect(),
    }
}

/// Implements spec §4.6's `harEntriesToCapturedExchanges`. The input
/// slice is assumed already time-sorted, matching HAR's natural entry
/// order.
pub fn har_entries_to_captured_exchanges(entries: &[HarEntry], options: MaterializeOptions) -> Vec<CapturedExchange> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let request_content_type = entry.request.post_data.as_ref().and_then(|pd| pd.mime_type.as_deref());
            let request_body_format = detect_body_format(request_content_type);
            let request_raw = entry.request.post_data.as_ref().and_then(|pd| pd.text.as_deref());
            let request_raw_truncated = request_raw.map(|t| truncate(t, options.max_request_body_chars));
            let request_body = match request_body_format {
                BodyFormat::Json => request_raw_truncated.as_deref().and_then(safe_parse_json),
                BodyFormat::Form => request_raw_truncated.as_deref().and_then(parse_form_body),
                _ => None,
            };

            let response_content_type = entry.response.content.as_ref().and_then(|c| c.mime_type.as_deref());
            let response_body_format = detect_body_format(response_content_type);
            let response_raw = entry.response.content.as_ref().and_then(|c| c.text.as_deref());
            let response_raw_truncated = response_raw.map(|t| truncate(t, options.max_response_body_chars));
            let response_body = match response_body_format {
                BodyFormat::Json => response_raw_truncated.as_deref().and_then(safe_parse_json),
                BodyFormat::Form => response_raw_truncated.as_deref().and_then(parse_form_body),
                _ => None,
            };

            let mut request_headers = header_map(&entry.request.headers);
            request_headers.remove("cookie");

            let mut cookies: HashMap<String, String> = entry
                .request
                .cookies
                .iter()
                .map(|c| (c.name.clone(), c.value.clone()))
                .collect();
            if let Some(cookie_header) = entry.request.headers.iter().find(|h| h.name.to_lowercase() == "cookie") {
                for pair in cookie_header.value.split(';') {
                    if let Some((name, value)) = pair.trim().split_once('=') {
                        cookies.entry(name.trim().to_string()).or_insert_with(|| value.trim().to_string());
                    }
                }
            }

            CapturedExchange {
                index,
                request: RequestBag {
                    headers: request_headers,
                    cookies,
                    query: parse_query(&entry.request.url, &entry.request.query_string),
                    body: request_body,
                    body_raw: request_raw_truncated,
                    body_format: request_body_format,
                    method: entry.request.method.clone(),
                    url: entry.request.url.clone(),
                },
                response: ResponseBag {
                    status: entry.response.status,
                    headers: header_map(&entry.response.headers),
                    schema: response_body.as_ref().map(infer_schema),
                    body: response_body,
                    body_raw: response_raw_truncated,
                    body_format: response_body_format,
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::har::wire::{HarContent, HarHeader, HarPostData, HarRequest, HarResponse};

    fn entry_with_body(body: &str, content_type: &str) -> HarEntry {
        HarEntry {
            request: HarRequest {
                method: "POST".to_string(),
                url: "https://api.acme.test/v1/login?redirect=home".to_string(),
                headers: vec![HarHeader {
                    name: "Cookie".to_string(),
                    value: "session=abc; theme=dark".to_string(),
                }],
                cookies: vec![],
                query_string: vec![],
                post_data: Some(HarPostData {
                    mime_type: Some(content_type.to_string()),
                    text: Some(body.to_string()),
                }),
            },
            response: HarResponse {
                status: 200,
                headers: vec![],
                content: Some(HarContent {
                    mime_type: Some("application/json".to_string()),
                    text: Some(r#"{"ok":true}"#.to_string()),
                    size: None,
                }),
            },
            time: None,
        }
    }

    #[test]
    fn json_body_parsed_and_cookie_header_stripped() {
        let entries = vec![entry_with_body(r#"{"a":1}"#, "application/json")];
        let exchanges = har_entries_to_captured_exchanges(&entries, MaterializeOptions::default());
        let ex = &exchanges[0];
        assert_eq!(ex.request.body_format, BodyFormat::Json);
        assert_eq!(ex.request.body, Some(serde_json::json!({"a": 1})));
        assert!(!ex.request.headers.contains_key("cookie"));
        assert_eq!(ex.request.cookies.get("session").unwrap(), "abc");
        assert_eq!(ex.request.query.get("redirect").unwrap(), "home");
    }

    #[test]
    fn response_body_carries_an_inferred_schema() {
        let entries = vec![entry_with_body(r#"{"a":1}"#, "application/json")];
        let exchanges = har_entries_to_captured_exchanges(&entries, MaterializeOptions::default());
        let schema = exchanges[0].response.schema.as_ref().expect("json response body should be schema-inferred");
        assert_eq!(schema.shape.get("ok").map(String::as_str), Some("boolean"));
    }

    #[test]
    fn form_body_parsed_into_map() {
        let entries = vec![entry_with_body("a=1&b=two", "application/x-www-form-urlencoded")];
        let exchanges = har_entries_to_captured_exchanges(&entries, MaterializeOptions::default());
        let body = exchanges[0].request.body.as_ref().unwrap();
        assert_eq!(body.get("a").unwrap(), "1");
        assert_eq!(body.get("b").unwrap(), "two");
    }

    #[test]
    fn body_exceeding_cap_is_truncated() {
        let big = "x".repeat(10);
        let entries = vec![entry_with_body(&big, "text/plain")];
        let opts = MaterializeOptions {
            max_request_body_chars: 5,
            max_response_body_chars: 100_000,
        };
        let exchanges = har_entries_to_captured_exchanges(&entries, opts);
        assert_eq!(exchanges[0].request.body_raw.as_deref().unwrap().len(), 5);
    }

    #[test]
    fn exact_cap_is_not_truncated() {
        let exact = "x".repeat(5);
        let entries = vec![entry_with_body(&exact, "text/plain")];
        let opts = MaterializeOptions {
            max_request_body_chars: 5,
            max_response_body_chars: 100_000,
        };
        let exchanges = har_entries_to_captured_exchanges(&entries, opts);
        assert_eq!(exchanges[0].request.body_raw.as_deref().unwrap().len(), 5);
    }
}
