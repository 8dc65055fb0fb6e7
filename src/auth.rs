//! C4 — Auth Extractor.
//!
//! Ranks candidate auth schemes across headers and cookies, and
//! assembles a structured `AuthInfo` report. Clause order for
//! `guess_auth_method` is pinned against `native-src-lib.rs::guess_auth_method`
//! in the retrieval pack's `other_examples/`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::har::ApiData;

/// Token-refresh exchange, synthesized when a refresh-like endpoint is
/// observed in the capture (supplemented feature, see SPEC_FULL.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    pub endpoint: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<HashMap<String, String>>,
    #[serde(rename = "tokenPath", skip_serializing_if = "Option::is_none")]
    pub token_path: Option<String>,
    #[serde(rename = "expiresIn", skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthInfo {
    pub service: String,
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    #[serde(rename = "authMethod")]
    pub auth_method: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<HashMap<String, String>>,
    #[serde(rename = "mudraToken", skip_serializing_if = "Option::is_none")]
    pub mudra_token: Option<String>,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "outletIds", skip_serializing_if = "Option::is_none")]
    pub outlet_ids: Option<Vec<String>>,
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<RefreshConfig>,
}

/// Service/baseUrl/authMethod only — safe to hand outside the trust
/// boundary (e.g. to a skill marketplace listing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishableAuthInfo {
    pub service: String,
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    #[serde(rename = "authMethod")]
    pub auth_method: String,
}

impl AuthInfo {
    pub fn publishable(&self) -> PublishableAuthInfo {
        PublishableAuthInfo {
            service: self.service.clone(),
            base_url: self.base_url.clone(),
            auth_method: self.auth_method.clone(),
        }
    }
}

fn header_name_contains(headers: &HashMap<String, String>, needle: &str) -> Option<String> {
    headers
        .keys()
        .find(|name| name.to_lowercase().contains(needle))
        .cloned()
}

fn cookie_exact_match(cookies: &HashMap<String, String>, names: &[&str]) -> Option<String> {
    cookies
        .keys()
        .find(|name| names.contains(&name.to_lowercase().as_str()))
        .cloned()
}

fn cookie_name_contains(cookies: &HashMap<String, String>, needle: &str) -> Option<String> {
    cookies
        .keys()
        .find(|name| name.to_lowercase().contains(needle))
        .cloned()
}

/// First matching clause wins (spec §4.4, 13 clauses, checked in order).
pub fn guess_auth_method(auth_headers: &HashMap<String, String>, cookies: &HashMap<String, String>) -> String {
    // 1. Bearer scheme in any header value.
    if auth_headers.values().any(|v| v.to_lowercase().starts_with("bearer ")) {
        return "Bearer Token".to_string();
    }

    // 2. API key-ish header name.
    if let Some(name) = auth_headers.keys().find(|n| {
        let lower = n.to_lowercase();
        lower == "x-api-key" || lower == "api-key" || lower == "apikey" || lower == "x-key" || lower == "key"
    }) {
        return format!("API Key ({name})");
    }

    // 3. JWT / id-token header name.
    if let Some(name) = auth_headers.keys().find(|n| {
        let lower = n.to_lowercase();
        lower.contains("jwt") || lower == "id-token" || lower == "id_token" || lower.contains("id-token") || lower.contains("id_token")
    }) {
        return format!("JWT ({name})");
    }

    // 4. authorization header present: inspect scheme.
    if let Some((name, value)) = auth_headers.iter().find(|(n, _)| n.to_lowercase() == "authorization") {
        let lower = value.to_lowercase();
        if lower.starts_with("basic ") {
            return "Basic Auth".to_string();
        }
        if lower.starts_with("digest ") {
            return "Digest Auth".to_string();
        }
        let _ = name;
        return "Authorization Header".to_string();
    }

    // 5. session/csrf/xsrf in header name.
    if let Some(name) = auth_headers.keys().find(|n| {
        let lower = n.to_lowercase();
        lower.contains("session") || lower.contains("csrf") || lower.contains("xsrf")
    }) {
        return format!("Session Token ({name})");
    }

    // 6. amz in header name.
    if header_name_contains(auth_headers, "amz").is_some() {
        return "AWS Signature".to_string();
    }

    // 7. exact `mudra` header.
    if auth_headers.keys().any(|n| n.to_lowercase() == "mudra") {
        return "Mudra Token".to_string();
    }

    // 8. oauth in header name.
    if let Some(name) = header_name_contains(auth_headers, "oauth") {
        return format!("OAuth ({name})");
    }

    // 9. auth or token in header name.
    if let Some(name) = auth_headers.keys().find(|n| {
        let lower = n.to_lowercase();
        lower.contains("auth") || lower.contains("token")
    }) {
        return format!("Custom Token ({name})");
    }

    // 10. any custom x-* header.
    if let Some(name) = auth_headers.keys().find(|n| n.to_lowercase().starts_with("x-")) {
        return format!("Custom Header ({name})");
    }

    // 11. cookie exact-name match.
    const EXACT_COOKIE_NAMES: &[&str] = &[
        "session",
        "sessionid",
        "token",
        "authtoken",
        "jwt",
        "auth",
        "access_token",
        "id_token",
        "refresh_token",
    ];
    if let Some(name) = cookie_exact_match(cookies, EXACT_COOKIE_NAMES) {
        return format!("Cookie-based ({name})");
    }

    // 12. cookie name pattern.
    if let Some(name) = cookies.keys().find(|n| {
        let lower = n.to_lowercase();
        lower.contains("auth")
            || lower.contains("token")
            || lower.contains("session")
            || lower.contains("access")
            || lower.contains("jwt")
            || lower.contains("id_token")
    }) {
        return format!("Cookie-based ({name})");
    }

    // 13. otherwise.
    "Unknown (may need login)".to_string()
}

const CONTEXT_PATTERNS: &[&str] = &[
    "outletid",
    "userid",
    "supplierid",
    "companyid",
    "tenantid",
    "organizationid",
    "accountid",
    "workspaceid",
    "projectid",
];

const AUTH_COOKIE_PATTERNS: &[&str] = &["session", "token", "auth", "jwt", "access", "refresh", "csrf", "xsrf", "sid", "id_token"];

/// Refresh-exchange detection, supplemented from the upstream project's
/// `detect_refresh_endpoint`: URL-pattern or `grant_type=refresh_token`
/// body signals a token-refresh endpoint.
pub fn detect_refresh_endpoint(
    url: &str,
    method: &str,
    request_body: Option<&str>,
    response_body: Option<&str>,
) -> Option<RefreshConfig> {
    const REFRESH_URL_PATTERNS: &[&str] = &[
        "/oauth/token",
        "/oauth2/v1/token",
        "/oauth2/v2/token",
        "/oauth2/v3/token",
        "/oauth2/v4/token",
        "/auth/refresh",
        "/auth/token/refresh",
        "/token/refresh",
        "/refresh",
        "/api/auth/refresh",
        "/api/token/refresh",
        "/securetoken.googleapis.com",
        "/v1/token",
        "/v2/token",
    ];

    let url_lower = url.to_lowercase();
    let is_refresh_url = REFRESH_URL_PATTERNS.iter().any(|p| url_lower.contains(p));

    let has_refresh_grant = request_body.map_or(false, |body| {
        let lower = body.to_lowercase();
        lower.contains("grant_type=refresh_token") || lower.contains("\"grant_type\":\"refresh_token\"") || lower.contains("refresh_token=")
    });

    if !is_refresh_url && !has_refresh_grant {
        return None;
    }

    let (token_path, expires_in) = match response_body.and_then(|b| serde_json::from_str::<serde_json::Value>(b).ok()) {
        Some(json) => {
            let token_path = if json.get("access_token").is_some() {
                Some("access_token".to_string())
            } else if json.get("token").is_some() {
                Some("token".to_string())
            } else if json.get("id_token").is_some() {
                Some("id_token".to_string())
            } else {
                None
            };
            let expires_in = json
                .get("expires_in")
                .and_then(|v| v.as_i64())
                .or_else(|| json.get("expiresIn").and_then(|v| v.as_i64()));
            (token_path, expires_in)
        }
        None => (None, None),
    };

    let body_template = request_body.and_then(|body| {
        if body.contains('=') && !body.starts_with('{') {
            let mut params = HashMap::new();
            for pair in body.split('&') {
                if let Some((key, value)) = pair.split_once('=') {
                    let masked = if key.to_lowercase().contains("token") {
                        "${refreshToken}".to_string()
                    } else {
                        value.to_string()
                    };
                    params.insert(key.to_string(), masked);
                }
            }
            Some(params)
        } else {
            None
        }
    });

    Some(RefreshConfig {
        endpoint: url.to_string(),
        method: method.to_string(),
        body: body_template,
        token_path,
        expires_in,
    })
}

/// Assemble the full `AuthInfo` report for a service (spec §4.4
/// `generateAuthInfo`).
pub fn generate_auth_info(service: &str, api_data: &ApiData, now: DateTime<Utc>) -> AuthInfo {
    let auth_method = guess_auth_method(&api_data.auth_headers, &api_data.cookies);

    let mut headers = HashMap::new();
    let mut context: HashMap<String, String> = HashMap::new();

    for (key, value) in &api_data.auth_headers {
        let lower = key.to_lowercase();
        if CONTEXT_PATTERNS.iter().any(|p| lower.contains(p)) {
            context.insert(key.clone(), value.clone());
        } else {
            headers.insert(key.clone(), value.clone());
        }
    }

    for (key, value) in &api_data.auth_info {
        if let Some(header_name) = key.strip_prefix("request_header_") {
            let lower = header_name.to_lowercase();
            if CONTEXT_PATTERNS.iter().any(|p| lower.contains(p)) {
                context.entry(header_name.to_string()).or_insert_with(|| value.clone());
            }
        }
    }

    let mudra_token = api_data
        .auth_headers
        .get("mudra")
        .or_else(|| api_data.auth_headers.get("Mudra"))
        .cloned();
    let user_id = mudra_token
        .as_ref()
        .and_then(|m| m.find("--").map(|pos| m[..pos].to_string()));

    let outlet_ids = api_data
        .auth_info
        .get("request_header_outletid")
        .map(|v| v.split(',').map(|s| s.trim().to_string()).collect::<Vec<_>>());

    let filtered_cookies: HashMap<String, String> = api_data
        .cookies
        .iter()
        .filter(|(name, _)| {
            let lower = name.to_lowercase();
            AUTH_COOKIE_PATTERNS.iter().any(|p| lower.contains(p))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut notes = Vec::new();
    if !headers.is_empty() {
        notes.push(format!("{} auth header(s) captured", headers.len()));
    }
    if !filtered_cookies.is_empty() {
        notes.push(format!("{} auth cookie(s) captured", filtered_cookies.len()));
    }
    if user_id.is_some() {
        notes.push("mudra token carries an embedded userId".to_string());
    }

    AuthInfo {
        service: service.to_string(),
        base_url: api_data.base_url.clone(),
        auth_method,
        timestamp: now,
        headers: if headers.is_empty() { None } else { Some(headers) },
        cookies: if filtered_cookies.is_empty() { None } else { Some(filtered_cookies) },
        mudra_token,
        user_id,
        outlet_ids,
        notes,
        refresh: api_data.refresh_candidate.clone(),
    }
}
