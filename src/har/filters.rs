//! Static classification tables for HAR ingestion (spec §4.2) and the auth
//! header allowlist shared with C3/C4. Lifted, name for name, from the
//! original `unbrowse` native module (`native-src-lib.rs`) in the
//! retrieval pack's `other_examples/`.

use once_cell::sync::Lazy;
use std::collections::HashSet;

pub static STATIC_EXTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".woff", ".woff2", ".ico", ".map",
    ]
});

pub static SKIP_PATHS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "/cdn-cgi/",
        "/_next/data/",
        "/__nextjs",
        "/sockjs-node/",
        "/favicon",
        "/manifest.json",
        "/robots.txt",
        "/sitemap",
    ]
});

pub static SKIP_DOMAINS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        // Analytics & tracking
        "google-analytics.com",
        "analytics.google.com",
        "mixpanel.com",
        "api-js.mixpanel.com",
        "mparticle.com",
        "jssdks.mparticle.com",
        "segment.io",
        "segment.com",
        "cdn.segment.com",
        "api.segment.io",
        "amplitude.com",
        "api.amplitude.com",
        "heap.io",
        "heapanalytics.com",
        "posthog.com",
        "i.posthog.com",
        "plausible.io",
        "matomo.org",
        // Ads & attribution
        "doubleclick.net",
        "googletagmanager.com",
        "googlesyndication.com",
        "facebook.com",
        "instagram.com",
        "connect.facebook.net",
        "appsflyer.com",
        "intentiq.com",
        "id5-sync.com",
        "33across.com",
        "btloader.com",
        "hbwrapper.com",
        // Payments
        "stripe.com",
        "js.stripe.com",
        "r.stripe.com",
        "m.stripe.com",
        // Support & engagement
        "intercom.io",
        "api-iam.intercom.io",
        // UX & monitoring
        "hotjar.com",
        "clarity.ms",
        "sentry.io",
        // CDNs
        "cdn.jsdelivr.net",
        "unpkg.com",
        "cdnjs.cloudflare.com",
        // Consent
        "onetrust.com",
        "cookielaw.org",
        "cdn.cookielaw.org",
        // Third-party SSO
        "accounts.google.com",
        "stack-auth.com",
        "api.stack-auth.com",
        // Google services
        "www.googletagmanager.com",
        "www.google.com",
        "fonts.googleapis.com",
        "fonts.gstatic.com",
        "maps.googleapis.com",
        "www.gstatic.com",
        "apis.google.com",
        "pagead2.googlesyndication.com",
        "adservice.google.com",
        // Facebook/Meta
        "graph.facebook.com",
        "www.facebook.com",
        // Twitter
        "platform.twitter.com",
        "syndication.twitter.com",
        // Other common third-party
        "newrelic.com",
        "nr-data.net",
        "fullstory.com",
        "rs.fullstory.com",
        "launchdarkly.com",
        "app.launchdarkly.com",
        "datadoghq.com",
        "browser-intake-datadoghq.com",
        "bugsnag.com",
        "sessions.bugsnag.com",
    ]
});

/// Exact-match header names considered auth carriers.
pub static AUTH_HEADER_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "authorization",
        "x-api-key",
        "api-key",
        "apikey",
        "x-auth-token",
        "access-token",
        "x-access-token",
        "token",
        "x-token",
        "authtype",
        "mudra",
        "bearer",
        "jwt",
        "x-jwt",
        "x-jwt-token",
        "id-token",
        "id_token",
        "x-id-token",
        "refresh-token",
        "x-refresh-token",
        "x-apikey",
        "x-key",
        "key",
        "secret",
        "x-secret",
        "api-secret",
        "x-api-secret",
        "client-secret",
        "x-client-secret",
        "session",
        "session-id",
        "sessionid",
        "x-session",
        "x-session-id",
        "x-session-token",
        "session-token",
        "csrf",
        "x-csrf",
        "x-csrf-token",
        "csrf-token",
        "x-xsrf-token",
        "xsrf-token",
        "x-oauth-token",
        "oauth-token",
        "x-oauth",
        "oauth",
        "x-amz-security-token",
        "x-amz-access-token",
        "x-goog-api-key",
        "x-rapidapi-key",
        "ocp-apim-subscription-key",
        "x-functions-key",
        "x-auth",
        "x-authentication",
        "x-authorization",
        "x-user-token",
        "x-app-token",
        "x-client-token",
        "x-access-key",
        "x-secret-key",
        "x-signature",
        "x-request-signature",
        "signature",
    ]
    .iter()
    .copied()
    .collect()
});

/// Substring patterns that also mark a header as auth-like even when its
/// name isn't in `AUTH_HEADER_NAMES` verbatim.
pub static AUTH_HEADER_PATTERNS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "auth", "token", "key", "secret", "bearer", "jwt", "session", "credential", "password",
        "signature", "sign", "api-", "apikey", "access", "oauth", "csrf", "xsrf",
    ]
});

/// Standard browser/proxy headers that begin with `x-` but are never
/// application-specific auth.
pub static STANDARD_HEADERS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "x-requested-with",
        "x-forwarded-for",
        "x-forwarded-host",
        "x-forwarded-proto",
        "x-real-ip",
        "x-frame-options",
        "x-content-type-options",
        "x-xss-protection",
        "x-ua-compatible",
        "x-dns-prefetch-control",
        "x-download-options",
        "x-permitted-cross-domain-policies",
        "x-powered-by",
        "x-request-id",
        "x-correlation-id",
        "x-trace-id",
    ]
    .iter()
    .copied()
    .collect()
});

/// Headers recorded into `auth_info` (and later `HeaderProfile::context`)
/// regardless of the `x-` prefix rule, because they carry account/tenant
/// context rather than a bearer secret.
pub static CONTEXT_HEADER_NAMES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["outletid", "userid", "supplierid", "companyid"].iter().copied().collect());

pub fn is_http2_pseudo_header(name: &str) -> bool {
    name.starts_with(':')
}

pub fn is_auth_like_header(name: &str) -> bool {
    let lower = name.to_lowercase();
    if AUTH_HEADER_NAMES.contains(lower.as_str()) {
        return true;
    }
    AUTH_HEADER_PATTERNS.iter().any(|p| lower.contains(p))
}

pub fn is_standard_header(name: &str) -> bool {
    STANDARD_HEADERS.contains(name.to_lowercase().as_str())
}

pub fn is_static_asset(path_lower: &str) -> bool {
    STATIC_EXTS.iter().any(|ext| path_lower.ends_with(ext))
        || SKIP_PATHS.iter().any(|prefix| path_lower.starts_with(prefix))
}

pub fn is_skipped_domain(domain: &str) -> bool {
    SKIP_DOMAINS.iter().any(|skip| domain.contains(skip))
}

pub fn is_html_content_type(content_type: &str) -> bool {
    let ct = content_type.to_lowercase();
    ct.contains("text/html") || ct.contains("application/xhtml")
}

pub fn is_api_like(url_lower: &str, method: &str, domain: &str, content_type: Option<&str>) -> bool {
    if let Some(ct) = content_type {
        let ct = ct.to_lowercase();
        if ct.contains("application/json") || ct.contains("+json") || ct.contains("text/json") {
            return true;
        }
    }

    url_lower.contains("/api/")
        || url_lower.contains("/services/")
        || url_lower.contains("/v1/")
        || url_lower.contains("/v2/")
        || url_lower.contains("/v3/")
        || url_lower.contains("/graphql")
        || matches!(method, "POST" | "PUT" | "DELETE" | "PATCH")
        || domain.starts_with("api.")
        || domain.contains("api.")
}

fn root_domain(domain: &str) -> String {
    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() >= 2 {
        parts[parts.len() - 2..].join(".")
    } else {
        domain.to_string()
    }
}

pub fn is_same_root_domain(a: &str, b: &str) -> bool {
    root_domain(a) == root_domain(b)
}

/// Strip leading `www.`/`api.`/version prefixes and trailing TLD-like
/// suffixes, lowercase, replace `.` with `-`. Mirrors
/// `native-src-lib.rs::derive_service_name`.
pub fn derive_service_name(domain: &str) -> String {
    static VERSION_PREFIX: Lazy<regex::Regex> = Lazy::new(|| regex::Regex::new(r"^v\d+\.").unwrap());
    static SERV_PREFIX: Lazy<regex::Regex> = Lazy::new(|| regex::Regex::new(r"^[a-z0-9]*serv\.").unwrap());
    static TLD_SUFFIX: Lazy<regex::Regex> =
        Lazy::new(|| regex::Regex::new(r"\.(com|org|net|co|io|ai|app|sg|dev|xyz)\.?$").unwrap());

    let name = domain.trim_start_matches("www.").trim_start_matches("api.");
    let name = VERSION_PREFIX.replace(name, "");
    let name = SERV_PREFIX.replace(&name, "");
    let name = TLD_SUFFIX.replace(&name, "");
    let name = name.replace('.', "-").to_lowercase();

    if name.is_empty() {
        "unknown-api".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_asset_by_extension() {
        assert!(is_static_asset("/assets/app.js"));
        assert!(is_static_asset("/favicon.ico"));
        assert!(!is_static_asset("/api/v1/users"));
    }

    #[test]
    fn skip_path_prefix() {
        assert!(is_static_asset("/_next/data/build/page.json"));
    }

    #[test]
    fn skipped_domain_by_substring() {
        assert!(is_skipped_domain("www.google-analytics.com"));
        assert!(!is_skipped_domain("api.acme.test"));
    }

    #[test]
    fn service_name_strips_prefix_and_tld() {
        assert_eq!(derive_service_name("api.acme.com"), "acme");
        assert_eq!(derive_service_name("www.foo-bar.io"), "foo-bar");
    }

    #[test]
    fn auth_header_allowlist_and_pattern() {
        assert!(is_auth_like_header("Authorization"));
        assert!(is_auth_like_header("x-custom-apikey"));
        assert!(!is_auth_like_header("accept-language"));
    }

    #[test]
    fn standard_x_headers_are_not_custom_auth() {
        assert!(is_standard_header("X-Request-Id"));
        assert!(!is_standard_header("x-tenant-token"));
    }
}
