//! C12 — Pipeline Orchestrator.
//!
//! Composition only, no state of its own: wires C1-C10 together so
//! callers never have to hand-assemble the HAR → ApiData →
//! CorrelationGraph → replay pipeline themselves.

use crate::auth::generate_auth_info;
use crate::chain::plan_chain_for_target;
use crate::clock::Clock;
use crate::correlation::{infer_correlation_graph_v1, CorrelationGraph};
use crate::error::Result as PipelineResult;
use crate::executor::{execute_chain_for_target, ExecutionResult, Transport};
use crate::har::{malformed_capture_fallback, parse_har, ApiData};
use crate::har::wire::Har;
use crate::headers::{build_domain_profile, DomainProfile, HeaderProfile};
use crate::session::{har_entries_to_captured_exchanges, MaterializeOptions};
use std::collections::HashMap;

/// HAR + optional seed URL ⟶ `ApiData` + `CorrelationGraph`.
///
/// Runs C2 (filter + auth extract), C3 (header profile), C4 (auth
/// info), and in parallel C6 + C7 (captured exchanges + correlation
/// graph), matching the data flow diagram in spec §2.
pub fn build_api_data_and_graph(har: &Har, seed_url: Option<&str>, clock: &dyn Clock) -> (ApiData, CorrelationGraph) {
    let now = clock.now();
    let mut api_data = parse_har(har, seed_url);

    let mut requests_by_domain: HashMap<String, Vec<Vec<(String, String)>>> = HashMap::new();
    for entry in &har.log.entries {
        if let Ok(url) = url::Url::parse(&entry.request.url) {
            if let Some(domain) = url.host_str() {
                let headers = entry.request.headers.iter().map(|h| (h.name.clone(), h.value.clone())).collect();
                requests_by_domain.entry(domain.to_string()).or_default().push(headers);
            }
        }
    }

    let mut domains = HashMap::new();
    for (domain, requests) in &requests_by_domain {
        domains.insert(domain.clone(), build_domain_profile(requests, now));
    }
    api_data.header_profile = Some(HeaderProfile {
        domains,
        endpoint_overrides: HashMap::new(),
    });

    let generated_auth = generate_auth_info(&api_data.service, &api_data, now);
    api_data.generated_auth_info = Some(generated_auth);

    let exchanges = har_entries_to_captured_exchanges(&har.log.entries, MaterializeOptions::default());
    let graph = infer_correlation_graph_v1(&exchanges, now);

    (api_data, graph)
}

/// HAR text ⟶ `ApiData` + `CorrelationGraph`, tolerating a capture whose
/// JSON never deserializes into [`Har`] at all (spec §7
/// `MalformedCapture`): callers get the degraded `ApiData` back instead
/// of a hard failure, paired with an empty graph.
pub fn build_api_data_and_graph_from_text(text: &str, seed_url: Option<&str>, clock: &dyn Clock) -> (ApiData, CorrelationGraph) {
    match serde_json::from_str::<Har>(text) {
        Ok(har) => build_api_data_and_graph(&har, seed_url, clock),
        Err(e) => {
            tracing::warn!(error = %e, "HAR capture could not be parsed; falling back to a degraded ApiData");
            let graph = CorrelationGraph {
                version: 1,
                generated_at: clock.now(),
                requests: Vec::new(),
                links: Vec::new(),
                entry_points: Vec::new(),
                chains: Vec::new(),
            };
            (malformed_capture_fallback(), graph)
        }
    }
}

/// Look up one domain's profile without re-deriving the whole
/// `HeaderProfile`.
pub fn domain_profile<'a>(profile: &'a HeaderProfile, domain: &str) -> Option<&'a DomainProfile> {
    profile.domains.get(domain)
}

/// (target, ApiData-derived exchanges/graph, transport) ⟶ executed
/// chain. `api_data` itself carries no exchange list (that lives in the
/// caller's `CaptureSession`); callers materialize exchanges once via
/// C6 and reuse them across replays.
pub async fn replay_target(
    exchanges: &[crate::session::CapturedExchange],
    graph: &CorrelationGraph,
    target_index: usize,
    transport: &dyn Transport,
) -> PipelineResult<ExecutionResult> {
    execute_chain_for_target(exchanges, graph, target_index, transport, None, None, None).await
}

/// Convenience wrapper exposing C8 directly, for callers that only
/// want the prerequisite plan without executing it.
pub fn plan_for_target(graph: &CorrelationGraph, target_index: usize) -> PipelineResult<Vec<usize>> {
    plan_chain_for_target(graph, target_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::executor::MockTransport;
    use crate::har::wire::{HarContent, HarEntry, HarHeader, HarLog, HarRequest, HarResponse};
    use crate::executor::TransportResult;
    use chrono::Utc;

    fn har_fixture() -> Har {
        Har {
            log: HarLog {
                entries: vec![
                    HarEntry {
                        request: HarRequest {
                            method: "GET".to_string(),
                            url: "https://api.acme.test/v1/start".to_string(),
                            headers: vec![],
                            cookies: vec![],
                            query_string: vec![],
                            post_data: None,
                        },
                        response: HarResponse {
                            status: 200,
                            headers: vec![],
                            content: Some(HarContent {
                                mime_type: Some("application/json".to_string()),
                                text: Some(r#"{"csrfToken":"abc1234567"}"#.to_string()),
                                size: None,
                            }),
                        },
                        time: None,
                    },
                    HarEntry {
                        request: HarRequest {
                            method: "POST".to_string(),
                            url: "https://api.acme.test/v1/submit".to_string(),
                            headers: vec![HarHeader {
                                name: "X-CSRF-Token".to_string(),
                                value: "abc1234567".to_string(),
                            }],
                            cookies: vec![],
                            query_string: vec![],
                            post_data: None,
                        },
                        response: HarResponse {
                            status: 201,
                            headers: vec![],
                            content: None,
                        },
                        time: None,
                    },
                ],
            },
        }
    }

    #[test]
    fn builds_api_data_and_graph_together() {
        let clock = FixedClock(Utc::now());
        let (api_data, graph) = build_api_data_and_graph(&har_fixture(), Some("https://api.acme.test/v1/start"), &clock);
        assert_eq!(api_data.service, "acme");
        assert_eq!(graph.links.len(), 1);
        assert!(api_data.generated_auth_info.is_some());
        assert!(api_data.header_profile.is_some());
    }

    #[test]
    fn malformed_har_text_degrades_instead_of_panicking() {
        let clock = FixedClock(Utc::now());
        let (api_data, graph) = build_api_data_and_graph_from_text("not a har capture", None, &clock);
        assert_eq!(api_data.service, "unknown-api");
        assert!(api_data.endpoints.is_empty());
        assert!(graph.links.is_empty());
    }

    #[tokio::test]
    async fn replay_target_drives_planned_chain_through_transport() {
        let clock = FixedClock(Utc::now());
        let (_, graph) = build_api_data_and_graph(&har_fixture(), None, &clock);
        let exchanges = har_entries_to_captured_exchanges(&har_fixture().log.entries, MaterializeOptions::default());

        let transport = MockTransport::new();
        transport.stub(
            "GET",
            "https://api.acme.test/v1/start",
            TransportResult {
                status: 200,
                headers: HashMap::new(),
                body_text: r#"{"csrfToken":"NEW"}"#.to_string(),
                content_type: Some("application/json".to_string()),
            },
        );
        transport.stub(
            "POST",
            "https://api.acme.test/v1/submit",
            TransportResult {
                status: 201,
                headers: HashMap::new(),
                body_text: r#"{"ok":true}"#.to_string(),
                content_type: Some("application/json".to_string()),
            },
        );

        let result = replay_target(&exchanges, &graph, 1, &transport).await.unwrap();
        assert_eq!(result.chain, vec![0, 1]);
        assert_eq!(result.final_result.unwrap().status, 201);
    }

    #[test]
    fn plan_for_target_surfaces_an_invariant_violation() {
        let clock = FixedClock(Utc::now());
        let (_, graph) = build_api_data_and_graph(&har_fixture(), None, &clock);
        let err = plan_for_target(&graph, 999).unwrap_err();
        assert!(matches!(err, crate::error::PipelineError::InvariantViolation(999)));
    }
}
