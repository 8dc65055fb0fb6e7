//! C8 — Chain Planner.
//!
//! Given a target exchange index, computes backward reachability
//! through the correlation graph's link set and returns the
//! prerequisite steps in ascending index order, target included.

use std::collections::BTreeSet;

use crate::correlation::CorrelationGraph;
use crate::error::{PipelineError, Result};

/// Implements spec §4.8's `planChainForTarget`: start with `{target}`,
/// repeatedly add the source of any link whose target is already in the
/// set, until a fixed point is reached.
///
/// `target_index` must name a request the correlation graph actually
/// knows about; an out-of-range target is a hard
/// [`PipelineError::InvariantViolation`], not a recoverable kind — a
/// caller can't plan a chain for a request that was never captured.
/// Graphs that don't populate `requests` (a handful of these module's
/// own fixtures) skip the check, since they have no request set to
/// validate against.
pub fn plan_chain_for_target(graph: &CorrelationGraph, target_index: usize) -> Result<Vec<usize>> {
    if !graph.requests.is_empty() && !graph.requests.iter().any(|r| r.index == target_index) {
        return Err(PipelineError::InvariantViolation(target_index));
    }

    let mut plan: BTreeSet<usize> = BTreeSet::from([target_index]);

    loop {
        let mut grew = false;
        for link in &graph.links {
            if plan.contains(&link.target_request_index) && plan.insert(link.source_request_index) {
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }

    Ok(plan.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::{CorrelationLink, RequestSummary, ValueLocation};
    use crate::schema::ValueType;
    use chrono::Utc;

    fn link(source: usize, target: usize) -> CorrelationLink {
        CorrelationLink {
            source_request_index: source,
            source_path: "p".to_string(),
            source_location: ValueLocation::Body,
            target_request_index: target,
            target_path: "p".to_string(),
            target_location: ValueLocation::Header,
            value_hash: "h".to_string(),
            value_preview: "len:1".to_string(),
            value_type: ValueType::Unknown,
        }
    }

    fn graph(links: Vec<CorrelationLink>, n: usize) -> CorrelationGraph {
        CorrelationGraph {
            version: 1,
            generated_at: Utc::now(),
            requests: (0..n)
                .map(|i| RequestSummary {
                    index: i,
                    method: "GET".to_string(),
                    url: String::new(),
                    status: 200,
                })
                .collect(),
            links,
            entry_points: vec![],
            chains: vec![],
        }
    }

    #[test]
    fn transitive_chain_closes_to_fixed_point() {
        let g = graph(vec![link(0, 1), link(1, 2)], 3);
        assert_eq!(plan_chain_for_target(&g, 2).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn isolated_target_plans_to_itself() {
        let g = graph(vec![], 1);
        assert_eq!(plan_chain_for_target(&g, 0).unwrap(), vec![0]);
    }

    #[test]
    fn plan_is_sorted_and_contains_target() {
        let g = graph(vec![link(3, 5), link(1, 3)], 6);
        let plan = plan_chain_for_target(&g, 5).unwrap();
        assert_eq!(plan, vec![1, 3, 5]);
        assert!(plan.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn target_index_outside_the_request_set_is_an_invariant_violation() {
        let g = graph(vec![], 3);
        let err = plan_chain_for_target(&g, 99).unwrap_err();
        assert!(matches!(err, crate::error::PipelineError::InvariantViolation(99)));
    }
}
