//! Blocking of transitive dependents.

use std::collections::{HashSet, VecDeque};

use crate::metrics::{NodeOutcome, RunMetrics};
use crate::models::Plan;

/// Block every transitive dependent of `node_id` that is not blocked yet.
///
/// Each newly blocked node gets a `blocked` outcome (zero attempts, zero
/// duration) in `metrics`. Traversal is breadth-first over an explicit
/// queue, so graph depth is not limited by the call stack. Nodes already in
/// `blocked` are neither re-recorded nor traversed again, which makes the
/// call idempotent across a run.
///
/// Returns the newly blocked ids in traversal order.
pub fn block_dependents(
    node_id: &str,
    plan: &Plan,
    blocked: &mut HashSet<String>,
    metrics: &mut RunMetrics,
) -> Vec<String> {
    let mut newly_blocked = Vec::new();
    let mut queue: VecDeque<&str> = plan
        .dependents_of(node_id)
        .iter()
        .map(String::as_str)
        .collect();

    while let Some(id) = queue.pop_front() {
        if !blocked.insert(id.to_owned()) {
            continue;
        }
        metrics.record(id, NodeOutcome::blocked());
        newly_blocked.push(id.to_owned());
        queue.extend(plan.dependents_of(id).iter().map(String::as_str));
    }

    newly_blocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::build_plan;
    use crate::metrics::NodeStatus;
    use crate::models::NodeSpec;

    fn node(id: &str, deps: &[&str]) -> NodeSpec {
        let mut spec = NodeSpec::new(id);
        spec.depends_on = deps.iter().map(|d| d.to_string()).collect();
        spec
    }

    #[test]
    fn blocks_transitive_dependents_once() {
        //   a
        //  / \
        // b   c   x
        //  \ /
        //   d
        let specs = vec![
            node("a", &[]),
            node("b", &["a"]),
            node("c", &["a"]),
            node("d", &["b", "c"]),
            node("x", &[]),
        ];
        let plan = build_plan(&specs).unwrap();
        let mut blocked = HashSet::new();
        let mut metrics = RunMetrics::new(specs.len());

        let newly = block_dependents("a", &plan, &mut blocked, &mut metrics);

        assert_eq!(newly, vec!["b", "c", "d"]);
        assert_eq!(metrics.blocked, 3);
        assert_eq!(metrics.status("d"), Some(NodeStatus::Blocked));
        assert_eq!(metrics.status("x"), None);
        assert_eq!(metrics.status("a"), None);
    }

    #[test]
    fn repeated_propagation_is_a_no_op() {
        let specs = vec![node("a", &[]), node("b", &["a"]), node("c", &["b"])];
        let plan = build_plan(&specs).unwrap();
        let mut blocked = HashSet::new();
        let mut metrics = RunMetrics::new(specs.len());

        block_dependents("a", &plan, &mut blocked, &mut metrics);
        let again = block_dependents("b", &plan, &mut blocked, &mut metrics);

        assert!(again.is_empty());
        assert_eq!(metrics.blocked, 2);
    }

    #[test]
    fn deep_chains_do_not_recurse() {
        let specs: Vec<NodeSpec> = (0..20_000)
            .map(|i| {
                if i == 0 {
                    node("n0", &[])
                } else {
                    node(&format!("n{i}"), &[format!("n{}", i - 1).as_str()])
                }
            })
            .collect();
        let plan = build_plan(&specs).unwrap();
        let mut blocked = HashSet::new();
        let mut metrics = RunMetrics::new(specs.len());

        let newly = block_dependents("n0", &plan, &mut blocked, &mut metrics);
        assert_eq!(newly.len(), 19_999);
    }
}
