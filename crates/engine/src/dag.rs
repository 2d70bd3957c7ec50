//! Dependency planning — run this before executing a node set.
//!
//! Rules enforced:
//! 1. Node IDs must be unique.
//! 2. A node must not depend on itself.
//! 3. Every dependency must name a node in the set.
//! 4. The dependency graph must be acyclic.
//!
//! Returns a [`Plan`]: a topological order and its partition into batches.

use std::collections::{HashMap, HashSet};

use crate::models::{NodeSpec, Plan};
use crate::EngineError;

/// Validate `specs` and produce the batched execution plan.
///
/// Within each batch node IDs keep the order in which `specs` yields them.
///
/// # Errors
/// - [`EngineError::DuplicateNode`] if two specs share an ID.
/// - [`EngineError::SelfDependency`] if a node lists itself.
/// - [`EngineError::MissingDependency`] if a dependency is not in the set.
/// - [`EngineError::CycleDetected`] naming every node that could not be scheduled.
pub fn build_plan<'a, I>(specs: I) -> Result<Plan, EngineError>
where
    I: IntoIterator<Item = &'a NodeSpec>,
{
    let specs: Vec<&NodeSpec> = specs.into_iter().collect();

    // -----------------------------------------------------------------------
    // 1. Index node IDs, rejecting duplicates
    // -----------------------------------------------------------------------
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(specs.len());
    for (i, spec) in specs.iter().enumerate() {
        if index.insert(spec.id.as_str(), i).is_some() {
            return Err(EngineError::DuplicateNode(spec.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Validate dependency references and build the dependents adjacency
    // -----------------------------------------------------------------------
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
    let mut in_degree: Vec<usize> = vec![0; specs.len()];

    for (i, spec) in specs.iter().enumerate() {
        let mut seen: HashSet<&str> = HashSet::new();
        for dep in &spec.depends_on {
            if dep == &spec.id {
                return Err(EngineError::SelfDependency(spec.id.clone()));
            }
            let Some(&d) = index.get(dep.as_str()) else {
                return Err(EngineError::MissingDependency {
                    node_id: spec.id.clone(),
                    dependency: dep.clone(),
                });
            };
            if seen.insert(dep.as_str()) {
                dependents[d].push(i);
                in_degree[i] += 1;
            }
        }
    }

    // -----------------------------------------------------------------------
    // 3. Layered topological sort (Kahn's algorithm, one layer per batch)
    // -----------------------------------------------------------------------
    let mut ready: Vec<usize> = (0..specs.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order: Vec<String> = Vec::with_capacity(specs.len());
    let mut batches: Vec<Vec<String>> = Vec::new();

    while !ready.is_empty() {
        let mut next = Vec::new();
        for &i in &ready {
            for &d in &dependents[i] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    next.push(d);
                }
            }
        }
        next.sort_unstable();

        let batch: Vec<String> = ready.iter().map(|&i| specs[i].id.clone()).collect();
        order.extend(batch.iter().cloned());
        batches.push(batch);
        ready = next;
    }

    // Whatever still has unmet dependencies sits on (or behind) a cycle.
    if order.len() != specs.len() {
        let mut stuck: Vec<String> = (0..specs.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| specs[i].id.clone())
            .collect();
        stuck.sort();
        return Err(EngineError::CycleDetected(stuck));
    }

    let dependents = dependents
        .into_iter()
        .enumerate()
        .filter(|(_, ds)| !ds.is_empty())
        .map(|(i, ds)| {
            let ids = ds.into_iter().map(|d| specs[d].id.clone()).collect();
            (specs[i].id.clone(), ids)
        })
        .collect();

    Ok(Plan {
        order,
        batches,
        dependents,
    })
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, deps: &[&str]) -> NodeSpec {
        NodeSpec {
            id: id.to_string(),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            config: Default::default(),
        }
    }

    fn position(plan: &Plan, id: &str) -> usize {
        plan.order.iter().position(|n| n == id).unwrap()
    }

    #[test]
    fn valid_linear_chain_returns_sorted_order() {
        // A → B → C
        let specs = vec![node("c", &["b"]), node("a", &[]), node("b", &["a"])];

        let plan = build_plan(&specs).expect("should be valid");
        assert_eq!(plan.order, vec!["a", "b", "c"]);
        assert_eq!(plan.batches, vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn valid_diamond_is_batched_by_depth() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let specs = vec![
            node("a", &[]),
            node("b", &["a"]),
            node("c", &["a"]),
            node("d", &["b", "c"]),
        ];

        let plan = build_plan(&specs).expect("should be valid");
        assert_eq!(plan.batches, vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
        assert_eq!(plan.dependents_of("a"), ["b", "c"]);
        assert!(plan.dependents_of("d").is_empty());
    }

    #[test]
    fn order_respects_dependencies_and_batches_concatenate_to_order() {
        let specs = vec![
            node("ship", &["pay", "stock"]),
            node("notify", &[]),
            node("pay", &["check"]),
            node("stock", &["check"]),
            node("check", &[]),
            node("done", &["ship", "notify"]),
        ];

        let plan = build_plan(&specs).expect("should be valid");

        for spec in &specs {
            for dep in &spec.depends_on {
                assert!(position(&plan, dep) < position(&plan, &spec.id));
            }
        }
        let flat: Vec<String> = plan.batches.concat();
        assert_eq!(flat, plan.order);

        // Batches are maximal: everything ready goes as early as possible.
        assert_eq!(plan.batches[0], vec!["notify", "check"]);
        assert_eq!(plan.batches[1], vec!["pay", "stock"]);
    }

    #[test]
    fn independent_nodes_share_the_first_batch() {
        let specs = vec![node("x", &[]), node("y", &[]), node("z", &[])];
        let plan = build_plan(&specs).expect("should be valid");
        assert_eq!(plan.batches.len(), 1);
        assert_eq!(plan.batches[0], vec!["x", "y", "z"]);
    }

    #[test]
    fn repeated_dependency_is_counted_once() {
        let specs = vec![node("a", &[]), node("b", &["a", "a"])];
        let plan = build_plan(&specs).expect("should be valid");
        assert_eq!(plan.order, vec!["a", "b"]);
        assert_eq!(plan.dependents_of("a"), ["b"]);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let specs = vec![node("a", &[]), node("a", &[])];
        assert!(matches!(
            build_plan(&specs),
            Err(EngineError::DuplicateNode(id)) if id == "a"
        ));
    }

    #[test]
    fn dependency_on_missing_node_is_rejected() {
        let specs = vec![node("a", &["ghost"])];
        assert_eq!(
            build_plan(&specs),
            Err(EngineError::MissingDependency {
                node_id: "a".into(),
                dependency: "ghost".into(),
            })
        );
    }

    #[test]
    fn self_dependency_is_rejected() {
        let specs = vec![node("a", &["a"])];
        assert_eq!(
            build_plan(&specs),
            Err(EngineError::SelfDependency("a".into()))
        );
    }

    #[test]
    fn cycle_is_detected_and_named() {
        // A → B → C → A, with D hanging off the cycle.
        let specs = vec![
            node("a", &["c"]),
            node("b", &["a"]),
            node("c", &["b"]),
            node("d", &["c"]),
            node("free", &[]),
        ];
        assert_eq!(
            build_plan(&specs),
            Err(EngineError::CycleDetected(vec![
                "a".into(),
                "b".into(),
                "c".into(),
                "d".into()
            ]))
        );
    }

    #[test]
    fn empty_node_set_yields_empty_plan() {
        let plan = build_plan(&Vec::<NodeSpec>::new()).expect("empty set is valid");
        assert!(plan.is_empty());
        assert!(plan.batches.is_empty());
    }
}
