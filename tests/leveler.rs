// tests/leveler.rs

use std::collections::HashSet;

use proptest::prelude::*;

use modelflow::dag::{DagGraph, NodeDescriptor, PriorityLevels};
use modelflow::errors::ModelflowError;
use modelflow_test_utils::builders::descriptors;

fn levels_of(nodes: &[(&str, &[&str])]) -> Vec<Vec<String>> {
    let graph = DagGraph::from_descriptors(descriptors(nodes)).unwrap();
    PriorityLevels::compute(&graph).unwrap().into_inner()
}

fn names(level: &[&str]) -> Vec<String> {
    level.iter().map(|s| s.to_string()).collect()
}

#[test]
fn two_roots_join_then_chain() {
    let levels = levels_of(&[("A", &[]), ("B", &[]), ("C", &["A", "B"]), ("D", &["C"])]);
    assert_eq!(levels, vec![names(&["A", "B"]), names(&["C"]), names(&["D"])]);
}

#[test]
fn diamond() {
    let levels = levels_of(&[("A", &[]), ("B", &["A"]), ("C", &["A"]), ("D", &["B", "C"])]);
    assert_eq!(levels, vec![names(&["A"]), names(&["B", "C"]), names(&["D"])]);
}

#[test]
fn independent_roots_share_one_level() {
    let levels = levels_of(&[("n1", &[]), ("n2", &[]), ("n3", &[]), ("n4", &[])]);
    assert_eq!(levels, vec![names(&["n1", "n2", "n3", "n4"])]);
}

#[test]
fn longest_path_decides_level() {
    // A -> B -> C and A -> C: C must sit after B, not merely after A.
    let graph = DagGraph::from_descriptors(descriptors(&[
        ("A", &[]),
        ("B", &["A"]),
        ("C", &["A", "B"]),
    ]))
    .unwrap();
    let levels = PriorityLevels::compute(&graph).unwrap();

    assert_eq!(levels.level_of("A"), Some(0));
    assert_eq!(levels.level_of("B"), Some(1));
    assert_eq!(levels.level_of("C"), Some(2));
    assert_eq!(levels.level_of("missing"), None);
}

#[test]
fn downstreams_are_computed() {
    let graph = DagGraph::from_descriptors(descriptors(&[
        ("A", &[]),
        ("B", &["A"]),
        ("C", &["A"]),
    ]))
    .unwrap();

    assert_eq!(graph.downstreams_of("A"), &["B".to_string(), "C".to_string()]);
    assert!(graph.downstreams_of("B").is_empty());
    assert_eq!(graph.roots().collect::<Vec<_>>(), vec!["A"]);
    assert_eq!(graph.leaves().collect::<Vec<_>>(), vec!["B", "C"]);
}

#[test]
fn unknown_upstream_fails_construction() {
    let result = DagGraph::from_descriptors(descriptors(&[("A", &[]), ("B", &["ghost"])]));

    match result {
        Err(ModelflowError::UnknownUpstream { node, upstream }) => {
            assert_eq!(node, "B");
            assert_eq!(upstream, "ghost");
        }
        other => panic!("expected UnknownUpstream, got {:?}", other),
    }
}

#[test]
fn empty_descriptor_set_is_rejected() {
    let result = DagGraph::from_descriptors(Vec::<NodeDescriptor>::new());
    assert!(matches!(result, Err(ModelflowError::EmptyGraph)));
}

#[test]
fn duplicate_node_is_rejected() {
    let result = DagGraph::from_descriptors(vec![NodeDescriptor::root("A"), NodeDescriptor::root("A")]);
    assert!(matches!(result, Err(ModelflowError::ConfigError(_))));
}

#[test]
fn cycle_is_reported_not_looped_on() {
    let graph = DagGraph::from_descriptors(descriptors(&[
        ("A", &[]),
        ("B", &["A", "C"]),
        ("C", &["B"]),
    ]))
    .unwrap();

    assert!(matches!(
        PriorityLevels::compute(&graph),
        Err(ModelflowError::DagCycle(_))
    ));
}

#[test]
fn repeated_upstream_collapses_to_one_edge() {
    let desc = NodeDescriptor::new("B", ["A", "A"]);
    assert_eq!(desc.upstreams, vec!["A".to_string()]);
}

// Acyclic by construction: node i may only depend on nodes 0..i.
fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = Vec<NodeDescriptor>> {
    (1..=max_nodes).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), n).prop_map(
            |raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        let ups: HashSet<String> = if i == 0 {
                            HashSet::new()
                        } else {
                            picks.into_iter().map(|p| format!("n{}", p % i)).collect()
                        };
                        NodeDescriptor::new(format!("n{i}"), ups)
                    })
                    .collect()
            },
        )
    })
}

proptest! {
    #[test]
    fn every_node_sits_after_its_upstreams(descs in dag_strategy(16)) {
        let graph = DagGraph::from_descriptors(descs).unwrap();
        let levels = PriorityLevels::compute(&graph).unwrap();

        // Each node appears in exactly one level.
        let flat: Vec<&String> = levels.levels().iter().flatten().collect();
        let unique: HashSet<&String> = flat.iter().copied().collect();
        prop_assert_eq!(flat.len(), graph.len());
        prop_assert_eq!(unique.len(), graph.len());

        for desc in graph.descriptors() {
            let level = levels.level_of(&desc.name).unwrap();
            if desc.upstreams.is_empty() {
                prop_assert_eq!(level, 0);
            } else {
                let max_up = desc
                    .upstreams
                    .iter()
                    .map(|u| levels.level_of(u).unwrap())
                    .max()
                    .unwrap();
                prop_assert_eq!(level, max_up + 1);
            }
        }
    }

    #[test]
    fn levelling_is_deterministic(descs in dag_strategy(16)) {
        let graph = DagGraph::from_descriptors(descs).unwrap();
        let first = PriorityLevels::compute(&graph).unwrap();
        let second = PriorityLevels::compute(&graph).unwrap();
        prop_assert_eq!(first, second);
    }
}
