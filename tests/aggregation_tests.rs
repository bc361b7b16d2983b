use pretty_assertions::assert_eq;
use stackprof_core::aggregator::{prune_tree, reclassify_tree, CallTree};
use stackprof_core::model::{ClassMethodNames, FunctionId, StackSnapshot};
use stackprof_core::names::NameResolver;
use stackprof_core::output::{read_profiles, serialize_profile, write_profiles};
use stackprof_core::session::SessionMetadata;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use tempfile::tempdir;

fn tree_of(stacks: &[&[u64]]) -> CallTree {
    let mut tree = CallTree::new();
    for frames in stacks {
        tree.merge_snapshot(&StackSnapshot::from_raw(1, frames));
    }
    tree
}

fn letter_names(ids: &HashSet<FunctionId>) -> HashMap<FunctionId, ClassMethodNames> {
    ids.iter()
        .map(|id| {
            let method = char::from(b'A' + (id.0 as u8 - 1)).to_string();
            (*id, ClassMethodNames::new("Letters", method))
        })
        .collect()
}

fn metadata(session_id: i32) -> SessionMetadata {
    SessionMetadata {
        session_id,
        start_time: Utc.timestamp_millis_opt(1_000).unwrap(),
        stop_time: Some(Utc.timestamp_millis_opt(2_500).unwrap()),
        sample_count: 3,
        thread_count: 1,
    }
}

#[test]
fn test_shared_prefix_profile() {
    // A=1, B=2, C=3, D=4; frames are innermost first
    let mut tree = tree_of(&[&[3, 2, 1], &[4, 2, 1], &[4, 2, 1]]);
    NameResolver::new().resolve_names(&mut tree, &letter_names);
    reclassify_tree(&mut tree, &HashSet::new()).unwrap();
    prune_tree(&mut tree, 20_000);

    let profile = serialize_profile(&tree, &metadata(4444));
    let json = serde_json::to_string(&profile).unwrap();

    assert_eq!(
        json,
        concat!(
            "[4444,1000,2500,3,{\"OTHER\":[",
            "[[\"Letters\",\"A\",0],3,0,[",
            "[[\"Letters\",\"B\",0],3,0,[",
            "[[\"Letters\",\"C\",0],1,0,[]],",
            "[[\"Letters\",\"D\",0],2,0,[]]",
            "]]]]]},1,1]"
        )
    );
}

#[test]
fn test_blocked_leaf_reclassified_through_ancestors() {
    let blocked: &[u64] = &[99, 2, 1];
    let running: &[u64] = &[3, 2, 1];
    let mut stacks = vec![blocked; 5];
    stacks.extend(std::iter::repeat(running).take(3));
    let mut tree = tree_of(&stacks);

    let names = |ids: &HashSet<FunctionId>| -> HashMap<FunctionId, ClassMethodNames> {
        ids.iter()
            .map(|id| match id.0 {
                99 => (*id, ClassMethodNames::new("Foo", "Bar")),
                n => (*id, ClassMethodNames::new("App", format!("m{}", n))),
            })
            .collect()
    };
    NameResolver::new().resolve_names(&mut tree, &names);

    let signatures: HashSet<String> = ["Foo:Bar".to_string()].into_iter().collect();
    let report = reclassify_tree(&mut tree, &signatures).unwrap();
    assert_eq!(report.matched_leaves, 1);
    assert_eq!(report.samples_moved, 5);

    let outer = tree.node(tree.find_path(&[1]).unwrap()).unwrap();
    assert_eq!(outer.runnable_count, 3);
    assert_eq!(outer.non_runnable_count, 5);

    let leaf = tree.node(tree.find_path(&[1, 2, 99]).unwrap()).unwrap();
    assert_eq!(leaf.runnable_count, 0);
    assert_eq!(leaf.non_runnable_count, 5);

    // Totals are conserved at every node
    let expected: [(&[u64], u64); 4] = [(&[1], 8), (&[1, 2], 8), (&[1, 2, 3], 3), (&[1, 2, 99], 5)];
    for (path, merged) in expected {
        let node = tree.node(tree.find_path(path).unwrap()).unwrap();
        assert_eq!(node.runnable_count + node.non_runnable_count, merged);
    }
}

#[test]
fn test_pruning_flags_exactly_the_excess() {
    // Ten disjoint chains of length two: every node is a first child
    let stacks: Vec<Vec<u64>> = (0..10u64).map(|i| vec![100 + i, 1 + i]).collect();
    let refs: Vec<&[u64]> = stacks.iter().map(Vec::as_slice).collect();
    let mut tree = tree_of(&refs);

    let candidates = tree.pruning_list().len();
    assert_eq!(candidates, 11);

    let report = prune_tree(&mut tree, 4);
    assert_eq!(report.candidates, candidates);
    assert_eq!(report.flagged, candidates - 4);

    let flagged = tree
        .pruning_list()
        .iter()
        .filter(|id| tree.node(**id).unwrap().ignore_for_reporting)
        .count();
    assert_eq!(flagged, candidates - 4);
}

#[test]
fn test_native_and_unresolved_names_in_profile() {
    let mut tree = tree_of(&[&[0, 7]]);
    let nothing =
        |_: &HashSet<FunctionId>| -> HashMap<FunctionId, ClassMethodNames> { HashMap::new() };
    NameResolver::new().resolve_names(&mut tree, &nothing);

    let profile = serialize_profile(&tree, &metadata(1));
    let root = &profile.roots()[0];
    assert_eq!(root.class_name, "Unknown class");
    assert_eq!(root.method_name, "Unknown method(7)");
    assert_eq!(root.children[0].class_name, "Native");
    assert_eq!(root.children[0].method_name, "Unknown Native Function");
}

#[test]
fn test_empty_tree_profile_round_trips_through_file() {
    let tree = CallTree::new();
    let mut meta = metadata(9);
    meta.sample_count = 0;
    meta.thread_count = 0;
    let profile = serialize_profile(&tree, &meta);
    assert_eq!(
        serde_json::to_string(&profile).unwrap(),
        "[9,1000,2500,0,{},0,0]"
    );

    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.json");
    write_profiles(&[profile.clone()], &path).unwrap();
    assert_eq!(read_profiles(&path).unwrap(), vec![profile]);
}
