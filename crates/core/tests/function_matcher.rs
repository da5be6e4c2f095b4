mod common;

use align_core::correspondence::{CorrespondenceMap, MatchConfidence, Side};
use align_core::matcher::{match_functions, MatcherConfig};
use align_core::model::{EdgeKind, Function, FunctionId};
use common::{block, diamond_function, program, two_block_function};

fn run_matcher(
    a: &align_core::model::Program,
    b: &align_core::model::Program,
) -> CorrespondenceMap {
    let mut map = CorrespondenceMap::new();
    match_functions(a, b, &MatcherConfig::default(), &mut map).expect("matcher");
    map
}

/// Diamond plus one extra cold block: similar to the diamond, not identical.
fn diamond_with_extra_block(name: Option<&str>) -> Function {
    let mut function = diamond_function(name);
    let extra = function.add_block(block(&["xor", "ret"]));
    function.blocks[extra.0].cold = true;
    function
}

#[test]
fn identical_functions_match_exactly() {
    let a = program("a", vec![two_block_function(Some("f")), diamond_function(Some("g"))]);
    let b = program("b", vec![two_block_function(Some("f")), diamond_function(Some("g"))]);
    let map = run_matcher(&a, &b);

    assert_eq!(map.matched_count(), 2);
    for pair in map.iter_function_matches() {
        assert_eq!(pair.confidence, MatchConfidence::Exact);
        assert_eq!(pair.a, pair.b);
    }
    assert!(map.unmatched_functions(Side::A).is_empty());
    assert!(map.unmatched_functions(Side::B).is_empty());
}

#[test]
fn exact_matching_ignores_symbol_names() {
    // Same content under different names still pairs in the exact pass.
    let a = program("a", vec![diamond_function(Some("old_name"))]);
    let b = program("b", vec![diamond_function(Some("new_name"))]);
    let map = run_matcher(&a, &b);

    assert_eq!(map.confidence(FunctionId(0)), Some(MatchConfidence::Exact));
}

#[test]
fn ambiguous_digests_defer_to_the_name_pass() {
    // Two byte-identical functions per side: the exact pass must not guess.
    let a = program(
        "a",
        vec![two_block_function(Some("first")), two_block_function(Some("second"))],
    );
    let b = program(
        "b",
        vec![two_block_function(Some("second")), two_block_function(Some("first"))],
    );
    let map = run_matcher(&a, &b);

    assert_eq!(map.matched_count(), 2);
    assert_eq!(map.function_match_ab(FunctionId(0)), Some(FunctionId(1)));
    assert_eq!(map.function_match_ab(FunctionId(1)), Some(FunctionId(0)));
    assert_eq!(map.confidence(FunctionId(0)), Some(MatchConfidence::Name));
    assert_eq!(map.confidence(FunctionId(1)), Some(MatchConfidence::Name));
}

#[test]
fn colliding_names_are_skipped_not_force_matched() {
    // Side A carries the name twice with different content; the name pass
    // must not pick one, so any pairing left comes from the fuzzy pass.
    let a = program(
        "a",
        vec![diamond_function(Some("dup")), diamond_with_extra_block(Some("dup"))],
    );
    let b = program("b", vec![diamond_with_extra_block(Some("dup"))]);
    let map = run_matcher(&a, &b);

    // A's second function is byte-identical to B's only function, so the
    // exact pass takes it; the leftover "dup" stays unmatched rather than
    // being name-matched against an already-taken candidate.
    assert_eq!(map.function_match_ab(FunctionId(1)), Some(FunctionId(0)));
    assert_eq!(map.confidence(FunctionId(1)), Some(MatchConfidence::Exact));
    assert!(map.unmatched_functions(Side::A).contains(&FunctionId(0)));
}

#[test]
fn similar_functions_fall_through_to_the_fuzzy_pass() {
    // One extra block in B, rest identical, no usable names.
    let a = program("a", vec![diamond_function(None)]);
    let b = program("b", vec![diamond_with_extra_block(None)]);
    let map = run_matcher(&a, &b);

    assert_eq!(map.function_match_ab(FunctionId(0)), Some(FunctionId(0)));
    assert_eq!(map.confidence(FunctionId(0)), Some(MatchConfidence::Fuzzy));
}

#[test]
fn different_repeated_content_never_pairs_at_exact_confidence() {
    // Entry, block count, and edge count all agree; only the duplicated
    // pair of blocks differs. These must not slip through the exact pass.
    let build = |op: &str| {
        let mut function = Function::new(None, 32);
        let entry = function.add_block(block(&["cmp", "jne"]));
        let left = function.add_block(block(&[op, "ret"]));
        let right = function.add_block(block(&[op, "ret"]));
        function.entry = entry;
        function.add_edge(entry, left, EdgeKind::BranchTaken);
        function.add_edge(entry, right, EdgeKind::Fallthrough);
        function
    };
    let a = program("a", vec![build("add")]);
    let b = program("b", vec![build("sub")]);
    let map = run_matcher(&a, &b);

    // The shared entry plus identical shape still clears the fuzzy floor,
    // which is the honest confidence for this pair.
    assert_eq!(map.confidence(FunctionId(0)), Some(MatchConfidence::Fuzzy));
}

#[test]
fn dissimilar_functions_stay_unmatched() {
    let mut lone = Function::new(None, 4);
    let entry = lone.add_block(block(&["nop"]));
    lone.entry = entry;

    let a = program("a", vec![diamond_function(None)]);
    let b = program("b", vec![lone]);
    let map = run_matcher(&a, &b);

    assert_eq!(map.matched_count(), 0);
    assert!(map.unmatched_functions(Side::A).contains(&FunctionId(0)));
    assert!(map.unmatched_functions(Side::B).contains(&FunctionId(0)));
}

#[test]
fn fuzzy_floor_is_configurable() {
    let a = program("a", vec![diamond_function(None)]);
    let b = program("b", vec![diamond_with_extra_block(None)]);

    let mut map = CorrespondenceMap::new();
    let strict = MatcherConfig { fuzzy_floor: 0.99 };
    match_functions(&a, &b, &strict, &mut map).expect("matcher");
    assert_eq!(map.matched_count(), 0);
}

#[test]
fn matcher_is_deterministic() {
    let a = program(
        "a",
        vec![
            diamond_function(Some("f")),
            two_block_function(None),
            diamond_with_extra_block(Some("h")),
        ],
    );
    let b = program(
        "b",
        vec![
            diamond_with_extra_block(Some("h")),
            diamond_function(Some("f")),
            two_block_function(None),
        ],
    );
    let first = run_matcher(&a, &b);
    let second = run_matcher(&a, &b);
    assert_eq!(first, second);
}

#[test]
fn matcher_output_is_a_partial_bijection() {
    let a = program(
        "a",
        vec![diamond_function(Some("f")), diamond_function(Some("g")), two_block_function(None)],
    );
    let b = program(
        "b",
        vec![two_block_function(None), diamond_function(Some("g")), diamond_function(Some("f"))],
    );
    let map = run_matcher(&a, &b);

    let mut seen_b = std::collections::BTreeSet::new();
    for pair in map.iter_function_matches() {
        assert_eq!(map.function_match_ba(pair.b), Some(pair.a));
        assert!(seen_b.insert(pair.b), "B id {:?} paired twice", pair.b);
    }
}
