mod common;

use align_core::correspondence::{MatchConfidence, Side};
use align_core::engine::{align_programs, AlignOptions, AlignmentReport};
use align_core::model::{BlockId, Function, FunctionId, ModelError, Program};
use common::{block, diamond_function, program, two_block_function};

/// Distinct single-block function so digests stay unique within a program.
fn leaf_function() -> Function {
    let mut function = Function::new(None, 8);
    let entry = function.add_block(block(&["lea", "call", "ret"]));
    function.entry = entry;
    function
}

fn align(a: &Program, b: &Program) -> align_core::correspondence::CorrespondenceMap {
    align_programs(a, b, &AlignOptions::default()).expect("alignment")
}

#[test]
fn self_alignment_is_a_total_exact_bijection() {
    let p = program(
        "self",
        vec![two_block_function(Some("f")), diamond_function(Some("g")), leaf_function()],
    );
    let map = align(&p, &p);

    assert_eq!(map.matched_count(), p.functions.len());
    assert!(map.unmatched_functions(Side::A).is_empty());
    assert!(map.unmatched_functions(Side::B).is_empty());
    for pair in map.iter_function_matches() {
        assert_eq!(pair.confidence, MatchConfidence::Exact);
        let table = map.block_correspondence(pair.a).expect("block table");
        assert_eq!(table.matched_count(), p.functions[pair.a.0].blocks.len());
        assert!(table.unmatched(Side::A).is_empty());
        assert!(table.unmatched(Side::B).is_empty());
    }
}

#[test]
fn entry_blocks_are_matched_for_every_pair() {
    let a = program("a", vec![two_block_function(Some("f")), diamond_function(Some("g"))]);
    let b = program("b", vec![diamond_function(Some("g")), two_block_function(Some("f"))]);
    let map = align(&a, &b);

    for pair in map.iter_function_matches() {
        let entry_a = a.functions[pair.a.0].entry;
        let entry_b = b.functions[pair.b.0].entry;
        assert_eq!(map.block_match_ab(pair.a, entry_a), Some(entry_b));
    }
}

#[test]
fn alignment_is_deterministic() {
    let a = program("a", vec![diamond_function(None), two_block_function(Some("f"))]);
    let b = program("b", vec![two_block_function(Some("f")), diamond_function(None)]);
    assert_eq!(align(&a, &b), align(&a, &b));
}

#[test]
fn function_only_in_b_lands_in_the_b_residue() {
    // A has `f`; B has the identical `f` plus an unreferenced `g`.
    let a = program("a", vec![two_block_function(Some("f"))]);
    let b = program("b", vec![two_block_function(Some("f")), diamond_function(Some("g"))]);
    let map = align(&a, &b);

    assert_eq!(map.function_match_ab(FunctionId(0)), Some(FunctionId(0)));
    assert_eq!(map.confidence(FunctionId(0)), Some(MatchConfidence::Exact));
    let table = map.block_correspondence(FunctionId(0)).expect("table");
    assert_eq!(table.matched_count(), 2);

    assert!(map.unmatched_functions(Side::A).is_empty());
    assert_eq!(map.unmatched_functions(Side::B).len(), 1);
    assert!(map.unmatched_functions(Side::B).contains(&FunctionId(1)));
}

#[test]
fn function_only_in_a_lands_in_the_a_residue() {
    let a = program("a", vec![two_block_function(Some("f")), diamond_function(Some("gone"))]);
    let b = program("b", vec![two_block_function(Some("f"))]);
    let map = align(&a, &b);

    assert_eq!(map.matched_count(), 1);
    assert!(map.unmatched_functions(Side::A).contains(&FunctionId(1)));
    assert!(map.unmatched_functions(Side::B).is_empty());
}

#[test]
fn added_block_surfaces_as_fuzzy_match_with_b_only_block() {
    let a = program("a", vec![diamond_function(None)]);
    let mut variant = diamond_function(None);
    let extra = variant.add_block(block(&["xor", "ret"]));
    variant.blocks[extra.0].cold = true;
    let b = program("b", vec![variant]);
    let map = align(&a, &b);

    assert_eq!(map.confidence(FunctionId(0)), Some(MatchConfidence::Fuzzy));
    let table = map.block_correspondence(FunctionId(0)).expect("table");
    assert_eq!(table.matched_count(), 4);
    assert!(table.unmatched(Side::A).is_empty());
    assert!(table.unmatched(Side::B).contains(&extra));
}

#[test]
fn invalid_programs_are_rejected_before_matching() {
    let mut broken = two_block_function(Some("f"));
    broken.entry = BlockId(9);
    let a = program("a", vec![broken]);
    let b = program("b", vec![two_block_function(Some("f"))]);

    let err = align_programs(&a, &b, &AlignOptions::default()).expect_err("must fail");
    assert!(matches!(err, ModelError::BadEntry { .. }));
}

#[test]
fn empty_programs_align_to_an_empty_map() {
    let a = Program::new("a");
    let b = Program::new("b");
    let map = align(&a, &b);

    assert_eq!(map.matched_count(), 0);
    assert!(map.unmatched_functions(Side::A).is_empty());
    assert!(map.unmatched_functions(Side::B).is_empty());
}

#[test]
fn report_summarizes_the_run() {
    let a = program("prog_a", vec![two_block_function(Some("f")), diamond_function(Some("gone"))]);
    let b = program("prog_b", vec![two_block_function(Some("f"))]);
    let map = align(&a, &b);
    let report = AlignmentReport::from_map(&map, &a, &b);

    assert_eq!(report.program_a, "prog_a");
    assert_eq!(report.program_b, "prog_b");
    assert_eq!(report.matched_functions, 1);
    assert_eq!(report.exact_matches, 1);
    assert_eq!(report.name_matches, 0);
    assert_eq!(report.fuzzy_matches, 0);
    assert_eq!(report.only_in_a.len(), 1);
    assert_eq!(report.only_in_a[0].name.as_deref(), Some("gone"));
    assert!(report.only_in_b.is_empty());
    assert_eq!(report.functions.len(), 1);
    assert_eq!(report.functions[0].matched_blocks, 2);

    let value = serde_json::to_value(&report).expect("report serializes");
    assert_eq!(value["matched_functions"], 1);
    assert_eq!(value["functions"][0]["confidence"], "exact");
}
