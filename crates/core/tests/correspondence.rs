use align_core::correspondence::{CorrespondenceMap, MatchConfidence, Side};
use align_core::model::{BlockId, FunctionId, ModelError};

#[test]
fn function_lookups_work_in_both_directions() {
    let mut map = CorrespondenceMap::new();
    map.insert_function_match(FunctionId(0), FunctionId(3), MatchConfidence::Exact)
        .expect("insert");

    assert_eq!(map.function_match_ab(FunctionId(0)), Some(FunctionId(3)));
    assert_eq!(map.function_match_ba(FunctionId(3)), Some(FunctionId(0)));
    assert_eq!(map.function_match_ab(FunctionId(1)), None);
    assert_eq!(map.confidence(FunctionId(0)), Some(MatchConfidence::Exact));
}

#[test]
fn a_side_function_cannot_be_paired_twice() {
    let mut map = CorrespondenceMap::new();
    map.insert_function_match(FunctionId(0), FunctionId(0), MatchConfidence::Exact)
        .expect("insert");
    let err = map
        .insert_function_match(FunctionId(0), FunctionId(1), MatchConfidence::Name)
        .expect_err("duplicate A id must be rejected");
    assert!(matches!(err, ModelError::DuplicateFunctionMatch { function: FunctionId(0), .. }));
}

#[test]
fn b_side_function_cannot_be_paired_twice() {
    let mut map = CorrespondenceMap::new();
    map.insert_function_match(FunctionId(0), FunctionId(5), MatchConfidence::Exact)
        .expect("insert");
    let err = map
        .insert_function_match(FunctionId(1), FunctionId(5), MatchConfidence::Fuzzy)
        .expect_err("duplicate B id must be rejected");
    assert!(matches!(err, ModelError::DuplicateFunctionMatch { function: FunctionId(5), .. }));
}

#[test]
fn block_lookups_are_scoped_to_a_function_pair() {
    let mut map = CorrespondenceMap::new();
    map.insert_function_match(FunctionId(0), FunctionId(1), MatchConfidence::Name)
        .expect("insert");
    map.insert_block_match(FunctionId(0), BlockId(0), BlockId(2)).expect("block insert");

    assert_eq!(map.block_match_ab(FunctionId(0), BlockId(0)), Some(BlockId(2)));
    assert_eq!(map.block_match_ba(FunctionId(0), BlockId(2)), Some(BlockId(0)));
    assert_eq!(map.block_match_ab(FunctionId(0), BlockId(1)), None);
    // Lookups against an unknown pair return nothing rather than guessing.
    assert_eq!(map.block_match_ab(FunctionId(9), BlockId(0)), None);
}

#[test]
fn block_matches_require_an_existing_function_pair() {
    let mut map = CorrespondenceMap::new();
    let err = map
        .insert_block_match(FunctionId(7), BlockId(0), BlockId(0))
        .expect_err("unpaired function must be rejected");
    assert!(matches!(err, ModelError::DuplicateFunctionMatch { function: FunctionId(7), .. }));
}

#[test]
fn blocks_cannot_be_paired_twice_on_either_side() {
    let mut map = CorrespondenceMap::new();
    map.insert_function_match(FunctionId(0), FunctionId(0), MatchConfidence::Exact)
        .expect("insert");
    map.insert_block_match(FunctionId(0), BlockId(0), BlockId(0)).expect("block insert");

    let err = map
        .insert_block_match(FunctionId(0), BlockId(0), BlockId(1))
        .expect_err("duplicate A block");
    assert!(matches!(err, ModelError::DuplicateBlockMatch { block: BlockId(0), .. }));

    let err = map
        .insert_block_match(FunctionId(0), BlockId(1), BlockId(0))
        .expect_err("duplicate B block");
    assert!(matches!(err, ModelError::DuplicateBlockMatch { block: BlockId(0), .. }));
}

#[test]
fn unmatched_residue_is_enumerable_per_side() {
    let mut map = CorrespondenceMap::new();
    map.insert_function_match(FunctionId(0), FunctionId(0), MatchConfidence::Exact)
        .expect("insert");
    map.record_unmatched_function(Side::A, FunctionId(1));
    map.record_unmatched_function(Side::B, FunctionId(2));
    map.record_unmatched_block(FunctionId(0), Side::B, BlockId(4));

    assert_eq!(map.unmatched_functions(Side::A).len(), 1);
    assert!(map.unmatched_functions(Side::A).contains(&FunctionId(1)));
    assert!(map.unmatched_functions(Side::B).contains(&FunctionId(2)));

    let table = map.block_correspondence(FunctionId(0)).expect("table");
    assert!(table.unmatched(Side::B).contains(&BlockId(4)));
    assert!(table.unmatched(Side::A).is_empty());
}

#[test]
fn function_matches_enumerate_in_a_side_id_order() {
    let mut map = CorrespondenceMap::new();
    map.insert_function_match(FunctionId(2), FunctionId(0), MatchConfidence::Fuzzy)
        .expect("insert");
    map.insert_function_match(FunctionId(0), FunctionId(2), MatchConfidence::Exact)
        .expect("insert");

    let order: Vec<FunctionId> = map.iter_function_matches().map(|p| p.a).collect();
    assert_eq!(order, vec![FunctionId(0), FunctionId(2)]);
    assert_eq!(map.matched_count(), 2);
}
