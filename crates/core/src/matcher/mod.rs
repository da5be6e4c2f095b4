//! Function matcher: pairs functions of program A with functions of
//! program B in descending-confidence passes over the still-unmatched pool.
//!
//! Greedy with no backtracking: once a pass commits a pair, both functions
//! leave the pool. Ambiguity (several candidates sharing a digest or a name)
//! is deferred to the next pass, never guessed. Whatever survives all three
//! passes is legitimate single-side residue, not an error.
//!
//! This is a deliberate engineering trade-off against optimal bipartite
//! assignment; see DESIGN.md before "fixing" it into a Hungarian solver.

use std::collections::BTreeMap;

use crate::correspondence::{CorrespondenceMap, MatchConfidence, Side};
use crate::digest::{block_digest, function_digest, Fingerprint};
use crate::model::{FunctionId, ModelError, Program};

/// Weight of block-count closeness in the fuzzy similarity score.
pub const WEIGHT_BLOCK_COUNT: f64 = 0.3;
/// Weight of edge-count closeness in the fuzzy similarity score.
pub const WEIGHT_EDGE_COUNT: f64 = 0.2;
/// Weight of bag-of-block-digest overlap in the fuzzy similarity score.
pub const WEIGHT_DIGEST_OVERLAP: f64 = 0.5;
/// Minimum fuzzy score a candidate pair must clear to be committed.
///
/// Tuned so that a function differing by one added block from an otherwise
/// identical counterpart clears the floor comfortably, while functions with
/// disjoint block content and divergent shape do not.
pub const FUZZY_FLOOR: f64 = 0.5;

/// Tunable knobs for the matcher. `Default` uses the documented constants.
#[derive(Debug, Clone, Copy)]
pub struct MatcherConfig {
    pub fuzzy_floor: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self { fuzzy_floor: FUZZY_FLOOR }
    }
}

/// Per-function data computed once up front so the passes never re-hash.
struct FunctionFacts {
    digest: Fingerprint,
    /// Sorted multiset of block digests, for bag-of-blocks overlap.
    block_bag: Vec<Fingerprint>,
    block_count: usize,
    edge_count: usize,
    name: Option<String>,
}

fn collect_facts(program: &Program) -> Vec<FunctionFacts> {
    program
        .functions
        .iter()
        .map(|function| {
            let mut block_bag: Vec<Fingerprint> =
                function.blocks.iter().map(block_digest).collect();
            block_bag.sort_unstable();
            FunctionFacts {
                digest: function_digest(function),
                block_bag,
                block_count: function.blocks.len(),
                edge_count: function.edge_count(),
                name: function.name.clone(),
            }
        })
        .collect()
}

/// Ratio closeness in [0, 1]; equal counts (including both zero) score 1.
fn closeness(x: usize, y: usize) -> f64 {
    let (lo, hi) = if x <= y { (x, y) } else { (y, x) };
    if hi == 0 {
        1.0
    } else {
        lo as f64 / hi as f64
    }
}

/// Dice overlap of two sorted digest multisets.
fn bag_overlap(a: &[Fingerprint], b: &[Fingerprint]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let mut shared = 0usize;
    let (mut i, mut j) = (0usize, 0usize);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                shared += 1;
                i += 1;
                j += 1;
            }
        }
    }
    (2 * shared) as f64 / (a.len() + b.len()) as f64
}

fn similarity(a: &FunctionFacts, b: &FunctionFacts) -> f64 {
    WEIGHT_BLOCK_COUNT * closeness(a.block_count, b.block_count)
        + WEIGHT_EDGE_COUNT * closeness(a.edge_count, b.edge_count)
        + WEIGHT_DIGEST_OVERLAP * bag_overlap(&a.block_bag, &b.block_bag)
}

/// Group still-unmatched function ids by a key; only groups with exactly one
/// candidate on each side are safe to pair.
fn group_unmatched<K: Ord>(
    matched: &[bool],
    keys: impl Iterator<Item = (usize, K)>,
) -> BTreeMap<K, Vec<FunctionId>> {
    let mut groups: BTreeMap<K, Vec<FunctionId>> = BTreeMap::new();
    for (idx, key) in keys {
        if !matched[idx] {
            groups.entry(key).or_default().push(FunctionId(idx));
        }
    }
    groups
}

/// Pair functions of `a` with functions of `b`, writing matches and residue
/// into `map`. Pass order: exact digest, symbol name, fuzzy similarity.
pub fn match_functions(
    a: &Program,
    b: &Program,
    config: &MatcherConfig,
    map: &mut CorrespondenceMap,
) -> Result<(), ModelError> {
    let facts_a = collect_facts(a);
    let facts_b = collect_facts(b);
    let mut matched_a = vec![false; facts_a.len()];
    let mut matched_b = vec![false; facts_b.len()];

    // Pass 1: exact digest. A digest group with multiple candidates on
    // either side is ambiguous and defers wholesale to later passes.
    let groups_a =
        group_unmatched(&matched_a, facts_a.iter().enumerate().map(|(i, f)| (i, f.digest)));
    let groups_b =
        group_unmatched(&matched_b, facts_b.iter().enumerate().map(|(i, f)| (i, f.digest)));
    for (digest, ids_a) in &groups_a {
        let Some(ids_b) = groups_b.get(digest) else { continue };
        let (&[fa], &[fb]) = (ids_a.as_slice(), ids_b.as_slice()) else { continue };
        // Digests are hints; confirm the shape agrees before trusting one.
        if facts_a[fa.0].block_count != facts_b[fb.0].block_count
            || facts_a[fa.0].edge_count != facts_b[fb.0].edge_count
        {
            continue;
        }
        map.insert_function_match(fa, fb, MatchConfidence::Exact)?;
        matched_a[fa.0] = true;
        matched_b[fb.0] = true;
    }

    // Pass 2: symbol name, only where the name is present and unique on
    // both sides. Colliding names are skipped, not force-matched.
    let names_a = group_unmatched(
        &matched_a,
        facts_a.iter().enumerate().filter_map(|(i, f)| f.name.clone().map(|n| (i, n))),
    );
    let names_b = group_unmatched(
        &matched_b,
        facts_b.iter().enumerate().filter_map(|(i, f)| f.name.clone().map(|n| (i, n))),
    );
    for (name, ids_a) in &names_a {
        let Some(ids_b) = names_b.get(name) else { continue };
        let (&[fa], &[fb]) = (ids_a.as_slice(), ids_b.as_slice()) else { continue };
        map.insert_function_match(fa, fb, MatchConfidence::Name)?;
        matched_a[fa.0] = true;
        matched_b[fb.0] = true;
    }

    // Pass 3: fuzzy similarity over the remaining residue only, keeping the
    // candidate enumeration bounded. Stable greedy assignment: best score
    // first, ties toward the larger combined block count, then lowest ids.
    let remaining_a: Vec<FunctionId> =
        (0..facts_a.len()).filter(|i| !matched_a[*i]).map(FunctionId).collect();
    let remaining_b: Vec<FunctionId> =
        (0..facts_b.len()).filter(|i| !matched_b[*i]).map(FunctionId).collect();

    let mut candidates: Vec<(f64, usize, FunctionId, FunctionId)> = Vec::new();
    for &fa in &remaining_a {
        for &fb in &remaining_b {
            let score = similarity(&facts_a[fa.0], &facts_b[fb.0]);
            if score >= config.fuzzy_floor {
                let combined = facts_a[fa.0].block_count + facts_b[fb.0].block_count;
                candidates.push((score, combined, fa, fb));
            }
        }
    }
    candidates.sort_by(|x, y| {
        y.0.total_cmp(&x.0)
            .then(y.1.cmp(&x.1))
            .then(x.2.cmp(&y.2))
            .then(x.3.cmp(&y.3))
    });
    for (_, _, fa, fb) in candidates {
        if matched_a[fa.0] || matched_b[fb.0] {
            continue;
        }
        map.insert_function_match(fa, fb, MatchConfidence::Fuzzy)?;
        matched_a[fa.0] = true;
        matched_b[fb.0] = true;
    }

    for (idx, taken) in matched_a.iter().enumerate() {
        if !taken {
            map.record_unmatched_function(Side::A, FunctionId(idx));
        }
    }
    for (idx, taken) in matched_b.iter().enumerate() {
        if !taken {
            map.record_unmatched_function(Side::B, FunctionId(idx));
        }
    }
    Ok(())
}
