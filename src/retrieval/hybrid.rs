//! Hybrid ranking: fuses a semantic and a lexical ranked list.
//!
//! The two rankers score on incomparable native scales (cosine similarity
//! vs. keyword relevance), so fusion works on positions, not raw scores:
//! the item at 0-based position `i` of a list of size `N` contributes
//! `(1 - i/N)` scaled by the list's weight. An id present in only one list
//! gets zero contribution from the other; an empty list contributes zero
//! for every id.

use std::collections::HashMap;

use crate::eid::Eid;

/// Default weight of the semantic ranking in hybrid search.
pub const DEFAULT_SEMANTIC_WEIGHT: f32 = 0.7;

/// Fused ranking entry.
#[derive(Debug, Clone)]
pub struct FusedResult {
    pub id: Eid,
    /// Combined rank-normalized score.
    pub score: f32,
    /// 1-based rank in the semantic list, if present there.
    pub semantic_rank: Option<usize>,
    /// 1-based rank in the lexical list, if present there.
    pub lexical_rank: Option<usize>,
}

/// Fuse two best-first ranked id lists into one ordering.
///
/// `semantic_weight` is clamped to `[0, 1]`; the lexical list gets the
/// complement. Results are sorted by fused score descending (ties broken by
/// id for determinism) and truncated to `limit`.
pub fn fuse(
    semantic_ids: &[Eid],
    lexical_ids: &[Eid],
    semantic_weight: f32,
    limit: usize,
) -> Vec<FusedResult> {
    let sem_weight = semantic_weight.clamp(0.0, 1.0);
    let lex_weight = 1.0 - sem_weight;

    let mut scores: HashMap<Eid, FusedResult> = HashMap::new();

    let n1 = semantic_ids.len();
    for (rank, id) in semantic_ids.iter().enumerate() {
        let score = sem_weight * (1.0 - rank as f32 / n1 as f32);
        scores.insert(
            id.clone(),
            FusedResult {
                id: id.clone(),
                score,
                semantic_rank: Some(rank + 1),
                lexical_rank: None,
            },
        );
    }

    let n2 = lexical_ids.len();
    for (rank, id) in lexical_ids.iter().enumerate() {
        let score = lex_weight * (1.0 - rank as f32 / n2 as f32);
        scores
            .entry(id.clone())
            .and_modify(|result| {
                result.score += score;
                result.lexical_rank = Some(rank + 1);
            })
            .or_insert(FusedResult {
                id: id.clone(),
                score,
                semantic_rank: None,
                lexical_rank: Some(rank + 1),
            });
    }

    let mut results: Vec<FusedResult> = scores.into_values().collect();
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    results.truncate(limit);

    results
}
