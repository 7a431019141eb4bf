//! Reciprocal Rank Fusion over independently ranked result lists.

use kodit_core::fusion::{FusedHit, FusionResult, RankedList};
use std::collections::HashMap;

pub const DEFAULT_RRF_K: f64 = 60.0;

fn effective_k(k: f64) -> f64 {
    if k <= 0.0 { DEFAULT_RRF_K } else { k }
}

/// Fuse `lists` into a single score-ranked result. Each list's items
/// contribute `1 / (k + rank)` to their snippet's accumulated score, where
/// `rank` is the item's 0-based position within that list. A snippet's
/// original per-list score is recorded at the index of the list it came
/// from; lists it didn't appear in leave that slot at `0.0`.
#[must_use]
pub fn fuse(lists: &[RankedList], k: f64) -> FusionResult {
    let k = effective_k(k);
    let mut accum: HashMap<String, (f64, Vec<f64>)> = HashMap::new();

    for (list_idx, list) in lists.iter().enumerate() {
        for (rank, item) in list.iter().enumerate() {
            let entry = accum
                .entry(item.snippet_id.clone())
                .or_insert_with(|| (0.0, vec![0.0; lists.len()]));
            entry.0 += 1.0 / (k + rank as f64);
            entry.1[list_idx] = item.score;
        }
    }

    let mut hits: Vec<FusedHit> = accum
        .into_iter()
        .map(|(snippet_id, (fused_score, original_scores))| FusedHit {
            snippet_id,
            fused_score,
            original_scores,
        })
        .collect();

    sort_fused(&mut hits);
    FusionResult { hits }
}

/// [`fuse`], truncated to at most `top_k` elements. `top_k <= 0` returns
/// every fused hit.
#[must_use]
pub fn fuse_top_k(lists: &[RankedList], k: f64, top_k: i64) -> FusionResult {
    let mut result = fuse(lists, k);
    if top_k > 0 {
        #[allow(clippy::cast_sign_loss)]
        result.hits.truncate(top_k as usize);
    }
    result
}

/// Descending by fused score; ties broken by ascending snippet id so that
/// identical input always yields identical output.
fn sort_fused(hits: &mut [FusedHit]) {
    hits.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.snippet_id.cmp(&b.snippet_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use kodit_core::fusion::RankedItem;

    fn item(id: &str, score: f64) -> RankedItem {
        RankedItem { snippet_id: id.to_owned(), score }
    }

    #[test]
    fn single_list_preserves_order() {
        let list = vec![item("a", 3.0), item("b", 2.0), item("c", 1.0)];
        let result = fuse(&[list], 60.0);
        let ids: Vec<_> = result.hits.iter().map(|h| h.snippet_id.clone()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn overlap_across_lists_accumulates() {
        let list_a = vec![item("a", 1.0), item("b", 0.9)];
        let list_b = vec![item("b", 1.0), item("a", 0.8)];
        let result = fuse(&[list_a, list_b], 60.0);
        // both appear at rank 0 in one list and rank 1 in the other: tied fused score.
        assert_eq!(result.hits.len(), 2);
        assert!((result.hits[0].fused_score - result.hits[1].fused_score).abs() < 1e-12);
        // ties break by ascending snippet id.
        assert_eq!(result.hits[0].snippet_id, "a");
        assert_eq!(result.hits[1].snippet_id, "b");
    }

    #[test]
    fn ties_break_by_ascending_snippet_id() {
        // each in its own singleton list: all land at rank 0, so their fused
        // scores are exactly tied and only the id ordering can disambiguate.
        let lists = vec![vec![item("c", 1.0)], vec![item("a", 1.0)], vec![item("b", 1.0)]];
        let result = fuse(&lists, 60.0);
        let ids: Vec<_> = result.hits.iter().map(|h| h.snippet_id.clone()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn original_scores_aligned_by_list_index() {
        let list_a = vec![item("a", 5.0)];
        let list_b = vec![item("a", 9.0)];
        let result = fuse(&[list_a, list_b], 60.0);
        assert_eq!(result.hits[0].original_scores, vec![5.0, 9.0]);
    }

    #[test]
    fn missing_appearance_leaves_zero_slot() {
        let list_a = vec![item("a", 5.0), item("b", 4.0)];
        let list_b = vec![item("a", 9.0)];
        let result = fuse(&[list_a, list_b], 60.0);
        let b = result.hits.iter().find(|h| h.snippet_id == "b").unwrap();
        assert_eq!(b.original_scores, vec![4.0, 0.0]);
    }

    #[test]
    fn non_positive_k_coerces_to_default() {
        let list = vec![item("a", 1.0)];
        let explicit = fuse(&[list.clone()], DEFAULT_RRF_K);
        let coerced_zero = fuse(&[list.clone()], 0.0);
        let coerced_neg = fuse(&[list], -5.0);
        assert_eq!(explicit.hits[0].fused_score, coerced_zero.hits[0].fused_score);
        assert_eq!(explicit.hits[0].fused_score, coerced_neg.hits[0].fused_score);
    }

    #[test]
    fn top_k_truncates() {
        let list = vec![item("a", 3.0), item("b", 2.0), item("c", 1.0)];
        let result = fuse_top_k(&[list], 60.0, 2);
        assert_eq!(result.hits.len(), 2);
    }

    #[test]
    fn non_positive_top_k_returns_all() {
        let list = vec![item("a", 3.0), item("b", 2.0)];
        let result = fuse_top_k(&[list], 60.0, 0);
        assert_eq!(result.hits.len(), 2);
    }

    #[test]
    fn empty_lists_produce_empty_result() {
        let result = fuse(&[], 60.0);
        assert!(result.hits.is_empty());
    }

    proptest::proptest! {
        #[test]
        fn fusion_is_deterministic_across_runs(
            ids in proptest::collection::vec("[a-c]", 1..6),
            scores in proptest::collection::vec(0.0f64..10.0, 1..6),
        ) {
            let n = ids.len().min(scores.len());
            let list: RankedList = (0..n)
                .map(|i| RankedItem { snippet_id: ids[i].clone(), score: scores[i] })
                .collect();
            let first = fuse(&[list.clone()], 60.0);
            let second = fuse(&[list], 60.0);
            proptest::prop_assert_eq!(
                first.hits.iter().map(|h| h.snippet_id.clone()).collect::<Vec<_>>(),
                second.hits.iter().map(|h| h.snippet_id.clone()).collect::<Vec<_>>()
            );
        }

        #[test]
        fn fused_order_is_sorted_descending(
            scores in proptest::collection::vec(0.0f64..10.0, 0..8),
        ) {
            let list: RankedList = scores
                .into_iter()
                .enumerate()
                .map(|(i, score)| RankedItem { snippet_id: format!("s{i}"), score })
                .collect();
            let result = fuse(&[list], 60.0);
            for pair in result.hits.windows(2) {
                proptest::prop_assert!(pair[0].fused_score >= pair[1].fused_score);
            }
        }
    }
}
