//! Shared value types for rank fusion. The fusion algorithm itself
//! (`fuse_rrf`) lives in `kodit-search-core`, which depends on this crate;
//! these types are here so both the search coordinator and the queue's
//! search-facing handlers can speak the same vocabulary without a
//! dependency cycle.

use serde::{Deserialize, Serialize};

/// One entry in a single ranked input list. `rank` is implicit — it is the
/// item's 0-based position in the list, not stored on the item itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub snippet_id: String,
    /// The originating backend's native score (BM25 score, cosine
    /// similarity, …), preserved for explainability but not used directly
    /// in the fused ranking.
    pub score: f64,
}

/// A single ranked result list, e.g. one backend's search output.
pub type RankedList = Vec<RankedItem>;

/// One fused result: a snippet id, its accumulated RRF score, and its
/// original score from each input list aligned by list index (a list the
/// snippet did not appear in contributes `0.0` at that index).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedHit {
    pub snippet_id: String,
    pub fused_score: f64,
    pub original_scores: Vec<f64>,
}

/// The output of a fusion call: fused hits in final (sorted, truncated)
/// order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub hits: Vec<FusedHit>,
}
