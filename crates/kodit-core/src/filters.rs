//! Optional predicates shared by every search backend.

use serde::{Deserialize, Serialize};

/// A bundle of optional predicates narrowing a BM25/vector search. Every
/// field is optional; an all-`None`/empty `SearchFilters` is unfiltered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub language: Option<String>,
    pub author: Option<String>,
    /// Microseconds since epoch; inclusive lower bound.
    pub created_after: Option<i64>,
    /// Microseconds since epoch; inclusive upper bound.
    pub created_before: Option<i64>,
    pub source_repo_id: Option<i64>,
    /// A path prefix or glob; backends that cannot evaluate globs natively
    /// fall back to prefix matching.
    pub file_path_glob: Option<String>,
    pub enrichment_types: Vec<String>,
    pub enrichment_subtypes: Vec<String>,
    pub commit_shas: Vec<String>,
}

impl SearchFilters {
    /// `true` when every predicate is unset — backends can skip filter
    /// evaluation entirely in this case.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.language.is_none()
            && self.author.is_none()
            && self.created_after.is_none()
            && self.created_before.is_none()
            && self.source_repo_id.is_none()
            && self.file_path_glob.is_none()
            && self.enrichment_types.is_empty()
            && self.enrichment_subtypes.is_empty()
            && self.commit_shas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty() {
        assert!(SearchFilters::default().is_empty());
    }

    #[test]
    fn any_single_field_makes_it_non_empty() {
        let mut f = SearchFilters::default();
        f.language = Some("rust".into());
        assert!(!f.is_empty());

        let mut f = SearchFilters::default();
        f.commit_shas.push("deadbeef".into());
        assert!(!f.is_empty());
    }
}
