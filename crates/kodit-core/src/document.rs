//! The document/embedding model shared by every search backend.

use serde::{Deserialize, Serialize};

/// The input unit for indexing. Snippet ids are the linking primary key
/// across the BM25 store, every vector store, and any downstream join —
/// nothing else identifies a snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable, content-addressed identifier for this snippet.
    pub snippet_id: String,
    /// The text to be indexed/embedded.
    pub text: String,
}

impl Document {
    /// `true` when either the id or the text is blank — such documents are
    /// filtered out before indexing rather than erroring (§4.C).
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.snippet_id.trim().is_empty() || self.text.trim().is_empty()
    }
}

/// Which vector space an embedding belongs to. A snippet may have one
/// embedding of each type; the hybrid coordinator queries `Code` against
/// `codeQuery` and `Summary` against `textQuery` (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingType {
    Code,
    Summary,
}

impl EmbeddingType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Summary => "summary",
        }
    }
}

impl std::fmt::Display for EmbeddingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dense vector for one snippet in one embedding type's vector space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub snippet_id: String,
    pub embedding_type: EmbeddingType,
    pub vector: Vec<f32>,
}
