//! The closed set of operation identifiers workflows are built from.
//!
//! `Operation` is an interned string from a fixed vocabulary rather than a
//! free-form `String`: every task in the queue carries one, every handler is
//! registered against one, and every prescribed workflow (see
//! `kodit_queue::workflow`) is just an ordered list of these.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single operation in the closed vocabulary the queue and workflows are
/// built from. New variants require updating `Workflow::all()` in
/// `kodit-queue` so startup handler validation stays exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    RepoClone,
    RepoSync,
    CommitScan,
    CommitRescan,
    CommitExtractSnippets,
    CommitExtractExamples,
    CommitCreateBm25Index,
    CommitCreateCodeEmbeddings,
    CommitCreateExampleCodeEmbeddings,
    CommitCreateSummaryEnrichment,
    CommitCreateExampleSummary,
    CommitCreateSummaryEmbeddings,
    CommitCreateExampleSummaryEmbeddings,
    CommitCreatePublicApiDocs,
    CommitCreateArchitectureEnrichment,
    CommitCreateCommitDescription,
    CommitCreateDatabaseSchema,
    CommitCreateCookbook,
    CommitGenerateWiki,
}

impl Operation {
    /// Every known operation, in no particular order. Used by
    /// `Workflow::all()` to validate handler registration at startup.
    pub const ALL: &'static [Self] = &[
        Self::RepoClone,
        Self::RepoSync,
        Self::CommitScan,
        Self::CommitRescan,
        Self::CommitExtractSnippets,
        Self::CommitExtractExamples,
        Self::CommitCreateBm25Index,
        Self::CommitCreateCodeEmbeddings,
        Self::CommitCreateExampleCodeEmbeddings,
        Self::CommitCreateSummaryEnrichment,
        Self::CommitCreateExampleSummary,
        Self::CommitCreateSummaryEmbeddings,
        Self::CommitCreateExampleSummaryEmbeddings,
        Self::CommitCreatePublicApiDocs,
        Self::CommitCreateArchitectureEnrichment,
        Self::CommitCreateCommitDescription,
        Self::CommitCreateDatabaseSchema,
        Self::CommitCreateCookbook,
        Self::CommitGenerateWiki,
    ];

    /// The stable string identifier used in dedup keys, trackable status
    /// ids, and wire payloads (e.g. `"repo.clone"`, `"commit.scan"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RepoClone => "repo.clone",
            Self::RepoSync => "repo.sync",
            Self::CommitScan => "commit.scan",
            Self::CommitRescan => "commit.rescan",
            Self::CommitExtractSnippets => "commit.extract_snippets",
            Self::CommitExtractExamples => "commit.extract_examples",
            Self::CommitCreateBm25Index => "commit.create_bm25_index",
            Self::CommitCreateCodeEmbeddings => "commit.create_code_embeddings",
            Self::CommitCreateExampleCodeEmbeddings => "commit.create_example_code_embeddings",
            Self::CommitCreateSummaryEnrichment => "commit.create_summary_enrichment",
            Self::CommitCreateExampleSummary => "commit.create_example_summary",
            Self::CommitCreateSummaryEmbeddings => "commit.create_summary_embeddings",
            Self::CommitCreateExampleSummaryEmbeddings => {
                "commit.create_example_summary_embeddings"
            }
            Self::CommitCreatePublicApiDocs => "commit.create_public_api_docs",
            Self::CommitCreateArchitectureEnrichment => "commit.create_architecture_enrichment",
            Self::CommitCreateCommitDescription => "commit.create_commit_description",
            Self::CommitCreateDatabaseSchema => "commit.create_database_schema",
            Self::CommitCreateCookbook => "commit.create_cookbook",
            Self::CommitGenerateWiki => "commit.generate_wiki",
        }
    }

    /// Parse an operation from its stable string form. Returns `None` for
    /// anything outside the closed vocabulary.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.as_str() == s)
    }

    /// `true` for operations whose payload is keyed by a repository id and
    /// whose workflow begins before any specific commit is known
    /// (`repo.*`), derived from the `repo.` naming prefix.
    #[must_use]
    pub const fn is_repository_scoped(self) -> bool {
        matches!(self, Self::RepoClone | Self::RepoSync)
    }

    /// `true` for operations that act on a single commit (`commit.*`),
    /// derived from the `commit.` naming prefix.
    #[must_use]
    pub const fn is_commit_scoped(self) -> bool {
        !self.is_repository_scoped()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
