//! Prescribed operation sequences.
//!
//! A workflow is nothing more than an ordered list of [`Operation`]s; all
//! the sequencing guarantees (§4.E "Failure and ordering guarantees") fall
//! out of handing that list to
//! [`Queue::enqueue_operations`](crate::queue::Queue::enqueue_operations),
//! which assigns strictly decreasing priorities. This module owns no state
//! and talks to no database — it is pure list-building logic gated by a
//! profile flag.

use kodit_core::operation::Operation;

/// Which optional steps a workflow includes. Mirrors `Config::profile_examples`
/// / `Config::profile_enrichments` (`kodit-core`): examples and LLM-driven
/// enrichment stages are expensive, and some deployments skip them entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Profile {
    pub examples: bool,
    pub enrichments: bool,
}

impl Profile {
    #[must_use]
    pub const fn new(examples: bool, enrichments: bool) -> Self {
        Self { examples, enrichments }
    }

    #[must_use]
    pub const fn all() -> Self {
        Self { examples: true, enrichments: true }
    }
}

/// A named, prescribed sequence of operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    CreateNewRepository,
    SyncRepository,
    ScanAndIndexCommit,
    IndexCommit,
    RescanCommit,
}

impl Workflow {
    /// The ordered operation list this workflow expands to under `profile`.
    #[must_use]
    pub fn operations(self, profile: Profile) -> Vec<Operation> {
        match self {
            Self::CreateNewRepository => vec![Operation::RepoClone],
            Self::SyncRepository => vec![Operation::RepoClone, Operation::RepoSync],
            Self::ScanAndIndexCommit => {
                let mut ops = vec![Operation::CommitScan];
                ops.extend(index_commit_steps(profile));
                ops
            }
            Self::IndexCommit => index_commit_steps(profile),
            Self::RescanCommit => {
                let mut ops = vec![Operation::CommitRescan];
                ops.extend(index_commit_steps(profile));
                ops
            }
        }
    }

    /// Every workflow, used by [`all_operations`] for startup validation.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::CreateNewRepository,
            Self::SyncRepository,
            Self::ScanAndIndexCommit,
            Self::IndexCommit,
            Self::RescanCommit,
        ]
    }
}

/// The shared tail common to `ScanAndIndexCommit`, `IndexCommit`, and
/// `RescanCommit` (everything after the scan/rescan step).
fn index_commit_steps(profile: Profile) -> Vec<Operation> {
    let mut ops = vec![
        Operation::CommitExtractSnippets,
    ];
    if profile.examples {
        ops.push(Operation::CommitExtractExamples);
    }
    ops.push(Operation::CommitCreateBm25Index);
    ops.push(Operation::CommitCreateCodeEmbeddings);
    if profile.examples {
        ops.push(Operation::CommitCreateExampleCodeEmbeddings);
    }
    if profile.enrichments && profile.examples {
        ops.push(Operation::CommitCreateSummaryEnrichment);
        ops.push(Operation::CommitCreateExampleSummary);
    }
    if profile.enrichments {
        ops.push(Operation::CommitCreateSummaryEmbeddings);
    }
    if profile.enrichments && profile.examples {
        ops.push(Operation::CommitCreateExampleSummaryEmbeddings);
    }
    ops.push(Operation::CommitCreatePublicApiDocs);
    if profile.enrichments {
        ops.push(Operation::CommitCreateArchitectureEnrichment);
        ops.push(Operation::CommitCreateCommitDescription);
        ops.push(Operation::CommitCreateDatabaseSchema);
        ops.push(Operation::CommitCreateCookbook);
        ops.push(Operation::CommitGenerateWiki);
    }
    ops
}

/// The deduplicated union of every workflow's operations under the fullest
/// profile (`examples && enrichments`), the set handler registration must
/// cover so startup can fail fast on a missing handler rather than later,
/// mid-workflow.
#[must_use]
pub fn all_operations() -> Vec<Operation> {
    let mut seen = std::collections::HashSet::new();
    let mut ops = Vec::new();
    for workflow in Workflow::all() {
        for op in workflow.operations(Profile::all()) {
            if seen.insert(op) {
                ops.push(op);
            }
        }
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_new_repository_is_just_clone() {
        assert_eq!(
            Workflow::CreateNewRepository.operations(Profile::default()),
            vec![Operation::RepoClone]
        );
    }

    #[test]
    fn sync_repository_is_clone_then_sync() {
        assert_eq!(
            Workflow::SyncRepository.operations(Profile::default()),
            vec![Operation::RepoClone, Operation::RepoSync]
        );
    }

    #[test]
    fn index_commit_is_scan_and_index_commit_without_the_scan_step() {
        let profile = Profile::all();
        let scan_and_index = Workflow::ScanAndIndexCommit.operations(profile);
        let index_only = Workflow::IndexCommit.operations(profile);
        assert_eq!(scan_and_index[0], Operation::CommitScan);
        assert_eq!(&scan_and_index[1..], index_only.as_slice());
    }

    #[test]
    fn rescan_commit_prepends_rescan_instead_of_scan() {
        let profile = Profile::all();
        let scan_and_index = Workflow::ScanAndIndexCommit.operations(profile);
        let rescan = Workflow::RescanCommit.operations(profile);
        assert_eq!(rescan[0], Operation::CommitRescan);
        assert_eq!(&scan_and_index[1..], &rescan[1..]);
    }

    #[test]
    fn minimal_profile_drops_every_optional_step() {
        let ops = Workflow::ScanAndIndexCommit.operations(Profile::new(false, false));
        assert!(!ops.contains(&Operation::CommitExtractExamples));
        assert!(!ops.contains(&Operation::CommitCreateExampleCodeEmbeddings));
        assert!(!ops.contains(&Operation::CommitCreateSummaryEnrichment));
        assert!(!ops.contains(&Operation::CommitCreateExampleSummary));
        assert!(!ops.contains(&Operation::CommitCreateSummaryEmbeddings));
        assert!(!ops.contains(&Operation::CommitCreateExampleSummaryEmbeddings));
        assert!(!ops.contains(&Operation::CommitCreateArchitectureEnrichment));
        assert!(!ops.contains(&Operation::CommitCreateCommitDescription));
        assert!(!ops.contains(&Operation::CommitCreateDatabaseSchema));
        assert!(!ops.contains(&Operation::CommitCreateCookbook));
        assert!(!ops.contains(&Operation::CommitGenerateWiki));
        // Always-on steps survive regardless of profile.
        assert!(ops.contains(&Operation::CommitExtractSnippets));
        assert!(ops.contains(&Operation::CommitCreateBm25Index));
        assert!(ops.contains(&Operation::CommitCreateCodeEmbeddings));
        assert!(ops.contains(&Operation::CommitCreatePublicApiDocs));
    }

    #[test]
    fn enrichments_without_examples_skips_example_specific_steps() {
        let ops = Workflow::ScanAndIndexCommit.operations(Profile::new(false, true));
        assert!(!ops.contains(&Operation::CommitCreateSummaryEnrichment));
        assert!(!ops.contains(&Operation::CommitCreateExampleSummary));
        assert!(!ops.contains(&Operation::CommitCreateExampleSummaryEmbeddings));
        // Non-example-gated enrichment step still appears.
        assert!(ops.contains(&Operation::CommitCreateSummaryEmbeddings));
        assert!(ops.contains(&Operation::CommitCreateArchitectureEnrichment));
    }

    #[test]
    fn all_operations_covers_the_full_operation_vocabulary() {
        let mut covered: Vec<Operation> = all_operations();
        covered.sort_by_key(|op| op.as_str());
        let mut expected: Vec<Operation> = Operation::ALL.to_vec();
        expected.sort_by_key(|op| op.as_str());
        assert_eq!(covered, expected, "every known operation must appear in some workflow");
    }

    #[test]
    fn all_operations_has_no_duplicates() {
        let ops = all_operations();
        let mut seen = std::collections::HashSet::new();
        for op in ops {
            assert!(seen.insert(op), "duplicate operation {op} in all_operations()");
        }
    }
}
