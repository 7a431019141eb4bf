//! The two external collaborators §6 names but leaves opaque to the core:
//! `GitAdapter` (clone/update/scan a repository on disk) and `LlmEnricher`
//! (turn a commit's extracted snippets into prose enrichments). Neither
//! trait is implemented by the core crates — handlers depend on them as
//! injected collaborators so they can be tested against an in-memory fake
//! without a real git checkout or LLM call.

use kodit_core::error::{Error, Result};
use std::path::Path;
use std::process::Command;

/// One file as seen by a commit scan: its repo-relative path and raw
/// contents. Extraction (splitting into snippets) happens downstream of
/// this trait, in the `commit.extract_snippets` handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedFile {
    pub path: String,
    pub content: String,
}

/// Git operations the core depends on but does not implement (§6 "Git
/// adapter (external)"). `ShellGitAdapter` is the production default,
/// shelling out to the system `git` binary — matching this lineage's
/// preference for driving real CLIs over embedding a git implementation.
pub trait GitAdapter: Send + Sync {
    /// Clone `url` into `dest`, creating `dest` if necessary.
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<()>;

    /// Fetch and fast-forward `repo` (a local clone) to its remote's head.
    fn update(&self, repo: &Path) -> Result<()>;

    /// Every file present in `repo` at `commit_sha`.
    fn commit_files(&self, repo: &Path, commit_sha: &str) -> Result<Vec<String>>;

    /// The unified diff introduced by `commit_sha` relative to its first
    /// parent.
    fn commit_diff(&self, repo: &Path, commit_sha: &str) -> Result<String>;

    /// Read every file at `commit_sha`, returning path + content pairs.
    /// This is what `commit.scan` calls to populate the snippet store.
    fn scan_commit(&self, repo: &Path, commit_sha: &str) -> Result<Vec<ScannedFile>>;
}

/// Drives the real `git` binary via `std::process::Command`, matching the
/// lineage's general preference for shelling out to well-tested external
/// tools over re-implementing their protocols in-process.
#[derive(Debug, Clone, Default)]
pub struct ShellGitAdapter {
    git_binary: String,
}

impl ShellGitAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self { git_binary: "git".to_owned() }
    }

    fn run(&self, repo: Option<&Path>, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.git_binary);
        if let Some(repo) = repo {
            cmd.current_dir(repo);
        }
        cmd.args(args);
        let output = cmd
            .output()
            .map_err(|e| Error::Internal(format!("failed to spawn git {args:?}: {e}")))?;
        if !output.status.success() {
            return Err(Error::Internal(format!(
                "git {args:?} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|e| Error::Internal(format!("git {args:?} produced non-utf8 output: {e}")))
    }
}

impl GitAdapter for ShellGitAdapter {
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        let dest_str = dest.to_string_lossy().into_owned();
        self.run(None, &["clone", url, &dest_str]).map(|_| ())
    }

    fn update(&self, repo: &Path) -> Result<()> {
        self.run(Some(repo), &["fetch", "--all", "--prune"])?;
        self.run(Some(repo), &["pull", "--ff-only"]).map(|_| ())
    }

    fn commit_files(&self, repo: &Path, commit_sha: &str) -> Result<Vec<String>> {
        let out = self.run(Some(repo), &["ls-tree", "-r", "--name-only", commit_sha])?;
        Ok(out.lines().map(str::to_owned).filter(|l| !l.is_empty()).collect())
    }

    fn commit_diff(&self, repo: &Path, commit_sha: &str) -> Result<String> {
        self.run(Some(repo), &["show", "--format=", commit_sha])
    }

    fn scan_commit(&self, repo: &Path, commit_sha: &str) -> Result<Vec<ScannedFile>> {
        let paths = self.commit_files(repo, commit_sha)?;
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let spec = format!("{commit_sha}:{path}");
            match self.run(Some(repo), &["show", &spec]) {
                Ok(content) => files.push(ScannedFile { path, content }),
                Err(_) => continue, // binary blobs and submodule gitlinks are not scannable text
            }
        }
        Ok(files)
    }
}

/// One unit of enrichment work: a snippet (or commit-level) id plus the
/// context text an LLM would need to produce prose about it. The core never
/// inspects `context` beyond passing it through.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentRequest {
    pub subject_id: String,
    pub context: String,
}

/// One enrichment result: the prose an `LlmEnricher` produced for a
/// request, matched back up by `subject_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentResponse {
    pub subject_id: String,
    pub text: String,
}

/// LLM-driven enrichment text generation (§6 "LLM enricher (external)").
/// Opaque to the core: handlers call it, the core never inspects its
/// output beyond passing it to the snippet/enrichment store. Generating
/// enrichment *text* is an explicit non-goal (§1) — `NullLlmEnricher` is
/// the production default and enrichment-generating handlers degrade to a
/// no-op rather than synthesizing content the core has no mandate to
/// produce.
pub trait LlmEnricher: Send + Sync {
    fn enrich(&self, requests: &[EnrichmentRequest]) -> Result<Vec<EnrichmentResponse>>;
}

/// Returns an empty response for every request. Production default: LLM
/// enrichment generation is explicitly out of scope, so the workflows that
/// would call an enricher just record that the step ran and move on.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLlmEnricher;

impl LlmEnricher for NullLlmEnricher {
    fn enrich(&self, _requests: &[EnrichmentRequest]) -> Result<Vec<EnrichmentResponse>> {
        Ok(Vec::new())
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::FakeGitAdapter;
    use super::*;

    #[test]
    fn null_enricher_returns_empty_for_any_input() {
        let enricher = NullLlmEnricher;
        let out = enricher
            .enrich(&[EnrichmentRequest { subject_id: "a".to_owned(), context: "fn main() {}".to_owned() }])
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn fake_git_adapter_scans_seeded_commit() {
        let adapter = FakeGitAdapter::default();
        adapter.seed("deadbeef", vec![ScannedFile { path: "a.rs".to_owned(), content: "fn a() {}".to_owned() }]);
        let files = adapter.scan_commit(Path::new("/tmp/repo"), "deadbeef").unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "a.rs");
    }

    #[test]
    fn fake_git_adapter_returns_empty_for_unknown_commit() {
        let adapter = FakeGitAdapter::default();
        assert!(adapter.scan_commit(Path::new("/tmp/repo"), "unknown").unwrap().is_empty());
    }
}
