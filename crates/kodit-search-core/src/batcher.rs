//! Token-budgeted batching of documents for embedding providers.
//!
//! Embedding providers impose two limits: a per-batch character (token
//! proxy) budget and a per-batch item count. [`Batcher`] partitions a
//! sequence of [`Document`]s into batches that respect both, truncating
//! any single document that exceeds the character budget on its own.

use kodit_core::document::Document;
use kodit_core::error::{Error, Result};

/// Immutable batching configuration. A new [`Batcher`] is produced by
/// [`Batcher::with_max_batch_size`] rather than mutating one in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Batcher {
    /// Maximum Unicode code points per document (and per batch, summed).
    /// A conservative proxy for ~5,300 tokens at ~3 chars/token on
    /// 8,192-token models at the default of 16,000.
    max_chars: usize,
    /// Maximum number of documents per batch. Default 1 (current-generation
    /// providers); historically 10 when not explicitly configured.
    max_batch_size: usize,
}

/// Default character budget per batch.
pub const DEFAULT_MAX_CHARS: usize = 16_000;
/// Default item-count budget per batch (current-generation providers).
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1;
/// The historical default item-count budget, for providers configured
/// without an explicit batch size.
pub const LEGACY_MAX_BATCH_SIZE: usize = 10;

impl Default for Batcher {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

impl Batcher {
    /// Construct a batcher with an explicit character budget.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` if `max_chars == 0` — invalid
    /// configuration is rejected at construction time, never coerced.
    pub fn new(max_chars: usize) -> Result<Self> {
        if max_chars == 0 {
            return Err(Error::InvalidInput("maxChars must be > 0".into()));
        }
        Ok(Self {
            max_chars,
            ..Self::default()
        })
    }

    /// Returns a new `Batcher` with `max_batch_size` overridden. The
    /// receiver is left unchanged (batcher configuration is immutable).
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` if `max_batch_size == 0`.
    pub fn with_max_batch_size(&self, max_batch_size: usize) -> Result<Self> {
        if max_batch_size == 0 {
            return Err(Error::InvalidInput("maxBatchSize must be > 0".into()));
        }
        Ok(Self {
            max_batch_size,
            ..*self
        })
    }

    #[must_use]
    pub const fn max_chars(&self) -> usize {
        self.max_chars
    }

    #[must_use]
    pub const fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Truncate `s` to at most `max_chars` Unicode code points, never
    /// cutting a multi-byte character. Inputs already within budget are
    /// returned unchanged (as a borrow-free owned copy).
    #[must_use]
    pub fn truncate(&self, s: &str) -> String {
        truncate_to_chars(s, self.max_chars)
    }

    /// Partition `documents` into batches respecting both the character and
    /// item-count budgets.
    ///
    /// - Empty input produces empty output.
    /// - Greedy left-to-right packing: a document is added to the current
    ///   batch if doing so keeps both `batchChars <= max_chars` and
    ///   `batch.len() < max_batch_size`; otherwise the current batch is
    ///   closed and a new one started.
    /// - A document whose own measured size already exceeds `max_chars` is
    ///   placed alone in its own batch — it can never be combined with
    ///   anything else, even though it nominally overflows.
    ///
    /// `concat(batches) == documents` always holds: this function never
    /// drops, truncates, or reorders a document; only `truncate` shortens
    /// text, and only for callers who request it separately before
    /// embedding.
    #[must_use]
    pub fn batches(&self, documents: &[Document]) -> Vec<Vec<Document>> {
        let mut result = Vec::new();
        let mut current: Vec<Document> = Vec::new();
        let mut current_chars = 0usize;

        for doc in documents {
            let measured = doc.text.chars().count().min(self.max_chars);

            if measured >= self.max_chars {
                // Oversize item: flush whatever's pending, then isolate it.
                if !current.is_empty() {
                    result.push(std::mem::take(&mut current));
                    current_chars = 0;
                }
                result.push(vec![doc.clone()]);
                continue;
            }

            let fits_chars = current_chars + measured <= self.max_chars;
            let fits_count = current.len() < self.max_batch_size;
            if !current.is_empty() && (!fits_chars || !fits_count) {
                result.push(std::mem::take(&mut current));
                current_chars = 0;
            }

            current.push(doc.clone());
            current_chars += measured;
        }

        if !current.is_empty() {
            result.push(current);
        }

        result
    }
}

fn truncate_to_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_owned();
    }
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, text: &str) -> Document {
        Document {
            snippet_id: id.to_owned(),
            text: text.to_owned(),
        }
    }

    #[test]
    fn zero_max_chars_is_rejected() {
        assert!(Batcher::new(0).is_err());
    }

    #[test]
    fn zero_max_batch_size_is_rejected() {
        let b = Batcher::default();
        assert!(b.with_max_batch_size(0).is_err());
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let b = Batcher::default();
        assert!(b.batches(&[]).is_empty());
    }

    #[test]
    fn truncate_never_cuts_a_multibyte_character() {
        let b = Batcher::new(3).unwrap();
        assert_eq!(b.truncate("日本語テスト"), "日本語");
    }

    #[test]
    fn truncate_leaves_short_strings_unchanged() {
        let b = Batcher::new(100).unwrap();
        assert_eq!(b.truncate("hi"), "hi");
    }

    #[test]
    fn truncate_utf8_emoji_boundary() {
        let b = Batcher::new(7).unwrap();
        let truncated = b.truncate("hello 🌍🌎🌏");
        assert_eq!(truncated, "hello 🌍");
        assert_eq!(truncated.chars().count(), 7);
        assert!(std::str::from_utf8(truncated.as_bytes()).is_ok());
    }

    #[test]
    fn oversize_item_is_isolated_in_its_own_batch() {
        let b = Batcher::new(20).unwrap().with_max_batch_size(10).unwrap();
        let docs = vec![doc("a", &"a".repeat(5)), doc("y", &"y".repeat(50)), doc("z", &"z".repeat(5))];
        let batches = b.batches(&docs);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].snippet_id, "a");
        assert_eq!(batches[1].len(), 1);
        assert_eq!(batches[1][0].snippet_id, "y");
        assert_eq!(batches[2].len(), 1);
        assert_eq!(batches[2][0].snippet_id, "z");
    }

    #[test]
    fn default_batch_size_one_never_combines_documents() {
        let b = Batcher::default();
        let docs = vec![doc("a", "short"), doc("b", "also short")];
        let batches = b.batches(&docs);
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn legacy_batch_size_packs_multiple_small_documents() {
        let b = Batcher::new(100)
            .unwrap()
            .with_max_batch_size(LEGACY_MAX_BATCH_SIZE)
            .unwrap();
        let docs: Vec<_> = (0..10).map(|i| doc(&i.to_string(), "x")).collect();
        let batches = b.batches(&docs);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 10);
    }

    #[test]
    fn batch_count_limit_splits_even_when_chars_fit() {
        let b = Batcher::new(1_000).unwrap().with_max_batch_size(2).unwrap();
        let docs: Vec<_> = (0..5).map(|i| doc(&i.to_string(), "x")).collect();
        let batches = b.batches(&docs);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 2);
        assert_eq!(batches[2].len(), 1);
    }

    #[test]
    fn concat_of_batches_reconstructs_input() {
        let b = Batcher::new(10).unwrap().with_max_batch_size(3).unwrap();
        let docs = vec![doc("1", "ab"), doc("2", "cd"), doc("3", "ef"), doc("4", &"x".repeat(50))];
        let batches = b.batches(&docs);
        let flattened: Vec<_> = batches.into_iter().flatten().collect();
        assert_eq!(flattened, docs);
    }

    #[test]
    fn batches_are_independent_copies() {
        let b = Batcher::default();
        let mut docs = vec![doc("1", "a")];
        let batches = b.batches(&docs);
        docs[0].text = "mutated".into();
        assert_eq!(batches[0][0].text, "a");
    }

    proptest::proptest! {
        #[test]
        fn concat_always_reconstructs_input(
            texts in proptest::collection::vec(".{0,40}", 0..20),
            max_chars in 1usize..50,
            max_batch_size in 1usize..8,
        ) {
            let docs: Vec<Document> = texts
                .into_iter()
                .enumerate()
                .map(|(i, t)| doc(&i.to_string(), &t))
                .collect();
            let b = Batcher::new(max_chars).unwrap().with_max_batch_size(max_batch_size).unwrap();
            let batches = b.batches(&docs);
            let flattened: Vec<_> = batches.iter().flatten().cloned().collect();
            proptest::prop_assert_eq!(flattened, docs);

            for batch in &batches {
                let total_chars: usize = batch.iter().map(|d| d.text.chars().count().min(max_chars)).sum();
                let is_single_oversize = batch.len() == 1
                    && batch[0].text.chars().count().min(max_chars) >= max_chars
                    && total_chars >= max_chars;
                proptest::prop_assert!(
                    is_single_oversize || (total_chars <= max_chars && batch.len() <= max_batch_size)
                );
            }
        }

        #[test]
        fn truncate_is_always_valid_utf8_prefix_within_budget(
            s in ".{0,200}",
            max_chars in 1usize..100,
        ) {
            let b = Batcher::new(max_chars).unwrap();
            let truncated = b.truncate(&s);
            proptest::prop_assert!(std::str::from_utf8(truncated.as_bytes()).is_ok());
            proptest::prop_assert!(truncated.chars().count() <= max_chars);
            proptest::prop_assert!(s.chars().collect::<Vec<_>>().starts_with(&truncated.chars().collect::<Vec<_>>()));
        }
    }
}
