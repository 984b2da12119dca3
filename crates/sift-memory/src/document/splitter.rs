use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::types::{Chunk, ChunkId, Metadata};

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s+").expect("sentence end regex is valid"));

/// Sentence boundary detection strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segmenter {
    /// UAX #29 sentence boundaries.
    #[default]
    Unicode,
    /// Split after runs of `.`, `!` or `?` followed by whitespace.
    Punctuation,
}

impl Segmenter {
    /// Trimmed, non-empty sentences of `text` in order.
    #[must_use]
    pub fn segment(self, text: &str) -> Vec<&str> {
        match self {
            Self::Unicode => text
                .unicode_sentences()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect(),
            Self::Punctuation => punctuation_sentences(text),
        }
    }
}

fn punctuation_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        sentences.push(&text[start..m.end()]);
        start = m.end();
    }
    sentences.push(&text[start..]);
    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Chunk sizes are counted in whitespace-separated words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    pub target_size: usize,
    pub overlap: usize,
    pub segmenter: Segmenter,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            target_size: 400,
            overlap: 50,
            segmenter: Segmenter::Unicode,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    #[must_use]
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Split `text` into overlapping chunks with fresh ids and empty metadata.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        self.split_texts(text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                id: ChunkId::random(),
                text,
                index,
                metadata: Metadata::new(),
            })
            .collect()
    }

    /// Chunk texts only. Deterministic for a given input and config.
    #[must_use]
    pub fn split_texts(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let size = self.config.target_size.max(1);
        let overlap = self.config.overlap.min(size - 1);
        let sentences = self.config.segmenter.segment(text);

        let mut chunks = Vec::new();
        let mut buffer: Vec<String> = Vec::new();
        let mut words = 0usize;
        // buffer holds nothing but the overlap carried from the previous chunk
        let mut seeded = false;
        let mut i = 0;

        while i < sentences.len() {
            let sentence = sentences[i];
            let count = sentence.split_whitespace().count();

            if count >= size {
                if !seeded && !buffer.is_empty() {
                    chunks.push(join(&buffer));
                }
                buffer.clear();
                words = 0;
                seeded = false;
                windows(sentence, size, size - overlap, &mut chunks);
                i += 1;
            } else if words + count <= size {
                buffer.push(sentence.to_owned());
                words += count;
                seeded = false;
                i += 1;
            } else if seeded {
                // The carried overlap alone leaves no room for the next sentence:
                // shrink it until the sentence fits.
                let (seed, seed_words) = tail_words(&buffer, size - count);
                buffer = vec![seed];
                words = seed_words;
            } else {
                chunks.push(join(&buffer));
                let (seed, seed_words) = tail_words(&buffer, overlap);
                if seed_words == 0 {
                    buffer.clear();
                } else {
                    buffer = vec![seed];
                    seeded = true;
                }
                words = seed_words;
            }
        }

        if !seeded && !buffer.is_empty() {
            chunks.push(join(&buffer));
        }
        chunks
    }
}

fn join(sentences: &[String]) -> String {
    sentences.join(" ").trim().to_owned()
}

/// Last `n` words across `sentences`, joined with single spaces.
fn tail_words(sentences: &[String], n: usize) -> (String, usize) {
    let words: Vec<&str> = sentences.iter().flat_map(|s| s.split_whitespace()).collect();
    let tail = &words[words.len().saturating_sub(n)..];
    (tail.join(" "), tail.len())
}

fn windows(sentence: &str, size: usize, stride: usize, out: &mut Vec<String>) {
    let words: Vec<&str> = sentence.split_whitespace().collect();
    let mut start = 0;
    while start < words.len() {
        let end = (start + size).min(words.len());
        out.push(words[start..end].join(" "));
        start += stride;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn splitter(target_size: usize, overlap: usize) -> TextSplitter {
        TextSplitter::new(SplitterConfig {
            target_size,
            overlap,
            segmenter: Segmenter::Unicode,
        })
    }

    fn word_counts(chunks: &[String]) -> Vec<usize> {
        chunks.iter().map(|c| c.split_whitespace().count()).collect()
    }

    fn shared_words(a: &str, b: &str, overlap: usize) -> usize {
        let a: Vec<&str> = a.split_whitespace().collect();
        let tail: HashSet<&str> = a[a.len().saturating_sub(overlap)..].iter().copied().collect();
        b.split_whitespace()
            .take(overlap)
            .filter(|w| tail.contains(w))
            .count()
    }

    #[test]
    fn empty_and_whitespace_input() {
        let s = TextSplitter::default();
        assert!(s.split("").is_empty());
        assert!(s.split("   \n\t ").is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = TextSplitter::default().split("Short text. Still short.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Short text. Still short.");
        assert_eq!(chunks[0].index, 0);
        assert!(chunks[0].metadata.is_empty());
    }

    #[test]
    fn single_letter_sentences_overlap_by_one() {
        let chunks = splitter(2, 1).split_texts("A. B. C. D. E.");
        assert_eq!(chunks, vec!["A. B.", "B. C.", "C. D.", "D. E."]);
        for pair in chunks.windows(2) {
            assert_eq!(shared_words(&pair[0], &pair[1], 1), 1);
        }
    }

    #[test]
    fn zero_overlap_shares_nothing() {
        let chunks = splitter(2, 0).split_texts("A. B. C. D. E.");
        assert_eq!(chunks, vec!["A. B.", "C. D.", "E."]);
    }

    #[test]
    fn overlap_is_clamped_below_target() {
        let chunks = splitter(3, 10).split_texts("One two. Three four. Five six. Seven eight.");
        assert!(!chunks.is_empty());
        assert!(word_counts(&chunks).iter().all(|&n| n <= 3));
    }

    #[test]
    fn target_size_one_gives_one_word_per_chunk() {
        let chunks = splitter(1, 0).split_texts("Alpha beta. Gamma.");
        assert_eq!(chunks, vec!["Alpha", "beta.", "Gamma."]);
    }

    #[test]
    fn oversized_sentence_is_windowed() {
        let sentence = (0..10).map(|i| format!("W{i}")).collect::<Vec<_>>().join(" ");
        let chunks = splitter(4, 1).split_texts(&format!("Intro here. {sentence}."));
        assert_eq!(chunks[0], "Intro here.");
        let windows = &chunks[1..];
        assert!(windows.len() > 1);
        assert!(word_counts(windows).iter().all(|&n| n <= 4));
        assert_eq!(windows[0], "W0 W1 W2 W3");
        assert_eq!(windows[1], "W3 W4 W5 W6");
    }

    #[test]
    fn window_run_starts_and_ends_without_carried_words() {
        let sentence = (0..10).map(|i| format!("W{i}")).collect::<Vec<_>>().join(" ");
        let chunks = splitter(4, 1).split_texts(&format!("Aa bb. {sentence}. Cc dd."));
        assert_eq!(chunks[0], "Aa bb.");
        assert_eq!(chunks[1], "W0 W1 W2 W3");
        assert_eq!(chunks.last().map(String::as_str), Some("Cc dd."));
        assert_eq!(shared_words(&chunks[0], &chunks[1], 1), 0);
        let before_last = &chunks[chunks.len() - 2];
        assert_eq!(shared_words(before_last, "Cc dd.", 1), 0);
    }

    #[test]
    fn sentence_of_exact_target_with_overlap_splits() {
        let chunks = splitter(3, 1).split_texts("aa bb cc.");
        assert_eq!(chunks, vec!["aa bb cc.", "cc."]);
    }

    #[test]
    fn overlap_seed_shrinks_when_next_sentence_does_not_fit() {
        let text = "Aa bb. Cc dd. Ee ff. Gg hh.";
        let chunks = splitter(4, 3).split_texts(text);
        assert!(word_counts(&chunks).iter().all(|&n| n <= 4));
        assert_eq!(chunks.first().map(String::as_str), Some("Aa bb. Cc dd."));
        assert!(chunks.last().is_some_and(|c| c.ends_with("Gg hh.")));
        for pair in chunks.windows(2) {
            assert!(shared_words(&pair[0], &pair[1], 3) > 0);
        }
    }

    #[test]
    fn indices_are_sequential_and_ids_unique() {
        let text = "One two three. Four five six. Seven eight nine. Ten eleven twelve.";
        let chunks = splitter(4, 1).split(text);
        assert!(chunks.len() > 1);
        let ids: HashSet<_> = chunks.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids.len(), chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn boundaries_are_deterministic_ids_are_not() {
        let text = "The first sentence is here. A second one follows it. Then a third.";
        let s = splitter(6, 2);
        let a = s.split(text);
        let b = s.split(text);
        let texts = |cs: &[Chunk]| cs.iter().map(|c| c.text.clone()).collect::<Vec<_>>();
        assert_eq!(texts(&a), texts(&b));
        assert_ne!(a[0].id, b[0].id);
    }

    #[test]
    fn punctuation_segmenter_keeps_trailing_clause() {
        let sentences = Segmenter::Punctuation.segment("Really?! Yes. And then no trailing stop");
        assert_eq!(sentences, vec!["Really?!", "Yes.", "And then no trailing stop"]);
    }

    #[test]
    fn unicode_segmenter_splits_sentences() {
        let sentences = Segmenter::Unicode.segment("Is this a question? Yes it is. Wow!");
        assert_eq!(sentences, vec!["Is this a question?", "Yes it is.", "Wow!"]);
    }

    #[test]
    fn segmenter_deserializes_lowercase() {
        let s: Segmenter = serde_json::from_str("\"punctuation\"").unwrap();
        assert_eq!(s, Segmenter::Punctuation);
    }

    mod proptest_splitter {
        use super::*;
        use proptest::prelude::*;

        fn sentence(max_words: usize) -> impl Strategy<Value = String> {
            prop::collection::vec("[a-z]{1,6}", 1..max_words)
                .prop_map(|words| format!("{}.", words.join(" ")))
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(500))]

            #[test]
            fn split_never_panics(
                content in "\\PC{0,2000}",
                target_size in 0usize..200,
                overlap in 0usize..300,
                punctuation in proptest::bool::ANY,
            ) {
                let segmenter = if punctuation { Segmenter::Punctuation } else { Segmenter::Unicode };
                let s = TextSplitter::new(SplitterConfig { target_size, overlap, segmenter });
                let _ = s.split(&content);
            }

            #[test]
            fn chunks_bounded_and_non_empty(
                content in "[a-z.!? ]{1,800}",
                target_size in 1usize..50,
                overlap in 0usize..60,
            ) {
                let s = TextSplitter::new(SplitterConfig {
                    target_size,
                    overlap,
                    segmenter: Segmenter::Punctuation,
                });
                let chunks = s.split(&content);
                for (i, chunk) in chunks.iter().enumerate() {
                    prop_assert_eq!(chunk.index, i);
                    prop_assert!(!chunk.text.is_empty());
                    prop_assert!(chunk.word_count() <= target_size);
                }
            }

            #[test]
            fn adjacent_chunks_share_words(
                sentences in prop::collection::vec(sentence(8), 1..40),
                overlap in 1usize..8,
            ) {
                let target_size = 8;
                let s = TextSplitter::new(SplitterConfig {
                    target_size,
                    overlap,
                    segmenter: Segmenter::Punctuation,
                });
                let chunks = s.split_texts(&sentences.join(" "));
                for pair in chunks.windows(2) {
                    prop_assert!(shared_words(&pair[0], &pair[1], overlap) > 0);
                }
            }

            #[test]
            fn oversized_sentence_always_splits(
                words in prop::collection::vec("[a-z]{1,6}", 2..200),
                overlap in 0usize..10,
            ) {
                let target_size = words.len() - 1;
                let s = TextSplitter::new(SplitterConfig {
                    target_size,
                    overlap,
                    segmenter: Segmenter::Punctuation,
                });
                let chunks = s.split_texts(&words.join(" "));
                prop_assert!(chunks.len() > 1);
                prop_assert!(word_counts(&chunks).iter().all(|&n| n <= target_size));
            }

            #[test]
            fn same_input_same_boundaries(
                content in "[a-zA-Z.!? ]{1,600}",
                target_size in 1usize..40,
                overlap in 0usize..20,
            ) {
                let s = TextSplitter::new(SplitterConfig {
                    target_size,
                    overlap,
                    segmenter: Segmenter::Unicode,
                });
                prop_assert_eq!(s.split_texts(&content), s.split_texts(&content));
            }
        }
    }
}
