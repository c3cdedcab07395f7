//! Sentence-aware text splitting with overlap
//!
//! Sizes are measured in characters. Sentences are packed greedily into
//! windows; a sentence that does not fit in one window is broken on word
//! boundaries, and a word that does not fit is cut hard.

use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Error, Result};

/// A segment with its character range in the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
}

/// Splits text into overlapping windows of at most `chunk_size` characters
#[derive(Debug, Clone)]
pub struct SentenceSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl SentenceSplitter {
    /// Create a new splitter; requires `chunk_size > 0` and `overlap < chunk_size`
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".into()));
        }
        if overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split text into non-empty segments
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_spans(text).into_iter().map(|span| span.text).collect()
    }

    /// Split text, keeping each segment's character range
    pub fn split_spans(&self, text: &str) -> Vec<TextSpan> {
        let mut spans = Vec::new();
        let mut current = String::new();
        let mut current_start = 0usize;
        let mut current_len = 0usize;
        // set once `current` holds a unit of its own, not just overlap
        let mut fresh = false;

        for (unit_start, unit) in self.units(text) {
            let unit_len = unit.chars().count();

            if fresh && current_len + unit_len > self.chunk_size {
                push_span(&mut spans, &current, current_start);

                let tail = self.overlap_tail(&current);
                let tail_len = tail.chars().count();
                if tail_len + unit_len <= self.chunk_size {
                    current_start = current_start + current_len - tail_len;
                    current = tail;
                    current_len = tail_len;
                } else {
                    current.clear();
                    current_len = 0;
                }
            }

            if current.is_empty() {
                current_start = unit_start;
            }
            current.push_str(unit);
            current_len += unit_len;
            fresh = true;
        }

        if fresh {
            push_span(&mut spans, &current, current_start);
        }

        spans
    }

    /// Break text into contiguous pieces no longer than `chunk_size`
    fn units<'a>(&self, text: &'a str) -> Vec<(usize, &'a str)> {
        let mut units = Vec::new();
        let mut pos = 0usize;

        for sentence in text.split_sentence_bounds() {
            let sentence_len = sentence.chars().count();

            if sentence_len <= self.chunk_size {
                units.push((pos, sentence));
            } else {
                let mut word_pos = pos;
                for word in sentence.split_word_bounds() {
                    let word_len = word.chars().count();
                    if word_len <= self.chunk_size {
                        units.push((word_pos, word));
                    } else {
                        self.hard_cut(word, word_pos, word_len, &mut units);
                    }
                    word_pos += word_len;
                }
            }

            pos += sentence_len;
        }

        units
    }

    fn hard_cut<'a>(
        &self,
        word: &'a str,
        word_pos: usize,
        word_len: usize,
        units: &mut Vec<(usize, &'a str)>,
    ) {
        let boundaries: Vec<usize> = word.char_indices().map(|(i, _)| i).collect();

        for piece_start in (0..word_len).step_by(self.chunk_size) {
            let from = boundaries[piece_start];
            let to = boundaries
                .get(piece_start + self.chunk_size)
                .copied()
                .unwrap_or(word.len());
            units.push((word_pos + piece_start, &word[from..to]));
        }
    }

    /// Suffix of a finished window carried into the next one
    fn overlap_tail(&self, text: &str) -> String {
        if self.overlap == 0 {
            return String::new();
        }

        let len = text.chars().count();
        if len <= self.overlap {
            return text.to_string();
        }

        let start = text
            .char_indices()
            .nth(len - self.overlap)
            .map(|(i, _)| i)
            .unwrap_or(0);
        let tail = &text[start..];

        // Prefer starting on a sentence, then on a word
        if let Some(pos) = tail.find(". ") {
            let rest = &tail[pos + 2..];
            if !rest.trim().is_empty() {
                return rest.to_string();
            }
        }
        if let Some(pos) = tail.find(' ') {
            return tail[pos + 1..].to_string();
        }

        tail.to_string()
    }
}

impl Default for SentenceSplitter {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            overlap: 20,
        }
    }
}

fn push_span(spans: &mut Vec<TextSpan>, window: &str, window_start: usize) {
    let trimmed = window.trim();
    if trimmed.is_empty() {
        return;
    }

    let leading = window.chars().take_while(|c| c.is_whitespace()).count();
    let char_start = window_start + leading;
    spans.push(TextSpan {
        text: trimmed.to_string(),
        char_start,
        char_end: char_start + trimmed.chars().count(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLES: &[&str] = &[
        "Sky is red.",
        "The sky is red in the evening and blue in the morning. Water is wet when the sky is red. \
         Grass is green. Most of the time, anyway, unless it has not rained for a very long while.",
        "one two three four five six seven eight nine ten eleven twelve thirteen fourteen",
        "Überraschung! Ärger über Öl. 東京は大きい。大阪も大きい。",
        "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
        "  leading and trailing whitespace   \n\n  second paragraph here.  ",
    ];

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(SentenceSplitter::new(0, 0).is_err());
        assert!(SentenceSplitter::new(10, 10).is_err());
        assert!(SentenceSplitter::new(10, 9).is_ok());
    }

    #[test]
    fn test_short_text_is_one_segment() {
        let splitter = SentenceSplitter::default();
        assert_eq!(splitter.split("Sky is red."), vec!["Sky is red."]);
    }

    #[test]
    fn test_blank_text_has_no_segments() {
        let splitter = SentenceSplitter::default();
        assert!(splitter.split("").is_empty());
        assert!(splitter.split("   \n\t ").is_empty());
    }

    #[test]
    fn test_segments_are_bounded_non_empty_and_deterministic() {
        for &(size, overlap) in &[(1, 0), (5, 2), (12, 3), (20, 0), (40, 10), (512, 20)] {
            let splitter = SentenceSplitter::new(size, overlap).unwrap();
            for text in SAMPLES {
                let first = splitter.split(text);
                let second = splitter.split(text);
                assert_eq!(first, second, "size={} overlap={}", size, overlap);
                assert!(!first.is_empty());
                for segment in &first {
                    assert!(!segment.trim().is_empty());
                    assert!(segment.chars().count() <= size, "{:?} > {}", segment, size);
                }
            }
        }
    }

    fn size_and_overlap() -> impl Strategy<Value = (usize, usize)> {
        (1usize..80).prop_flat_map(|size| (Just(size), 0..size))
    }

    proptest! {
        #[test]
        fn test_generated_text_splits_into_bounded_segments(
            text in "[a-zA-Zé東 .,!?\n]{0,300}",
            (size, overlap) in size_and_overlap(),
        ) {
            let splitter = SentenceSplitter::new(size, overlap).unwrap();
            let first = splitter.split_spans(&text);
            prop_assert_eq!(&first, &splitter.split_spans(&text));
            prop_assert_eq!(first.is_empty(), text.trim().is_empty());

            let chars: Vec<char> = text.chars().collect();
            for span in &first {
                prop_assert!(!span.text.trim().is_empty());
                prop_assert!(span.text.chars().count() <= size);
                let slice: String = chars[span.char_start..span.char_end].iter().collect();
                prop_assert_eq!(&slice, &span.text);
            }
        }
    }

    #[test]
    fn test_prefers_sentence_boundaries() {
        let splitter = SentenceSplitter::new(30, 0).unwrap();
        let segments = splitter.split("Sky is red. Grass is green. Water is wet.");
        assert_eq!(segments, vec!["Sky is red. Grass is green.", "Water is wet."]);
    }

    #[test]
    fn test_overlap_carries_context() {
        let splitter = SentenceSplitter::new(30, 12).unwrap();
        let segments = splitter.split("Sky is red. Grass is green. Water is wet.");
        assert_eq!(segments.len(), 2);
        assert!(segments[1].starts_with("is green."), "{:?}", segments);
        assert!(segments[1].ends_with("Water is wet."));
    }

    #[test]
    fn test_long_word_is_hard_cut() {
        let splitter = SentenceSplitter::new(10, 0).unwrap();
        let segments = splitter.split(&"x".repeat(25));
        assert_eq!(segments, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn test_spans_point_into_source() {
        let text = "  Sky is red. Grass is green. Water is wet.";
        let splitter = SentenceSplitter::new(16, 6).unwrap();
        let chars: Vec<char> = text.chars().collect();

        for span in splitter.split_spans(text) {
            let slice: String = chars[span.char_start..span.char_end].iter().collect();
            assert_eq!(slice, span.text);
        }
    }
}
