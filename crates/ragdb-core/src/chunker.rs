//! Overlapping character-window chunker.
//!
//! Windows start every `chunk_size - overlap` characters. Each window ends at
//! `start + chunk_size` unless a better break exists inside the overlap
//! region `[next_start, start + chunk_size]`: a blank line first, then a line
//! break or sentence end, then any whitespace. Keeping the end at or past the
//! next start means the windows always cover the whole text.

use crate::error::{Error, Result};

/// Window over the source text in character offsets, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub start: usize,
    pub end: usize,
}

impl ChunkSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidArgument("chunk_size must be greater than zero".into()));
        }
        if overlap >= chunk_size {
            return Err(Error::InvalidArgument(format!(
                "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
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

    /// Distance between consecutive window starts.
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Raw windows before trimming. Empty text yields no windows.
    pub fn spans(&self, text: &str) -> Vec<ChunkSpan> {
        let chars: Vec<char> = text.chars().collect();
        self.spans_of(&chars)
    }

    fn spans_of(&self, chars: &[char]) -> Vec<ChunkSpan> {
        let n = chars.len();
        let step = self.step();
        let mut spans = Vec::with_capacity(n / step + 1);
        let mut start = 0;
        while start < n {
            let hard_end = start + self.chunk_size;
            if hard_end >= n {
                spans.push(ChunkSpan { start, end: n });
                break;
            }
            let end = best_break(chars, start + step, hard_end);
            spans.push(ChunkSpan { start, end });
            start += step;
        }
        spans
    }

    /// Chunks in document order, trimmed, with whitespace-only windows dropped.
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        offsets.push(text.len());
        self.spans_of(&chars)
            .into_iter()
            .map(|s| text[offsets[s.start]..offsets[s.end]].trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// `split` with validation of the size/overlap pair.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    Ok(Chunker::new(chunk_size, overlap)?.split(text))
}

/// Preference of cutting between `chars[p - 1]` and `chars[p]`. `p >= 1`.
fn break_rank(chars: &[char], p: usize) -> u8 {
    let prev = chars[p - 1];
    if prev == '\n' && p >= 2 && chars[p - 2] == '\n' {
        3
    } else if prev == '\n' || (prev.is_whitespace() && p >= 2 && matches!(chars[p - 2], '.' | '!' | '?')) {
        2
    } else if prev.is_whitespace() {
        1
    } else {
        0
    }
}

/// Latest cut in `[lo, hi]` of the best available rank, `hi` if none.
fn best_break(chars: &[char], lo: usize, hi: usize) -> usize {
    let mut best = (0u8, hi);
    for p in (lo..=hi).rev() {
        let rank = break_rank(chars, p);
        if rank > best.0 {
            best = (rank, p);
            if rank == 3 {
                break;
            }
        }
    }
    best.1
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reconstruct(text: &str, spans: &[ChunkSpan]) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::new();
        let mut covered = 0;
        for s in spans {
            let from = covered.max(s.start);
            out.extend(&chars[from..s.end]);
            covered = s.end;
        }
        out
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(matches!(Chunker::new(0, 0), Err(Error::InvalidArgument(_))));
        assert!(matches!(Chunker::new(10, 10), Err(Error::InvalidArgument(_))));
        assert!(matches!(split("abc", 5, 7), Err(Error::InvalidArgument(_))));
        assert!(Chunker::new(10, 9).is_ok());
    }

    #[test]
    fn short_text_is_a_single_trimmed_chunk() {
        assert_eq!(split("  Short text.\n", 1000, 200).unwrap(), vec!["Short text."]);
        assert!(split("   \n\n ", 1000, 200).unwrap().is_empty());
        assert!(split("", 10, 2).unwrap().is_empty());
    }

    #[test]
    fn hard_cuts_without_whitespace() {
        let chunks = split("abcdefghijklmnopqrstuvwxyz", 10, 3).unwrap();
        assert_eq!(chunks, vec!["abcdefghij", "hijklmnopq", "opqrstuvwx", "vwxyz"]);
    }

    #[test]
    fn prefers_paragraph_break() {
        let text = "First para.\n\nSecond para here.";
        let chunks = split(text, 20, 10).unwrap();
        assert_eq!(chunks[0], "First para.");
    }

    #[test]
    fn prefers_word_boundary_over_hard_cut() {
        let chunker = Chunker::new(12, 6).unwrap();
        let spans = chunker.spans("alpha beta gamma delta");
        assert_eq!(spans[0], ChunkSpan { start: 0, end: 11 });
        assert_eq!(chunker.split("alpha beta gamma delta")[0], "alpha beta");
    }

    #[test]
    fn no_overlap_means_fixed_cuts() {
        let chunker = Chunker::new(5, 0).unwrap();
        let spans = chunker.spans("abcde fghij");
        assert_eq!(
            spans,
            vec![ChunkSpan { start: 0, end: 5 }, ChunkSpan { start: 5, end: 10 }, ChunkSpan { start: 10, end: 11 }]
        );
    }

    #[test]
    fn multibyte_text_is_cut_on_char_boundaries() {
        let chunks = split("żółć gęślą jaźń", 6, 2).unwrap();
        assert!(chunks.iter().all(|c| c.chars().count() <= 6));
        assert!(chunks.first().unwrap().starts_with("żółć"));
    }

    proptest! {
        #[test]
        fn windows_respect_size_and_step(
            text in "[a-z .!?\n]{0,400}",
            chunk_size in 1usize..60,
            overlap_seed in 0usize..60,
        ) {
            let overlap = overlap_seed % chunk_size;
            let chunker = Chunker::new(chunk_size, overlap).unwrap();
            let spans = chunker.spans(&text);
            for s in &spans {
                prop_assert!(s.len() <= chunk_size);
                prop_assert!(!s.is_empty());
            }
            for pair in spans.windows(2) {
                prop_assert_eq!(pair[1].start - pair[0].start, chunk_size - overlap);
                prop_assert!(pair[0].end >= pair[1].start);
            }
            prop_assert_eq!(reconstruct(&text, &spans), text.clone());
            for chunk in chunker.split(&text) {
                prop_assert!(chunk.chars().count() <= chunk_size);
                prop_assert_eq!(chunk.trim(), chunk.as_str());
                prop_assert!(!chunk.is_empty());
            }
        }

        #[test]
        fn text_within_chunk_size_is_one_chunk(text in "[a-z \n]{0,50}") {
            let chunks = split(&text, 50, 10).unwrap();
            if text.trim().is_empty() {
                prop_assert!(chunks.is_empty());
            } else {
                prop_assert_eq!(chunks, vec![text.trim().to_string()]);
            }
        }
    }
}
