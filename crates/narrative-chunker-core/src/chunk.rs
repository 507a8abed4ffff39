//! Context-aware text splitter.
//!
//! Splits long text into [`Chunk`]s whose estimated token count stays
//! within a safe budget, preferring the largest semantic boundary that
//! works.
//!
//! # Algorithm
//!
//! 1. Whitespace-only input yields no chunks.
//! 2. If the whole text fits the budget, return it as one `original` chunk.
//! 3. Otherwise split into sections (`\n\s*\n`) and greedily accumulate
//!    sections while the accumulated span still fits.
//! 4. A section that alone exceeds the budget is split by paragraphs
//!    (single `\n`) with the same greedy policy; an oversized paragraph is
//!    split by sentences (`[.!?]+\s+`).
//! 5. A single sentence that still exceeds the budget is emitted as its own
//!    chunk flagged `oversized`. Content is never truncated or dropped.
//! 6. `total` is back-filled once the run is complete.
//!
//! Accumulated chunks are slices of the original text, so the separators
//! between merged segments are kept verbatim and every chunk's content is
//! exactly `text[span]`. Only whitespace between chunks is dropped.
//!
//! # Example
//!
//! ```rust
//! use narrative_chunker_core::chunk::split_text;
//! use narrative_chunker_core::token::TokenEstimator;
//!
//! let chunks = split_text("run-1", "Hello world.", 100, &TokenEstimator::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].total, 1);
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Chunk, ChunkType, SourceSpan};
use crate::token::TokenEstimator;

static SECTION_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid section regex (verified by tests)"));
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n").expect("valid paragraph regex (verified by tests)"));
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s+").expect("valid sentence regex (verified by tests)"));

/// Boundary granularity, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Section,
    Paragraph,
    Sentence,
}

impl Boundary {
    fn pattern(&self) -> &'static Regex {
        match self {
            Boundary::Section => &SECTION_BREAK,
            Boundary::Paragraph => &PARAGRAPH_BREAK,
            Boundary::Sentence => &SENTENCE_END,
        }
    }

    fn finer(&self) -> Option<Boundary> {
        match self {
            Boundary::Section => Some(Boundary::Paragraph),
            Boundary::Paragraph => Some(Boundary::Sentence),
            Boundary::Sentence => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    oversized: bool,
}

/// Budget-bounded splitter over a [`TokenEstimator`].
#[derive(Debug, Clone, Copy)]
pub struct ChunkSplitter {
    estimator: TokenEstimator,
    safe_token_budget: usize,
}

impl ChunkSplitter {
    pub fn new(estimator: TokenEstimator, safe_token_budget: usize) -> Self {
        Self {
            estimator,
            safe_token_budget,
        }
    }

    pub fn budget(&self) -> usize {
        self.safe_token_budget
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    /// Split `text` into an ordered chunk run identified by `parent_id`.
    pub fn split(&self, parent_id: &str, text: &str) -> Vec<Chunk> {
        let Some((start, end)) = trim_range(text, 0, text.len()) else {
            return Vec::new();
        };

        if self.estimator.estimate(text) <= self.safe_token_budget {
            let mut chunk = Chunk::new(
                parent_id,
                0,
                &text[start..end],
                SourceSpan::new(start, end),
                ChunkType::Original,
                &self.estimator,
            );
            chunk.total = 1;
            return vec![chunk];
        }

        let pieces = self.pack(text, start, end, Boundary::Section);
        let mut chunks: Vec<Chunk> = pieces
            .iter()
            .enumerate()
            .map(|(index, piece)| {
                let mut chunk = Chunk::new(
                    parent_id,
                    index,
                    &text[piece.start..piece.end],
                    SourceSpan::new(piece.start, piece.end),
                    ChunkType::Adaptive,
                    &self.estimator,
                );
                chunk.oversized = piece.oversized;
                chunk
            })
            .collect();

        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.total = total;
        }

        tracing::debug!(
            parent_id,
            chunks = total,
            oversized = chunks.iter().filter(|c| c.oversized).count(),
            budget = self.safe_token_budget,
            "split text"
        );

        chunks
    }

    /// Greedily pack the segments of `text[start..end]` at `boundary`,
    /// descending to a finer boundary for any segment over budget.
    fn pack(&self, text: &str, start: usize, end: usize, boundary: Boundary) -> Vec<Piece> {
        let mut pieces = Vec::new();
        let mut current: Option<(usize, usize)> = None;

        for (seg_start, seg_end) in segments(text, start, end, boundary) {
            if self.estimator.estimate(&text[seg_start..seg_end]) > self.safe_token_budget {
                if let Some((s, e)) = current.take() {
                    pieces.push(Piece {
                        start: s,
                        end: e,
                        oversized: false,
                    });
                }
                match boundary.finer() {
                    Some(finer) => pieces.extend(self.pack(text, seg_start, seg_end, finer)),
                    None => pieces.push(Piece {
                        start: seg_start,
                        end: seg_end,
                        oversized: true,
                    }),
                }
                continue;
            }

            current = match current {
                None => Some((seg_start, seg_end)),
                Some((s, e)) => {
                    if self.estimator.estimate(&text[s..seg_end]) <= self.safe_token_budget {
                        Some((s, seg_end))
                    } else {
                        pieces.push(Piece {
                            start: s,
                            end: e,
                            oversized: false,
                        });
                        Some((seg_start, seg_end))
                    }
                }
            };
        }

        if let Some((s, e)) = current {
            pieces.push(Piece {
                start: s,
                end: e,
                oversized: false,
            });
        }

        pieces
    }
}

/// Split `text` with a fresh [`ChunkSplitter`].
pub fn split_text(
    parent_id: &str,
    text: &str,
    safe_token_budget: usize,
    estimator: &TokenEstimator,
) -> Vec<Chunk> {
    ChunkSplitter::new(*estimator, safe_token_budget).split(parent_id, text)
}

/// Non-empty, whitespace-trimmed segments of `text[start..end]` delimited
/// by `boundary`. Sentence segments keep their terminal punctuation.
fn segments(text: &str, start: usize, end: usize, boundary: Boundary) -> Vec<(usize, usize)> {
    let slice = &text[start..end];
    let mut out = Vec::new();
    let mut cursor = 0usize;

    for m in boundary.pattern().find_iter(slice) {
        if let Some(range) = trim_range(text, start + cursor, start + m.end()) {
            out.push(range);
        }
        cursor = m.end();
    }
    if let Some(range) = trim_range(text, start + cursor, end) {
        out.push(range);
    }

    out
}

/// Shrink `[start, end)` to exclude surrounding whitespace. `None` when
/// nothing but whitespace remains.
fn trim_range(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lead = slice.len() - slice.trim_start().len();
    Some((start + lead, start + lead + trimmed.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::validate_sequence;

    fn est() -> TokenEstimator {
        TokenEstimator::default()
    }

    fn normalize(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn rejoin(chunks: &[Chunk]) -> String {
        chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `paragraphs` newline-separated paragraphs of `sentences` ten-word sentences.
    fn long_section(paragraphs: usize, sentences: usize) -> String {
        (0..paragraphs)
            .map(|p| {
                (0..sentences)
                    .map(|s| format!("Paragraph {} sentence {} has exactly ten words in it.", p, s))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split_text("run", "Hello world.", 100, &est());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].total, 1);
        assert_eq!(chunks[0].content, "Hello world.");
        assert_eq!(chunks[0].chunk_type, ChunkType::Original);
        assert_eq!(chunks[0].source_span, SourceSpan::new(0, 12));
    }

    #[test]
    fn test_empty_and_whitespace_inputs() {
        assert!(split_text("run", "", 100, &est()).is_empty());
        assert!(split_text("run", "  \n\n\t  ", 100, &est()).is_empty());
    }

    #[test]
    fn test_sections_are_accumulated_greedily() {
        // Each section is 20 chars → 15 tokens; two fit in 40, three do not.
        let text = "Section one is here.\n\nSection two is here.\n\nSection 3 is here!!";
        let chunks = split_text("run", text, 40, &est());
        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].content,
            "Section one is here.\n\nSection two is here."
        );
        assert_eq!(chunks[1].content, "Section 3 is here!!");
        assert!(chunks.iter().all(|c| c.chunk_type == ChunkType::Adaptive));
        assert_eq!(validate_sequence(text, &chunks), Ok(()));
    }

    #[test]
    fn test_oversized_section_cascade() {
        // One section (no blank lines) of 5000 words; budget ≈ 50 words.
        let text = long_section(50, 10);
        assert_eq!(text.split_whitespace().count(), 5000);
        let budget = est().estimate(&text) / 100;

        let chunks = split_text("run", &text, budget, &est());
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(
                c.estimated_tokens <= budget,
                "chunk {} has {} tokens over budget {}",
                c.index,
                c.estimated_tokens,
                budget
            );
            assert!(!c.oversized);
        }
        assert_eq!(normalize(&rejoin(&chunks)), normalize(&text));
        assert_eq!(validate_sequence(&text, &chunks), Ok(()));
    }

    #[test]
    fn test_single_sentence_over_budget_is_flagged() {
        let long_sentence = vec!["word"; 60].join(" ") + ".";
        let text = format!("Short one. {} Short two.", long_sentence);
        let chunks = split_text("run", &text, 20, &est());

        let oversized: Vec<&Chunk> = chunks.iter().filter(|c| c.oversized).collect();
        assert_eq!(oversized.len(), 1);
        assert_eq!(oversized[0].content, long_sentence);
        for c in chunks.iter().filter(|c| !c.oversized) {
            assert!(c.estimated_tokens <= 20);
        }
        assert_eq!(normalize(&rejoin(&chunks)), normalize(&text));
    }

    #[test]
    fn test_unpunctuated_run_is_one_oversized_chunk() {
        let text = vec!["token"; 200].join(" ");
        let chunks = split_text("run", &text, 10, &est());
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].oversized);
        assert_eq!(chunks[0].content, text);
    }

    #[test]
    fn test_indices_contiguous_and_total_backfilled() {
        let text = (0..40)
            .map(|i| format!("Section number {} talks about things.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = split_text("run", &text, 30, &est());
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
            assert_eq!(c.total, chunks.len());
            assert_eq!(c.id, format!("run:{:04}", i));
        }
    }

    #[test]
    fn test_spans_monotonic_with_whitespace_gaps() {
        let text = "  Lead section.\n\n\n  Middle section here.\n \nTrailing bit!  \n";
        let chunks = split_text("run", text, 12, &est());
        assert!(chunks.len() >= 2);
        let mut prev_end = 0;
        for c in &chunks {
            assert!(c.source_span.start >= prev_end);
            assert!(text[prev_end..c.source_span.start].trim().is_empty());
            assert_eq!(&text[c.source_span.start..c.source_span.end], c.content);
            prev_end = c.source_span.end;
        }
        assert!(text[prev_end..].trim().is_empty());
    }

    #[test]
    fn test_multibyte_utf8_text() {
        let text = "┌──────┐ Привет мир. Ещё одно предложение!\n\n└──────┘ Café über naïve. Ende.";
        let chunks = split_text("run", text, 8, &est());
        assert!(!chunks.is_empty());
        assert_eq!(validate_sequence(text, &chunks), Ok(()));
        assert_eq!(normalize(&rejoin(&chunks)), normalize(text));
    }

    #[test]
    fn test_deterministic() {
        let text = long_section(5, 6);
        let a = split_text("run", &text, 40, &est());
        let b = split_text("run", &text, 40, &est());
        assert_eq!(a, b);
    }

    #[test]
    fn test_splitter_reports_budget() {
        let splitter = ChunkSplitter::new(est(), 77);
        assert_eq!(splitter.budget(), 77);
        assert_eq!(splitter.estimator().tokens_per_char(), 0.75);
    }
}
