//! Merge per-chunk results back into one text.
//!
//! Failed chunks fall back to their original content behind a visible
//! [`FAILED_CHUNK_MARKER`]; they are never swapped in silently. Pieces are
//! joined with a paragraph break after terminal punctuation and a single
//! space otherwise, so text split mid-sentence flows back together.
//!
//! # Coherence score
//!
//! The score is an approximate readability signal, not a semantic measure.
//! Each boundary between adjacent pieces is classified by looking at the
//! last `window_chars` of one piece and the first `window_chars` of the next:
//!
//! | Class | Rule |
//! |-------|------|
//! | smooth | the head of the next piece contains a discourse connective as a whole word (however, therefore, ...) |
//! | adequate | the previous piece ends in `.`, `!` or `?` and the next starts with a capital |
//! | abrupt | neither |
//!
//! A strict majority of smooth transitions maps to `smooth_score`, a strict
//! majority of abrupt ones to `abrupt_score`, anything else to
//! `default_score`. The tier values in [`CoherencePolicy`] are tuning knobs.

use crate::models::{ChunkResult, RecombinedResult, TransitionReport};

/// Prefix placed before the original content of a chunk whose transform failed.
pub const FAILED_CHUNK_MARKER: &str = "[Processing failed, showing original]";

const DEFAULT_CONNECTIVES: &[&str] = &[
    "however",
    "meanwhile",
    "therefore",
    "moreover",
    "furthermore",
    "consequently",
    "nevertheless",
    "thus",
    "additionally",
    "subsequently",
    "afterward",
    "afterwards",
    "similarly",
    "instead",
    "finally",
    "then",
];

/// Tunable parameters of the boundary heuristic.
#[derive(Debug, Clone, PartialEq)]
pub struct CoherencePolicy {
    pub window_chars: usize,
    pub connectives: Vec<String>,
    pub smooth_score: f64,
    pub default_score: f64,
    pub abrupt_score: f64,
}

impl Default for CoherencePolicy {
    fn default() -> Self {
        Self {
            window_chars: 100,
            connectives: DEFAULT_CONNECTIVES.iter().map(|s| s.to_string()).collect(),
            smooth_score: 0.95,
            default_score: 0.8,
            abrupt_score: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Smooth,
    Adequate,
    Abrupt,
}

/// Merges ordered (or unordered) chunk results under a [`CoherencePolicy`].
#[derive(Debug, Clone, Default)]
pub struct ResultRecombiner {
    policy: CoherencePolicy,
}

impl ResultRecombiner {
    pub fn new(policy: CoherencePolicy) -> Self {
        Self { policy }
    }

    pub fn recombine(&self, mut results: Vec<ChunkResult>) -> RecombinedResult {
        results.sort_by_key(|r| r.index);
        let chunk_count = results.len();

        if chunk_count == 0 {
            return RecombinedResult {
                final_text: String::new(),
                chunk_count: 0,
                successful_count: 0,
                success_rate: 0.0,
                coherence_score: None,
                transitions: None,
                error: Some("no chunk results".to_string()),
                per_chunk_results: results,
            };
        }

        let successful_count = results
            .iter()
            .filter(|r| r.transformed().is_some())
            .count();
        let success_rate = successful_count as f64 / chunk_count as f64;

        if chunk_count == 1 {
            let only = &results[0];
            let final_text = only
                .transformed()
                .unwrap_or(&only.original_content)
                .to_string();
            let error = match only.transformed() {
                Some(_) => None,
                None => Some(
                    only.error
                        .clone()
                        .unwrap_or_else(|| "chunk produced no output".to_string()),
                ),
            };
            return RecombinedResult {
                final_text,
                chunk_count,
                successful_count,
                success_rate,
                coherence_score: Some(1.0),
                transitions: Some(TransitionReport::default()),
                error,
                per_chunk_results: results,
            };
        }

        if successful_count == 0 {
            let final_text = results
                .iter()
                .map(|r| r.original_content.trim())
                .collect::<Vec<_>>()
                .join("\n\n");
            tracing::warn!(chunks = chunk_count, "every chunk failed; returning original text");
            return RecombinedResult {
                final_text,
                chunk_count,
                successful_count,
                success_rate: 0.0,
                coherence_score: None,
                transitions: None,
                error: Some(format!("all {} chunks failed", chunk_count)),
                per_chunk_results: results,
            };
        }

        let pieces: Vec<String> = results.iter().map(piece_for).collect();

        let mut final_text = String::new();
        for piece in &pieces {
            if piece.is_empty() {
                continue;
            }
            if !final_text.is_empty() {
                final_text.push_str(if ends_sentence(&final_text) { "\n\n" } else { " " });
            }
            final_text.push_str(piece);
        }

        let transitions = self.classify(&pieces);
        let coherence_score = self.score(&transitions);

        RecombinedResult {
            final_text,
            chunk_count,
            successful_count,
            success_rate,
            coherence_score: Some(coherence_score),
            transitions: Some(transitions),
            error: None,
            per_chunk_results: results,
        }
    }

    fn classify(&self, pieces: &[String]) -> TransitionReport {
        let mut report = TransitionReport::default();
        for pair in pieces.windows(2) {
            match self.transition(&pair[0], &pair[1]) {
                Transition::Smooth => report.smooth += 1,
                Transition::Adequate => report.adequate += 1,
                Transition::Abrupt => report.abrupt += 1,
            }
        }
        report
    }

    fn transition(&self, previous: &str, next: &str) -> Transition {
        let tail = last_chars(previous, self.policy.window_chars);
        let head = first_chars(next, self.policy.window_chars);

        let has_connective = head
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .any(|w| {
                let word = w.to_lowercase();
                self.policy.connectives.iter().any(|c| *c == word)
            });
        if has_connective {
            return Transition::Smooth;
        }

        let starts_capital = head
            .trim_start()
            .chars()
            .next()
            .map(char::is_uppercase)
            .unwrap_or(false);
        if ends_sentence(tail) && starts_capital {
            Transition::Adequate
        } else {
            Transition::Abrupt
        }
    }

    fn score(&self, report: &TransitionReport) -> f64 {
        let total = report.total();
        if total == 0 {
            return 1.0;
        }
        if report.smooth * 2 > total {
            self.policy.smooth_score
        } else if report.abrupt * 2 > total {
            self.policy.abrupt_score
        } else {
            self.policy.default_score
        }
    }
}

/// Recombine with the default [`CoherencePolicy`].
pub fn recombine(results: Vec<ChunkResult>) -> RecombinedResult {
    ResultRecombiner::default().recombine(results)
}

fn piece_for(result: &ChunkResult) -> String {
    match result.transformed() {
        Some(output) => output.trim().to_string(),
        None => format!(
            "{}\n{}",
            FAILED_CHUNK_MARKER,
            result.original_content.trim()
        ),
    }
}

fn ends_sentence(text: &str) -> bool {
    text.trim_end()
        .trim_end_matches(['"', '\'', ')', ']', '”', '’'])
        .ends_with(['.', '!', '?'])
}

fn last_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    let (idx, _) = text
        .char_indices()
        .nth(count - n)
        .unwrap_or((0, ' '));
    &text[idx..]
}

fn first_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ChunkType, SourceSpan, TransformOutput};
    use crate::token::TokenEstimator;

    fn chunk(index: usize, content: &str) -> Chunk {
        let mut c = Chunk::new(
            "run",
            index,
            content,
            SourceSpan::new(index * 100, index * 100 + content.len()),
            ChunkType::Adaptive,
            &TokenEstimator::default(),
        );
        c.total = 3;
        c
    }

    fn ok(index: usize, original: &str, output: &str) -> ChunkResult {
        ChunkResult::succeeded(&chunk(index, original), TransformOutput::text(output))
    }

    fn failed(index: usize, original: &str) -> ChunkResult {
        ChunkResult::failed(&chunk(index, original), "upstream 500")
    }

    #[test]
    fn test_three_chunks_middle_failure() {
        let results = vec![
            ok(0, "orig zero.", "Transformed zero."),
            failed(1, "Original one."),
            ok(2, "orig two.", "Transformed two."),
        ];
        let merged = recombine(results);

        assert_eq!(merged.chunk_count, 3);
        assert_eq!(merged.successful_count, 2);
        assert!((merged.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!(merged.error.is_none());
        assert!(merged.is_partial());

        let text = &merged.final_text;
        let p0 = text.find("Transformed zero.").unwrap();
        let marker = text.find(FAILED_CHUNK_MARKER).unwrap();
        let p1 = text.find("Original one.").unwrap();
        let p2 = text.find("Transformed two.").unwrap();
        assert!(p0 < marker && marker < p1 && p1 < p2);
    }

    #[test]
    fn test_total_failure_keeps_every_original() {
        let results = vec![
            failed(0, "First original."),
            failed(1, "Second original."),
            failed(2, "Third original."),
        ];
        let merged = recombine(results);
        assert_eq!(merged.success_rate, 0.0);
        assert!(merged.coherence_score.is_none());
        assert!(merged.error.is_some());
        for original in ["First original.", "Second original.", "Third original."] {
            assert!(merged.final_text.contains(original));
        }
        assert!(!merged.final_text.contains(FAILED_CHUNK_MARKER));
    }

    #[test]
    fn test_single_result_is_returned_directly() {
        let merged = recombine(vec![ok(0, "in", "Out.")]);
        assert_eq!(merged.final_text, "Out.");
        assert_eq!(merged.success_rate, 1.0);
        assert_eq!(merged.coherence_score, Some(1.0));

        let merged = recombine(vec![failed(0, "Kept as is.")]);
        assert_eq!(merged.final_text, "Kept as is.");
        assert_eq!(merged.success_rate, 0.0);
        assert_eq!(merged.coherence_score, Some(1.0));
        assert_eq!(merged.error.as_deref(), Some("upstream 500"));
    }

    #[test]
    fn test_results_are_sorted_by_index() {
        let results = vec![
            ok(2, "c", "Gamma."),
            ok(0, "a", "Alpha."),
            ok(1, "b", "Beta."),
        ];
        let merged = recombine(results);
        assert_eq!(merged.final_text, "Alpha.\n\nBeta.\n\nGamma.");
        let order: Vec<usize> = merged.per_chunk_results.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_mid_sentence_pieces_join_with_space() {
        let results = vec![ok(0, "a", "The story began"), ok(1, "b", "in the rain.")];
        let merged = recombine(results);
        assert_eq!(merged.final_text, "The story began in the rain.");
    }

    #[test]
    fn test_empty_input() {
        let merged = recombine(Vec::new());
        assert_eq!(merged.chunk_count, 0);
        assert_eq!(merged.final_text, "");
        assert!(merged.error.is_some());
    }

    #[test]
    fn test_coherence_tiers() {
        let smooth = recombine(vec![
            ok(0, "a", "It rained."),
            ok(1, "b", "However, the sun came out."),
            ok(2, "c", "Therefore we went outside."),
        ]);
        assert_eq!(smooth.coherence_score, Some(0.95));
        assert_eq!(smooth.transitions.unwrap().smooth, 2);

        let abrupt = recombine(vec![
            ok(0, "a", "it rained and"),
            ok(1, "b", "the sun came"),
            ok(2, "c", "out later"),
        ]);
        assert_eq!(abrupt.coherence_score, Some(0.6));

        let adequate = recombine(vec![
            ok(0, "a", "It rained."),
            ok(1, "b", "The sun came out."),
            ok(2, "c", "We went outside."),
        ]);
        assert_eq!(adequate.coherence_score, Some(0.8));
        assert_eq!(adequate.transitions.unwrap().adequate, 2);
    }

    #[test]
    fn test_connective_inside_window_is_smooth() {
        let merged = recombine(vec![
            ok(0, "a", "It rained all day."),
            ok(1, "b", "The sun, however, came out at dusk."),
            ok(2, "c", "We went outside, meanwhile the dog slept."),
        ]);
        let transitions = merged.transitions.unwrap();
        assert_eq!(transitions.smooth, 2);
        assert_eq!(transitions.adequate, 0);
        assert_eq!(merged.coherence_score, Some(0.95));

        // Substrings of longer words do not count.
        let merged = recombine(vec![
            ok(0, "a", "It rained."),
            ok(1, "b", "Thusly spoke the thenar muscle."),
        ]);
        assert_eq!(merged.transitions.unwrap().smooth, 0);
    }

    #[test]
    fn test_custom_policy_scores() {
        let policy = CoherencePolicy {
            abrupt_score: 0.1,
            ..CoherencePolicy::default()
        };
        let merged = ResultRecombiner::new(policy).recombine(vec![
            ok(0, "a", "no stop here"),
            ok(1, "b", "lower start"),
        ]);
        assert_eq!(merged.coherence_score, Some(0.1));
    }

    #[test]
    fn test_window_helpers_respect_char_boundaries() {
        assert_eq!(last_chars("héllo", 3), "llo");
        assert_eq!(first_chars("héllo", 2), "hé");
        assert_eq!(last_chars("ab", 5), "ab");
    }
}
