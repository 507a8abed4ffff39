//! Overlap annotation.
//!
//! Copies bounded word windows from neighbouring chunks into each chunk's
//! `context_before` / `context_after` so downstream calls keep narrative
//! continuity across a boundary. `content` is never touched, and running
//! the annotator again with the same window yields the same values.

use crate::models::Chunk;

/// Attach overlap context to every chunk of a multi-chunk run.
///
/// - `context_before` is the last `overlap_word_count` words of the
///   previous chunk, or empty when that chunk has fewer words than the
///   window (no partial padding).
/// - `context_after` is the first `overlap_word_count` words of the next
///   chunk (fewer if the chunk is shorter).
///
/// Single-chunk runs and a zero window clear both fields.
pub fn annotate(chunks: &mut [Chunk], overlap_word_count: usize) {
    if chunks.len() <= 1 || overlap_word_count == 0 {
        for chunk in chunks.iter_mut() {
            chunk.context_before.clear();
            chunk.context_after.clear();
        }
        return;
    }

    let words: Vec<Vec<&str>> = chunks
        .iter()
        .map(|c| c.content.split_whitespace().collect())
        .collect();

    let mut before = Vec::with_capacity(chunks.len());
    let mut after = Vec::with_capacity(chunks.len());
    for i in 0..chunks.len() {
        before.push(if i == 0 {
            String::new()
        } else {
            tail_words(&words[i - 1], overlap_word_count)
        });
        after.push(match words.get(i + 1) {
            Some(next) => head_words(next, overlap_word_count),
            None => String::new(),
        });
    }

    for ((chunk, b), a) in chunks.iter_mut().zip(before).zip(after) {
        chunk.context_before = b;
        chunk.context_after = a;
    }
}

fn tail_words(words: &[&str], n: usize) -> String {
    if words.len() < n {
        return String::new();
    }
    words[words.len() - n..].join(" ")
}

fn head_words(words: &[&str], n: usize) -> String {
    words.iter().take(n).copied().collect::<Vec<_>>().join(" ")
}
