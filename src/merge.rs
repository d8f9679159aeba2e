//! Incremental transcript merging.
//!
//! Partial transcriptions over a sliding window overlap each other and the
//! final pass re-reads everything, so raw fragments repeat text freely. The
//! merger folds each fragment into one append-only transcript and hands back
//! only the suffix the caller has not seen yet.

use std::time::{Duration, Instant};

use tracing::trace;

/// Default silence gap after which appended text starts on a new line.
pub const DEFAULT_PAUSE_BREAK: Duration = Duration::from_millis(3000);

/// Stateful fuser of overlapping transcript fragments.
///
/// The committed transcript only ever grows; callers receive each appended
/// suffix exactly once. One merger serves one recording.
#[derive(Debug)]
pub struct StreamMerger {
    committed: String,
    last_emit_cursor: usize,
    last_fragment_at: Option<Instant>,
    pause_break: Duration,
}

impl StreamMerger {
    /// Create a merger with the given pause threshold.
    pub fn new(pause_break: Duration) -> Self {
        Self {
            committed: String::new(),
            last_emit_cursor: 0,
            last_fragment_at: None,
            pause_break,
        }
    }

    /// Fold a fragment into the transcript and return the newly appended
    /// text (possibly empty for repeats and blank fragments).
    pub fn merge(&mut self, fragment: &str, emitted_at: Instant) -> String {
        let fragment = fragment.trim();

        let paused = self
            .last_fragment_at
            .map(|prev| emitted_at.duration_since(prev) > self.pause_break)
            .unwrap_or(false);
        self.last_fragment_at = Some(emitted_at);

        if fragment.is_empty() {
            return String::new();
        }

        if self.committed.is_empty() {
            self.committed.push_str(fragment);
        } else if self.committed.contains(fragment) {
            trace!(fragment = %fragment, "Fragment already committed, skipping");
        } else {
            let committed_words: Vec<&str> = self.committed.split_whitespace().collect();
            let fragment_words: Vec<&str> = fragment.split_whitespace().collect();
            let overlap = longest_overlap(&committed_words, &fragment_words);
            let remainder = fragment_words[overlap..].join(" ");

            trace!(
                overlap_words = overlap,
                appended_words = fragment_words.len() - overlap,
                paused = paused,
                "Merging fragment"
            );

            // Whitespace differences can make every word overlap while the
            // verbatim check above missed it; nothing left to append then.
            if !remainder.is_empty() {
                self.committed.push_str(if paused { "\n" } else { " " });
                self.committed.push_str(&remainder);
            }
        }

        // The cursor always sits on a char boundary: it only ever takes the
        // value of a previous committed length, and the text is append-only.
        let delta = self.committed[self.last_emit_cursor..].to_string();
        self.last_emit_cursor = self.committed.len();
        delta
    }

    /// The full transcript committed so far.
    pub fn committed_text(&self) -> &str {
        &self.committed
    }
}

/// Longest `k` such that the last `k` words of `committed` equal the first
/// `k` words of `fragment`.
fn longest_overlap(committed: &[&str], fragment: &[&str]) -> usize {
    let max_k = committed.len().min(fragment.len());
    for k in (1..=max_k).rev() {
        if committed[committed.len() - k..] == fragment[..k] {
            return k;
        }
    }
    0
}

#[cfg(test)]
#[path = "merge_test.rs"]
mod tests;
