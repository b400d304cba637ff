//! Groups streamed reply text into speakable chunks.
//!
//! Synthesizing every sentence separately makes speech choppy, and waiting
//! for the whole reply delays it.  The batcher releases text once two
//! sentence boundaries (`.`, `!` or `?` followed by whitespace, or a newline)
//! are buffered, cutting right after the second one.

use std::sync::OnceLock;

use regex::Regex;

fn boundary() -> &'static Regex {
    static BOUNDARY: OnceLock<Regex> = OnceLock::new();
    BOUNDARY.get_or_init(|| Regex::new(r"[.!?]\s|\n").expect("boundary pattern is valid"))
}

#[derive(Debug, Default)]
pub struct SentenceBatcher {
    buffer: String,
}

impl SentenceBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a delta; returns a trimmed chunk once two boundaries are buffered.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        self.buffer.push_str(delta);
        let cut = boundary().find_iter(&self.buffer).nth(1)?.end();
        let rest = self.buffer.split_off(cut);
        let chunk = std::mem::replace(&mut self.buffer, rest);
        non_blank(&chunk)
    }

    /// Whatever is left at the end of the stream, trimmed.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        non_blank(&rest)
    }
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_sentence_is_held_back() {
        let mut b = SentenceBatcher::new();
        assert_eq!(b.push("Hello there. "), None);
        assert_eq!(b.push("How are"), None);
        assert_eq!(b.finish().as_deref(), Some("Hello there. How are"));
    }

    #[test]
    fn cuts_after_the_second_boundary() {
        let mut b = SentenceBatcher::new();
        assert_eq!(b.push("It is noon. "), None);
        assert_eq!(
            b.push("The sky is clear! Enjoy").as_deref(),
            Some("It is noon. The sky is clear!")
        );
        assert_eq!(b.push(" it."), None);
        assert_eq!(b.finish().as_deref(), Some("Enjoy it."));
    }

    #[test]
    fn newlines_count_as_boundaries() {
        let mut b = SentenceBatcher::new();
        assert_eq!(b.push("one\ntwo\nthree").as_deref(), Some("one\ntwo"));
        assert_eq!(b.finish().as_deref(), Some("three"));
    }

    #[test]
    fn decimals_are_not_boundaries() {
        let mut b = SentenceBatcher::new();
        assert_eq!(b.push("Pi is 3.14 roughly. Yes"), None);
    }

    #[test]
    fn blank_chunks_are_dropped() {
        let mut b = SentenceBatcher::new();
        assert_eq!(b.push("\n\n"), None);
        assert_eq!(b.finish(), None);
        assert_eq!(b.finish(), None);
    }
}
