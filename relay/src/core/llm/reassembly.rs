//! Token-to-word reassembly.
//!
//! Language models stream text at arbitrary sub-word granularity. Feeding
//! those fragments straight to a synthesizer produces audible breaks in the
//! middle of words, so fragments are held back until a word boundary is known
//! and then released as whole-word chunks.
//!
//! ```rust
//! use voice_relay::core::llm::TokenReassembler;
//!
//! let mut buffer = TokenReassembler::new();
//! assert_eq!(buffer.push("Hello"), None);
//! assert_eq!(buffer.push(" world").unwrap().text(), "Hello ");
//! assert_eq!(buffer.push("!"), None);
//!
//! let tail: Vec<String> = buffer.finish().into_iter().map(|c| c.text().to_string()).collect();
//! assert_eq!(tail, vec!["world! ".to_string(), String::new()]);
//! ```

const DELIMITER: char = ' ';

/// A run of complete words with one trailing space, or the empty
/// end-of-turn marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordChunk {
    text: String,
}

impl WordChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The empty chunk that closes a generation turn.
    pub fn end_of_turn() -> Self {
        Self {
            text: String::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    #[inline]
    pub fn is_end_of_turn(&self) -> bool {
        self.text.is_empty()
    }
}

/// Pending-fragment buffer for one generation turn.
#[derive(Debug, Default)]
pub struct TokenReassembler {
    pending: Vec<String>,
}

impl TokenReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no fragment is waiting for a word boundary.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Feed one raw fragment. Returns a chunk when it completes at least one
    /// word.
    ///
    /// Every delimiter in the fragment closes the entry before it. Empty
    /// pieces are dropped, which collapses repeated delimiters and keeps a
    /// leading delimiter from opening an empty entry.
    pub fn push(&mut self, fragment: &str) -> Option<WordChunk> {
        let mut delimited = false;

        for (index, piece) in fragment.split(DELIMITER).enumerate() {
            if index > 0 {
                delimited = true;
                self.close_last_entry();
            }
            if !piece.is_empty() {
                self.pending.push(piece.to_string());
            }
        }

        if delimited { self.drain_words() } else { None }
    }

    /// End the turn: flush whatever is pending with a trailing delimiter,
    /// then the end-of-turn marker. The marker is always present, even for a
    /// turn that produced no fragments.
    pub fn finish(&mut self) -> Vec<WordChunk> {
        let mut chunks = Vec::with_capacity(2);

        if !self.pending.is_empty() {
            let mut text: String = self.pending.drain(..).collect();
            if !text.ends_with(DELIMITER) {
                text.push(DELIMITER);
            }
            chunks.push(WordChunk::new(text));
        }

        chunks.push(WordChunk::end_of_turn());
        chunks
    }

    fn close_last_entry(&mut self) {
        if let Some(last) = self.pending.last_mut()
            && !last.ends_with(DELIMITER)
        {
            last.push(DELIMITER);
        }
    }

    /// Emit everything up to and including the last delimited entry.
    fn drain_words(&mut self) -> Option<WordChunk> {
        let end = self
            .pending
            .iter()
            .rposition(|entry| entry.ends_with(DELIMITER))?;

        let text: String = self.pending.drain(..=end).collect();
        Some(WordChunk::new(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(fragments: &[&str]) -> (Vec<String>, Vec<String>) {
        let mut buffer = TokenReassembler::new();
        let streamed = fragments
            .iter()
            .filter_map(|f| buffer.push(f))
            .map(WordChunk::into_text)
            .collect();
        let tail = buffer.finish().into_iter().map(WordChunk::into_text).collect();
        (streamed, tail)
    }

    #[test]
    fn test_hello_world() {
        let mut buffer = TokenReassembler::new();

        assert_eq!(buffer.push("Hello"), None);
        assert_eq!(buffer.push(" world"), Some(WordChunk::new("Hello ")));
        assert_eq!(buffer.push("!"), None);

        let tail = buffer.finish();
        assert_eq!(tail, vec![WordChunk::new("world! "), WordChunk::end_of_turn()]);
        assert!(tail[1].is_end_of_turn());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_words_split_mid_token() {
        let (streamed, tail) = run(&["Th", "ank", " y", "ou for", " call", "ing"]);
        assert_eq!(streamed, vec!["Thank ", "you ", "for "]);
        assert_eq!(tail, vec!["calling ", ""]);
    }

    #[test]
    fn test_trailing_delimiter_in_fragment() {
        let (streamed, tail) = run(&["Sure", ", ", "one", " moment"]);
        assert_eq!(streamed, vec!["Sure, ", "one "]);
        assert_eq!(tail, vec!["moment ", ""]);
    }

    #[test]
    fn test_single_space_fragment() {
        let mut buffer = TokenReassembler::new();
        assert_eq!(buffer.push(" "), None);
        assert!(buffer.is_empty());

        assert_eq!(buffer.push("Hi"), None);
        assert_eq!(buffer.push(" "), Some(WordChunk::new("Hi ")));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_doubled_delimiters_collapse() {
        let (streamed, tail) = run(&["one", "  two", "   ", "three"]);
        assert_eq!(streamed, vec!["one ", "two "]);
        assert_eq!(tail, vec!["three ", ""]);
    }

    #[test]
    fn test_many_words_in_one_fragment() {
        let (streamed, tail) = run(&["I", " can help you", " with"]);
        assert_eq!(streamed, vec!["I can help ", "you "]);
        assert_eq!(tail, vec!["with ", ""]);
    }

    #[test]
    fn test_empty_turn_still_emits_marker() {
        let (streamed, tail) = run(&[]);
        assert!(streamed.is_empty());
        assert_eq!(tail, vec![""]);

        let (streamed, tail) = run(&["", ""]);
        assert!(streamed.is_empty());
        assert_eq!(tail, vec![""]);
    }

    #[test]
    fn test_no_chunk_splits_a_word() {
        let fragments = ["Mm", "-hm", "m, I", " und", "erst", "and.", " Le", "t me", " che", "ck", "."];
        let (streamed, tail) = run(&fragments);

        for chunk in &streamed {
            assert!(chunk.ends_with(' '), "chunk {chunk:?} is not word aligned");
        }
        assert!(tail.last().unwrap().is_empty());
    }

    #[test]
    fn test_concatenation_matches_generated_text() {
        let cases: &[&[&str]] = &[
            &["Hello", " world", "!"],
            &["Your", " appoint", "ment is", " on", " Tues", "day at", " ten."],
            &["a", " b", " c", " d"],
            &["single"],
            &["x y z"],
        ];

        for fragments in cases {
            let full: String = fragments.concat();
            let (streamed, tail) = run(fragments);

            let mut joined: String = streamed.concat();
            joined.push_str(&tail.concat());
            assert_eq!(joined, format!("{full} "), "fragments {fragments:?}");
            assert_eq!(tail.last().map(String::as_str), Some(""));
        }
    }

    #[test]
    fn test_reusable_after_finish() {
        let mut buffer = TokenReassembler::new();
        buffer.push("first");
        buffer.finish();

        assert_eq!(buffer.push("second"), None);
        assert_eq!(
            buffer.finish(),
            vec![WordChunk::new("second "), WordChunk::end_of_turn()]
        );
    }
}
