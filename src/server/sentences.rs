//! Incremental sentence splitting for streamed completions
//!
//! Completions arrive as arbitrary text deltas. A sentence ends at a run of
//! `.`, `!` or `?` (optionally followed by closing quotes or brackets) that is
//! followed by whitespace. Text after the last boundary is held until more
//! arrives or the completion ends.

/// Characters that close a sentence
const fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Characters that may trail a terminator inside the same sentence
const fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '\u{201d}' | '\u{2019}')
}

/// Byte offset just past the first complete sentence in `text`
fn boundary(text: &str) -> Option<usize> {
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }

        while chars
            .next_if(|&(_, next)| is_terminator(next) || is_closer(next))
            .is_some()
        {}

        if let Some(&(idx, next)) = chars.peek()
            && next.is_whitespace()
        {
            return Some(idx);
        }
    }

    None
}

/// Accumulates completion deltas and yields whole sentences
#[derive(Debug, Default)]
pub struct SentenceSplitter {
    buffer: String,
}

impl SentenceSplitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a delta and return every sentence it completes
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);

        let mut sentences = Vec::new();
        while let Some(idx) = boundary(&self.buffer) {
            let rest = self.buffer.split_off(idx);
            let sentence = std::mem::replace(&mut self.buffer, rest.trim_start().to_string());
            let sentence = sentence.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
        }

        sentences
    }

    /// Flush whatever text remains once the completion has ended
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_terminators() {
        let mut splitter = SentenceSplitter::new();
        let sentences = splitter.push("Hi there! How can I help? ");

        assert_eq!(sentences, vec!["Hi there!", "How can I help?"]);
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_holds_tail_until_finish() {
        let mut splitter = SentenceSplitter::new();

        assert_eq!(splitter.push("Hi there! How can"), vec!["Hi there!"]);
        assert!(splitter.push(" I help?").is_empty());
        assert_eq!(splitter.finish().as_deref(), Some("How can I help?"));
    }

    #[test]
    fn test_deltas_split_mid_word() {
        let mut splitter = SentenceSplitter::new();
        let mut sentences = Vec::new();
        for delta in ["Hel", "lo wor", "ld.", " Next", " one."] {
            sentences.extend(splitter.push(delta));
        }

        assert_eq!(sentences, vec!["Hello world."]);
        assert_eq!(splitter.finish().as_deref(), Some("Next one."));
    }

    #[test]
    fn test_decimal_point_is_not_a_boundary() {
        let mut splitter = SentenceSplitter::new();

        assert!(splitter.push("Pi is 3.14 roughly").is_empty());
        assert_eq!(splitter.finish().as_deref(), Some("Pi is 3.14 roughly"));
    }

    #[test]
    fn test_terminator_runs_and_closers() {
        let mut splitter = SentenceSplitter::new();
        let sentences = splitter.push("Wait... really?! She said \"no.\" (Fine.) ok");

        assert_eq!(
            sentences,
            vec!["Wait...", "really?!", "She said \"no.\"", "(Fine.)"]
        );
        assert_eq!(splitter.finish().as_deref(), Some("ok"));
    }

    #[test]
    fn test_blank_input_yields_nothing() {
        let mut splitter = SentenceSplitter::new();

        assert!(splitter.push("   \n ").is_empty());
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_multibyte_text() {
        let mut splitter = SentenceSplitter::new();

        assert_eq!(splitter.push("¿Qué tal? Très bien."), vec!["¿Qué tal?"]);
        assert_eq!(splitter.finish().as_deref(), Some("Très bien."));
    }
}
