//! Accumulates streamed reply fragments into speakable chunks.
//!
//! A chunk is cut as soon as the buffered text grows past the threshold, so
//! the first words reach the synthesizer while the model is still writing.
//! Ordinals start at zero and never skip: a buffer that strips down to
//! nothing is dropped without consuming an ordinal.

/// A sentence-sized fragment of the assistant's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub ordinal: usize,
    pub text: String,
}

/// Threshold-based fragment accumulator.
///
/// ```rust
/// use talkback::llm::SentenceChunker;
///
/// let mut chunker = SentenceChunker::new(10);
/// assert!(chunker.push("Hello ").is_none());
/// let chunk = chunker.push("**there**, friend").unwrap();
/// assert_eq!(chunk.ordinal, 0);
/// assert_eq!(chunk.text, "Hello there, friend");
/// assert!(chunker.finish().is_none());
/// ```
#[derive(Debug)]
pub struct SentenceChunker {
    threshold: usize,
    buffer: String,
    next_ordinal: usize,
}

impl SentenceChunker {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            buffer: String::new(),
            next_ordinal: 0,
        }
    }

    /// Append a fragment; returns a chunk once the buffer exceeds the
    /// threshold (measured in characters).
    pub fn push(&mut self, fragment: &str) -> Option<TextChunk> {
        self.buffer.push_str(fragment);
        if self.buffer.chars().count() > self.threshold {
            self.flush()
        } else {
            None
        }
    }

    /// Flush whatever is left at end of stream.
    pub fn finish(&mut self) -> Option<TextChunk> {
        self.flush()
    }

    /// Emit `text` as its own chunk regardless of the threshold.
    ///
    /// Anything still buffered is flushed into the same chunk first.
    pub fn emit_whole(&mut self, text: &str) -> Option<TextChunk> {
        if !self.buffer.is_empty() && !self.buffer.ends_with(char::is_whitespace) {
            self.buffer.push(' ');
        }
        self.buffer.push_str(text);
        self.flush()
    }

    /// Number of chunks handed out so far.
    pub fn emitted(&self) -> usize {
        self.next_ordinal
    }

    fn flush(&mut self) -> Option<TextChunk> {
        let raw = std::mem::take(&mut self.buffer);
        let text = strip_emphasis(&raw);
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let chunk = TextChunk {
            ordinal: self.next_ordinal,
            text: text.to_string(),
        };
        self.next_ordinal += 1;
        Some(chunk)
    }
}

/// Remove markdown emphasis markers (`*`, `**`, `__`, `~~`) so they are not
/// read aloud.  Single underscores are kept; they are usually part of a word.
pub fn strip_emphasis(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '*' => {}
            '_' | '~' if chars.peek() == Some(&ch) => {
                while chars.peek() == Some(&ch) {
                    chars.next();
                }
            }
            _ => out.push(ch),
        }
    }
    out
}
