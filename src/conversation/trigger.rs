//! Wake-word and exit-phrase detection on recognized transcripts.
//!
//! Pure string logic: no I/O, no clocks.  Matching folds case on the wake
//! word and exit phrases only; the payload handed back keeps the speaker's
//! original casing.

use std::ops::Range;

/// Outcome of inspecting one transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerResult {
    /// The system is not being addressed.
    NoMatch,
    /// The system is addressed; the payload may be empty.
    Matched(String),
    /// An exit phrase was heard while active.
    Exit,
}

/// Leading punctuation left behind after the wake word ("buddy, what...").
const PAYLOAD_LEAD: &[char] = &[',', ':', ';', '.', '!', '?', '-'];

/// Decides whether a transcript addresses the assistant.
///
/// ```rust
/// use talkback::conversation::{TriggerDetector, TriggerResult};
///
/// let detector = TriggerDetector::new("buddy", ["that's all"]);
/// assert_eq!(
///     detector.detect("hey Buddy, what's up", false),
///     TriggerResult::Matched("what's up".into())
/// );
/// assert_eq!(detector.detect("That's all, thanks", true), TriggerResult::Exit);
/// ```
#[derive(Debug, Clone)]
pub struct TriggerDetector {
    wake_word: String,
    exit_phrases: Vec<String>,
}

impl TriggerDetector {
    pub fn new<I, S>(wake_word: &str, exit_phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let exit_phrases = exit_phrases
            .into_iter()
            .map(|p| fold(p.as_ref().trim()))
            .filter(|p| !p.is_empty())
            .collect();

        Self {
            wake_word: fold(wake_word.trim()),
            exit_phrases,
        }
    }

    pub fn wake_word(&self) -> &str {
        &self.wake_word
    }

    /// Inspect `transcript` given whether a conversation is in progress.
    pub fn detect(&self, transcript: &str, currently_active: bool) -> TriggerResult {
        if !currently_active {
            return match self.strip_wake_word(transcript) {
                Some(payload) => TriggerResult::Matched(payload),
                None => TriggerResult::NoMatch,
            };
        }

        if self.is_exit(transcript) {
            return TriggerResult::Exit;
        }

        let payload = match self.strip_wake_word(transcript) {
            Some(payload) => payload,
            None => transcript.trim().to_string(),
        };

        if payload.is_empty() && !self.contains_wake_word(transcript) {
            TriggerResult::NoMatch
        } else {
            TriggerResult::Matched(payload)
        }
    }

    /// `true` when any exit phrase occurs in `transcript`.
    pub fn is_exit(&self, transcript: &str) -> bool {
        self.exit_phrases
            .iter()
            .any(|phrase| find_folded(transcript, phrase).is_some())
    }

    fn contains_wake_word(&self, transcript: &str) -> bool {
        !self.wake_word.is_empty() && find_folded(transcript, &self.wake_word).is_some()
    }

    /// Text after the first occurrence of the wake word, or `None` when the
    /// wake word is absent.
    fn strip_wake_word(&self, transcript: &str) -> Option<String> {
        if self.wake_word.is_empty() {
            return None;
        }
        let hit = find_folded(transcript, &self.wake_word)?;
        let rest = transcript[hit.end..]
            .trim_start()
            .trim_start_matches(PAYLOAD_LEAD)
            .trim();
        Some(rest.to_string())
    }
}

fn fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        push_folded(&mut out, ch);
    }
    out
}

/// Lowercase, and treat a typographic apostrophe as a plain one.
fn push_folded(out: &mut String, ch: char) {
    if ch == '\u{2019}' {
        out.push('\'');
    } else {
        out.extend(ch.to_lowercase());
    }
}

/// Locate `needle` (already folded) in `haystack` as whole words, ignoring
/// case.  A hit inside a longer word ("buddyguard") is skipped.
///
/// Returns the byte range in the *original* haystack, so slicing with it is
/// always on a char boundary even when lowercasing changes byte lengths.
fn find_folded(haystack: &str, needle: &str) -> Option<Range<usize>> {
    if needle.is_empty() {
        return None;
    }

    let mut folded = String::with_capacity(haystack.len());
    // origin[i] = byte offset in `haystack` of the char that produced folded byte i
    let mut origin = Vec::with_capacity(haystack.len() + 1);

    for (offset, ch) in haystack.char_indices() {
        let before = folded.len();
        push_folded(&mut folded, ch);
        origin.resize(origin.len() + (folded.len() - before), offset);
    }
    origin.push(haystack.len());

    let mut from = 0;
    while let Some(pos) = folded[from..].find(needle) {
        let start = from + pos;
        let end = start + needle.len();
        let clear_before = folded[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let clear_after = folded[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if clear_before && clear_after {
            return Some(origin[start]..origin[end]);
        }
        from = start + folded[start..].chars().next().map_or(1, char::len_utf8);
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> TriggerDetector {
        TriggerDetector::new("buddy", ["that's all", "that is all"])
    }

    #[test]
    fn sleeping_wake_word_extracts_payload() {
        assert_eq!(
            detector().detect("hey buddy what's up", false),
            TriggerResult::Matched("what's up".into())
        );
    }

    #[test]
    fn sleeping_match_is_case_insensitive_but_payload_keeps_case() {
        assert_eq!(
            detector().detect("BUDDY, Tell Me A Joke", false),
            TriggerResult::Matched("Tell Me A Joke".into())
        );
    }

    #[test]
    fn sleeping_wake_word_alone_gives_empty_payload() {
        assert_eq!(
            detector().detect("Buddy.", false),
            TriggerResult::Matched(String::new())
        );
    }

    #[test]
    fn sleeping_without_wake_word_is_no_match() {
        assert_eq!(
            detector().detect("what's the weather", false),
            TriggerResult::NoMatch
        );
    }

    #[test]
    fn sleeping_ignores_exit_phrase() {
        assert_eq!(detector().detect("that's all", false), TriggerResult::NoMatch);
    }

    #[test]
    fn only_first_occurrence_is_stripped() {
        assert_eq!(
            detector().detect("buddy is my buddy", false),
            TriggerResult::Matched("is my buddy".into())
        );
    }

    #[test]
    fn active_exit_phrase_anywhere() {
        assert_eq!(
            detector().detect("okay That's All thanks", true),
            TriggerResult::Exit
        );
    }

    #[test]
    fn active_exit_beats_wake_word() {
        assert_eq!(
            detector().detect("buddy that is all", true),
            TriggerResult::Exit
        );
    }

    #[test]
    fn active_wake_word_is_stripped() {
        assert_eq!(
            detector().detect("buddy, and tomorrow?", true),
            TriggerResult::Matched("and tomorrow?".into())
        );
    }

    #[test]
    fn active_plain_transcript_is_whole_payload() {
        assert_eq!(
            detector().detect("  and what about Paris  ", true),
            TriggerResult::Matched("and what about Paris".into())
        );
    }

    #[test]
    fn active_blank_transcript_is_no_match() {
        assert_eq!(detector().detect("   ", true), TriggerResult::NoMatch);
    }

    #[test]
    fn active_wake_word_alone_is_empty_match() {
        assert_eq!(
            detector().detect("buddy", true),
            TriggerResult::Matched(String::new())
        );
    }

    #[test]
    fn non_ascii_case_folding_keeps_char_boundaries() {
        let det = TriggerDetector::new("ÉCLAIR", ["c'est tout"]);
        assert_eq!(
            det.detect("salut Éclair où es-tu", false),
            TriggerResult::Matched("où es-tu".into())
        );
        assert_eq!(det.detect("C'EST TOUT", true), TriggerResult::Exit);
    }

    #[test]
    fn typographic_apostrophe_matches_exit_phrase() {
        assert_eq!(
            detector().detect("that\u{2019}s all for now", true),
            TriggerResult::Exit
        );
    }

    #[test]
    fn find_folded_maps_back_to_original_offsets() {
        let hay = "İx buddy y";
        let range = find_folded(hay, "buddy").unwrap();
        assert_eq!(&hay[range], "buddy");
    }

    #[test]
    fn exit_phrase_inside_longer_word_is_not_exit() {
        assert_eq!(
            detector().detect("that's allowed", true),
            TriggerResult::Matched("that's allowed".into())
        );
        assert!(!detector().is_exit("is that's allowed here"));
    }

    #[test]
    fn wake_word_inside_longer_word_does_not_wake() {
        assert_eq!(detector().detect("buddyguard", false), TriggerResult::NoMatch);
        assert_eq!(
            detector().detect("my buddyguard is late", false),
            TriggerResult::NoMatch
        );
    }

    #[test]
    fn later_whole_word_hit_is_found_after_partial_one() {
        assert_eq!(
            detector().detect("buddyguard says buddy, hello", false),
            TriggerResult::Matched("hello".into())
        );
    }

    #[test]
    fn empty_wake_word_never_matches() {
        let det = TriggerDetector::new("  ", Vec::<String>::new());
        assert_eq!(det.detect("anything", false), TriggerResult::NoMatch);
    }
}
