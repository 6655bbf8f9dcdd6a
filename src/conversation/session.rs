//! Sleeping / active session state and conversation history.
//!
//! ```text
//! Sleeping ──wake word + request──▶ Active  (StartTurn)
//! Sleeping ──wake word alone──────▶ Active  (Greet)
//! Active   ──request──────────────▶ Active  (StartTurn)
//! Active   ──exit phrase──────────▶ Sleeping (EndSession, history cleared)
//! ```
//!
//! The history is only ever touched between turns by the owner of the
//! [`SessionStateMachine`]; pipeline workers receive a snapshot.

use std::sync::Arc;

use crate::config::ConversationConfig;
use crate::conversation::transcript::TranscriptLog;
use crate::conversation::trigger::{TriggerDetector, TriggerResult};
use crate::llm::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Sleeping,
    Active,
}

/// What the listening loop should do with an utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Ignore,
    Greet,
    StartTurn(String),
    EndSession,
}

/// Current state plus the messages exchanged since the last wake-up.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub state: SessionState,
    pub history: Vec<ChatMessage>,
}

pub struct SessionStateMachine {
    detector: TriggerDetector,
    session: Session,
    min_payload_chars: usize,
    max_history_messages: usize,
    transcript: Arc<dyn TranscriptLog>,
}

impl SessionStateMachine {
    pub fn new(config: &ConversationConfig, transcript: Arc<dyn TranscriptLog>) -> Self {
        Self {
            detector: TriggerDetector::new(&config.wake_word, &config.exit_phrases),
            session: Session::default(),
            min_payload_chars: config.min_payload_chars,
            max_history_messages: config.max_history_messages,
            transcript,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.session.history
    }

    pub fn detector(&self) -> &TriggerDetector {
        &self.detector
    }

    /// Feed one recognized utterance through the state machine.
    pub fn on_utterance(&mut self, transcript: &str) -> Action {
        let active = self.session.state == SessionState::Active;

        match self.detector.detect(transcript, active) {
            TriggerResult::NoMatch => Action::Ignore,
            TriggerResult::Exit => {
                self.end_session();
                Action::EndSession
            }
            TriggerResult::Matched(payload) => {
                if !active {
                    self.begin_session();
                }
                if payload.chars().count() < self.min_payload_chars {
                    Action::Greet
                } else {
                    self.transcript.append(&format!("user: {payload}"));
                    Action::StartTurn(payload)
                }
            }
        }
    }

    /// Return to `Sleeping` and forget the conversation.
    pub fn end_session(&mut self) {
        if self.session.state == SessionState::Active {
            log::info!("session: exit phrase heard, going to sleep");
            self.transcript.append("--- session ended ---");
        }
        self.session.state = SessionState::Sleeping;
        self.session.history.clear();
    }

    /// Append a finished exchange to the history.
    pub fn record_turn(&mut self, user: String, assistant: String) {
        self.transcript.append(&format!("assistant: {assistant}"));
        self.session.history.push(ChatMessage::user(user));
        self.session.history.push(ChatMessage::assistant(assistant));
        self.trim_history();
    }

    fn begin_session(&mut self) {
        log::info!("session: wake word heard, listening");
        self.session.state = SessionState::Active;
        self.session.history.clear();
        self.transcript.append("--- session started ---");
    }

    // Drops whole user/assistant pairs from the front.
    fn trim_history(&mut self) {
        let max = self.max_history_messages;
        let len = self.session.history.len();
        if max == 0 || len <= max {
            return;
        }
        let excess = len - max;
        let drop = (excess + excess % 2).min(len);
        self.session.history.drain(..drop);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::llm::Role;

    #[derive(Default)]
    struct MemoryLog(Mutex<Vec<String>>);

    impl TranscriptLog for MemoryLog {
        fn append(&self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    fn machine() -> (SessionStateMachine, Arc<MemoryLog>) {
        let log = Arc::new(MemoryLog::default());
        let sm = SessionStateMachine::new(&ConversationConfig::default(), log.clone());
        (sm, log)
    }

    #[test]
    fn starts_sleeping_with_empty_history() {
        let (sm, _) = machine();
        assert_eq!(sm.state(), SessionState::Sleeping);
        assert!(sm.history().is_empty());
    }

    #[test]
    fn wake_word_with_request_starts_turn() {
        let (mut sm, _) = machine();
        assert_eq!(
            sm.on_utterance("hey buddy what's up"),
            Action::StartTurn("what's up".into())
        );
        assert_eq!(sm.state(), SessionState::Active);
    }

    #[test]
    fn wake_word_alone_greets_and_activates() {
        let (mut sm, _) = machine();
        assert_eq!(sm.on_utterance("buddy"), Action::Greet);
        assert_eq!(sm.state(), SessionState::Active);
    }

    #[test]
    fn one_char_payload_counts_as_no_request() {
        let (mut sm, _) = machine();
        assert_eq!(sm.on_utterance("buddy a"), Action::Greet);
    }

    #[test]
    fn sleeping_ignores_unaddressed_speech() {
        let (mut sm, _) = machine();
        assert_eq!(sm.on_utterance("what time is it"), Action::Ignore);
        assert_eq!(sm.state(), SessionState::Sleeping);
    }

    #[test]
    fn exit_phrase_ends_session_and_clears_history() {
        let (mut sm, _) = machine();
        sm.on_utterance("buddy what's up");
        sm.record_turn("what's up".into(), "not much".into());

        assert_eq!(sm.on_utterance("that's all thanks"), Action::EndSession);
        assert_eq!(sm.state(), SessionState::Sleeping);
        assert!(sm.history().is_empty());
    }

    #[test]
    fn consecutive_turns_share_history_until_rewake() {
        let (mut sm, _) = machine();

        assert!(matches!(sm.on_utterance("buddy first question"), Action::StartTurn(_)));
        sm.record_turn("first question".into(), "first answer".into());

        assert_eq!(
            sm.on_utterance("second question"),
            Action::StartTurn("second question".into())
        );
        sm.record_turn("second question".into(), "second answer".into());
        assert_eq!(sm.history().len(), 4);
        assert_eq!(sm.history()[0].role, Role::User);
        assert_eq!(sm.history()[3].content, "second answer");

        sm.on_utterance("that's all");
        assert_eq!(
            sm.on_utterance("buddy third question"),
            Action::StartTurn("third question".into())
        );
        assert!(sm.history().is_empty());
    }

    #[test]
    fn history_is_capped_in_whole_pairs() {
        let log = Arc::new(MemoryLog::default());
        let config = ConversationConfig {
            max_history_messages: 3,
            ..ConversationConfig::default()
        };
        let mut sm = SessionStateMachine::new(&config, log);
        sm.on_utterance("buddy hello there");
        for i in 0..3 {
            sm.record_turn(format!("q{i}"), format!("a{i}"));
        }
        assert_eq!(sm.history().len(), 2);
        assert_eq!(sm.history()[0].content, "q2");
        assert_eq!(sm.history()[1].content, "a2");
    }

    #[test]
    fn transcript_records_boundaries_and_lines() {
        let (mut sm, log) = machine();
        sm.on_utterance("buddy how are you");
        sm.record_turn("how are you".into(), "great".into());
        sm.on_utterance("that's all");

        let lines = log.0.lock().unwrap().clone();
        assert_eq!(
            lines,
            vec![
                "--- session started ---",
                "user: how are you",
                "assistant: great",
                "--- session ended ---",
            ]
        );
    }

    #[test]
    fn greet_does_not_log_user_line() {
        let (mut sm, log) = machine();
        sm.on_utterance("buddy");
        assert_eq!(log.0.lock().unwrap().len(), 1);
    }
}
