//! Wake-word gating and conversation state.
//!
//! * [`TriggerDetector`] — pure wake-word / exit-phrase matching.
//! * [`SessionStateMachine`] — sleeping/active state and message history.
//! * [`TranscriptLog`] — append-only record of what was said.

pub mod session;
pub mod transcript;
pub mod trigger;

pub use session::{Action, Session, SessionState, SessionStateMachine};
pub use transcript::{FileTranscriptLog, NullTranscriptLog, TranscriptLog};
pub use trigger::{TriggerDetector, TriggerResult};
