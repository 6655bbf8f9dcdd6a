//! Speech-to-text: turns captured utterances into transcripts.
//!
//! # Architecture
//!
//! ```text
//! ListenEvent::Utterance ──▶ forward_transcripts ──▶ Recognizer::recognize
//!                                   │                   (VAD trim → WAV → HTTP)
//!                                   ▼
//!                         transcript channel → ConversationLoop
//! ```

pub mod recognizer;

pub use recognizer::{
    encode_wav, forward_transcripts, ApiRecognizer, Recognition, Recognizer, SttError,
};

#[cfg(test)]
pub use recognizer::ScriptedRecognizer;
