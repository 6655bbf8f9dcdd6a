//! Hands-free voice assistant.
//!
//! Listens for a wake word, streams the request to a chat model, and speaks
//! the reply sentence by sentence while the model is still writing.
//!
//! * [`audio`] — microphone capture and utterance segmentation.
//! * [`stt`] — speech recognition.
//! * [`conversation`] — wake-word gating, session state, transcript log.
//! * [`llm`] — streaming chat client and reply chunking.
//! * [`tts`] — speech synthesis into temporary clips.
//! * [`playback`] — clip decoding and audio output.
//! * [`pipeline`] — per-turn orchestration and the conversation loop.
//! * [`config`] — settings and paths.

pub mod audio;
pub mod config;
pub mod conversation;
pub mod llm;
pub mod pipeline;
pub mod playback;
pub mod stt;
pub mod tts;
