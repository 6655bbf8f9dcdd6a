//! Language-model side of a turn.
//!
//! This module provides:
//! * [`ChatService`] — async trait for a streaming chat model.
//! * [`ApiChat`] — OpenAI-compatible streaming client (SSE).
//! * [`SentenceChunker`] — cuts the growing reply into [`TextChunk`]s.
//! * [`ResponseGenerator`] — the first pipeline stage.
//! * [`LlmError`] — error variants for model calls.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//! use talkback::config::AppConfig;
//! use talkback::llm::{ApiChat, GeneratorSettings, ResponseGenerator};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let generator = ResponseGenerator::new(
//!         Arc::new(ApiChat::from_config(&config.llm)),
//!         GeneratorSettings::default(),
//!     );
//!
//!     let (tx, mut rx) = mpsc::channel(4);
//!     let cancel = CancellationToken::new();
//!     let run = generator.run(&[], "tell me a joke", tx, &cancel);
//!     let print = async {
//!         while let Some(chunk) = rx.recv().await {
//!             println!("{}: {}", chunk.ordinal, chunk.text);
//!         }
//!     };
//!     let (generation, ()) = tokio::join!(run, print);
//!     println!("full reply: {}", generation.reply);
//! }
//! ```

pub mod chat;
pub mod chunker;
pub mod generator;
pub mod sse;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use chat::{ApiChat, ChatMessage, ChatService, FragmentStream, LlmError, Role};
pub use chunker::{strip_emphasis, SentenceChunker, TextChunk};
pub use generator::{Generation, GenerationOutcome, GeneratorSettings, ResponseGenerator};
pub use sse::{SseDecoder, SseEvent};

#[cfg(test)]
pub use chat::ScriptedChat;
