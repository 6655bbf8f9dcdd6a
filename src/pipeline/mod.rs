//! Turn orchestration for the voice assistant.
//!
//! This module wires the generate → synthesize → play pipeline for one turn
//! and the loop that turns transcripts into turns.
//!
//! # Architecture
//!
//! ```text
//! transcripts (mpsc)
//!        │
//!        ▼
//! ConversationLoop::run()  ← async tokio task, owns the session
//!        │
//!        ├─ Greet / EndSession → PipelineCoordinator::speak
//!        │
//!        └─ StartTurn
//!              │
//!              ▼
//!        PipelineCoordinator::run_turn   (child CancellationToken)
//!              ├─ ResponseGenerator  ──TextChunk──▶
//!              ├─ SpeechSynthesizer  ──AudioUnit──▶
//!              └─ AudioPlayer
//!              │
//!              ▼
//!        TurnReport → history updated (unless cancelled)
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use talkback::config::AppConfig;
//! use talkback::llm::ApiChat;
//! use talkback::pipeline::{PipelineCoordinator, TurnSettings};
//! use talkback::playback::CpalOutput;
//! use talkback::tts::ApiSpeech;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let coordinator = PipelineCoordinator::new(
//!         Arc::new(ApiChat::from_config(&config.llm)),
//!         Arc::new(ApiSpeech::from_config(&config.tts, std::env::temp_dir())),
//!         Arc::new(CpalOutput::new()),
//!         TurnSettings::from_config(&config),
//!     );
//!
//!     let report = coordinator
//!         .run_turn(Vec::new(), "tell me a joke".into(), &CancellationToken::new())
//!         .await;
//!     println!("{}", report.reply);
//! }
//! ```

pub mod coordinator;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use coordinator::{PipelineCoordinator, TurnSettings};
pub use runner::ConversationLoop;
pub use state::{OrdinalCheck, TurnPhase, TurnReport};
