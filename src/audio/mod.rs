//! Audio input: microphone capture → mono 16 kHz frames → utterances.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → stereo_to_mono + resample_linear
//!           → Vec<f32> frames (std mpsc) → UtteranceSegmenter
//!           → ListenEvent::Utterance → VadDetector (in the recognizer)
//! ```

pub mod capture;
pub mod listener;
pub mod resample;
pub mod vad;

pub use capture::{CaptureError, MicStream, Microphone};
pub use listener::{ListenEvent, ListenPhase, UtteranceSegmenter};
pub use resample::{resample_linear, resample_to_16k, stereo_to_mono};
pub use vad::{rms, VadDetector};
