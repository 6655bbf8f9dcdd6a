//! Speech side of a turn: synthesis service, temp-file clips, and the
//! synthesizer pipeline stage.

pub mod clip;
pub mod speech;
pub mod synthesizer;

pub use clip::AudioClip;
pub use speech::{ApiSpeech, SpeechService, TtsError};
pub use synthesizer::{AudioUnit, SpeechSynthesizer, SynthesisReport};

#[cfg(test)]
pub use speech::ScriptedSpeech;
