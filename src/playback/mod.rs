//! Playback side of a turn: clip decoding, the output device, and the
//! player pipeline stage.

pub mod decode;
pub mod output;
pub mod player;

pub use decode::{decode, decode_file, Pcm};
pub use output::{AudioOutput, CpalOutput, PlaybackEnd, PlaybackError};
pub use player::{AudioPlayer, PlaybackReport};

#[cfg(test)]
pub use output::RecordingOutput;
