//! Second pipeline stage: turn text chunks into audio units.
//!
//! Chunks are synthesized one at a time, in arrival order, so audio units
//! leave in the same order the text came in.  A chunk whose synthesis fails
//! is logged and skipped; its ordinal simply never reaches the player.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::llm::TextChunk;
use crate::pipeline::OrdinalCheck;
use crate::tts::clip::AudioClip;
use crate::tts::speech::SpeechService;

/// Synthesized audio for one text chunk.
#[derive(Debug)]
pub struct AudioUnit {
    /// Ordinal of the text chunk this was made from.
    pub ordinal: usize,
    pub clip: AudioClip,
}

#[derive(Debug, Default)]
pub struct SynthesisReport {
    pub synthesized: usize,
    pub skipped: Vec<usize>,
    pub cancelled: bool,
    pub order_violations: usize,
}

pub struct SpeechSynthesizer {
    speech: Arc<dyn SpeechService>,
}

impl SpeechSynthesizer {
    pub fn new(speech: Arc<dyn SpeechService>) -> Self {
        Self { speech }
    }

    /// Consume `text_in` until it closes (or `cancel` fires), sending one
    /// [`AudioUnit`] per successful chunk.  `audio_out` is closed on return.
    pub async fn run(
        &self,
        mut text_in: mpsc::Receiver<TextChunk>,
        audio_out: mpsc::Sender<AudioUnit>,
        cancel: &CancellationToken,
    ) -> SynthesisReport {
        let mut report = SynthesisReport::default();
        let mut check = OrdinalCheck::contiguous("synthesizer");

        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                next = text_in.recv() => match next {
                    Some(chunk) => chunk,
                    None => break,
                },
            };

            check.observe(chunk.ordinal);

            // A clip created by an abandoned synthesize future is dropped with
            // it, which removes the file.
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                result = self.speech.synthesize(&chunk.text) => result,
            };

            let clip = match result {
                Ok(clip) => clip,
                Err(e) => {
                    log::warn!("synthesizer: skipping chunk {}: {e}", chunk.ordinal);
                    report.skipped.push(chunk.ordinal);
                    continue;
                }
            };

            log::debug!("synthesizer: chunk {} ready", chunk.ordinal);
            let unit = AudioUnit {
                ordinal: chunk.ordinal,
                clip,
            };

            let sent = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                sent = audio_out.send(unit) => sent,
            };
            if let Err(mpsc::error::SendError(unit)) = sent {
                log::debug!("synthesizer: player gone, dropping unit {}", unit.ordinal);
                unit.clip.release();
                break;
            }
            report.synthesized += 1;
        }

        report.order_violations = check.violations();
        log::debug!(
            "synthesizer: done ({} synthesized, {} skipped)",
            report.synthesized,
            report.skipped.len()
        );
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
