//! Last pipeline stage: play audio units one at a time, in order.
//!
//! The player owns every clip it receives and releases it after playback
//! whatever the outcome.  Units still buffered in the channel when the
//! player stops are drained and released too.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::pipeline::OrdinalCheck;
use crate::playback::output::{AudioOutput, PlaybackEnd};
use crate::tts::AudioUnit;

#[derive(Debug, Default)]
pub struct PlaybackReport {
    /// Ordinals played to completion, in order.
    pub played: Vec<usize>,
    pub failed: Vec<usize>,
    pub stopped: bool,
    pub order_violations: usize,
}

pub struct AudioPlayer {
    output: Arc<dyn AudioOutput>,
}

impl AudioPlayer {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self { output }
    }

    /// Play units from `audio_in` until it closes or `cancel` fires.
    pub async fn run(
        &self,
        mut audio_in: mpsc::Receiver<AudioUnit>,
        cancel: &CancellationToken,
    ) -> PlaybackReport {
        let mut report = PlaybackReport::default();
        let mut check = OrdinalCheck::increasing("player");

        loop {
            let unit = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    report.stopped = true;
                    break;
                }
                next = audio_in.recv() => match next {
                    Some(unit) => unit,
                    None => break,
                },
            };

            check.observe(unit.ordinal);
            let result = self.output.play(&unit.clip, cancel).await;
            let AudioUnit { ordinal, clip } = unit;
            clip.release();

            match result {
                Ok(PlaybackEnd::Finished) => {
                    log::debug!("player: unit {ordinal} done");
                    report.played.push(ordinal);
                }
                Ok(PlaybackEnd::Stopped) => {
                    log::debug!("player: unit {ordinal} stopped");
                    report.stopped = true;
                    break;
                }
                Err(e) => {
                    log::warn!("player: unit {ordinal} failed: {e}");
                    report.failed.push(ordinal);
                }
            }
        }

        audio_in.close();
        while let Ok(unit) = audio_in.try_recv() {
            log::debug!("player: discarding unit {}", unit.ordinal);
            unit.clip.release();
        }

        report.order_violations = check.violations();
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
