//! Cuts a continuous microphone feed into utterances.
//!
//! The segmenter is a plain state machine over mono frames:
//!
//! ```text
//! Calibrating ──ambient window filled──▶ Waiting
//! Waiting ──frame above threshold──▶ Speaking
//! Waiting ──listen timeout──▶ Waiting   (emits Timeout)
//! Speaking ──pause of silence / phrase limit──▶ Waiting   (emits Utterance)
//! ```
//!
//! Calibration measures the room's ambient level once and raises the voice
//! threshold above it, so a noisy room does not read as constant speech.

use crate::audio::vad::rms;
use crate::config::AudioConfig;

/// Ambient RMS is multiplied by this to get the voice threshold.
const AMBIENT_MARGIN: f32 = 1.5;

#[derive(Debug, Clone, PartialEq)]
pub enum ListenEvent {
    /// A complete phrase, silence tail included.
    Utterance(Vec<f32>),
    /// No speech started within the listen timeout.
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenPhase {
    Calibrating,
    Waiting,
    Speaking,
}

#[derive(Debug)]
pub struct UtteranceSegmenter {
    floor: f32,
    threshold: f32,
    phase: ListenPhase,

    calibration_samples: usize,
    listen_timeout_samples: usize,
    phrase_limit_samples: usize,
    pause_samples: usize,

    ambient_sum_sq: f64,
    ambient_count: usize,
    waited: usize,
    silence: usize,
    phrase: Vec<f32>,
}

fn samples_for_secs(rate: u32, secs: f32) -> usize {
    (rate as f32 * secs.max(0.0)) as usize
}

fn samples_for_ms(rate: u32, ms: u64) -> usize {
    (rate as u64 * ms / 1000) as usize
}

impl UtteranceSegmenter {
    pub fn new(config: &AudioConfig) -> Self {
        let rate = config.sample_rate;
        let calibration_samples = samples_for_ms(rate, config.ambient_calibration_ms);

        Self {
            floor: config.vad_threshold,
            threshold: config.vad_threshold,
            phase: if calibration_samples == 0 {
                ListenPhase::Waiting
            } else {
                ListenPhase::Calibrating
            },
            calibration_samples,
            listen_timeout_samples: samples_for_secs(rate, config.listen_timeout_secs),
            phrase_limit_samples: samples_for_secs(rate, config.phrase_limit_secs),
            pause_samples: samples_for_ms(rate, config.pause_ms),
            ambient_sum_sq: 0.0,
            ambient_count: 0,
            waited: 0,
            silence: 0,
            phrase: Vec::new(),
        }
    }

    pub fn phase(&self) -> ListenPhase {
        self.phase
    }

    /// Current voice threshold (the configured floor until calibrated).
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Feed one frame; returns an event when a phrase ends or the listen
    /// timeout expires.
    pub fn push(&mut self, frame: &[f32]) -> Option<ListenEvent> {
        match self.phase {
            ListenPhase::Calibrating => {
                self.calibrate(frame);
                None
            }
            ListenPhase::Waiting => {
                if rms(frame) > self.threshold {
                    log::debug!("listen: speech onset");
                    self.phase = ListenPhase::Speaking;
                    self.phrase.clear();
                    self.phrase.extend_from_slice(frame);
                    self.silence = 0;
                    return None;
                }
                self.waited += frame.len();
                if self.listen_timeout_samples > 0 && self.waited >= self.listen_timeout_samples {
                    self.waited = 0;
                    return Some(ListenEvent::Timeout);
                }
                None
            }
            ListenPhase::Speaking => {
                self.phrase.extend_from_slice(frame);
                if rms(frame) > self.threshold {
                    self.silence = 0;
                } else {
                    self.silence += frame.len();
                }

                let paused = self.silence >= self.pause_samples;
                let too_long =
                    self.phrase_limit_samples > 0 && self.phrase.len() >= self.phrase_limit_samples;
                if paused || too_long {
                    if too_long && !paused {
                        log::debug!("listen: phrase limit reached");
                    }
                    return Some(self.finish());
                }
                None
            }
        }
    }

    /// Drop any partial phrase and go back to waiting for speech.
    pub fn reset(&mut self) {
        if self.phase != ListenPhase::Calibrating {
            self.phase = ListenPhase::Waiting;
        }
        self.phrase.clear();
        self.silence = 0;
        self.waited = 0;
    }

    fn calibrate(&mut self, frame: &[f32]) {
        self.ambient_sum_sq += frame.iter().map(|s| f64::from(s * s)).sum::<f64>();
        self.ambient_count += frame.len();
        if self.ambient_count < self.calibration_samples {
            return;
        }

        let ambient = (self.ambient_sum_sq / self.ambient_count.max(1) as f64).sqrt() as f32;
        self.threshold = self.floor.max(ambient * AMBIENT_MARGIN);
        self.phase = ListenPhase::Waiting;
        log::info!(
            "listen: ambient level {ambient:.4}, voice threshold {:.4}",
            self.threshold
        );
    }

    fn finish(&mut self) -> ListenEvent {
        self.phase = ListenPhase::Waiting;
        self.silence = 0;
        self.waited = 0;
        ListenEvent::Utterance(std::mem::take(&mut self.phrase))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
