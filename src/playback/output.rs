//! Audio output device abstraction.
//!
//! [`AudioOutput::play`] returns once the clip has finished or the token
//! fired.  [`CpalOutput`] runs the `cpal` stream on a blocking thread (the
//! stream handle is not `Send`) and waits on a channel for one of two
//! signals: `Finished`, raised by the output callback after the last sample,
//! or `Stop`, raised from the async side on cancellation.

use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::audio::resample_linear;
use crate::config::AudioFormat;
use crate::playback::decode::decode_file;
use crate::tts::AudioClip;

/// Allowed overrun past the clip's nominal length before giving up.
const COMPLETION_GRACE: Duration = Duration::from_millis(1500);

/// Time for the device buffer to drain after the last sample is queued.
const DEVICE_TAIL: Duration = Duration::from_millis(120);

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no output device found on the default audio host")]
    NoDevice,

    #[error("failed to query default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("could not decode clip: {0}")]
    Decode(String),

    #[error("could not read clip: {0}")]
    Io(#[from] std::io::Error),

    #[error("playback never signalled completion")]
    Stalled,

    #[error("playback thread failed: {0}")]
    Join(String),
}

/// How a `play` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEnd {
    Finished,
    /// Cut short by the cancellation token.
    Stopped,
}

// ---------------------------------------------------------------------------
// AudioOutput trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn play(
        &self,
        clip: &AudioClip,
        cancel: &CancellationToken,
    ) -> Result<PlaybackEnd, PlaybackError>;
}

// ---------------------------------------------------------------------------
// CpalOutput
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Signal {
    Finished,
    Stop,
}

/// Plays clips on the system default output device.
#[derive(Debug, Default)]
pub struct CpalOutput;

impl CpalOutput {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AudioOutput for CpalOutput {
    async fn play(
        &self,
        clip: &AudioClip,
        cancel: &CancellationToken,
    ) -> Result<PlaybackEnd, PlaybackError> {
        let path = clip.path().to_path_buf();
        let format = clip.format();
        let (signal_tx, signal_rx) = mpsc::channel::<Signal>();
        let stop_tx = signal_tx.clone();

        let mut job = tokio::task::spawn_blocking(move || {
            play_blocking(path, format, signal_tx, signal_rx)
        });

        tokio::select! {
            joined = &mut job => joined.map_err(|e| PlaybackError::Join(e.to_string()))?,
            () = cancel.cancelled() => {
                let _ = stop_tx.send(Signal::Stop);
                match job.await {
                    Ok(Err(e)) => log::debug!("playback: error while stopping: {e}"),
                    Err(e) => log::debug!("playback: thread failed while stopping: {e}"),
                    Ok(Ok(_)) => {}
                }
                Ok(PlaybackEnd::Stopped)
            }
        }
    }
}

fn play_blocking(
    path: PathBuf,
    format: AudioFormat,
    signal_tx: mpsc::Sender<Signal>,
    signal_rx: mpsc::Receiver<Signal>,
) -> Result<PlaybackEnd, PlaybackError> {
    let pcm = decode_file(&path, format)?;
    if pcm.samples.is_empty() {
        log::debug!("playback: {} has no audio", path.display());
        return Ok(PlaybackEnd::Finished);
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(PlaybackError::NoDevice)?;
    let supported = device.default_output_config()?;
    let channels = usize::from(supported.channels()).max(1);
    let device_rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.into();

    let samples = resample_linear(&pcm.samples, pcm.sample_rate, device_rate);
    let total = samples.len();
    let expected = Duration::from_secs_f64(total as f64 / f64::from(device_rate.max(1)));

    let mut position = 0usize;
    let mut signalled = false;
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            for frame in data.chunks_mut(channels) {
                let sample = samples.get(position).copied().unwrap_or(0.0);
                position = (position + 1).min(total);
                frame.fill(sample);
            }
            if position >= total && !signalled {
                signalled = true;
                let _ = signal_tx.send(Signal::Finished);
            }
        },
        |err| log::error!("playback: stream error: {err}"),
        None,
    )?;
    stream.play()?;

    let end = match signal_rx.recv_timeout(expected + COMPLETION_GRACE) {
        Ok(Signal::Finished) => match signal_rx.recv_timeout(DEVICE_TAIL) {
            Ok(Signal::Stop) => PlaybackEnd::Stopped,
            _ => PlaybackEnd::Finished,
        },
        Ok(Signal::Stop) => PlaybackEnd::Stopped,
        Err(RecvTimeoutError::Timeout) => return Err(PlaybackError::Stalled),
        Err(RecvTimeoutError::Disconnected) => PlaybackEnd::Finished,
    };

    drop(stream);
    log::debug!(
        "playback: {} {:?} ({:.2}s @ {device_rate} Hz)",
        path.display(),
        end,
        pcm.duration_secs()
    );
    Ok(end)
}

// ---------------------------------------------------------------------------
// RecordingOutput  (test-only)
// ---------------------------------------------------------------------------

/// A test double that "plays" a clip by reading its text content.
///
/// Each play sleeps for `delay` (observing the token), records the clip's
/// content on completion, and fails for contents listed in `fail_on`.
#[cfg(test)]
pub struct RecordingOutput {
    delay: Duration,
    fail_on: Vec<String>,
    played: std::sync::Mutex<Vec<String>>,
    active: std::sync::atomic::AtomicUsize,
    max_active: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl RecordingOutput {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            fail_on: Vec::new(),
            played: std::sync::Mutex::new(Vec::new()),
            active: Default::default(),
            max_active: Default::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail_on.push(text.to_string());
        self
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    /// Highest number of overlapping `play` calls seen.
    pub fn max_overlap(&self) -> usize {
        self.max_active.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl AudioOutput for RecordingOutput {
    async fn play(
        &self,
        clip: &AudioClip,
        cancel: &CancellationToken,
    ) -> Result<PlaybackEnd, PlaybackError> {
        use std::sync::atomic::Ordering;

        let text = std::fs::read_to_string(clip.path())?;

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let end = tokio::select! {
            biased;
            () = cancel.cancelled() => PlaybackEnd::Stopped,
            () = tokio::time::sleep(self.delay) => PlaybackEnd::Finished,
        };
        self.active.fetch_sub(1, Ordering::SeqCst);

        if end == PlaybackEnd::Stopped {
            return Ok(end);
        }
        if self.fail_on.contains(&text) {
            return Err(PlaybackError::Decode("scripted failure".into()));
        }
        self.played.lock().unwrap().push(text);
        Ok(end)
    }
}
