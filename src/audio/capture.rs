//! Microphone capture via `cpal`.
//!
//! [`Microphone::start`] converts every hardware buffer to mono at the
//! configured rate inside the callback and forwards it over a std channel.
//! The returned [`MicStream`] keeps the stream alive; dropping it stops
//! capture.

use std::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use crate::audio::resample::{resample_linear, stereo_to_mono};

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// MicStream
// ---------------------------------------------------------------------------

/// RAII guard for a running input stream.  Not `Send` on every platform,
/// so keep it on the thread that started it.
pub struct MicStream {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

/// The default input device, delivering mono frames at `target_rate`.
///
/// ```rust,no_run
/// use std::sync::mpsc;
/// use talkback::audio::Microphone;
///
/// let (tx, rx) = mpsc::channel::<Vec<f32>>();
/// let mic = Microphone::open(16_000).unwrap();
/// let _stream = mic.start(tx).unwrap();
/// while let Ok(frame) = rx.recv() {
///     println!("{} samples", frame.len());
/// }
/// ```
pub struct Microphone {
    device: cpal::Device,
    config: cpal::StreamConfig,
    native_rate: u32,
    channels: u16,
    target_rate: u32,
}

impl Microphone {
    pub fn open(target_rate: u32) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
        let supported = device.default_input_config()?;

        let channels = supported.channels();
        let native_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        log::info!(
            "capture: {} @ {native_rate} Hz x{channels}, delivering {target_rate} Hz mono",
            device.name().unwrap_or_else(|_| "input".into())
        );

        Ok(Self {
            device,
            config,
            native_rate,
            channels,
            target_rate,
        })
    }

    /// Begin streaming frames into `tx`.  Send errors are ignored so the
    /// audio thread never panics once the consumer is gone.
    pub fn start(&self, tx: mpsc::Sender<Vec<f32>>) -> Result<MicStream, CaptureError> {
        let channels = self.channels;
        let native_rate = self.native_rate;
        let target_rate = self.target_rate;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono = stereo_to_mono(data, channels);
                let _ = tx.send(resample_linear(&mono, native_rate, target_rate));
            },
            |err: cpal::StreamError| log::error!("capture: stream error: {err}"),
            None,
        )?;

        stream.play()?;
        Ok(MicStream { _stream: stream })
    }

    pub fn native_rate(&self) -> u32 {
        self.native_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_error_messages() {
        assert!(CaptureError::NoDevice.to_string().contains("no input device"));
    }
}
