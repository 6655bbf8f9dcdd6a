//! Speech recognition over a Whisper-compatible HTTP API.
//!
//! [`Recognizer`] is the interface the listen loop uses.  It is object-safe
//! and `Send + Sync` so it can be held behind an `Arc<dyn Recognizer>`.
//!
//! [`ApiRecognizer`] trims silence locally first; a clip with no voice at
//! all comes back as [`Recognition::NoSpeech`] without touching the network.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::audio::VadDetector;
use crate::config::{AudioConfig, SttConfig};

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum SttError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("STT endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("STT request timed out")]
    Timeout,

    #[error("could not encode audio: {0}")]
    Encode(String),

    #[error("unexpected STT response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SttError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SttError::Timeout
        } else if e.is_decode() {
            SttError::Parse(e.to_string())
        } else {
            SttError::Request(e.to_string())
        }
    }
}

impl From<hound::Error> for SttError {
    fn from(e: hound::Error) -> Self {
        SttError::Encode(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Recognizer trait
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    Transcript(String),
    /// Nothing intelligible was said.
    NoSpeech,
}

/// # Contract
///
/// `audio` is mono `f32` PCM at the rate the recognizer was built for.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, audio: &[f32]) -> Result<Recognition, SttError>;
}

// ---------------------------------------------------------------------------
// ApiRecognizer
// ---------------------------------------------------------------------------

#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub struct ApiRecognizer {
    client: reqwest::Client,
    config: SttConfig,
    vad: VadDetector,
    sample_rate: u32,
}

impl ApiRecognizer {
    pub fn from_config(stt: &SttConfig, audio: &AudioConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(stt.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        // 30 ms frames at whatever rate capture delivers.
        let frame = (audio.sample_rate as usize * 3 / 100).max(1);

        Self {
            client,
            config: stt.clone(),
            vad: VadDetector::with_frame_size(audio.vad_threshold, frame),
            sample_rate: audio.sample_rate,
        }
    }
}

#[async_trait]
impl Recognizer for ApiRecognizer {
    async fn recognize(&self, audio: &[f32]) -> Result<Recognition, SttError> {
        let voiced = self.vad.trim_silence(audio);
        if voiced.is_empty() {
            log::debug!("stt: clip is silent, skipping request");
            return Ok(Recognition::NoSpeech);
        }

        let wav = encode_wav(voiced, self.sample_rate)?;
        log::debug!(
            "stt: uploading {:.2}s ({} bytes)",
            voiced.len() as f32 / self.sample_rate as f32,
            wav.len()
        );

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("utterance.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| SttError::Request(e.to_string()))?,
            )
            .text("model", self.config.model.clone());
        if let Some(language) = language_hint(&self.config) {
            form = form.text("language", language.to_string());
        }

        let url = format!(
            "{}/v1/audio/transcriptions",
            self.config.base_url.trim_end_matches('/')
        );
        let mut req = self.client.post(&url).multipart(form);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SttError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let result: TranscriptionResponse = response.json().await?;
        Ok(to_recognition(&result.text))
    }
}

/// Language form field; omitted when blank or `"auto"` so the service
/// detects the language itself.
fn language_hint(config: &SttConfig) -> Option<&str> {
    let language = config.language.trim();
    if language.is_empty() || language.eq_ignore_ascii_case("auto") {
        None
    } else {
        Some(language)
    }
}

fn to_recognition(text: &str) -> Recognition {
    let text = text.trim();
    if text.is_empty() {
        Recognition::NoSpeech
    } else {
        Recognition::Transcript(text.to_string())
    }
}

/// Encode mono `f32` samples as 16-bit PCM WAV.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, SttError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

// ---------------------------------------------------------------------------
// forward_transcripts
// ---------------------------------------------------------------------------

/// Recognize each utterance from `audio_in` and forward the transcripts to
/// `text_out`, until either side closes or `cancel` fires.
///
/// Recognition failures are logged and the utterance is dropped.
pub async fn forward_transcripts(
    recognizer: Arc<dyn Recognizer>,
    mut audio_in: mpsc::Receiver<Vec<f32>>,
    text_out: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    loop {
        let audio = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = audio_in.recv() => match next {
                Some(audio) => audio,
                None => break,
            },
        };

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = recognizer.recognize(&audio) => result,
        };

        match result {
            Ok(Recognition::Transcript(text)) => {
                log::info!("heard: {text:?}");
                if text_out.send(text).await.is_err() {
                    break;
                }
            }
            Ok(Recognition::NoSpeech) => log::debug!("stt: no speech"),
            Err(e) => log::warn!("stt: recognition failed: {e}"),
        }
    }
    log::debug!("stt: transcript forwarding stopped");
}

// ---------------------------------------------------------------------------
// ScriptedRecognizer  (test-only)
// ---------------------------------------------------------------------------

/// Returns queued results in order, then `NoSpeech` forever.
#[cfg(test)]
pub struct ScriptedRecognizer {
    results: std::sync::Mutex<std::collections::VecDeque<Result<Recognition, SttError>>>,
}

#[cfg(test)]
impl ScriptedRecognizer {
    pub fn new(results: impl IntoIterator<Item = Result<Recognition, SttError>>) -> Self {
        Self {
            results: std::sync::Mutex::new(results.into_iter().collect()),
        }
    }

    pub fn transcripts(texts: &[&str]) -> Self {
        Self::new(
            texts
                .iter()
                .map(|t| Ok(Recognition::Transcript(t.to_string()))),
        )
    }
}

#[cfg(test)]
#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn recognize(&self, _audio: &[f32]) -> Result<Recognition, SttError> {
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Recognition::NoSpeech))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
