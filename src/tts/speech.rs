//! Speech synthesis service: `SpeechService` trait and the `ApiSpeech`
//! implementation for OpenAI-compatible `/v1/audio/speech` endpoints.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::TtsConfig;
use crate::tts::clip::AudioClip;

// ---------------------------------------------------------------------------
// TtsError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("TTS endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("TTS request timed out")]
    Timeout,

    #[error("TTS returned no audio")]
    EmptyAudio,

    #[error("could not store synthesized audio: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for TtsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TtsError::Timeout
        } else {
            TtsError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechService trait
// ---------------------------------------------------------------------------

/// Turns one piece of text into a playable clip.
#[async_trait]
pub trait SpeechService: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioClip, TtsError>;
}

// ---------------------------------------------------------------------------
// ApiSpeech
// ---------------------------------------------------------------------------

pub struct ApiSpeech {
    client: reqwest::Client,
    config: TtsConfig,
    audio_dir: PathBuf,
}

impl ApiSpeech {
    /// Clips are written under `audio_dir`.
    pub fn from_config(config: &TtsConfig, audio_dir: impl Into<PathBuf>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
            audio_dir: audio_dir.into(),
        }
    }
}

#[async_trait]
impl SpeechService for ApiSpeech {
    async fn synthesize(&self, text: &str) -> Result<AudioClip, TtsError> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        let request = SpeechRequest {
            model: &self.config.model,
            input: text,
            voice: &self.config.voice,
            speed: self.config.speed,
            response_format: self.config.format.extension(),
        };

        let url = format!(
            "{}/v1/audio/speech",
            self.config.base_url.trim_end_matches('/')
        );
        let mut req = self.client.post(&url).json(&request);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(TtsError::EmptyAudio);
        }

        let dir = self.audio_dir.clone();
        let format = self.config.format;
        let clip = tokio::task::spawn_blocking(move || AudioClip::write(&dir, format, &audio))
            .await
            .map_err(|e| TtsError::Io(std::io::Error::other(e.to_string())))??;

        log::debug!("tts: {} bytes -> {}", clip_len(&clip), clip.path().display());
        Ok(clip)
    }
}

fn clip_len(clip: &AudioClip) -> u64 {
    std::fs::metadata(clip.path()).map(|m| m.len()).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// ScriptedSpeech  (test-only)
// ---------------------------------------------------------------------------

/// A test double that writes each text verbatim into a clip.
///
/// Texts listed in `fail_on` fail synthesis.  Per-call delays are taken
/// from the front of `delays` (zero once exhausted).  Every created path is
/// remembered so tests can check nothing leaks.
#[cfg(test)]
pub struct ScriptedSpeech {
    dir: tempfile::TempDir,
    fail_on: Vec<String>,
    delays: std::sync::Mutex<std::collections::VecDeque<Duration>>,
    created: std::sync::Mutex<Vec<PathBuf>>,
}

#[cfg(test)]
impl ScriptedSpeech {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("temp dir"),
            fail_on: Vec::new(),
            delays: std::sync::Mutex::new(Default::default()),
            created: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail_on.push(text.to_string());
        self
    }

    pub fn with_delays(self, delays: impl IntoIterator<Item = Duration>) -> Self {
        self.delays.lock().unwrap().extend(delays);
        self
    }

    pub fn created(&self) -> Vec<PathBuf> {
        self.created.lock().unwrap().clone()
    }

    /// Paths created by this service that still exist on disk.
    pub fn leaked(&self) -> Vec<PathBuf> {
        self.created().into_iter().filter(|p| p.exists()).collect()
    }
}

#[cfg(test)]
#[async_trait]
impl SpeechService for ScriptedSpeech {
    async fn synthesize(&self, text: &str) -> Result<AudioClip, TtsError> {
        let delay = self.delays.lock().unwrap().pop_front().unwrap_or(Duration::ZERO);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on.iter().any(|f| f == text) {
            return Err(TtsError::Status {
                status: 500,
                body: "scripted failure".into(),
            });
        }
        let clip = AudioClip::write(self.dir.path(), crate::config::AudioFormat::Wav, text.as_bytes())?;
        self.created.lock().unwrap().push(clip.path().to_path_buf());
        Ok(clip)
    }
}
