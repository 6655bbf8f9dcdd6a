//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

/// Environment variable consulted when an API key is not set in the file.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

// ---------------------------------------------------------------------------
// ConversationConfig
// ---------------------------------------------------------------------------

/// Wake word, exit phrases and canned replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Keyword that wakes the assistant and prefixes an addressed utterance.
    pub wake_word: String,
    /// Phrases that end the conversation while active.  Matched
    /// case-insensitively anywhere in the transcript.
    pub exit_phrases: Vec<String>,
    /// Spoken when the wake word is heard without a request.
    pub greeting: String,
    /// Spoken when an exit phrase ends the conversation.  `None` stays silent.
    pub farewell: Option<String>,
    /// Payloads shorter than this (in characters) count as "no request yet".
    pub min_payload_chars: usize,
    /// Upper bound on remembered messages; `0` keeps everything.
    pub max_history_messages: usize,
    /// Spoken in place of a reply when the language model fails.
    pub apology: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            wake_word: "buddy".into(),
            exit_phrases: vec!["that's all".into(), "that is all".into()],
            greeting: "Hi! What can I do for you?".into(),
            farewell: Some("Okay, talk to you later.".into()),
            min_payload_chars: 2,
            max_history_messages: 20,
            apology: "Sorry, I couldn't come up with an answer just now.".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Settings for the streaming chat model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible endpoint.
    ///
    /// - Ollama default: `http://localhost:11434`
    /// - OpenAI: `https://api.openai.com`
    pub base_url: String,
    /// API key; `None` for local providers.
    pub api_key: Option<String>,
    /// Model identifier sent to the API (e.g. `"qwen2.5:3b"`, `"gpt-4o-mini"`).
    pub model: String,
    /// Sampling temperature (0.0 – 1.0).
    pub temperature: f32,
    /// Connect timeout, and the longest gap tolerated between two streamed
    /// fragments.
    pub timeout_secs: u64,
    /// Persona prepended to every request as a `system` message.
    pub system_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            api_key: None,
            model: "qwen2.5:3b".into(),
            temperature: 0.7,
            timeout_secs: 20,
            system_prompt: Some(
                "You are a friendly voice assistant. Answer briefly in plain spoken language."
                    .into(),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Settings for the speech recognition service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Base URL of a Whisper-compatible transcription endpoint.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Language hint as an ISO-639-1 code; blank or `"auto"` leaves detection
    /// to the service.
    pub language: String,
    pub timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            api_key: None,
            model: "whisper-1".into(),
            language: "en".into(),
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// TtsConfig
// ---------------------------------------------------------------------------

/// Container format requested from the synthesis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
}

impl AudioFormat {
    /// File extension (and `response_format` value) for this format.
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::Mp3
    }
}

/// Settings for the speech synthesis service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    pub speed: f32,
    pub format: AudioFormat,
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            api_key: None,
            model: "tts-1".into(),
            voice: "alloy".into(),
            speed: 1.0,
            format: AudioFormat::Mp3,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for microphone capture and the listen cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Rate the recognizer receives audio at (Hz).
    pub sample_rate: u32,
    /// Minimum RMS amplitude considered speech.  Ambient calibration may
    /// raise the effective threshold above this floor.
    pub vad_threshold: f32,
    /// Length of the ambient-noise calibration window at the start of each
    /// listen cycle.
    pub ambient_calibration_ms: u64,
    /// How long to wait for speech to begin before giving up on a cycle.
    pub listen_timeout_secs: f32,
    /// Hard cap on a single phrase.
    pub phrase_limit_secs: f32,
    /// Trailing silence that ends a phrase.
    pub pause_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            vad_threshold: 0.01,
            ambient_calibration_ms: 500,
            listen_timeout_secs: 5.0,
            phrase_limit_secs: 15.0,
            pause_ms: 800,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Tunables for the per-turn generate → synthesize → play pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// A chunk is emitted once the buffered reply exceeds this many
    /// characters.
    pub chunk_threshold: usize,
    /// Capacity of the text and audio channels between stages.
    pub channel_capacity: usize,
    /// How long a cancelled stage may take to wind down before it is aborted.
    pub cancel_grace_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: 40,
            channel_capacity: 4,
            cancel_grace_ms: 2_000,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use talkback::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub conversation: ConversationConfig,
    pub llm: LlmConfig,
    pub stt: SttConfig,
    pub tts: TtsConfig,
    pub audio: AudioConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Fill unset API keys from [`API_KEY_ENV`].
    pub fn apply_env(&mut self) {
        self.apply_api_key(std::env::var(API_KEY_ENV).ok());
    }

    fn apply_api_key(&mut self, key: Option<String>) {
        let Some(key) = key.filter(|k| !k.trim().is_empty()) else {
            return;
        };
        for slot in [
            &mut self.llm.api_key,
            &mut self.stt.api_key,
            &mut self.tts.api_key,
        ] {
            if slot.as_deref().map_or(true, str::is_empty) {
                *slot = Some(key.clone());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
