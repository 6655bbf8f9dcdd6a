//! Cross-platform application paths using the `dirs` crate.
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\talkback\
//!   macOS:   ~/Library/Application Support/talkback/
//!   Linux:   ~/.config/talkback/
//!
//! Data dir (conversation transcript):
//!   Windows: %LOCALAPPDATA%\talkback\
//!   macOS:   ~/Library/Application Support/talkback/
//!   Linux:   ~/.local/share/talkback/
//!
//! Synthesized audio lives under the system temp directory and is removed
//! as soon as it has been played.

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Append-only conversation transcript.
    pub transcript_file: PathBuf,
    /// Scratch directory for synthesized audio clips.
    pub audio_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "talkback";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            transcript_file: data_dir.join("transcript.log"),
            audio_dir: std::env::temp_dir().join(Self::APP_NAME),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths
            .transcript_file
            .file_name()
            .is_some_and(|n| n == "transcript.log"));
        assert!(paths.audio_dir.ends_with("talkback"));
    }
}
