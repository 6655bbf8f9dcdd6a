//! Temporary on-disk audio produced by the synthesis service.
//!
//! An [`AudioClip`] owns its file: dropping the clip deletes it.  The
//! synthesizer creates clips and hands them to the player, which is the
//! only stage that releases them.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::config::AudioFormat;

#[derive(Debug)]
pub struct AudioClip {
    file: NamedTempFile,
    format: AudioFormat,
}

impl AudioClip {
    /// Write `bytes` to a fresh temp file under `dir`.
    pub fn write(dir: &Path, format: AudioFormat, bytes: &[u8]) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("reply-")
            .suffix(&format!(".{}", format.extension()))
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self { file, format })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Delete the backing file now, logging (rather than ignoring) failure.
    pub fn release(self) {
        let path: PathBuf = self.file.path().to_path_buf();
        if let Err(e) = self.file.close() {
            log::warn!("clip: could not remove {}: {e}", path.display());
        }
    }
}
