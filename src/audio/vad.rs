//! Energy-based voice activity detection.
//!
//! Audio is split into fixed frames (30 ms at 16 kHz by default).  A frame
//! is voice when its RMS exceeds the threshold.  The recognizer uses
//! [`VadDetector::trim_silence`] before upload and skips the request
//! entirely when nothing is left.

/// Root-mean-square amplitude of `frame` (0.0 for an empty frame).
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let mean_sq = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
    mean_sq.sqrt()
}

/// Energy-based silence trimmer.
///
/// ```rust
/// use talkback::audio::VadDetector;
///
/// let vad = VadDetector::new(0.01);
///
/// let mut audio = vec![0.0_f32; 480];
/// audio.extend(vec![0.5_f32; 480]);
/// audio.extend(vec![0.0_f32; 480]);
///
/// assert_eq!(vad.trim_silence(&audio).len(), 480);
/// assert!(vad.has_voice(&audio));
/// assert!(!vad.has_voice(&[0.0; 960]));
/// ```
#[derive(Debug, Clone)]
pub struct VadDetector {
    rms_threshold: f32,
    frame_size: usize,
}

impl VadDetector {
    /// 30 ms frames at 16 kHz.
    pub fn new(rms_threshold: f32) -> Self {
        Self {
            rms_threshold,
            frame_size: 480,
        }
    }

    /// Frame size for other sample rates; a zero size is treated as one
    /// sample.
    pub fn with_frame_size(rms_threshold: f32, frame_size: usize) -> Self {
        Self {
            rms_threshold,
            frame_size: frame_size.max(1),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.rms_threshold
    }

    fn is_voice_frame(&self, frame: &[f32]) -> bool {
        !frame.is_empty() && rms(frame) > self.rms_threshold
    }

    /// `true` when at least one frame is above the threshold.
    pub fn has_voice(&self, audio: &[f32]) -> bool {
        audio
            .chunks(self.frame_size)
            .any(|frame| self.is_voice_frame(frame))
    }

    /// Sub-slice of `audio` from the first to the last voice frame; empty
    /// when the whole clip is silent.
    pub fn trim_silence<'a>(&self, audio: &'a [f32]) -> &'a [f32] {
        let frames: Vec<&[f32]> = audio.chunks(self.frame_size).collect();

        let Some(first) = frames.iter().position(|f| self.is_voice_frame(f)) else {
            return &audio[0..0];
        };
        let last = frames
            .iter()
            .rposition(|f| self.is_voice_frame(f))
            .unwrap_or(first);

        let start = first * self.frame_size;
        let end = ((last + 1) * self.frame_size).min(audio.len());
        &audio[start..end]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
