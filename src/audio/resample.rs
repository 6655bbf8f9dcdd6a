//! Channel mixing and sample-rate conversion.
//!
//! Capture runs at whatever rate the microphone prefers and recognition
//! wants 16 kHz mono; playback goes the other way, from the synthesized
//! clip's rate to the output device's.  Both directions use
//! [`resample_linear`].

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging channels.
///
/// ```rust
/// use talkback::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample_linear
// ---------------------------------------------------------------------------

/// Resample mono `samples` from `from_rate` to `to_rate` Hz by linear
/// interpolation.
///
/// Equal rates (or a zero rate on either side) return the input unchanged.
///
/// ```rust
/// use talkback::audio::resample_linear;
///
/// let hi = vec![0.5_f32; 480];
/// assert_eq!(resample_linear(&hi, 48_000, 16_000).len(), 160);
/// assert_eq!(resample_linear(&hi, 24_000, 48_000).len(), 960);
/// ```
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }
    if samples.is_empty() {
        return Vec::new();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let src_pos = i as f64 / ratio;
            let idx = src_pos as usize;
            let frac = (src_pos - idx as f64) as f32;
            match (samples.get(idx), samples.get(idx + 1)) {
                (Some(&a), Some(&b)) => a * (1.0 - frac) + b * frac,
                (Some(&a), None) => a,
                _ => 0.0,
            }
        })
        .collect()
}

/// Shorthand for [`resample_linear`] into the recognizer's 16 kHz.
pub fn resample_to_16k(samples: &[f32], source_rate: u32) -> Vec<f32> {
    resample_linear(samples, source_rate, 16_000)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
