//! Decode synthesized clips (MP3 or WAV) into mono `f32` PCM.

use std::io::Cursor;
use std::path::Path;

use crate::audio::stereo_to_mono;
use crate::config::AudioFormat;
use crate::playback::output::PlaybackError;

/// Mono samples plus the rate they were recorded at.
#[derive(Debug, Clone, PartialEq)]
pub struct Pcm {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Pcm {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

pub fn decode_file(path: &Path, format: AudioFormat) -> Result<Pcm, PlaybackError> {
    let bytes = std::fs::read(path)?;
    decode(&bytes, format)
}

pub fn decode(bytes: &[u8], format: AudioFormat) -> Result<Pcm, PlaybackError> {
    match format {
        AudioFormat::Mp3 => decode_mp3(bytes),
        AudioFormat::Wav => decode_wav(bytes),
    }
}

fn decode_mp3(bytes: &[u8]) -> Result<Pcm, PlaybackError> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(0);
                let pcm: Vec<f32> = frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                let channels = u16::try_from(frame.channels).unwrap_or(1);
                samples.extend(stereo_to_mono(&pcm, channels));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(PlaybackError::Decode(format!("mp3: {e}"))),
        }
    }

    Ok(Pcm {
        samples,
        sample_rate,
    })
}

fn decode_wav(bytes: &[u8]) -> Result<Pcm, PlaybackError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| PlaybackError::Decode(format!("wav: {e}")))?;
    let spec = reader.spec();

    let interleaved: Result<Vec<f32>, hound::Error> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect(),
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect()
        }
    };
    let interleaved = interleaved.map_err(|e| PlaybackError::Decode(format!("wav: {e}")))?;

    Ok(Pcm {
        samples: stereo_to_mono(&interleaved, spec.channels),
        sample_rate: spec.sample_rate,
    })
}
