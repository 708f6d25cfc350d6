use hound::{SampleFormat, WavReader};
use std::path::Path;
use tracing::info;

use crate::error::{RecorderError, RecorderResult};

/// A decoded WAV file as interleaved 16-bit PCM.
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    /// Load a WAV file, converting any integer or float encoding to i16.
    ///
    /// Missing, unreadable and zero-length files are all rejected with
    /// [`RecorderError::InvalidPlaybackFile`].
    pub fn open(path: impl AsRef<Path>) -> RecorderResult<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let invalid = |reason: String| {
            RecorderError::InvalidPlaybackFile(format!("{}: {}", path.display(), reason))
        };

        let reader = WavReader::open(path).map_err(|e| invalid(e.to_string()))?;
        let spec = reader.spec();

        let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 16) => reader
                .into_samples::<i16>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| invalid(e.to_string()))?,
            (SampleFormat::Int, bits) => reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| scale_to_i16(v, bits)))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| invalid(e.to_string()))?,
            (SampleFormat::Float, _) => reader
                .into_samples::<f32>()
                .map(|s| s.map(float_to_i16))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| invalid(e.to_string()))?,
        };

        if spec.channels == 0 || samples.len() < spec.channels as usize {
            return Err(invalid("file contains no audio frames".to_string()));
        }

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }
}

fn scale_to_i16(value: i32, bits: u16) -> i16 {
    if bits > 16 {
        (value >> (bits - 16)) as i16
    } else {
        (value << (16 - bits)) as i16
    }
}

fn float_to_i16(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
