// Playback buffer construction
//
// The reference file is upmixed (mono only) and tiled or truncated so the
// buffer holds exactly `duration * sample_rate` frames. Playback and
// capture therefore span the same, predictable number of frames.

use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use super::file::AudioFile;
use crate::error::{RecorderError, RecorderResult};

/// Non-fatal conditions noticed while building a playback buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaybackWarning {
    /// The file's rate differs from the session rate. No resampling is done.
    SampleRateMismatch { file_rate: u32, target_rate: u32 },
}

impl std::fmt::Display for PlaybackWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackWarning::SampleRateMismatch {
                file_rate,
                target_rate,
            } => write!(
                f,
                "playback sample rate ({file_rate} Hz) doesn't match recording ({target_rate} Hz)"
            ),
        }
    }
}

/// Interleaved i16 samples ready to be streamed to the output device.
#[derive(Debug, Clone)]
pub struct PlaybackBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Duration of the source file before tiling
    pub source_duration_secs: f64,
    pub warnings: Vec<PlaybackWarning>,
}

impl PlaybackBuffer {
    /// Load `path` and shape it into exactly `duration_secs * sample_rate` frames.
    pub fn build(
        path: impl AsRef<Path>,
        duration_secs: f64,
        sample_rate: u32,
    ) -> RecorderResult<Self> {
        let file = AudioFile::open(path)?;

        let mut warnings = Vec::new();
        if file.sample_rate != sample_rate {
            let warning = PlaybackWarning::SampleRateMismatch {
                file_rate: file.sample_rate,
                target_rate: sample_rate,
            };
            warn!("{}; consider converting the file to {} Hz", warning, sample_rate);
            warnings.push(warning);
        }

        let (samples, channels) = if file.channels == 1 {
            info!("Converted mono playback to stereo");
            (upmix_mono(&file.samples), 2)
        } else {
            (file.samples, file.channels)
        };

        let frames = match target_frames(duration_secs, sample_rate) {
            Some(0) => {
                return Err(RecorderError::InvalidRequest(format!(
                    "duration {duration_secs}s at {sample_rate} Hz yields no frames"
                )))
            }
            Some(frames) => frames,
            None => return Err(too_long(duration_secs, sample_rate)),
        };

        let source_frames = samples.len() / channels as usize;
        if source_frames < frames {
            info!(
                "Tiling {} source frames {}x to reach {} frames",
                source_frames,
                frames.div_ceil(source_frames),
                frames
            );
        }

        let samples = tile_to_frames(&samples, channels, frames)
            .ok_or_else(|| too_long(duration_secs, sample_rate))?;

        Ok(Self {
            samples,
            sample_rate,
            channels,
            source_duration_secs: file.duration_seconds,
            warnings,
        })
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Samples of a single channel, in frame order.
    pub fn channel(&self, index: usize) -> impl Iterator<Item = i16> + '_ {
        self.samples
            .iter()
            .skip(index)
            .step_by(self.channels as usize)
            .copied()
    }
}

fn too_long(duration_secs: f64, sample_rate: u32) -> RecorderError {
    RecorderError::InvalidRequest(format!(
        "duration {duration_secs}s at {sample_rate} Hz is too long to buffer"
    ))
}

/// Number of frames covering `duration_secs` at `sample_rate`.
///
/// `None` when the count is negative, not finite or does not fit a `usize`.
pub fn target_frames(duration_secs: f64, sample_rate: u32) -> Option<usize> {
    let frames = (duration_secs * sample_rate as f64).round();
    if !frames.is_finite() || frames < 0.0 || frames >= usize::MAX as f64 {
        return None;
    }
    Some(frames as usize)
}

/// Duplicate a mono signal into two identical interleaved channels.
pub fn upmix_mono(mono: &[i16]) -> Vec<i16> {
    mono.iter().flat_map(|&s| [s, s]).collect()
}

/// Repeat (or cut) interleaved samples end to end until exactly `frames` long.
///
/// `None` when the result cannot be allocated.
pub fn tile_to_frames(samples: &[i16], channels: u16, frames: usize) -> Option<Vec<i16>> {
    let wanted = frames.checked_mul(channels as usize)?;
    let mut tiled = Vec::new();
    tiled.try_reserve_exact(wanted).ok()?;
    if samples.is_empty() {
        tiled.resize(wanted, 0);
    } else {
        tiled.extend(samples.iter().copied().cycle().take(wanted));
    }
    Some(tiled)
}
