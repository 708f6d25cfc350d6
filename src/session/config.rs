use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audio::DeviceSelector;
use crate::config::RecorderSettings;
use crate::error::{RecorderError, RecorderResult};

/// Highest sample rate a session may request
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Parameters of a `start` call as they arrive from a client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartRequest {
    /// Reference WAV file; bare names are looked up in the playback directory
    pub playback_file: String,

    /// Session length in seconds
    #[serde(default)]
    pub duration: Option<f64>,

    #[serde(default)]
    pub sample_rate: Option<u32>,

    /// Leading part of every output file name
    #[serde(default)]
    pub output_prefix: Option<String>,

    /// Device index or name fragment overriding the default pattern
    #[serde(default)]
    pub input_device: Option<String>,

    #[serde(default)]
    pub output_device: Option<String>,
}

/// Validated session parameters with defaults applied
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub playback_file: PathBuf,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub output_prefix: String,
    pub input_device: Option<DeviceSelector>,
    pub output_device: Option<DeviceSelector>,
}

impl StartRequest {
    pub fn new(playback_file: impl Into<String>) -> Self {
        Self {
            playback_file: playback_file.into(),
            ..Self::default()
        }
    }

    pub fn resolve(self, settings: &RecorderSettings) -> RecorderResult<SessionConfig> {
        if self.playback_file.trim().is_empty() {
            return Err(RecorderError::InvalidRequest(
                "playback_file is required".to_string(),
            ));
        }

        let duration_secs = self.duration.unwrap_or(settings.default_duration_secs);
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(RecorderError::InvalidRequest(format!(
                "duration must be a positive number of seconds, got {duration_secs}"
            )));
        }
        if duration_secs > settings.max_duration_secs {
            return Err(RecorderError::InvalidRequest(format!(
                "duration {duration_secs}s exceeds the maximum of {}s",
                settings.max_duration_secs
            )));
        }

        let sample_rate = self.sample_rate.unwrap_or(settings.sample_rate);
        if sample_rate == 0 || sample_rate > MAX_SAMPLE_RATE {
            return Err(RecorderError::InvalidRequest(format!(
                "sample_rate must be between 1 and {MAX_SAMPLE_RATE} Hz, got {sample_rate}"
            )));
        }

        let output_prefix = self
            .output_prefix
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| settings.output_prefix.clone());
        if output_prefix.contains(['/', '\\']) {
            return Err(RecorderError::InvalidRequest(format!(
                "output_prefix must not contain path separators: {output_prefix}"
            )));
        }

        Ok(SessionConfig {
            playback_file: locate_playback(&self.playback_file, &settings.playback_dir),
            duration_secs,
            sample_rate,
            output_prefix,
            input_device: parse_hint(self.input_device),
            output_device: parse_hint(self.output_device),
        })
    }
}

/// `name` as given if it exists, otherwise relative to `playback_dir`.
///
/// Missing files are reported later by the playback buffer as
/// `InvalidPlaybackFile`.
fn locate_playback(name: &str, playback_dir: &Path) -> PathBuf {
    let direct = PathBuf::from(name);
    if direct.exists() {
        return direct;
    }
    let fallback = playback_dir.join(name);
    if fallback.exists() {
        fallback
    } else {
        direct
    }
}

fn parse_hint(hint: Option<String>) -> Option<DeviceSelector> {
    hint.filter(|h| !h.trim().is_empty())
        .map(|h| DeviceSelector::parse(&h))
}
