use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::transfer::StorageConfig;

/// Environment variables override file values, e.g.
/// `BENCH_RECORDER__RECORDER__SAMPLE_RATE=48000`
pub const ENV_PREFIX: &str = "BENCH_RECORDER";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub recorder: RecorderSettings,
    pub storage: StorageConfig,
    pub transfer: TransferSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "bench-recorder".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Session engine settings and request defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    /// Where session WAV files are written
    pub recordings_dir: PathBuf,
    /// Fallback directory for relative playback file names
    pub playback_dir: PathBuf,
    pub default_duration_secs: f64,
    /// Longest session a request may ask for
    pub max_duration_secs: f64,
    pub sample_rate: u32,
    pub output_prefix: String,
    /// Name fragment identifying the target interface
    pub device_pattern: String,
    /// Delay between starting playback and starting capture
    pub capture_offset_ms: u64,
    /// How long `stop` waits for the streams to wind down
    pub stop_timeout_ms: u64,
    /// Cancellation polling granularity of the stream workers
    pub poll_interval_ms: u64,
}

impl RecorderSettings {
    pub fn capture_offset(&self) -> Duration {
        Duration::from_millis(self.capture_offset_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            recordings_dir: PathBuf::from("recordings"),
            playback_dir: PathBuf::from("playback_files"),
            default_duration_secs: 3600.0,
            max_duration_secs: 14_400.0,
            sample_rate: 44_100,
            output_prefix: "api_recording".to_string(),
            device_pattern: "rubix".to_string(),
            capture_offset_ms: 100,
            stop_timeout_ms: 2_000,
            poll_interval_ms: 50,
        }
    }
}

/// Transfer worker and retry settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    /// Jobs allowed to run at the same time
    pub workers: usize,
    /// Upper bound for a single scp/rsync/http call
    pub command_timeout_secs: u64,
}

impl TransferSettings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2_000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
            workers: 2,
            command_timeout_secs: 300,
        }
    }
}

impl Config {
    /// Defaults, then the optional file at `path`, then environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {path}"))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}
