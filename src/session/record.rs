use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::audio::{DevicePair, OutputFile, PlaybackWarning};

/// Recording channels captured from the input device
pub const CAPTURE_CHANNELS: u16 = 2;

/// Lifecycle of a recording session.
///
/// ```text
/// idle → recording → completed | stopped | error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Recording,
    Completed,
    Stopped,
    Error,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Recording)
    }

    /// Terminal states whose output files are usable
    pub fn has_output(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Stopped)
    }
}

/// One playback+capture run.
///
/// Only the session engine mutates a session, and only until it reaches a
/// terminal status. Output files are present exactly when the status is
/// `completed` or `stopped`.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingSession {
    id: String,
    human_id: String,
    playback_file: String,
    #[serde(skip)]
    playback_path: PathBuf,
    #[serde(skip)]
    file_label: String,
    start_time: DateTime<Local>,
    end_time: Option<DateTime<Local>>,
    duration: f64,
    sample_rate: u32,
    channels: u16,
    output_prefix: String,
    input_device: String,
    output_device: String,
    status: SessionStatus,
    files: Vec<OutputFile>,
    error: Option<String>,
    warnings: Vec<PlaybackWarning>,
}

impl RecordingSession {
    pub(crate) fn begin(
        playback_path: &Path,
        duration: f64,
        sample_rate: u32,
        output_prefix: &str,
        devices: &DevicePair,
        warnings: Vec<PlaybackWarning>,
        start_time: DateTime<Local>,
    ) -> Self {
        Self {
            id: session_id(start_time),
            human_id: generate_human_id(),
            playback_file: playback_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| playback_path.display().to_string()),
            playback_path: playback_path.to_path_buf(),
            file_label: file_label(start_time),
            start_time,
            end_time: None,
            duration,
            sample_rate,
            channels: CAPTURE_CHANNELS,
            output_prefix: output_prefix.to_string(),
            input_device: devices.input.name.clone(),
            output_device: devices.output.name.clone(),
            status: SessionStatus::Recording,
            files: Vec::new(),
            error: None,
            warnings,
        }
    }

    /// Move to a success terminal state with the files that were written.
    pub(crate) fn finish(
        &mut self,
        status: SessionStatus,
        files: Vec<OutputFile>,
        end_time: DateTime<Local>,
    ) {
        debug_assert!(status.has_output());
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.files = files;
        self.end_time = Some(end_time);
    }

    /// Move to `error`; no output files are reported.
    pub(crate) fn fail(&mut self, message: impl Into<String>, end_time: DateTime<Local>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = SessionStatus::Error;
        self.files.clear();
        self.error = Some(message.into());
        self.end_time = Some(end_time);
    }

    /// Distinguish a session started within the same second as an earlier one.
    pub(crate) fn disambiguate(&mut self, sequence: u32) {
        self.id = format!("{}_{}", session_id(self.start_time), sequence);
        self.file_label = format!("{}_{}", file_label(self.start_time), sequence);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn human_id(&self) -> &str {
        &self.human_id
    }

    pub fn playback_file(&self) -> &str {
        &self.playback_file
    }

    pub fn playback_path(&self) -> &Path {
        &self.playback_path
    }

    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Local>> {
        self.end_time
    }

    /// Requested duration in seconds
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn output_prefix(&self) -> &str {
        &self.output_prefix
    }

    pub fn input_device(&self) -> &str {
        &self.input_device
    }

    pub fn output_device(&self) -> &str {
        &self.output_device
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn files(&self) -> &[OutputFile] {
        &self.files
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn warnings(&self) -> &[PlaybackWarning] {
        &self.warnings
    }

    /// Timestamp label used in output file names
    pub fn file_label(&self) -> &str {
        &self.file_label
    }

    /// Seconds from start to `end_time`, or to `now` while still recording.
    pub fn elapsed_seconds(&self, now: DateTime<Local>) -> f64 {
        let end = self.end_time.unwrap_or(now);
        (end - self.start_time).num_milliseconds().max(0) as f64 / 1000.0
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let now = Local::now();
        let elapsed = self.elapsed_seconds(now);
        let recording = self.status == SessionStatus::Recording;
        SessionSnapshot {
            session: self.clone(),
            elapsed_seconds: recording.then_some(elapsed),
            expected_duration: recording.then_some(self.duration),
            progress_percent: recording
                .then(|| (elapsed / self.duration * 100.0).min(100.0)),
            duration_seconds: (!recording).then_some(elapsed),
        }
    }
}

/// Serializable view of a session with wall-clock derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    #[serde(flatten)]
    pub session: RecordingSession,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

fn session_id(start_time: DateTime<Local>) -> String {
    start_time.format("%Y%m%d_%H%M%S").to_string()
}

fn file_label(start_time: DateTime<Local>) -> String {
    start_time.format("%Y-%m-%d_%H-%M-%S").to_string()
}

const ADJECTIVES: &[&str] = &[
    "swift", "bright", "calm", "bold", "clear", "deep", "eager", "fair", "gentle", "happy", "keen",
    "light", "merry", "noble", "quick", "warm", "wise", "brave", "cool", "deft", "fine", "grand",
];

const NOUNS: &[&str] = &[
    "panda", "tiger", "eagle", "dolphin", "falcon", "phoenix", "dragon", "wolf", "bear", "hawk",
    "lynx", "otter", "raven", "seal", "swan", "whale", "bison", "crane", "heron", "koala",
];

/// Memorable alias such as `swift-panda-2347`
pub fn generate_human_id() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("quiet");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("owl");
    let number: u16 = rng.gen_range(1000..=9999);
    format!("{adjective}-{noun}-{number}")
}
