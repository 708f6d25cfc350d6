//! Session engine
//!
//! Owns device binding and the playback/capture worker pair of the single
//! active session. A session runs as one supervisor task:
//!
//! ```text
//! start ─▶ playback worker ─▶ (capture offset) ─▶ capture worker
//!                  │                                   │
//!                  └──── both done | stop | deadline ──┘
//!                                   │
//!                       finalize: write files, registry, auto-transfer
//! ```
//!
//! Both workers run on the blocking pool and observe one [`StopSignal`].
//! `stop` waits for finalization; the workers get `stop_timeout` to
//! acknowledge cancellation before finalization proceeds with whatever
//! was captured.
//!
//! A session whose capture filled up is `completed` even when a stop or
//! the deadline fired afterwards. A partial capture is `stopped`, and a
//! session that captured nothing ends in `error` without files.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::record::{RecordingSession, SessionSnapshot, SessionStatus, CAPTURE_CHANNELS};
use super::registry::SessionRegistry;
use crate::audio::{
    output_path, write_session_files, AudioBackend, AudioDevice, CaptureBuffer, CaptureRequest,
    DevicePair, DeviceResolver, DeviceSelector, OutputFile, OutputKind, PlaybackBuffer,
    PlaybackRequest, StopReason, StopSignal, TargetPresence,
};
use crate::config::RecorderSettings;
use crate::error::{RecorderError, RecorderResult};
use crate::transfer::TransferService;

/// `status` result: the active session or an idle marker.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EngineStatus {
    Idle(IdleStatus),
    Active(Box<SessionSnapshot>),
}

#[derive(Debug, Clone, Serialize)]
pub struct IdleStatus {
    pub status: &'static str,
    pub message: String,
}

impl EngineStatus {
    pub fn is_idle(&self) -> bool {
        matches!(self, EngineStatus::Idle(_))
    }
}

/// Result of removing a finished session's files from disk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeletionReport {
    pub session_id: String,
    pub deleted_files: Vec<String>,
    /// `name: reason` for every file that could not be removed
    pub failed_files: Vec<String>,
    pub deleted_count: usize,
}

struct ActiveControl {
    session_id: String,
    stop: StopSignal,
    done: oneshot::Receiver<RecordingSession>,
}

pub struct SessionEngine {
    backend: Arc<dyn AudioBackend>,
    registry: Arc<SessionRegistry>,
    transfers: TransferService,
    settings: RecorderSettings,
    control: Mutex<Option<ActiveControl>>,
    finished: Arc<Notify>,
}

impl SessionEngine {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        registry: Arc<SessionRegistry>,
        transfers: TransferService,
        settings: RecorderSettings,
    ) -> Self {
        Self {
            backend,
            registry,
            transfers,
            settings,
            control: Mutex::new(None),
            finished: Arc::new(Notify::new()),
        }
    }

    pub fn settings(&self) -> &RecorderSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Bind devices, build the playback buffer and launch a new session.
    ///
    /// Returns as soon as the session is registered and its workers are
    /// running.
    pub async fn start(&self, config: SessionConfig) -> RecorderResult<RecordingSession> {
        let mut control = self.control.lock().await;
        if self.registry.is_active().await {
            return Err(RecorderError::SessionAlreadyActive);
        }

        let devices = self
            .resolve_devices(config.input_device.clone(), config.output_device.clone())
            .await?;

        let path = config.playback_file.clone();
        let (duration, sample_rate) = (config.duration_secs, config.sample_rate);
        let buffer = tokio::task::spawn_blocking(move || {
            PlaybackBuffer::build(path, duration, sample_rate)
        })
        .await
        .map_err(|e| worker_failure("playback buffer", e))??;
        let sink = CaptureBuffer::new(CAPTURE_CHANNELS, buffer.frames())?;
        let buffer = Arc::new(buffer);

        let session = RecordingSession::begin(
            &config.playback_file,
            config.duration_secs,
            config.sample_rate,
            &config.output_prefix,
            &devices,
            buffer.warnings.clone(),
            Local::now(),
        );
        let session = self.registry.begin(session).await?;

        info!("Starting recording session");
        info!("  Session: {} ({})", session.id(), session.human_id());
        info!("  Playback: {}", config.playback_file.display());
        info!("  Duration: {}s at {} Hz", config.duration_secs, config.sample_rate);
        info!(
            "  Input: {} / Output: {}",
            devices.input.name, devices.output.name
        );

        let stop = StopSignal::new();
        let (done_tx, done_rx) = oneshot::channel();
        let run = SessionRun {
            backend: Arc::clone(&self.backend),
            registry: Arc::clone(&self.registry),
            transfers: self.transfers.clone(),
            settings: self.settings.clone(),
            session: session.clone(),
            devices,
            buffer,
            sink,
            stop: stop.clone(),
            finished: Arc::clone(&self.finished),
            done: done_tx,
        };
        tokio::spawn(run.execute());

        *control = Some(ActiveControl {
            session_id: session.id().to_string(),
            stop,
            done: done_rx,
        });
        Ok(session)
    }

    /// Cancel the active session and return it once finalized.
    pub async fn stop(&self) -> RecorderResult<RecordingSession> {
        let Some(control) = self.control.lock().await.take() else {
            return Err(RecorderError::NoActiveSession);
        };
        let active = self.registry.active().await;
        if active.as_ref().map(|s| s.id()) != Some(control.session_id.as_str()) {
            return Err(RecorderError::NoActiveSession);
        }

        info!("Stop requested for session {}", control.session_id);
        control.stop.trigger(StopReason::Requested(Local::now()));

        control.done.await.map_err(|_| {
            RecorderError::Audio(format!(
                "session {} ended without finalizing",
                control.session_id
            ))
        })
    }

    pub async fn status(&self) -> EngineStatus {
        match self.registry.active().await {
            Some(session) => EngineStatus::Active(Box::new(session.snapshot())),
            None => EngineStatus::Idle(IdleStatus {
                status: "idle",
                message: "No active recording".to_string(),
            }),
        }
    }

    /// Terminal sessions, most recent first.
    pub async fn history(&self) -> Vec<SessionSnapshot> {
        self.registry
            .history()
            .await
            .iter()
            .map(RecordingSession::snapshot)
            .collect()
    }

    /// Wait until no session is active; returns the latest finished one.
    pub async fn wait_idle(&self) -> Option<RecordingSession> {
        loop {
            let finished = self.finished.notified();
            if !self.registry.is_active().await {
                return self.registry.history().await.into_iter().next();
            }
            finished.await;
        }
    }

    /// Remove every file a finished session left in the recordings directory.
    ///
    /// Covers the partial files of failed sessions too. Files that are
    /// already gone are skipped; the session stays in history.
    pub async fn delete(&self, id: &str) -> RecorderResult<DeletionReport> {
        if let Some(active) = self.registry.active().await {
            if active.id() == id || active.human_id() == id {
                return Err(RecorderError::SessionInProgress(active.id().to_string()));
            }
        }
        let session = self
            .registry
            .find_terminal(id)
            .await
            .ok_or_else(|| RecorderError::SessionNotFound(id.to_string()))?;

        let mut report = DeletionReport {
            session_id: session.id().to_string(),
            ..DeletionReport::default()
        };
        for kind in OutputKind::ALL {
            let path = output_path(
                &self.settings.recordings_dir,
                session.output_prefix(),
                session.file_label(),
                kind,
            );
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    info!("Deleted {}", path.display());
                    report.deleted_files.push(name);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to delete {}: {}", path.display(), e);
                    report.failed_files.push(format!("{name}: {e}"));
                }
            }
        }

        if report.deleted_files.is_empty() && report.failed_files.is_empty() {
            return Err(RecorderError::NoSessionFiles(session.id().to_string()));
        }
        report.deleted_count = report.deleted_files.len();
        Ok(report)
    }

    /// Which roles of the configured pattern are currently connected.
    pub async fn target_presence(&self) -> RecorderResult<TargetPresence> {
        let backend = Arc::clone(&self.backend);
        let pattern = self.settings.device_pattern.clone();
        tokio::task::spawn_blocking(move || DeviceResolver::new(backend.as_ref()).presence(&pattern))
            .await
            .map_err(|e| worker_failure("device lookup", e))?
    }

    /// Fresh device enumeration with target flags for `pattern`.
    pub async fn devices(&self, pattern: Option<String>) -> RecorderResult<Vec<AudioDevice>> {
        let backend = Arc::clone(&self.backend);
        let pattern = pattern.unwrap_or_else(|| self.settings.device_pattern.clone());
        tokio::task::spawn_blocking(move || DeviceResolver::new(backend.as_ref()).enumerate(&pattern))
            .await
            .map_err(|e| worker_failure("device enumeration", e))?
    }

    /// Resolve the configured target pair, honouring explicit hints.
    pub async fn resolve_devices(
        &self,
        input: Option<DeviceSelector>,
        output: Option<DeviceSelector>,
    ) -> RecorderResult<DevicePair> {
        let backend = Arc::clone(&self.backend);
        let pattern = self.settings.device_pattern.clone();
        tokio::task::spawn_blocking(move || {
            DeviceResolver::new(backend.as_ref()).resolve_with(
                &pattern,
                input.as_ref(),
                output.as_ref(),
            )
        })
        .await
        .map_err(|e| worker_failure("device resolution", e))?
    }
}

fn worker_failure(what: &str, err: JoinError) -> RecorderError {
    RecorderError::Audio(format!("{what} task failed: {err}"))
}

type WorkerResult = Result<RecorderResult<()>, JoinError>;

/// Everything the supervisor task of one session owns.
struct SessionRun {
    backend: Arc<dyn AudioBackend>,
    registry: Arc<SessionRegistry>,
    transfers: TransferService,
    settings: RecorderSettings,
    session: RecordingSession,
    devices: DevicePair,
    buffer: Arc<PlaybackBuffer>,
    sink: CaptureBuffer,
    stop: StopSignal,
    finished: Arc<Notify>,
    done: oneshot::Sender<RecordingSession>,
}

enum Outcome {
    Written(Vec<OutputFile>),
    Failed(String),
}

impl SessionRun {
    async fn execute(self) {
        let poll_interval = self.settings.poll_interval();

        let mut playback = self.spawn_playback(poll_interval);

        // Playback leads capture by a fixed offset
        tokio::select! {
            _ = tokio::time::sleep(self.settings.capture_offset()) => {}
            _ = self.stop.triggered() => {}
        }
        let mut capture = self.spawn_capture(poll_interval);

        let mut playback_result: Option<WorkerResult> = None;
        let mut capture_result: Option<WorkerResult> = None;

        let watchdog = tokio::time::sleep(
            Duration::from_secs_f64(self.session.duration())
                + self.settings.capture_offset()
                + self.settings.stop_timeout(),
        );
        tokio::pin!(watchdog);

        while playback_result.is_none() || capture_result.is_none() {
            tokio::select! {
                r = &mut playback, if playback_result.is_none() => {
                    self.stop_on_failure("playback", &r);
                    playback_result = Some(r);
                }
                r = &mut capture, if capture_result.is_none() => {
                    self.stop_on_failure("capture", &r);
                    capture_result = Some(r);
                }
                _ = &mut watchdog => {
                    warn!(
                        "Session {} overran its duration; stopping streams",
                        self.session.id()
                    );
                    self.stop.trigger(StopReason::Deadline);
                    break;
                }
                _ = self.stop.triggered() => break,
            }
        }

        if playback_result.is_none() || capture_result.is_none() {
            let drain = async {
                if playback_result.is_none() {
                    playback_result = Some((&mut playback).await);
                }
                if capture_result.is_none() {
                    capture_result = Some((&mut capture).await);
                }
            };
            if tokio::time::timeout(self.settings.stop_timeout(), drain)
                .await
                .is_err()
            {
                warn!(
                    "Audio workers did not stop within {:?}; finalizing with {} captured frames",
                    self.settings.stop_timeout(),
                    self.sink.frames()
                );
            }
        }

        let failure = describe_failure("playback", playback_result.as_ref())
            .or_else(|| describe_failure("capture", capture_result.as_ref()));
        self.finalize(failure).await;
    }

    fn spawn_playback(&self, poll_interval: Duration) -> JoinHandle<RecorderResult<()>> {
        let backend = Arc::clone(&self.backend);
        let request = PlaybackRequest {
            device: self.devices.output.clone(),
            buffer: Arc::clone(&self.buffer),
            stop: self.stop.clone(),
            poll_interval,
        };
        debug!("Launching playback on {}", request.device.name);
        tokio::task::spawn_blocking(move || backend.play(request))
    }

    fn spawn_capture(&self, poll_interval: Duration) -> JoinHandle<RecorderResult<()>> {
        let backend = Arc::clone(&self.backend);
        let request = CaptureRequest {
            device: self.devices.input.clone(),
            sample_rate: self.session.sample_rate(),
            sink: self.sink.clone(),
            stop: self.stop.clone(),
            poll_interval,
        };
        debug!("Launching capture on {}", request.device.name);
        tokio::task::spawn_blocking(move || backend.capture(request))
    }

    fn stop_on_failure(&self, worker: &str, result: &WorkerResult) {
        if describe_failure(worker, Some(result)).is_some() {
            self.stop.trigger(StopReason::Fault);
        }
    }

    async fn write_files(&self, samples: Vec<i16>) -> RecorderResult<Vec<OutputFile>> {
        let dir = self.settings.recordings_dir.clone();
        let prefix = self.session.output_prefix().to_string();
        let label = self.session.file_label().to_string();
        let sample_rate = self.session.sample_rate();
        tokio::task::spawn_blocking(move || {
            write_session_files(&dir, &prefix, &label, &samples, sample_rate)
        })
        .await
        .map_err(|e| worker_failure("file writer", e))?
    }

    async fn finalize(self, failure: Option<String>) {
        // A full sink means the capture ran its course, whatever stop arrived late
        let complete = self.sink.is_full();
        let samples = self.sink.take();
        let frames = samples.len() / CAPTURE_CHANNELS as usize;

        let outcome = match failure {
            Some(message) => {
                // Partial audio stays on disk but is not reported as output
                if frames > 0 {
                    if let Err(e) = self.write_files(samples).await {
                        warn!("Could not save partial capture: {}", e);
                    }
                }
                Outcome::Failed(message)
            }
            None if frames == 0 => Outcome::Failed(match self.stop.reason() {
                Some(StopReason::Requested(_)) => "stopped before capture began".to_string(),
                _ => "no audio was captured".to_string(),
            }),
            None => match self.write_files(samples).await {
                Ok(files) => Outcome::Written(files),
                Err(e) => Outcome::Failed(format!("failed to write output files: {e}")),
            },
        };

        let (status, end_time) = match self.stop.reason() {
            _ if complete => (SessionStatus::Completed, Local::now()),
            Some(StopReason::Requested(at)) => (SessionStatus::Stopped, at),
            Some(StopReason::Deadline) => (SessionStatus::Stopped, Local::now()),
            _ => (SessionStatus::Completed, Local::now()),
        };

        let finished = self
            .registry
            .finish(self.session.id(), |session| match outcome {
                Outcome::Written(files) => session.finish(status, files, end_time),
                Outcome::Failed(message) => session.fail(message, Local::now()),
            })
            .await;
        self.finished.notify_waiters();

        let session = match finished {
            Ok(session) => session,
            Err(e) => {
                error!("Session {} could not be finalized: {}", self.session.id(), e);
                return;
            }
        };

        match session.status() {
            SessionStatus::Error => error!(
                "Session {} failed: {}",
                session.id(),
                session.error().unwrap_or("unknown error")
            ),
            status => info!(
                "Session {} {:?} with {} frames captured",
                session.id(),
                status,
                frames
            ),
        }

        if let Some(job) = self.transfers.auto_enqueue(&session).await {
            info!("Auto-transfer {} queued for session {}", job.id, session.id());
        }

        // Nobody waiting unless `stop` was called
        let _ = self.done.send(session);
    }
}

fn describe_failure(worker: &str, result: Option<&WorkerResult>) -> Option<String> {
    match result? {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(format!("{worker} failed: {e}")),
        Err(e) => Some(format!("{worker} worker panicked: {e}")),
    }
}
