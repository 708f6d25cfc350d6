use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::Notify;

use super::playback::PlaybackBuffer;
use crate::error::{RecorderError, RecorderResult};

/// Snapshot of one audio device as reported by the host.
///
/// Refreshed on every enumeration; never cached between resolutions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioDevice {
    /// Position in the host's enumeration order
    pub id: usize,
    pub name: String,
    /// Maximum input channels the device reports (0 = not an input)
    pub input_channels: u16,
    /// Maximum output channels the device reports (0 = not an output)
    pub output_channels: u16,
    /// Default sample rate in Hz, if the host reports one
    pub sample_rate: Option<u32>,
    /// Whether the name matched the configured target pattern
    pub is_target: bool,
}

/// Why a session's streams were asked to stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopReason {
    /// An explicit stop request, with the instant it was made
    Requested(DateTime<Local>),
    /// The session's wall-clock deadline elapsed
    Deadline,
    /// The other worker failed
    Fault,
}

struct StopState {
    flag: AtomicBool,
    reason: Mutex<Option<StopReason>>,
    notify: Notify,
}

/// Cooperative cancellation shared by the playback and capture workers.
///
/// Workers poll [`StopSignal::is_triggered`]; async supervisors can await
/// [`StopSignal::triggered`]. The first trigger wins and its reason sticks.
#[derive(Clone)]
pub struct StopSignal {
    state: Arc<StopState>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            state: Arc::new(StopState {
                flag: AtomicBool::new(false),
                reason: Mutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    pub fn trigger(&self, reason: StopReason) {
        {
            let mut slot = lock(&self.state.reason);
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.state.flag.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.state.flag.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<StopReason> {
        *lock(&self.state.reason)
    }

    /// Resolves once the signal has been triggered.
    pub async fn triggered(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("triggered", &self.is_triggered())
            .field("reason", &self.reason())
            .finish()
    }
}

/// In-memory accumulator for captured interleaved i16 frames.
///
/// Bounded to the requested frame count; extra samples are discarded.
/// Shared between the capture worker and finalization so that data
/// captured before a stalled stream can still be written out.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    samples: Arc<Mutex<Vec<i16>>>,
    channels: u16,
    capacity_frames: usize,
}

impl CaptureBuffer {
    /// Reserve room for `capacity_frames` up front.
    ///
    /// Fails instead of aborting when the reservation cannot be satisfied.
    pub fn new(channels: u16, capacity_frames: usize) -> RecorderResult<Self> {
        let capacity = capacity_frames
            .checked_mul(channels as usize)
            .ok_or_else(|| too_large(capacity_frames))?;
        let mut samples = Vec::new();
        samples
            .try_reserve_exact(capacity)
            .map_err(|_| too_large(capacity_frames))?;

        Ok(Self {
            samples: Arc::new(Mutex::new(samples)),
            channels,
            capacity_frames,
        })
    }

    /// Append interleaved samples. Returns `true` once the buffer is full.
    pub fn push(&self, interleaved: &[i16]) -> bool {
        let capacity = self.capacity_frames * self.channels as usize;
        let mut samples = lock(&self.samples);
        let room = capacity.saturating_sub(samples.len());
        // Only whole frames are accepted
        let take = interleaved.len().min(room) / self.channels as usize * self.channels as usize;
        samples.extend_from_slice(&interleaved[..take]);
        samples.len() >= capacity
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    pub fn frames(&self) -> usize {
        lock(&self.samples).len() / self.channels as usize
    }

    pub fn is_full(&self) -> bool {
        self.frames() >= self.capacity_frames
    }

    /// Move everything captured so far out of the buffer, leaving it empty.
    pub fn take(&self) -> Vec<i16> {
        std::mem::take(&mut *lock(&self.samples))
    }
}

fn too_large(frames: usize) -> RecorderError {
    RecorderError::InvalidRequest(format!(
        "capture buffer of {frames} frames cannot be allocated"
    ))
}

/// Everything a playback worker needs to drive one output stream.
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    pub device: AudioDevice,
    pub buffer: Arc<PlaybackBuffer>,
    pub stop: StopSignal,
    pub poll_interval: Duration,
}

/// Everything a capture worker needs to fill one accumulator.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub device: AudioDevice,
    pub sample_rate: u32,
    pub sink: CaptureBuffer,
    pub stop: StopSignal,
    pub poll_interval: Duration,
}

/// Audio hardware seam.
///
/// `play` and `capture` block the calling thread until their work is done
/// or the stop signal is observed, and must release every device handle
/// before returning on all paths. The session engine runs each call on
/// its own blocking worker.
///
/// Implementations:
/// - [`CpalBackend`](super::CpalBackend): real devices through cpal
/// - test doubles that script device lists and stream behaviour
pub trait AudioBackend: Send + Sync {
    /// Enumerate every device the host exposes, in host order
    fn devices(&self) -> RecorderResult<Vec<AudioDevice>>;

    /// Stream the whole buffer to the output device
    fn play(&self, request: PlaybackRequest) -> RecorderResult<()>;

    /// Read frames from the input device until the sink is full
    fn capture(&self, request: CaptureRequest) -> RecorderResult<()>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Backend bound to the platform's default audio host
    pub fn create() -> Arc<dyn AudioBackend> {
        Arc::new(super::cpal_backend::CpalBackend::new())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
