// Shared fixtures for the integration tests: a wall-clock paced audio
// backend that never touches hardware, WAV authoring, and a fast config.
#![allow(dead_code)]

use bench_recorder::audio::{AudioBackend, AudioDevice, CaptureRequest, PlaybackRequest};
use bench_recorder::config::Config;
use bench_recorder::{RecorderError, RecorderResult};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub fn device(id: usize, name: &str, inputs: u16, outputs: u16) -> AudioDevice {
    AudioDevice {
        id,
        name: name.to_string(),
        input_channels: inputs,
        output_channels: outputs,
        sample_rate: Some(48_000),
        is_target: false,
    }
}

/// A typical laptop plus two interfaces from the same family.
pub fn bench_devices() -> Vec<AudioDevice> {
    vec![
        device(0, "MacBook Pro Microphone", 1, 0),
        device(1, "Rubix24 USB Audio", 2, 2),
        device(2, "MacBook Pro Speakers", 0, 2),
        device(3, "Rubix44 USB Audio", 4, 4),
    ]
}

/// Captured frame `i` is `[i, -i]` (wrapping) so tests can check ordering.
pub fn capture_frame(i: usize) -> [i16; 2] {
    let v = (i % i16::MAX as usize) as i16;
    [v, -v]
}

/// In-memory backend that streams at real-time pace.
pub struct ScriptedBackend {
    devices: Vec<AudioDevice>,
    /// Capture reports a disconnect after this many frames
    pub fail_capture_after: Option<usize>,
    /// Capture goes silent after this many frames and waits for a stop
    pub stall_capture_after: Option<usize>,
    /// Playback keeps the stream open this long after the buffer ends
    pub playback_tail: Duration,
    /// Both workers keep running this long after a stop request
    pub stop_lag: Duration,
    pub played_frames: AtomicUsize,
    pub used_devices: Mutex<Vec<(String, String)>>,
}

impl ScriptedBackend {
    pub fn new(devices: Vec<AudioDevice>) -> Self {
        Self {
            devices,
            fail_capture_after: None,
            stall_capture_after: None,
            playback_tail: Duration::ZERO,
            stop_lag: Duration::ZERO,
            played_frames: AtomicUsize::new(0),
            used_devices: Mutex::new(Vec::new()),
        }
    }

    pub fn bench() -> Self {
        Self::new(bench_devices())
    }

    fn note(&self, role: &str, device: &AudioDevice) {
        self.used_devices
            .lock()
            .unwrap()
            .push((role.to_string(), device.name.clone()));
    }

    fn acknowledge_stop(&self) {
        if !self.stop_lag.is_zero() {
            std::thread::sleep(self.stop_lag);
        }
    }
}

impl AudioBackend for ScriptedBackend {
    fn devices(&self) -> RecorderResult<Vec<AudioDevice>> {
        Ok(self.devices.clone())
    }

    fn play(&self, request: PlaybackRequest) -> RecorderResult<()> {
        self.note("output", &request.device);
        let total = request.buffer.frames();
        let rate = request.buffer.sample_rate as f64;
        let length = Duration::from_secs_f64(total as f64 / rate) + self.playback_tail;
        let start = Instant::now();
        loop {
            if request.stop.is_triggered() {
                self.acknowledge_stop();
                return Ok(());
            }
            let due = ((start.elapsed().as_secs_f64() * rate) as usize).min(total);
            self.played_frames.store(due, Ordering::SeqCst);
            if due >= total && start.elapsed() >= length {
                return Ok(());
            }
            std::thread::sleep(request.poll_interval);
        }
    }

    fn capture(&self, request: CaptureRequest) -> RecorderResult<()> {
        self.note("input", &request.device);
        let channels = request.sink.channels() as usize;
        let capacity = request.sink.capacity_frames();
        let rate = request.sample_rate as f64;
        let start = Instant::now();
        let mut produced = 0usize;
        loop {
            if request.stop.is_triggered() {
                self.acknowledge_stop();
                return Ok(());
            }
            let mut due = ((start.elapsed().as_secs_f64() * rate) as usize).min(capacity);
            if let Some(limit) = self.stall_capture_after {
                due = due.min(limit);
            }
            let failing = self.fail_capture_after.filter(|limit| due >= *limit);
            if let Some(limit) = failing {
                due = limit;
            }
            if due > produced {
                let chunk: Vec<i16> = (produced..due)
                    .flat_map(|i| capture_frame(i).into_iter().take(channels))
                    .collect();
                produced = due;
                if request.sink.push(&chunk) {
                    return Ok(());
                }
            }
            if failing.is_some() {
                return Err(RecorderError::Audio("device disconnected".to_string()));
            }
            std::thread::sleep(request.poll_interval);
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Write a 16-bit WAV whose frame `i` holds `i` on every channel.
pub fn write_ramp_wav(path: &Path, sample_rate: u32, channels: u16, frames: usize) {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        for _ in 0..channels {
            writer.write_sample(i as i16).unwrap();
        }
    }
    writer.finalize().unwrap();
}

/// Read every sample of a 16-bit WAV.
pub fn read_wav(path: &Path) -> (WavSpec, Vec<i16>) {
    let mut reader = hound::WavReader::open(path).unwrap();
    let spec = reader.spec();
    let samples = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    (spec, samples)
}

/// Config rooted in `dir` with fast timings and an 8 kHz default rate.
pub fn test_config(dir: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.recorder.recordings_dir = dir.join("recordings");
    cfg.recorder.playback_dir = dir.to_path_buf();
    cfg.recorder.sample_rate = 8_000;
    cfg.recorder.default_duration_secs = 0.3;
    cfg.recorder.capture_offset_ms = 20;
    cfg.recorder.stop_timeout_ms = 500;
    cfg.recorder.poll_interval_ms = 5;
    cfg.transfer.initial_backoff_ms = 10;
    cfg.transfer.max_backoff_ms = 50;
    cfg
}

/// `reference.wav` in `dir`: 0.1 s of stereo ramp at 8 kHz.
pub fn reference_wav(dir: &Path) -> PathBuf {
    let path = dir.join("reference.wav");
    write_ramp_wav(&path, 8_000, 2, 800);
    path
}
