// Hardware backend built on cpal
//
// Each call builds its stream on the calling thread, keeps it alive while
// polling the stop signal, and drops it before returning. cpal streams are
// not `Send`, so they never leave the worker that created them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, FromSample, Sample, SampleFormat, SampleRate, SizedSample, StreamConfig, StreamError,
};
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioDevice, CaptureBuffer, CaptureRequest, PlaybackRequest};
use crate::error::{RecorderError, RecorderResult};

/// Fatal stream error reported from a cpal callback thread
type ErrorSlot = Arc<Mutex<Option<String>>>;

pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }

    /// Re-locate a device from a snapshot. Enumeration index first, then name.
    fn locate(&self, wanted: &AudioDevice) -> RecorderResult<cpal::Device> {
        let host = cpal::default_host();
        let devices: Vec<cpal::Device> = host
            .devices()
            .map_err(|e| audio_error("failed to enumerate devices", e))?
            .collect();

        let same_name = |d: &cpal::Device| d.name().map(|n| n == wanted.name).unwrap_or(false);

        if let Some(device) = devices.get(wanted.id).filter(|d| same_name(d)) {
            return Ok(device.clone());
        }

        devices
            .into_iter()
            .find(|d| same_name(d))
            .ok_or_else(|| RecorderError::Audio(format!("device '{}' is no longer available", wanted.name)))
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn devices(&self) -> RecorderResult<Vec<AudioDevice>> {
        let host = cpal::default_host();
        let devices = host
            .devices()
            .map_err(|e| audio_error("failed to enumerate devices", e))?;

        Ok(devices
            .enumerate()
            .map(|(id, device)| describe(id, &device))
            .collect())
    }

    fn play(&self, request: PlaybackRequest) -> RecorderResult<()> {
        let device = self.locate(&request.device)?;
        let supported = device
            .default_output_config()
            .map_err(|e| audio_error("no output configuration", e))?;

        let buffer = Arc::clone(&request.buffer);
        let config = StreamConfig {
            channels: buffer.channels,
            sample_rate: SampleRate(buffer.sample_rate),
            buffer_size: BufferSize::Default,
        };
        debug!("Output stream config: {:?} ({:?})", config, supported.sample_format());

        let position = Arc::new(AtomicUsize::new(0));
        let failure: ErrorSlot = Arc::new(Mutex::new(None));

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_output::<f32>(&device, &config, &request, &position, &failure),
            SampleFormat::I16 => build_output::<i16>(&device, &config, &request, &position, &failure),
            SampleFormat::U16 => build_output::<u16>(&device, &config, &request, &position, &failure),
            other => {
                return Err(RecorderError::Audio(format!(
                    "unsupported output sample format {other:?}"
                )))
            }
        }?;
        stream
            .play()
            .map_err(|e| audio_error("failed to start playback", e))?;

        info!(
            "Playback started on '{}' ({} frames)",
            request.device.name,
            buffer.frames()
        );

        let total = buffer.samples.len();
        loop {
            if let Some(message) = take_failure(&failure) {
                return Err(RecorderError::Audio(message));
            }
            if request.stop.is_triggered() {
                info!("Playback cancelled");
                break;
            }
            if position.load(Ordering::Acquire) >= total {
                // Let the device drain what it already pulled
                std::thread::sleep(request.poll_interval);
                info!("Playback finished");
                break;
            }
            std::thread::sleep(request.poll_interval);
        }

        drop(stream);
        Ok(())
    }

    fn capture(&self, request: CaptureRequest) -> RecorderResult<()> {
        let device = self.locate(&request.device)?;
        let supported = device
            .default_input_config()
            .map_err(|e| audio_error("no input configuration", e))?;

        let config = StreamConfig {
            channels: request.sink.channels(),
            sample_rate: SampleRate(request.sample_rate),
            buffer_size: BufferSize::Default,
        };
        debug!("Input stream config: {:?} ({:?})", config, supported.sample_format());

        let failure: ErrorSlot = Arc::new(Mutex::new(None));

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_input::<f32>(&device, &config, &request.sink, &failure),
            SampleFormat::I16 => build_input::<i16>(&device, &config, &request.sink, &failure),
            SampleFormat::U16 => build_input::<u16>(&device, &config, &request.sink, &failure),
            other => {
                return Err(RecorderError::Audio(format!(
                    "unsupported input sample format {other:?}"
                )))
            }
        }?;
        stream
            .play()
            .map_err(|e| audio_error("failed to start capture", e))?;

        info!(
            "Capture started on '{}' ({} frames requested)",
            request.device.name,
            request.sink.capacity_frames()
        );

        loop {
            if let Some(message) = take_failure(&failure) {
                return Err(RecorderError::Audio(message));
            }
            if request.stop.is_triggered() {
                info!("Capture cancelled after {} frames", request.sink.frames());
                break;
            }
            if request.sink.is_full() {
                info!("Capture finished");
                break;
            }
            std::thread::sleep(request.poll_interval);
        }

        drop(stream);
        Ok(())
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

fn describe(id: usize, device: &cpal::Device) -> AudioDevice {
    let name = device.name().unwrap_or_else(|_| format!("device {id}"));

    let input_channels = device
        .supported_input_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);
    let output_channels = device
        .supported_output_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);

    let sample_rate = device
        .default_input_config()
        .or_else(|_| device.default_output_config())
        .ok()
        .map(|c| c.sample_rate().0);

    AudioDevice {
        id,
        name,
        input_channels,
        output_channels,
        sample_rate,
        is_target: false,
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    request: &PlaybackRequest,
    position: &Arc<AtomicUsize>,
    failure: &ErrorSlot,
) -> RecorderResult<cpal::Stream>
where
    T: SizedSample + FromSample<i16>,
{
    let buffer = Arc::clone(&request.buffer);
    let position = Arc::clone(position);
    let failure = Arc::clone(failure);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let start = position.load(Ordering::Acquire);
                for (offset, out) in data.iter_mut().enumerate() {
                    *out = match buffer.samples.get(start + offset) {
                        Some(&sample) => T::from_sample(sample),
                        None => T::EQUILIBRIUM,
                    };
                }
                let end = (start + data.len()).min(buffer.samples.len());
                position.store(end, Ordering::Release);
            },
            move |err| record_failure(&failure, "output", err),
            None,
        )
        .map_err(|e| audio_error("failed to open output stream", e))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    sink: &CaptureBuffer,
    failure: &ErrorSlot,
) -> RecorderResult<cpal::Stream>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let sink = sink.clone();
    let failure = Arc::clone(failure);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let converted: Vec<i16> = data.iter().map(|&s| i16::from_sample(s)).collect();
                sink.push(&converted);
            },
            move |err| record_failure(&failure, "input", err),
            None,
        )
        .map_err(|e| audio_error("failed to open input stream", e))
}

fn record_failure(slot: &ErrorSlot, direction: &str, err: StreamError) {
    match err {
        StreamError::DeviceNotAvailable => {
            error!("{} device disconnected", direction);
            let mut slot = slot.lock().unwrap_or_else(|p| p.into_inner());
            slot.get_or_insert_with(|| format!("{direction} device disconnected"));
        }
        other => warn!("Transient {} stream error: {}", direction, other),
    }
}

fn take_failure(slot: &ErrorSlot) -> Option<String> {
    slot.lock().unwrap_or_else(|p| p.into_inner()).take()
}

fn audio_error(context: &str, err: impl std::fmt::Display) -> RecorderError {
    RecorderError::Audio(format!("{context}: {err}"))
}
