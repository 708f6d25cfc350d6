use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::RecorderResult;

/// Which view of the capture a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Stereo,
    Ch1,
    Ch2,
}

impl OutputKind {
    pub const ALL: [OutputKind; 3] = [OutputKind::Stereo, OutputKind::Ch1, OutputKind::Ch2];

    pub fn suffix(self) -> &'static str {
        match self {
            OutputKind::Stereo => "stereo",
            OutputKind::Ch1 => "ch1",
            OutputKind::Ch2 => "ch2",
        }
    }
}

/// A file written for a finished session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputFile {
    pub kind: OutputKind,
    pub name: String,
    pub path: PathBuf,
    /// Size on disk in bytes
    pub size: u64,
}

/// `{dir}/{prefix}_{label}_{suffix}.wav`
pub fn output_path(dir: &Path, prefix: &str, label: &str, kind: OutputKind) -> PathBuf {
    dir.join(format!("{}_{}_{}.wav", prefix, label, kind.suffix()))
}

/// Write the stereo capture plus one file per channel.
///
/// `interleaved` holds two-channel frames. Any failure aborts the remaining
/// writes; files already written are left on disk.
pub fn write_session_files(
    dir: &Path,
    prefix: &str,
    label: &str,
    interleaved: &[i16],
    sample_rate: u32,
) -> RecorderResult<Vec<OutputFile>> {
    fs::create_dir_all(dir)?;

    let mut files = Vec::with_capacity(OutputKind::ALL.len());
    for kind in OutputKind::ALL {
        let path = output_path(dir, prefix, label, kind);
        let channels = if kind == OutputKind::Stereo { 2 } else { 1 };

        let mut writer = TrackWriter::create(&path, sample_rate, channels)?;
        match kind {
            OutputKind::Stereo => writer.write(interleaved.iter().copied())?,
            OutputKind::Ch1 => writer.write(interleaved.iter().step_by(2).copied())?,
            OutputKind::Ch2 => writer.write(interleaved.iter().skip(1).step_by(2).copied())?,
        }
        let frames = writer.finish()?;

        let size = fs::metadata(&path)?.len();
        info!("Saved: {} ({} frames, {} bytes)", path.display(), frames, size);

        files.push(OutputFile {
            kind,
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path,
            size,
        });
    }

    Ok(files)
}

/// Writes one 16-bit PCM WAV file
struct TrackWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    channels: u16,
    samples: usize,
}

impl TrackWriter {
    fn create(path: &Path, sample_rate: u32, channels: u16) -> RecorderResult<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(path, spec).map_err(into_io)?;

        Ok(Self {
            writer: Some(writer),
            channels,
            samples: 0,
        })
    }

    fn write(&mut self, samples: impl Iterator<Item = i16>) -> RecorderResult<()> {
        if let Some(writer) = &mut self.writer {
            for sample in samples {
                writer.write_sample(sample).map_err(into_io)?;
                self.samples += 1;
            }
        }
        Ok(())
    }

    /// Finalize the header; returns frames written.
    fn finish(mut self) -> RecorderResult<usize> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(into_io)?;
        }
        Ok(self.samples / self.channels as usize)
    }
}

impl Drop for TrackWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}

fn into_io(err: hound::Error) -> std::io::Error {
    match err {
        hound::Error::IoError(io) => io,
        other => std::io::Error::other(other.to_string()),
    }
}
