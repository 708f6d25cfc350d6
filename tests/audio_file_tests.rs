// Integration tests for audio file processing
//
// These tests verify that WAV files in the encodings a reference signal is
// likely to come in are decoded to 16-bit PCM correctly.

mod common;

use anyhow::Result;
use bench_recorder::audio::AudioFile;
use bench_recorder::RecorderError;
use common::write_ramp_wav;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::PathBuf;

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("stereo.wav");
    write_ramp_wav(&path, 44_100, 2, 4_410);

    let audio = AudioFile::open(&path)?;

    // Verify basic properties
    assert_eq!(audio.sample_rate, 44_100);
    assert_eq!(audio.channels, 2);
    assert_eq!(audio.frames(), 4_410);
    assert!((audio.duration_seconds - 0.1).abs() < 1e-9);
    assert_eq!(&audio.samples[..6], &[0, 0, 1, 1, 2, 2]);

    // Verify path is stored
    assert!(audio.path.contains("stereo.wav"));

    Ok(())
}

#[test]
fn test_audio_file_float_is_converted() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("float.wav");
    let spec = WavSpec {
        channels: 1,
        sample_rate: 48_000,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&path, spec)?;
    for sample in [0.0f32, 0.5, -1.0, 1.5] {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    let audio = AudioFile::open(&path)?;
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples, vec![0, 16_383, -i16::MAX, i16::MAX]);
    Ok(())
}

#[test]
fn test_audio_file_24_bit_is_scaled() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("studio.wav");
    let spec = WavSpec {
        channels: 2,
        sample_rate: 96_000,
        bits_per_sample: 24,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec)?;
    for sample in [0x7F_FFFFi32, -0x80_0000, 0x100, -0x100] {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    let audio = AudioFile::open(&path)?;
    assert_eq!(audio.samples, vec![i16::MAX, i16::MIN, 1, -1]);
    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let path = PathBuf::from("/nonexistent/path/to/audio.wav");
    let result = AudioFile::open(&path);

    assert!(matches!(result, Err(RecorderError::InvalidPlaybackFile(_))));
}

#[test]
fn test_audio_file_rejects_non_wav() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("notes.wav");
    std::fs::write(&path, b"definitely not RIFF data")?;

    let err = AudioFile::open(&path).err().expect("garbage should not decode");
    assert!(err.to_string().contains("notes.wav"));
    Ok(())
}
