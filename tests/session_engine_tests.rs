// Integration tests for the session engine
//
// The scripted backend streams in real time, so sessions here are short
// (fractions of a second at 8 kHz).

mod common;

use anyhow::Result;
use bench_recorder::audio::{AudioBackend, OutputKind, PlaybackWarning};
use bench_recorder::config::Config;
use bench_recorder::{
    AppState, RecorderError, RecordingSession, SessionEngine, SessionStatus, StartRequest,
};
use common::{capture_frame, read_wav, reference_wav, test_config, ScriptedBackend};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn engine_for(backend: &Arc<ScriptedBackend>, cfg: &Config) -> Arc<SessionEngine> {
    let backend: Arc<dyn AudioBackend> = backend.clone();
    AppState::new(cfg, backend).engine
}

fn request(cfg: &Config, duration: f64) -> bench_recorder::SessionConfig {
    StartRequest {
        duration: Some(duration),
        output_prefix: Some("bench".into()),
        ..StartRequest::new("reference.wav")
    }
    .resolve(&cfg.recorder)
    .unwrap()
}

async fn wait_finished(engine: &SessionEngine) -> Result<RecordingSession> {
    let session = tokio::time::timeout(Duration::from_secs(5), engine.wait_idle())
        .await?
        .expect("a finished session");
    Ok(session)
}

#[tokio::test]
async fn test_session_completes_and_writes_three_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    reference_wav(dir.path());
    let cfg = test_config(dir.path());
    let backend = Arc::new(ScriptedBackend::bench());
    let engine = engine_for(&backend, &cfg);

    let started = engine.start(request(&cfg, 0.3)).await?;
    assert_eq!(started.status(), SessionStatus::Recording);
    assert!(started.files().is_empty());
    assert_eq!(started.input_device(), "Rubix24 USB Audio");

    let session = wait_finished(&engine).await?;
    assert_eq!(session.id(), started.id());
    assert_eq!(session.status(), SessionStatus::Completed);
    assert!(session.end_time().is_some());
    assert!(session.error().is_none());

    let files = session.files();
    assert_eq!(files.len(), 3);
    let label = started.start_time().format("%Y-%m-%d_%H-%M-%S").to_string();
    for (file, kind) in files.iter().zip(OutputKind::ALL) {
        assert_eq!(file.kind, kind);
        assert_eq!(file.name, format!("bench_{}_{}.wav", label, kind.suffix()));
        assert!(file.path.exists());
        assert!(file.size > 44);
    }

    // 0.3 s at 8 kHz
    let (spec, stereo) = read_wav(&files[0].path);
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 8_000);
    assert_eq!(stereo.len(), 2 * 2_400);

    let (_, ch1) = read_wav(&files[1].path);
    let (_, ch2) = read_wav(&files[2].path);
    assert_eq!(ch1.len(), 2_400);
    for i in [0, 1, 1_000, 2_399] {
        let [left, right] = capture_frame(i);
        assert_eq!(ch1[i], left);
        assert_eq!(ch2[i], right);
    }

    assert_eq!(engine.history().await.len(), 1);
    assert!(engine.status().await.is_idle());
    Ok(())
}

#[tokio::test]
async fn test_second_start_is_rejected_while_recording() -> Result<()> {
    let dir = tempfile::tempdir()?;
    reference_wav(dir.path());
    let cfg = test_config(dir.path());
    let engine = engine_for(&Arc::new(ScriptedBackend::bench()), &cfg);

    engine.start(request(&cfg, 3.0)).await?;
    let err = engine.start(request(&cfg, 3.0)).await.unwrap_err();
    assert!(matches!(err, RecorderError::SessionAlreadyActive));

    engine.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_concurrent_starts_exactly_one_wins() -> Result<()> {
    let dir = tempfile::tempdir()?;
    reference_wav(dir.path());
    let cfg = test_config(dir.path());
    let engine = engine_for(&Arc::new(ScriptedBackend::bench()), &cfg);

    let a = tokio::spawn({
        let engine = Arc::clone(&engine);
        let config = request(&cfg, 3.0);
        async move { engine.start(config).await }
    });
    let b = tokio::spawn({
        let engine = Arc::clone(&engine);
        let config = request(&cfg, 3.0);
        async move { engine.start(config).await }
    });
    let results = [a.await?, b.await?];

    let started = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(RecorderError::SessionAlreadyActive)))
        .count();
    assert_eq!((started, rejected), (1, 1));

    engine.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_stop_finalizes_early() -> Result<()> {
    let dir = tempfile::tempdir()?;
    reference_wav(dir.path());
    let cfg = test_config(dir.path());
    let engine = engine_for(&Arc::new(ScriptedBackend::bench()), &cfg);

    let started = engine.start(request(&cfg, 5.0)).await?;
    tokio::time::sleep(Duration::from_millis(250)).await;

    let stopped = engine.stop().await?;
    assert_eq!(stopped.id(), started.id());
    assert_eq!(stopped.status(), SessionStatus::Stopped);
    assert_eq!(stopped.files().len(), 3);

    let end = stopped.end_time().expect("end time");
    let elapsed = (end - stopped.start_time()).num_milliseconds();
    assert!(elapsed < 5_000, "stopped after {elapsed} ms");

    let (_, stereo) = read_wav(&stopped.files()[0].path);
    let frames = stereo.len() / 2;
    assert!(frames > 0 && frames < 5 * 8_000, "captured {frames} frames");

    assert!(engine.status().await.is_idle());
    Ok(())
}

#[tokio::test]
async fn test_stop_without_session_fails() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let engine = engine_for(&Arc::new(ScriptedBackend::bench()), &cfg);

    let err = engine.stop().await.unwrap_err();
    assert!(matches!(err, RecorderError::NoActiveSession));
}

#[tokio::test]
async fn test_stop_after_completion_reports_no_active_session() -> Result<()> {
    let dir = tempfile::tempdir()?;
    reference_wav(dir.path());
    let cfg = test_config(dir.path());
    let engine = engine_for(&Arc::new(ScriptedBackend::bench()), &cfg);

    engine.start(request(&cfg, 0.1)).await?;
    wait_finished(&engine).await?;

    let err = engine.stop().await.unwrap_err();
    assert!(matches!(err, RecorderError::NoActiveSession));
    Ok(())
}

#[tokio::test]
async fn test_status_reports_progress_while_recording() -> Result<()> {
    let dir = tempfile::tempdir()?;
    reference_wav(dir.path());
    let cfg = test_config(dir.path());
    let engine = engine_for(&Arc::new(ScriptedBackend::bench()), &cfg);

    assert!(engine.status().await.is_idle());
    engine.start(request(&cfg, 3.0)).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = serde_json::to_value(engine.status().await)?;
    assert_eq!(status["status"], "recording");
    assert_eq!(status["expected_duration"], 3.0);
    assert!(status["elapsed_seconds"].as_f64().unwrap() > 0.0);
    assert!(status["progress_percent"].as_f64().unwrap() < 100.0);
    assert!(status["files"].as_array().unwrap().is_empty());

    engine.stop().await?;
    let history = serde_json::to_value(engine.history().await)?;
    assert_eq!(history[0]["status"], "stopped");
    assert!(history[0]["duration_seconds"].as_f64().is_some());
    assert!(history[0].get("elapsed_seconds").is_none());
    Ok(())
}

#[tokio::test]
async fn test_capture_failure_marks_session_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    reference_wav(dir.path());
    let cfg = test_config(dir.path());
    let mut backend = ScriptedBackend::bench();
    backend.fail_capture_after = Some(400);
    let engine = engine_for(&Arc::new(backend), &cfg);

    engine.start(request(&cfg, 2.0)).await?;
    let session = wait_finished(&engine).await?;

    assert_eq!(session.status(), SessionStatus::Error);
    assert!(session.files().is_empty());
    let message = session.error().expect("error message");
    assert!(message.contains("device disconnected"), "{message}");

    // Partial capture is left on disk, just not reported
    let leftovers = std::fs::read_dir(&cfg.recorder.recordings_dir)?.count();
    assert_eq!(leftovers, 3);
    Ok(())
}

#[tokio::test]
async fn test_stop_proceeds_when_workers_lag() -> Result<()> {
    let dir = tempfile::tempdir()?;
    reference_wav(dir.path());
    let mut cfg = test_config(dir.path());
    cfg.recorder.stop_timeout_ms = 100;
    let mut backend = ScriptedBackend::bench();
    backend.stop_lag = Duration::from_secs(1);
    let engine = engine_for(&Arc::new(backend), &cfg);

    engine.start(request(&cfg, 5.0)).await?;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let requested = Instant::now();
    let stopped = engine.stop().await?;
    assert!(requested.elapsed() < Duration::from_millis(900));
    assert_eq!(stopped.status(), SessionStatus::Stopped);
    assert_eq!(stopped.files().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_stop_before_capture_reports_no_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    reference_wav(dir.path());
    let mut cfg = test_config(dir.path());
    cfg.recorder.capture_offset_ms = 500;
    let engine = engine_for(&Arc::new(ScriptedBackend::bench()), &cfg);

    engine.start(request(&cfg, 2.0)).await?;
    let stopped = engine.stop().await?;

    assert_eq!(stopped.status(), SessionStatus::Error);
    assert!(stopped.files().is_empty());
    let message = stopped.error().expect("error message");
    assert!(message.contains("before capture began"), "{message}");

    // Nothing captured, nothing written
    let written = std::fs::read_dir(&cfg.recorder.recordings_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(written, 0);
    Ok(())
}

#[tokio::test]
async fn test_deadline_finalizes_stalled_capture() -> Result<()> {
    let dir = tempfile::tempdir()?;
    reference_wav(dir.path());
    let cfg = test_config(dir.path());
    let mut backend = ScriptedBackend::bench();
    backend.stall_capture_after = Some(800);
    let engine = engine_for(&Arc::new(backend), &cfg);

    let launched = Instant::now();
    engine.start(request(&cfg, 0.3)).await?;
    let session = wait_finished(&engine).await?;

    // duration + capture offset + stop timeout
    assert!(
        launched.elapsed() >= Duration::from_millis(820),
        "finalized after {:?}",
        launched.elapsed()
    );
    assert_eq!(session.status(), SessionStatus::Stopped);
    assert_eq!(session.files().len(), 3);

    let (_, stereo) = read_wav(&session.files()[0].path);
    assert_eq!(stereo.len(), 800 * 2);
    assert_eq!(&stereo[..2], &capture_frame(0));
    assert_eq!(&stereo[stereo.len() - 2..], &capture_frame(799));
    Ok(())
}

#[tokio::test]
async fn test_stop_after_full_capture_still_completes() -> Result<()> {
    let dir = tempfile::tempdir()?;
    reference_wav(dir.path());
    let cfg = test_config(dir.path());
    let mut backend = ScriptedBackend::bench();
    backend.playback_tail = Duration::from_secs(3);
    let engine = engine_for(&Arc::new(backend), &cfg);

    engine.start(request(&cfg, 0.3)).await?;
    // Capture is full, playback is still draining its tail
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(!engine.status().await.is_idle());

    let session = engine.stop().await?;
    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(session.files().len(), 3);
    let (_, stereo) = read_wav(&session.files()[0].path);
    assert_eq!(stereo.len(), 2_400 * 2);
    Ok(())
}

#[tokio::test]
async fn test_unknown_device_fails_start() -> Result<()> {
    let dir = tempfile::tempdir()?;
    reference_wav(dir.path());
    let mut cfg = test_config(dir.path());
    cfg.recorder.device_pattern = "focusrite".into();
    let engine = engine_for(&Arc::new(ScriptedBackend::bench()), &cfg);

    let err = engine.start(request(&cfg, 0.1)).await.unwrap_err();
    assert!(matches!(err, RecorderError::DeviceNotFound { .. }));
    assert!(engine.status().await.is_idle());
    assert!(engine.history().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_missing_playback_file_fails_start() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cfg = test_config(dir.path());
    let engine = engine_for(&Arc::new(ScriptedBackend::bench()), &cfg);

    let err = engine.start(request(&cfg, 0.1)).await.unwrap_err();
    assert!(matches!(err, RecorderError::InvalidPlaybackFile(_)));
    assert!(engine.status().await.is_idle());
    Ok(())
}

#[tokio::test]
async fn test_device_hints_override_pattern() -> Result<()> {
    let dir = tempfile::tempdir()?;
    reference_wav(dir.path());
    let cfg = test_config(dir.path());
    let backend = Arc::new(ScriptedBackend::bench());
    let engine = engine_for(&backend, &cfg);

    let config = StartRequest {
        duration: Some(0.1),
        input_device: Some("3".into()),
        output_device: Some("speakers".into()),
        ..StartRequest::new("reference.wav")
    }
    .resolve(&cfg.recorder)?;

    let started = engine.start(config).await?;
    assert_eq!(started.input_device(), "Rubix44 USB Audio");
    assert_eq!(started.output_device(), "MacBook Pro Speakers");
    wait_finished(&engine).await?;

    let used = backend.used_devices.lock().unwrap().clone();
    assert!(used.contains(&("input".to_string(), "Rubix44 USB Audio".to_string())));
    assert!(used.contains(&("output".to_string(), "MacBook Pro Speakers".to_string())));
    Ok(())
}

#[tokio::test]
async fn test_sample_rate_mismatch_is_a_warning() -> Result<()> {
    let dir = tempfile::tempdir()?;
    reference_wav(dir.path());
    let cfg = test_config(dir.path());
    let engine = engine_for(&Arc::new(ScriptedBackend::bench()), &cfg);

    let config = StartRequest {
        duration: Some(0.1),
        sample_rate: Some(16_000),
        ..StartRequest::new("reference.wav")
    }
    .resolve(&cfg.recorder)?;

    let started = engine.start(config).await?;
    assert_eq!(
        started.warnings(),
        &[PlaybackWarning::SampleRateMismatch {
            file_rate: 8_000,
            target_rate: 16_000
        }]
    );

    let session = wait_finished(&engine).await?;
    assert_eq!(session.status(), SessionStatus::Completed);
    let (spec, ch1) = read_wav(&session.files()[1].path);
    assert_eq!(spec.sample_rate, 16_000);
    assert_eq!(ch1.len(), 1_600);
    Ok(())
}

#[tokio::test]
async fn test_back_to_back_sessions_keep_separate_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    reference_wav(dir.path());
    let cfg = test_config(dir.path());
    let engine = engine_for(&Arc::new(ScriptedBackend::bench()), &cfg);

    let mut ids = Vec::new();
    for _ in 0..2 {
        engine.start(request(&cfg, 0.05)).await?;
        let session = wait_finished(&engine).await?;
        assert_eq!(session.status(), SessionStatus::Completed);
        ids.push(session.id().to_string());
    }

    assert_ne!(ids[0], ids[1]);
    let written = std::fs::read_dir(&cfg.recorder.recordings_dir)?.count();
    assert_eq!(written, 6);
    Ok(())
}
