//! Protocol handlers that deliver a single file to remote storage.

use std::collections::HashMap;
use std::path::Path;
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use super::config::{StorageConfig, TransferProtocol};

/// Outcome classification used by the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// Network or timeout class; worth another attempt
    #[error("transient transfer failure: {0}")]
    Transient(String),
    #[error("transfer failed: {0}")]
    Permanent(String),
}

impl TransferError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransferError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            TransferError::Transient(msg) | TransferError::Permanent(msg) => msg,
        }
    }
}

#[async_trait]
pub trait TransferHandler: Send + Sync {
    fn protocol(&self) -> TransferProtocol;

    /// Deliver `file` to the destination described by `config`.
    async fn send(&self, file: &Path, config: &StorageConfig) -> Result<(), TransferError>;
}

/// Handlers for every implemented protocol. `sftp` is deliberately absent.
pub fn default_handlers(
    command_timeout: Duration,
) -> HashMap<TransferProtocol, Arc<dyn TransferHandler>> {
    let mut handlers: HashMap<TransferProtocol, Arc<dyn TransferHandler>> = HashMap::new();
    handlers.insert(
        TransferProtocol::Scp,
        Arc::new(ScpHandler::new(command_timeout)),
    );
    handlers.insert(
        TransferProtocol::Rsync,
        Arc::new(RsyncHandler::new(command_timeout)),
    );
    handlers.insert(
        TransferProtocol::Http,
        Arc::new(HttpUploadHandler::new(command_timeout)),
    );
    handlers
}

fn file_name(file: &Path) -> Result<String, TransferError> {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| TransferError::Permanent(format!("{} has no file name", file.display())))
}

fn remote_dir(config: &StorageConfig) -> &str {
    config.remote_path.trim_end_matches('/')
}

pub struct ScpHandler {
    timeout: Duration,
}

impl ScpHandler {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn args(file: &Path, config: &StorageConfig) -> Result<Vec<String>, TransferError> {
        let name = file_name(file)?;
        Ok(vec![
            "-P".to_string(),
            config.port.to_string(),
            file.display().to_string(),
            format!(
                "{}@{}:{}/{}",
                config.username,
                config.host,
                remote_dir(config),
                name
            ),
        ])
    }
}

#[async_trait]
impl TransferHandler for ScpHandler {
    fn protocol(&self) -> TransferProtocol {
        TransferProtocol::Scp
    }

    async fn send(&self, file: &Path, config: &StorageConfig) -> Result<(), TransferError> {
        let args = Self::args(file, config)?;
        let output = run_command("scp", &args, self.timeout).await?;
        // ssh reports connection-level failures as 255
        check_exit("scp", &output, |code| code == 255)?;
        info!("Transferred {} via scp to {}", file.display(), config.host);
        Ok(())
    }
}

pub struct RsyncHandler {
    timeout: Duration,
}

impl RsyncHandler {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn args(file: &Path, config: &StorageConfig) -> Vec<String> {
        vec![
            "-avz".to_string(),
            "-e".to_string(),
            format!("ssh -p {}", config.port),
            file.display().to_string(),
            format!(
                "{}@{}:{}/",
                config.username,
                config.host,
                remote_dir(config)
            ),
        ]
    }
}

#[async_trait]
impl TransferHandler for RsyncHandler {
    fn protocol(&self) -> TransferProtocol {
        TransferProtocol::Rsync
    }

    async fn send(&self, file: &Path, config: &StorageConfig) -> Result<(), TransferError> {
        let args = Self::args(file, config);
        let output = run_command("rsync", &args, self.timeout).await?;
        // socket I/O, stream, timeout and ssh failures
        check_exit("rsync", &output, |code| {
            matches!(code, 10 | 12 | 30 | 35 | 255)
        })?;
        info!("Transferred {} via rsync to {}", file.display(), config.host);
        Ok(())
    }
}

async fn run_command(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<Output, TransferError> {
    debug!("Running {} {}", program, args.join(" "));
    let child = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(TransferError::Permanent(format!(
            "failed to launch {program}: {e}"
        ))),
        Err(_) => Err(TransferError::Transient(format!(
            "{program} timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

fn check_exit(
    program: &str,
    output: &Output,
    transient: impl Fn(i32) -> bool,
) -> Result<(), TransferError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    match output.status.code() {
        Some(code) if transient(code) => Err(TransferError::Transient(format!(
            "{program} exited with {code}: {stderr}"
        ))),
        Some(code) => Err(TransferError::Permanent(format!(
            "{program} exited with {code}: {stderr}"
        ))),
        None => Err(TransferError::Transient(format!(
            "{program} terminated by signal: {stderr}"
        ))),
    }
}

/// Multipart POST of each file to `http://host:port{remote_path}`.
pub struct HttpUploadHandler {
    timeout: Duration,
}

impl HttpUploadHandler {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn upload_url(config: &StorageConfig) -> String {
        let path = if config.remote_path.starts_with('/') {
            config.remote_path.clone()
        } else {
            format!("/{}", config.remote_path)
        };
        format!("http://{}:{}{}", config.host, config.port, path)
    }
}

#[async_trait]
impl TransferHandler for HttpUploadHandler {
    fn protocol(&self) -> TransferProtocol {
        TransferProtocol::Http
    }

    async fn send(&self, file: &Path, config: &StorageConfig) -> Result<(), TransferError> {
        let name = file_name(file)?;
        let bytes = tokio::fs::read(file)
            .await
            .map_err(|e| TransferError::Permanent(format!("{}: {e}", file.display())))?;

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(name.clone())
            .mime_str("audio/wav")
            .map_err(|e| TransferError::Permanent(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| TransferError::Permanent(e.to_string()))?;

        let url = Self::upload_url(config);
        let mut request = client.post(&url).multipart(form);
        if let Some(password) = &config.password {
            request = request.basic_auth(&config.username, Some(password));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                TransferError::Transient(e.to_string())
            } else {
                TransferError::Permanent(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            info!("Uploaded {} to {}", name, url);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
        if status.is_server_error() || status.as_u16() == 429 {
            Err(TransferError::Transient(message))
        } else {
            Err(TransferError::Permanent(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn target() -> StorageConfig {
        StorageConfig {
            enabled: true,
            host: "nas.local".into(),
            port: 2222,
            username: "lab".into(),
            remote_path: "/srv/recordings/".into(),
            ..StorageConfig::default()
        }
    }

    #[test]
    fn scp_targets_remote_file() {
        let file = PathBuf::from("recordings/api_recording_2024-01-01_10-00-00_ch1.wav");
        let args = ScpHandler::args(&file, &target()).unwrap();
        assert_eq!(
            args,
            vec![
                "-P",
                "2222",
                "recordings/api_recording_2024-01-01_10-00-00_ch1.wav",
                "lab@nas.local:/srv/recordings/api_recording_2024-01-01_10-00-00_ch1.wav",
            ]
        );
    }

    #[test]
    fn rsync_uses_ssh_port() {
        let file = PathBuf::from("recordings/a.wav");
        let args = RsyncHandler::args(&file, &target());
        assert_eq!(
            args,
            vec![
                "-avz",
                "-e",
                "ssh -p 2222",
                "recordings/a.wav",
                "lab@nas.local:/srv/recordings/"
            ]
        );
    }

    #[test]
    fn http_url_includes_port_and_path() {
        let mut cfg = target();
        cfg.port = 8080;
        cfg.remote_path = "upload".into();
        assert_eq!(
            HttpUploadHandler::upload_url(&cfg),
            "http://nas.local:8080/upload"
        );
    }

    #[test]
    fn default_handlers_leave_sftp_out() {
        let handlers = default_handlers(Duration::from_secs(1));
        assert!(handlers.contains_key(&TransferProtocol::Scp));
        assert!(handlers.contains_key(&TransferProtocol::Rsync));
        assert!(handlers.contains_key(&TransferProtocol::Http));
        assert!(!handlers.contains_key(&TransferProtocol::Sftp));
    }

    #[tokio::test]
    async fn missing_program_is_permanent() {
        let err = run_command(
            "bench-recorder-no-such-binary",
            &[],
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(!err.is_transient());
    }
}
