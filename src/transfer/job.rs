use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::config::{StorageConfig, TransferProtocol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Succeeded | TransferStatus::Failed)
    }
}

/// Where a job sends its files. Credentials are never recorded here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Destination {
    pub host: String,
    pub port: u16,
    pub remote_path: String,
    pub username: String,
}

impl From<&StorageConfig> for Destination {
    fn from(config: &StorageConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            remote_path: config.remote_path.clone(),
            username: config.username.clone(),
        }
    }
}

/// Delivery of one finished session's files to remote storage.
#[derive(Debug, Clone, Serialize)]
pub struct TransferJob {
    pub id: Uuid,
    pub session_id: String,
    pub protocol: TransferProtocol,
    pub destination: Destination,
    pub files: Vec<PathBuf>,
    pub status: TransferStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub delete_after_transfer: bool,
    /// File names delivered so far
    pub transferred: Vec<String>,
    /// Local files removed after success
    pub deleted: Vec<String>,
    /// Deletion failures; reported without affecting `status`
    pub delete_errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TransferJob {
    pub fn new(
        session_id: impl Into<String>,
        files: Vec<PathBuf>,
        config: &StorageConfig,
        delete_after_transfer: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            protocol: config.protocol,
            destination: Destination::from(config),
            files,
            status: TransferStatus::Pending,
            attempts: 0,
            last_error: None,
            delete_after_transfer,
            transferred: Vec::new(),
            deleted: Vec::new(),
            delete_errors: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}
