use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Delivery mechanism for session files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferProtocol {
    #[default]
    Scp,
    Rsync,
    Http,
    /// Reserved; enqueueing against it fails fast
    Sftp,
}

impl std::fmt::Display for TransferProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransferProtocol::Scp => "scp",
            TransferProtocol::Rsync => "rsync",
            TransferProtocol::Http => "http",
            TransferProtocol::Sftp => "sftp",
        };
        f.write_str(name)
    }
}

/// Remote storage target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Gate for every transfer
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub protocol: TransferProtocol,
    pub username: String,
    pub remote_path: String,
    /// Only used for HTTP basic auth; scp/rsync rely on SSH keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Enqueue a transfer after every successful session
    pub auto_transfer: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: 22,
            protocol: TransferProtocol::Scp,
            username: String::new(),
            remote_path: String::new(),
            password: None,
            auto_transfer: false,
        }
    }
}

impl StorageConfig {
    /// Required fields that are still empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.host.trim().is_empty() {
            missing.push("host");
        }
        if self.username.trim().is_empty() {
            missing.push("username");
        }
        if self.remote_path.trim().is_empty() {
            missing.push("remote_path");
        }
        missing
    }

    /// Copy safe to hand out over the API
    pub fn masked(&self) -> Self {
        Self {
            password: self.password.as_ref().map(|_| "***".to_string()),
            ..self.clone()
        }
    }

    /// `user@host:path`, as shown in logs and job records
    pub fn destination(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.remote_path)
    }
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfigPatch {
    pub enabled: Option<bool>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<TransferProtocol>,
    pub username: Option<String>,
    pub remote_path: Option<String>,
    pub password: Option<String>,
    pub auto_transfer: Option<bool>,
}

impl StorageConfigPatch {
    pub fn apply(self, base: &StorageConfig) -> StorageConfig {
        StorageConfig {
            enabled: self.enabled.unwrap_or(base.enabled),
            host: self.host.unwrap_or_else(|| base.host.clone()),
            port: self.port.unwrap_or(base.port),
            protocol: self.protocol.unwrap_or(base.protocol),
            username: self.username.unwrap_or_else(|| base.username.clone()),
            remote_path: self.remote_path.unwrap_or_else(|| base.remote_path.clone()),
            password: self.password.or_else(|| base.password.clone()),
            auto_transfer: self.auto_transfer.unwrap_or(base.auto_transfer),
        }
    }
}

/// Process-wide storage config.
///
/// Readers get an immutable `Arc` snapshot; writers swap in a whole new
/// value, so a reader never observes a half-applied update.
pub struct StorageSettings {
    current: RwLock<Arc<StorageConfig>>,
}

impl StorageSettings {
    pub fn new(initial: StorageConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub async fn load(&self) -> Arc<StorageConfig> {
        Arc::clone(&*self.current.read().await)
    }

    pub async fn replace(&self, config: StorageConfig) -> Arc<StorageConfig> {
        let config = Arc::new(config);
        *self.current.write().await = Arc::clone(&config);
        info!("Storage configuration replaced");
        config
    }

    /// Merge `patch` into the current value and swap the result in.
    pub async fn update(&self, patch: StorageConfigPatch) -> Arc<StorageConfig> {
        let mut current = self.current.write().await;
        let next = Arc::new(patch.apply(&current));
        *current = Arc::clone(&next);
        info!(
            "Storage configuration updated (enabled={}, protocol={}, auto_transfer={})",
            next.enabled, next.protocol, next.auto_transfer
        );
        next
    }
}
