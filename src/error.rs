use thiserror::Error;

/// Which side of the device pair a lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    Input,
    Output,
}

impl std::fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceRole::Input => write!(f, "input"),
            DeviceRole::Output => write!(f, "output"),
        }
    }
}

/// Errors surfaced by the recorder core to its callers.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("no {role} device matching '{pattern}'")]
    DeviceNotFound { pattern: String, role: DeviceRole },

    #[error("invalid playback file: {0}")]
    InvalidPlaybackFile(String),

    #[error("a recording session is already active")]
    SessionAlreadyActive,

    #[error("no active recording session")]
    NoActiveSession,

    #[error("no finished session with id '{0}'")]
    SessionNotFound(String),

    #[error("session '{0}' is still recording")]
    SessionInProgress(String),

    #[error("no files found for session '{0}'")]
    NoSessionFiles(String),

    #[error("session '{0}' has no output files to transfer")]
    NothingToTransfer(String),

    #[error("storage server not configured or disabled")]
    StorageDisabled,

    #[error("storage configuration incomplete, missing: {}", .0.join(", "))]
    StorageIncomplete(Vec<&'static str>),

    #[error("transfer protocol '{0}' is not implemented")]
    ProtocolNotImplemented(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("audio device error: {0}")]
    Audio(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type RecorderResult<T> = Result<T, RecorderError>;
