pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod transfer;

pub use audio::{
    AudioBackend, AudioBackendFactory, AudioDevice, AudioFile, DevicePair, DeviceResolver,
    OutputFile, PlaybackBuffer, PlaybackWarning,
};
pub use config::Config;
pub use error::{DeviceRole, RecorderError, RecorderResult};
pub use http::{create_router, AppState};
pub use session::{
    EngineStatus, RecordingSession, SessionConfig, SessionEngine, SessionRegistry, SessionStatus,
    StartRequest,
};
pub use transfer::{StorageConfig, TransferJob, TransferService, TransferStatus};
