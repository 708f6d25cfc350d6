pub mod backend;
pub mod cpal_backend;
pub mod device;
pub mod file;
pub mod playback;
pub mod writer;

pub use backend::{
    AudioBackend, AudioBackendFactory, AudioDevice, CaptureBuffer, CaptureRequest,
    PlaybackRequest, StopReason, StopSignal,
};
pub use cpal_backend::CpalBackend;
pub use device::{DevicePair, DeviceResolver, DeviceSelector, TargetPresence};
pub use file::AudioFile;
pub use playback::{PlaybackBuffer, PlaybackWarning};
pub use writer::{output_path, write_session_files, OutputFile, OutputKind};
