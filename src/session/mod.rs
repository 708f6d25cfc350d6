//! Recording sessions
//!
//! This module provides:
//! - `RecordingSession`: one playback+capture run and its lifecycle
//! - `SessionRegistry`: the single active-session slot plus history
//! - `SessionEngine`: device binding, worker coordination, finalization
//! - `StartRequest`: client parameters validated into a `SessionConfig`

mod config;
mod engine;
mod record;
mod registry;

pub use config::{SessionConfig, StartRequest};
pub use engine::{DeletionReport, EngineStatus, IdleStatus, SessionEngine};
pub use record::{
    generate_human_id, RecordingSession, SessionSnapshot, SessionStatus, CAPTURE_CHANNELS,
};
pub use registry::SessionRegistry;
