//! Delivery of finished session files to remote storage
//!
//! Jobs are queued against terminal sessions and executed by a small worker
//! pool with a bounded retry policy. Local files are only ever deleted after
//! a job has succeeded.

mod config;
mod job;
mod policy;
mod protocol;
mod service;

pub use config::{StorageConfig, StorageConfigPatch, StorageSettings, TransferProtocol};
pub use job::{Destination, TransferJob, TransferStatus};
pub use policy::RetryPolicy;
pub use protocol::{
    default_handlers, HttpUploadHandler, RsyncHandler, ScpHandler, TransferError, TransferHandler,
};
pub use service::TransferService;
