//! HTTP API server for remote control of the recorder
//!
//! All routes live under `/api/v1`:
//! - GET /health - Health check
//! - GET /status - Target device presence, current recording, recorder defaults
//! - GET /devices, /devices/target - Enumerate hardware, resolve the target pair
//! - POST /recordings/start, /recordings/stop - Session control
//! - GET /recordings/status, /recordings/history - Session queries
//! - POST /recordings/delete - Remove a finished session's files
//! - POST /recordings/transfer - Queue delivery to remote storage
//! - GET /transfers, /transfers/:id - Transfer job state
//! - GET/PUT /storage/config - Storage target

mod handlers;
mod routes;
mod state;

pub use handlers::status_for;
pub use routes::{create_router, API_PREFIX};
pub use state::AppState;
