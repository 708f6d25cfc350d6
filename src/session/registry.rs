use tokio::sync::Mutex;
use tracing::{debug, info};

use super::record::RecordingSession;
use crate::error::{RecorderError, RecorderResult};

#[derive(Default)]
struct RegistryState {
    active: Option<RecordingSession>,
    /// Terminal sessions, oldest first
    history: Vec<RecordingSession>,
}

/// Active-session slot plus history of finished sessions.
///
/// A single mutex guards both, so `begin` is the serialization point for
/// concurrent starts and a session moves from the slot into history in one
/// step.
#[derive(Default)]
pub struct SessionRegistry {
    state: Mutex<RegistryState>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the active slot for `session`.
    pub async fn begin(&self, mut session: RecordingSession) -> RecorderResult<RecordingSession> {
        let mut state = self.state.lock().await;
        if state.active.is_some() {
            return Err(RecorderError::SessionAlreadyActive);
        }

        let mut sequence = 1;
        while state.history.iter().any(|s| s.id() == session.id()) {
            sequence += 1;
            session.disambiguate(sequence);
        }

        info!(
            "Session {} ({}) registered as active",
            session.id(),
            session.human_id()
        );
        state.active = Some(session.clone());
        Ok(session)
    }

    pub async fn active(&self) -> Option<RecordingSession> {
        self.state.lock().await.active.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.active.is_some()
    }

    /// Finalize the active session with `id` and move it into history.
    ///
    /// `finalize` must leave the session in a terminal status.
    pub async fn finish<F>(&self, id: &str, finalize: F) -> RecorderResult<RecordingSession>
    where
        F: FnOnce(&mut RecordingSession),
    {
        let mut state = self.state.lock().await;
        let matches = state.active.as_ref().is_some_and(|s| s.id() == id);
        if !matches {
            return Err(RecorderError::NoActiveSession);
        }
        let Some(mut session) = state.active.take() else {
            return Err(RecorderError::NoActiveSession);
        };

        finalize(&mut session);
        debug_assert!(session.status().is_terminal());
        debug!(
            "Session {} finished with status {:?}",
            session.id(),
            session.status()
        );
        state.history.push(session.clone());
        Ok(session)
    }

    /// Terminal sessions, most recent first.
    pub async fn history(&self) -> Vec<RecordingSession> {
        self.state
            .lock()
            .await
            .history
            .iter()
            .rev()
            .cloned()
            .collect()
    }

    /// Terminal session by id or human id; the active session never matches.
    pub async fn find_terminal(&self, id: &str) -> Option<RecordingSession> {
        self.state
            .lock()
            .await
            .history
            .iter()
            .rev()
            .find(|s| s.id() == id || s.human_id() == id)
            .cloned()
    }
}
