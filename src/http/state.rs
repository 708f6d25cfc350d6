use crate::audio::AudioBackend;
use crate::config::Config;
use crate::session::{SessionEngine, SessionRegistry};
use crate::transfer::{StorageSettings, TransferService};
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Owner of the active recording session
    pub engine: Arc<SessionEngine>,
    pub transfers: TransferService,
    /// Runtime storage target, replaced atomically on update
    pub storage: Arc<StorageSettings>,
    pub service_name: String,
}

impl AppState {
    /// Wire engine, registry and transfer workers from `config`.
    ///
    /// Must be called inside a tokio runtime; the transfer worker is spawned here.
    pub fn new(config: &Config, backend: Arc<dyn AudioBackend>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let storage = Arc::new(StorageSettings::new(config.storage.clone()));
        let transfers =
            TransferService::spawn(Arc::clone(&registry), Arc::clone(&storage), &config.transfer);
        Self::with_parts(config, backend, registry, transfers)
    }

    /// State around an existing transfer service and registry.
    pub fn with_parts(
        config: &Config,
        backend: Arc<dyn AudioBackend>,
        registry: Arc<SessionRegistry>,
        transfers: TransferService,
    ) -> Self {
        let storage = Arc::clone(transfers.storage());
        let engine = Arc::new(SessionEngine::new(
            backend,
            registry,
            transfers.clone(),
            config.recorder.clone(),
        ));
        Self {
            engine,
            transfers,
            storage,
            service_name: config.service.name.clone(),
        }
    }
}
