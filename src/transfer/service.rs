use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Notify, RwLock, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::config::{StorageConfig, StorageSettings, TransferProtocol};
use super::job::{TransferJob, TransferStatus};
use super::policy::RetryPolicy;
use super::protocol::{default_handlers, TransferError, TransferHandler};
use crate::config::TransferSettings;
use crate::error::{RecorderError, RecorderResult};
use crate::session::{RecordingSession, SessionRegistry};

struct QueuedJob {
    id: Uuid,
    /// Config captured at enqueue time; later updates do not affect the job
    config: Arc<StorageConfig>,
}

struct Inner {
    registry: Arc<SessionRegistry>,
    storage: Arc<StorageSettings>,
    policy: RetryPolicy,
    handlers: HashMap<TransferProtocol, Arc<dyn TransferHandler>>,
    jobs: RwLock<Vec<TransferJob>>,
    changed: Notify,
}

/// Queue and worker pool delivering finished sessions to remote storage.
///
/// Jobs run on their own tasks, never on the session engine's, and never
/// hold the registry lock across network I/O.
#[derive(Clone)]
pub struct TransferService {
    inner: Arc<Inner>,
    queue: mpsc::UnboundedSender<QueuedJob>,
}

impl TransferService {
    /// Service with the built-in scp/rsync/http handlers.
    pub fn spawn(
        registry: Arc<SessionRegistry>,
        storage: Arc<StorageSettings>,
        settings: &TransferSettings,
    ) -> Self {
        Self::with_handlers(
            registry,
            storage,
            RetryPolicy::from(settings),
            default_handlers(settings.command_timeout()),
            settings.workers,
        )
    }

    pub fn with_handlers(
        registry: Arc<SessionRegistry>,
        storage: Arc<StorageSettings>,
        policy: RetryPolicy,
        handlers: HashMap<TransferProtocol, Arc<dyn TransferHandler>>,
        workers: usize,
    ) -> Self {
        let inner = Arc::new(Inner {
            registry,
            storage,
            policy,
            handlers,
            jobs: RwLock::new(Vec::new()),
            changed: Notify::new(),
        });
        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(worker_loop(Arc::clone(&inner), rx, workers.max(1)));
        Self { inner, queue }
    }

    pub fn storage(&self) -> &Arc<StorageSettings> {
        &self.inner.storage
    }

    /// Create a pending job for a terminal session and queue it.
    pub async fn enqueue(
        &self,
        session_id: &str,
        delete_after_transfer: bool,
    ) -> RecorderResult<TransferJob> {
        let config = self.inner.storage.load().await;
        if !config.enabled {
            return Err(RecorderError::StorageDisabled);
        }
        if !self.inner.handlers.contains_key(&config.protocol) {
            return Err(RecorderError::ProtocolNotImplemented(
                config.protocol.to_string(),
            ));
        }
        let missing = config.missing_fields();
        if !missing.is_empty() {
            return Err(RecorderError::StorageIncomplete(missing));
        }

        let session = self
            .inner
            .registry
            .find_terminal(session_id)
            .await
            .ok_or_else(|| RecorderError::SessionNotFound(session_id.to_string()))?;
        if !session.status().has_output() || session.files().is_empty() {
            return Err(RecorderError::NothingToTransfer(session.id().to_string()));
        }

        let files: Vec<PathBuf> = session.files().iter().map(|f| f.path.clone()).collect();
        let job = TransferJob::new(session.id(), files, &config, delete_after_transfer);
        self.inner.jobs.write().await.push(job.clone());

        self.queue
            .send(QueuedJob {
                id: job.id,
                config: Arc::clone(&config),
            })
            .map_err(|_| {
                RecorderError::Io(std::io::Error::other("transfer worker is not running"))
            })?;

        info!(
            "Queued transfer {} for session {} ({} files via {} to {})",
            job.id,
            job.session_id,
            job.files.len(),
            config.protocol,
            config.destination()
        );
        Ok(job)
    }

    /// Queue a transfer for a freshly finalized session when auto-transfer is on.
    pub async fn auto_enqueue(&self, session: &RecordingSession) -> Option<TransferJob> {
        let config = self.inner.storage.load().await;
        if !(config.enabled && config.auto_transfer && session.status().has_output()) {
            return None;
        }
        match self.enqueue(session.id(), false).await {
            Ok(job) => Some(job),
            Err(e) => {
                warn!("Auto-transfer for session {} not queued: {}", session.id(), e);
                None
            }
        }
    }

    pub async fn job(&self, id: Uuid) -> Option<TransferJob> {
        self.inner
            .jobs
            .read()
            .await
            .iter()
            .find(|j| j.id == id)
            .cloned()
    }

    /// All jobs, most recent first.
    pub async fn jobs(&self) -> Vec<TransferJob> {
        self.inner.jobs.read().await.iter().rev().cloned().collect()
    }

    /// Resolve once the job reaches `succeeded` or `failed`.
    pub async fn wait(&self, id: Uuid) -> Option<TransferJob> {
        loop {
            let changed = self.inner.changed.notified();
            let job = self.job(id).await?;
            if job.status.is_terminal() {
                return Some(job);
            }
            changed.await;
        }
    }
}

async fn worker_loop(inner: Arc<Inner>, mut rx: mpsc::UnboundedReceiver<QueuedJob>, workers: usize) {
    let permits = Arc::new(Semaphore::new(workers));
    while let Some(queued) = rx.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let inner = Arc::clone(&inner);
        tokio::spawn(async move {
            inner.execute(queued).await;
            drop(permit);
        });
    }
    info!("Transfer worker stopped");
}

impl Inner {
    async fn update<F>(&self, id: Uuid, apply: F) -> Option<TransferJob>
    where
        F: FnOnce(&mut TransferJob),
    {
        let snapshot = {
            let mut jobs = self.jobs.write().await;
            let job = jobs.iter_mut().find(|j| j.id == id)?;
            apply(job);
            job.clone()
        };
        self.changed.notify_waiters();
        Some(snapshot)
    }

    async fn execute(&self, queued: QueuedJob) {
        let QueuedJob { id, config } = queued;
        let Some(job) = self
            .update(id, |job| job.status = TransferStatus::InProgress)
            .await
        else {
            return;
        };

        let Some(handler) = self.handlers.get(&job.protocol).cloned() else {
            let message = format!("protocol {} is not implemented", job.protocol);
            self.fail(id, message).await;
            return;
        };

        let mut pending = job.files.clone();
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.update(id, |job| job.attempts = attempt).await;

            let failure = self.send_pending(id, handler.as_ref(), &config, &mut pending).await;
            let Some(err) = failure else {
                break;
            };

            warn!(
                "Transfer {} attempt {}/{} failed: {}",
                id, attempt, self.policy.max_attempts, err
            );
            let message = err.message().to_string();
            self.update(id, |job| job.last_error = Some(message.clone()))
                .await;

            match (err.is_transient(), self.policy.delay_after(attempt)) {
                (true, Some(delay)) => {
                    info!("Retrying transfer {} in {:?}", id, delay);
                    tokio::time::sleep(delay).await;
                }
                _ => {
                    self.fail(id, message).await;
                    return;
                }
            }
        }

        let Some(job) = self
            .update(id, |job| {
                job.status = TransferStatus::Succeeded;
                job.finished_at = Some(Utc::now());
            })
            .await
        else {
            return;
        };
        info!(
            "Transfer {} succeeded after {} attempt(s)",
            id, job.attempts
        );

        if job.delete_after_transfer {
            self.delete_local(&job).await;
        }
    }

    /// Send every file still in `pending`, stopping at the first failure.
    async fn send_pending(
        &self,
        id: Uuid,
        handler: &dyn TransferHandler,
        config: &StorageConfig,
        pending: &mut Vec<PathBuf>,
    ) -> Option<TransferError> {
        while let Some(file) = pending.first().cloned() {
            if let Err(e) = handler.send(&file, config).await {
                return Some(e);
            }
            pending.remove(0);
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            self.update(id, |job| job.transferred.push(name)).await;
        }
        None
    }

    async fn fail(&self, id: Uuid, message: String) {
        error!("Transfer {} failed, local files kept: {}", id, message);
        self.update(id, |job| {
            job.status = TransferStatus::Failed;
            job.last_error = Some(message);
            job.finished_at = Some(Utc::now());
        })
        .await;
    }

    /// Remove local copies after success; failures are recorded only.
    async fn delete_local(&self, job: &TransferJob) {
        for file in &job.files {
            let name = file.display().to_string();
            match tokio::fs::remove_file(file).await {
                Ok(()) => {
                    info!("Deleted local file {}", name);
                    self.update(job.id, |job| job.deleted.push(name)).await;
                }
                Err(e) => {
                    warn!("Failed to delete {}: {}", name, e);
                    let message = format!("{name}: {e}");
                    self.update(job.id, |job| job.delete_errors.push(message))
                        .await;
                }
            }
        }
    }
}
