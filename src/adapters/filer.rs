//! Resource filer
//!
//! The filer accepts save and delete requests from the transform passes and
//! applies them to a [`ResourceStore`] on a fixed set of worker queues. Every
//! operation for one (resource type, key) pair is routed to the same queue, so
//! operations on a single resource are applied in submission order while
//! unrelated resources are filed concurrently.
//!
//! Store failures do not interrupt the submitting pass. They are recorded with
//! the provenance of the record that produced them and raised by
//! [`ResourceFiler::fail_if_any_errors`] after a [`ResourceFiler::wait_to_finish`]
//! barrier.

use crate::adapters::store::ResourceStore;
use crate::domain::{
    CompositeKey, RecordProvenance, Resource, ResourceType, Result, TributaryError,
};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const QUEUE_CAPACITY: usize = 1024;

/// Filing counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilerStats {
    pub saved: usize,
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
struct FilingFailure {
    provenance: RecordProvenance,
    message: String,
}

#[derive(Default)]
struct FilerState {
    saved: AtomicUsize,
    deleted: AtomicUsize,
    failures: Mutex<Vec<FilingFailure>>,
}

impl FilerState {
    fn record_failure(&self, provenance: RecordProvenance, err: TributaryError) {
        tracing::error!(
            file = %provenance.file,
            file_type = %provenance.file_type,
            row = provenance.row,
            error = %err,
            "Filing failed"
        );
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(FilingFailure {
                provenance,
                message: err.to_string(),
            });
        }
    }

    fn failure_count(&self) -> usize {
        self.failures.lock().map(|f| f.len()).unwrap_or(0)
    }
}

enum FilingCommand {
    Save {
        provenance: RecordProvenance,
        resource: Box<Resource>,
    },
    Delete {
        provenance: RecordProvenance,
        resource_type: ResourceType,
        key: CompositeKey,
    },
    Load {
        resource_type: ResourceType,
        key: CompositeKey,
        reply: oneshot::Sender<Result<Option<Resource>>>,
    },
    Exists {
        resource_type: ResourceType,
        key: CompositeKey,
        reply: oneshot::Sender<Result<bool>>,
    },
    Barrier(oneshot::Sender<()>),
}

/// Batched, per-key ordered resource filer
pub struct ResourceFiler {
    store: Arc<dyn ResourceStore + Send + Sync>,
    queues: Vec<mpsc::Sender<FilingCommand>>,
    workers: Vec<JoinHandle<()>>,
    state: Arc<FilerState>,
}

impl ResourceFiler {
    /// Create a filer with `queue_count` worker queues
    ///
    /// Must be called inside a tokio runtime. A `queue_count` of zero is
    /// treated as one.
    pub fn new(store: Arc<dyn ResourceStore + Send + Sync>, queue_count: usize) -> Self {
        let state = Arc::new(FilerState::default());
        let mut queues = Vec::new();
        let mut workers = Vec::new();

        for index in 0..queue_count.max(1) {
            let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
            queues.push(tx);
            workers.push(tokio::spawn(run_worker(
                index,
                Arc::clone(&store),
                Arc::clone(&state),
                rx,
            )));
        }

        tracing::debug!(queues = queues.len(), store = store.store_name(), "Resource filer started");

        Self {
            store,
            queues,
            workers,
            state,
        }
    }

    /// Name of the backing store
    pub fn store_name(&self) -> &str {
        self.store.store_name()
    }

    /// Number of worker queues
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Queue a patient-scoped resource for saving
    ///
    /// # Errors
    ///
    /// Returns a filer error if the resource is administrative or has no owning
    /// patient, or if the filer has shut down.
    pub async fn save_patient_resource(
        &self,
        provenance: RecordProvenance,
        resource: Resource,
    ) -> Result<()> {
        if resource.resource_type.is_admin() || resource.patient.is_none() {
            return Err(TributaryError::Filer(format!(
                "{provenance}: {} {} is not a patient-scoped resource",
                resource.resource_type, resource.source_key
            )));
        }
        self.submit_save(provenance, resource).await
    }

    /// Queue an administrative resource for saving
    pub async fn save_admin_resource(
        &self,
        provenance: RecordProvenance,
        resource: Resource,
    ) -> Result<()> {
        if !resource.resource_type.is_admin() {
            return Err(TributaryError::Filer(format!(
                "{provenance}: {} {} is not an administrative resource",
                resource.resource_type, resource.source_key
            )));
        }
        self.submit_save(provenance, resource).await
    }

    /// Queue a patient-scoped resource for deletion
    pub async fn delete_patient_resource(
        &self,
        provenance: RecordProvenance,
        resource_type: ResourceType,
        key: CompositeKey,
    ) -> Result<()> {
        if resource_type.is_admin() {
            return Err(TributaryError::Filer(format!(
                "{provenance}: {resource_type} {key} is not a patient-scoped resource"
            )));
        }
        self.submit_delete(provenance, resource_type, key).await
    }

    /// Queue an administrative resource for deletion
    pub async fn delete_admin_resource(
        &self,
        provenance: RecordProvenance,
        resource_type: ResourceType,
        key: CompositeKey,
    ) -> Result<()> {
        if !resource_type.is_admin() {
            return Err(TributaryError::Filer(format!(
                "{provenance}: {resource_type} {key} is not an administrative resource"
            )));
        }
        self.submit_delete(provenance, resource_type, key).await
    }

    /// Load a resource
    ///
    /// The read is queued behind any pending writes for the same key.
    pub async fn load_resource(
        &self,
        resource_type: ResourceType,
        key: &CompositeKey,
    ) -> Result<Option<Resource>> {
        let (reply, rx) = oneshot::channel();
        self.send(
            resource_type,
            key,
            FilingCommand::Load {
                resource_type,
                key: key.clone(),
                reply,
            },
        )
        .await?;
        rx.await.map_err(|_| Self::closed())?
    }

    /// Check whether a resource has been filed
    pub async fn exists(&self, resource_type: ResourceType, key: &CompositeKey) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(
            resource_type,
            key,
            FilingCommand::Exists {
                resource_type,
                key: key.clone(),
                reply,
            },
        )
        .await?;
        rx.await.map_err(|_| Self::closed())?
    }

    /// Wait until every operation queued so far has been applied
    pub async fn wait_to_finish(&self) -> Result<()> {
        let mut barriers = Vec::with_capacity(self.queues.len());
        for queue in &self.queues {
            let (tx, rx) = oneshot::channel();
            queue
                .send(FilingCommand::Barrier(tx))
                .await
                .map_err(|_| Self::closed())?;
            barriers.push(rx);
        }
        for barrier in barriers {
            barrier.await.map_err(|_| Self::closed())?;
        }

        let stats = self.stats();
        tracing::debug!(
            saved = stats.saved,
            deleted = stats.deleted,
            failed = stats.failed,
            "Filing queues drained"
        );
        Ok(())
    }

    /// Raise the filing failures recorded so far
    ///
    /// # Errors
    ///
    /// Returns a filer error naming the failure count and the provenance of the
    /// first failure.
    pub fn fail_if_any_errors(&self) -> Result<()> {
        let failures = self
            .state
            .failures
            .lock()
            .map_err(|_| TributaryError::Filer("filer state lock poisoned".to_string()))?;

        match failures.first() {
            None => Ok(()),
            Some(first) => Err(TributaryError::Filer(format!(
                "{} resource(s) failed to file; first at {}: {}",
                failures.len(),
                first.provenance,
                first.message
            ))),
        }
    }

    /// Current filing counters
    pub fn stats(&self) -> FilerStats {
        FilerStats {
            saved: self.state.saved.load(Ordering::Relaxed),
            deleted: self.state.deleted.load(Ordering::Relaxed),
            failed: self.state.failure_count(),
        }
    }

    /// Drain every queue and stop the workers
    pub async fn shutdown(self) -> Result<FilerStats> {
        let Self {
            queues,
            workers,
            state,
            ..
        } = self;
        drop(queues);

        for worker in workers {
            worker
                .await
                .map_err(|e| TributaryError::Filer(format!("filing worker panicked: {e}")))?;
        }

        Ok(FilerStats {
            saved: state.saved.load(Ordering::Relaxed),
            deleted: state.deleted.load(Ordering::Relaxed),
            failed: state.failure_count(),
        })
    }

    async fn submit_save(&self, provenance: RecordProvenance, resource: Resource) -> Result<()> {
        let resource_type = resource.resource_type;
        let key = resource.source_key.clone();
        self.send(
            resource_type,
            &key,
            FilingCommand::Save {
                provenance,
                resource: Box::new(resource),
            },
        )
        .await
    }

    async fn submit_delete(
        &self,
        provenance: RecordProvenance,
        resource_type: ResourceType,
        key: CompositeKey,
    ) -> Result<()> {
        let route_key = key.clone();
        self.send(
            resource_type,
            &route_key,
            FilingCommand::Delete {
                provenance,
                resource_type,
                key,
            },
        )
        .await
    }

    async fn send(
        &self,
        resource_type: ResourceType,
        key: &CompositeKey,
        command: FilingCommand,
    ) -> Result<()> {
        let index = queue_index(resource_type, key, self.queues.len());
        self.queues[index]
            .send(command)
            .await
            .map_err(|_| Self::closed())
    }

    fn closed() -> TributaryError {
        TributaryError::Filer("resource filer has shut down".to_string())
    }
}

/// Queue a key is routed to; stable for the life of the process
fn queue_index(resource_type: ResourceType, key: &CompositeKey, queue_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    resource_type.hash(&mut hasher);
    key.hash(&mut hasher);
    (hasher.finish() % queue_count.max(1) as u64) as usize
}

async fn run_worker(
    index: usize,
    store: Arc<dyn ResourceStore + Send + Sync>,
    state: Arc<FilerState>,
    mut rx: mpsc::Receiver<FilingCommand>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            FilingCommand::Save {
                provenance,
                resource,
            } => match store.upsert(*resource).await {
                Ok(stored) => {
                    state.saved.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(
                        queue = index,
                        resource_type = %stored.resource_type,
                        key = %stored.source_key,
                        "Saved resource"
                    );
                }
                Err(e) => state.record_failure(provenance, e),
            },
            FilingCommand::Delete {
                provenance,
                resource_type,
                key,
            } => match store.delete(resource_type, &key).await {
                Ok(removed) => {
                    state.deleted.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(
                        queue = index,
                        resource_type = %resource_type,
                        key = %key,
                        removed,
                        "Deleted resource"
                    );
                }
                Err(e) => state.record_failure(provenance, e),
            },
            FilingCommand::Load {
                resource_type,
                key,
                reply,
            } => {
                let _ = reply.send(store.get(resource_type, &key).await);
            }
            FilingCommand::Exists {
                resource_type,
                key,
                reply,
            } => {
                let _ = reply.send(store.exists(resource_type, &key).await);
            }
            FilingCommand::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::trace!(queue = index, "Filing worker stopped");
}
