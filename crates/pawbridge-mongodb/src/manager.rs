//! Connection lifecycle and the operation queue.
//!
//! Every operation is handed to [`ConnectionManager::execute`] as a [`Job`]. Jobs wait in
//! a FIFO queue until the session is open, then run one at a time in submission order.
//! Jobs submitted while the queue drains run in the same drain.

use crate::bootstrap::bootstrap_models;
use crate::session::{Session, StoreContext};
use crate::store::{Connector, RecordStore};
use crate::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use pawbridge_common::PetDataError;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// A queued operation; receives the open session, or the error that prevented opening it
pub type Job = Box<dyn FnOnce(Result<Session>) -> BoxFuture<'static, ()> + Send>;

/// Lifecycle of the shared connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
}

struct QueueState {
    state: ConnectionState,
    store: Option<Arc<dyn RecordStore>>,
    queue: VecDeque<Job>,
    draining: bool,
}

struct Inner {
    connector: Arc<dyn Connector>,
    context: Arc<StoreContext>,
    queue: Mutex<QueueState>,
}

/// Owner of the single shared connection
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queue = self.inner.queue.lock();
        f.debug_struct("ConnectionManager")
            .field("state", &queue.state)
            .field("queued", &queue.queue.len())
            .field("draining", &queue.draining)
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, context: Arc<StoreContext>) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                context,
                queue: Mutex::new(QueueState {
                    state: ConnectionState::Idle,
                    store: None,
                    queue: VecDeque::new(),
                    draining: false,
                }),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.queue.lock().state
    }

    pub fn context(&self) -> &Arc<StoreContext> {
        &self.inner.context
    }

    /// Number of jobs waiting to run
    pub fn queued(&self) -> usize {
        self.inner.queue.lock().queue.len()
    }

    /// Queue `job`; starts the connection on first use.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn execute(&self, job: Job) {
        let mut queue = self.inner.queue.lock();
        queue.queue.push_back(job);

        match queue.state {
            ConnectionState::Connected => {
                if !queue.draining {
                    queue.draining = true;
                    drop(queue);
                    tokio::spawn(drain(self.inner.clone()));
                }
            }
            ConnectionState::Connecting => {
                tracing::debug!(queued = queue.queue.len(), "Connection in progress, operation queued");
            }
            ConnectionState::Idle => {
                queue.state = ConnectionState::Connecting;
                drop(queue);
                tokio::spawn(connect(self.inner.clone()));
            }
        }
    }
}

/// Run one job, containing any panic so the queue keeps moving
async fn run_job(job: Job, session: Result<Session>) {
    let outcome = AssertUnwindSafe(async move { job(session).await })
        .catch_unwind()
        .await;
    if outcome.is_err() {
        tracing::error!("Queued operation panicked");
    }
}

async fn drain(inner: Arc<Inner>) {
    loop {
        let (job, store) = {
            let mut queue = inner.queue.lock();
            match queue.queue.pop_front() {
                Some(job) => (job, queue.store.clone()),
                None => {
                    queue.draining = false;
                    return;
                }
            }
        };

        let session = store
            .map(|store| Session::new(store, inner.context.clone()))
            .ok_or_else(|| PetDataError::Internal("Draining without an open store".to_string()));
        run_job(job, session).await;
    }
}

/// Open the store, retrying retryable failures per the configured policy
async fn open_store(inner: &Inner) -> Result<Arc<dyn RecordStore>> {
    let identity = &inner.context.config().identity;
    let policy = &inner.context.config().retry;
    let uri = identity.uri();
    let mut attempt = 0;

    loop {
        tracing::info!(uri = %identity.redacted_uri(), attempt = attempt + 1, "Connecting");
        match inner.connector.connect(&uri).await {
            Ok(store) => return Ok(store),
            Err(e) if e.is_retryable() && policy.should_retry(attempt) => {
                attempt += 1;
                let delay = policy.backoff(attempt);
                tracing::warn!(error = %e, attempt = attempt, delay_ms = delay.as_millis() as u64, "Connect failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(uri = %identity.redacted_uri(), error = %e, "Connect failed");
                return Err(e);
            }
        }
    }
}

async fn open_session(inner: &Inner) -> Result<Arc<dyn RecordStore>> {
    let store = open_store(inner).await?;
    bootstrap_models(store.as_ref(), &inner.context).await?;
    Ok(store)
}

async fn connect(inner: Arc<Inner>) {
    match open_session(&inner).await {
        Ok(store) => {
            {
                let mut queue = inner.queue.lock();
                queue.store = Some(store);
                queue.state = ConnectionState::Connected;
                queue.draining = true;
            }
            tracing::info!("Connection ready, draining queued operations");
            drain(inner).await;
        }
        Err(e) => {
            let failed: Vec<Job> = {
                let mut queue = inner.queue.lock();
                queue.state = ConnectionState::Idle;
                queue.queue.drain(..).collect()
            };
            tracing::error!(error = %e, failed = failed.len(), "Could not open session");
            for job in failed {
                run_job(job, Err(e.clone())).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::memory::{MemoryConnector, MemoryStore};
    use crate::retry::RetryPolicy;
    use crate::schema::SchemaStore;
    use std::time::Duration;
    use tokio::sync::{mpsc, Notify};

    fn manager(connector: MemoryConnector, retry: RetryPolicy) -> ConnectionManager {
        let dir = std::env::temp_dir().join(format!("pawbridge-manager-{}", bson::oid::ObjectId::new()));
        let config = StoreConfig {
            models_path: dir.join("models.json"),
            retry,
            ..StoreConfig::default()
        };
        let context = Arc::new(StoreContext::new(config, SchemaStore::default()));
        ConnectionManager::new(Arc::new(connector), context)
    }

    fn recording_job(id: usize, tx: mpsc::UnboundedSender<(usize, bool)>) -> Job {
        Box::new(move |session: Result<Session>| {
            async move {
                let _ = tx.send((id, session.is_ok()));
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_jobs_wait_for_connection_and_run_in_order() {
        let gate = Arc::new(Notify::new());
        let connector = MemoryConnector::new(Arc::new(MemoryStore::new())).gated(gate.clone());
        let manager = manager(connector, RetryPolicy::disabled());
        let (tx, mut rx) = mpsc::unbounded_channel();

        for id in 0..3 {
            manager.execute(recording_job(id, tx.clone()));
        }
        tokio::task::yield_now().await;
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.queued(), 3);

        gate.notify_one();
        for expected in 0..3 {
            assert_eq!(rx.recv().await, Some((expected, true)));
        }
        assert_eq!(manager.state(), ConnectionState::Connected);

        manager.execute(recording_job(3, tx.clone()));
        assert_eq!(rx.recv().await, Some((3, true)));
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_drain() {
        let connector = MemoryConnector::new(Arc::new(MemoryStore::new()));
        let manager = manager(connector, RetryPolicy::disabled());
        let (tx, mut rx) = mpsc::unbounded_channel();

        manager.execute(Box::new(|_: Result<Session>| async { panic!("boom") }.boxed()));
        manager.execute(recording_job(1, tx));
        assert_eq!(rx.recv().await, Some((1, true)));
    }

    #[tokio::test]
    async fn test_retries_then_connects() {
        let connector = MemoryConnector::new(Arc::new(MemoryStore::new())).failing(2);
        let manager = manager(connector, RetryPolicy::new(3, Duration::from_millis(1)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        manager.execute(recording_job(0, tx));
        assert_eq!(rx.recv().await, Some((0, true)));
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_queued_jobs_and_reset() {
        let connector = MemoryConnector::new(Arc::new(MemoryStore::new())).failing(5);
        let manager = manager(connector, RetryPolicy::new(1, Duration::from_millis(1)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        manager.execute(recording_job(0, tx.clone()));
        manager.execute(recording_job(1, tx));
        assert_eq!(rx.recv().await, Some((0, false)));
        assert_eq!(rx.recv().await, Some((1, false)));
        assert_eq!(manager.state(), ConnectionState::Idle);
    }
}
