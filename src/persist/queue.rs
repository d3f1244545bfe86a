//! Single-consumer persistence queue.
//!
//! Every durable side effect of a record store is expressed as a
//! [`PersistOp`] and handed to one background task that applies them in
//! submission order. Each job carries the store revision it was produced at;
//! a job older than one already applied to the same storage key is dropped
//! as superseded, so a late-arriving save never overwrites newer state.

use super::PersistenceGateway;
use crate::core::naming::storage_key;
use crate::core::{Record, RecordPayload, Result, StoreError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, Level, event, info_span};

/// Called by the worker after a record was written successfully.
pub type SavedHook<P> = Box<dyn Fn(&Record<P>) + Send + Sync>;

#[derive(Debug, Clone)]
pub enum PersistOp<P> {
    Save(Record<P>),
    /// Removes the record artifact, and its companions when `companions` is set.
    Delete { name: String, companions: bool },
    /// Writes `record` under its new name, then drops the artifact of
    /// `previous_name` and re-keys its companions.
    Rename {
        record: Record<P>,
        previous_name: String,
    },
    /// Completes once every earlier job has been processed.
    Flush,
}

impl<P> PersistOp<P> {
    pub fn label(&self) -> &'static str {
        match self {
            PersistOp::Save(_) => "save",
            PersistOp::Delete { .. } => "delete",
            PersistOp::Rename { .. } => "rename",
            PersistOp::Flush => "flush",
        }
    }
}

struct PersistJob<P> {
    op: PersistOp<P>,
    revision: u64,
    ack: oneshot::Sender<Result<()>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; grows linearly with each retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Default)]
struct QueueShared {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    superseded: AtomicU64,
    retries: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl QueueShared {
    fn record_error(&self, err: &StoreError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        *lock(&self.last_error) = Some(err.to_string());
    }
}

/// Point-in-time counters of a [`PersistQueue`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub superseded: u64,
    pub retries: u64,
    pub last_error: Option<String>,
}

impl PersistStats {
    pub fn pending(&self) -> u64 {
        self.submitted
            .saturating_sub(self.completed + self.failed + self.superseded)
    }
}

/// Completion handle of one submitted job.
///
/// Dropping the ticket does not cancel the job.
#[derive(Debug)]
pub struct PersistTicket {
    rx: oneshot::Receiver<Result<()>>,
}

impl PersistTicket {
    pub async fn wait(self) -> Result<()> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(StoreError::QueueClosed),
        }
    }
}

pub struct PersistQueue<P> {
    tx: Mutex<Option<mpsc::Sender<PersistJob<P>>>>,
    shared: Arc<QueueShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<P: RecordPayload> PersistQueue<P> {
    /// Starts the worker on the current tokio runtime.
    pub fn spawn(
        gateway: Arc<dyn PersistenceGateway<P>>,
        capacity: usize,
        policy: RetryPolicy,
        on_saved: SavedHook<P>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shared = Arc::new(QueueShared::default());
        let worker = Worker {
            gateway,
            shared: Arc::clone(&shared),
            policy,
            on_saved,
            applied: HashMap::new(),
        };
        let handle = tokio::spawn(worker.run(rx));

        Self {
            tx: Mutex::new(Some(tx)),
            shared,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Enqueues `op`, waiting for queue capacity if necessary.
    pub async fn submit(&self, op: PersistOp<P>, revision: u64) -> Result<PersistTicket> {
        let tx = lock(&self.tx).clone().ok_or(StoreError::QueueClosed)?;
        let counted = !matches!(op, PersistOp::Flush);
        let (ack, rx) = oneshot::channel();
        tx.send(PersistJob { op, revision, ack })
            .await
            .map_err(|_| StoreError::QueueClosed)?;
        if counted {
            self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(PersistTicket { rx })
    }

    /// Waits until every job submitted before this call has been processed.
    pub async fn flush(&self) -> Result<()> {
        self.submit(PersistOp::Flush, 0).await?.wait().await
    }

    pub fn stats(&self) -> PersistStats {
        let shared = &self.shared;
        PersistStats {
            submitted: shared.submitted.load(Ordering::Relaxed),
            completed: shared.completed.load(Ordering::Relaxed),
            failed: shared.failed.load(Ordering::Relaxed),
            superseded: shared.superseded.load(Ordering::Relaxed),
            retries: shared.retries.load(Ordering::Relaxed),
            last_error: lock(&shared.last_error).clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.tx).is_none()
    }

    /// Stops accepting jobs, drains the ones already queued and joins the worker.
    pub async fn shutdown(&self) -> Result<()> {
        drop(lock(&self.tx).take());
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|err| StoreError::Io(format!("persist worker join: {}", err)))?;
        }
        Ok(())
    }
}

impl<P> Drop for PersistQueue<P> {
    fn drop(&mut self) {
        // Closing the channel lets the detached worker finish what is queued.
        drop(lock(&self.tx).take());
    }
}

enum Applied {
    Written,
    Superseded,
}

struct Worker<P> {
    gateway: Arc<dyn PersistenceGateway<P>>,
    shared: Arc<QueueShared>,
    policy: RetryPolicy,
    on_saved: SavedHook<P>,
    /// Highest revision attempted per storage key.
    applied: HashMap<String, u64>,
}

impl<P: RecordPayload> Worker<P> {
    async fn run(mut self, mut rx: mpsc::Receiver<PersistJob<P>>) {
        while let Some(job) = rx.recv().await {
            let PersistJob { op, revision, ack } = job;
            let span = info_span!("persist_job", kind = P::KIND, op = op.label(), revision);
            let result = self.execute(op, revision).instrument(span).await;
            let _ = ack.send(result);
        }
        event!(Level::DEBUG, kind = P::KIND, "persist worker drained");
    }

    async fn execute(&mut self, op: PersistOp<P>, revision: u64) -> Result<()> {
        let outcome = match op {
            PersistOp::Flush => return Ok(()),
            PersistOp::Save(record) => self.save(record, revision).await,
            PersistOp::Delete { name, companions } => {
                self.delete(&name, companions, revision).await
            }
            PersistOp::Rename {
                record,
                previous_name,
            } => self.rename(record, &previous_name, revision).await,
        };

        match outcome {
            Ok(Applied::Written) => {
                self.shared.completed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Ok(Applied::Superseded) => {
                self.shared.superseded.fetch_add(1, Ordering::Relaxed);
                event!(Level::DEBUG, "skipped superseded job");
                Ok(())
            }
            Err(err) => {
                self.shared.record_error(&err);
                event!(Level::WARN, error = %err, "persist job failed");
                Err(err)
            }
        }
    }

    fn is_superseded(&self, key: &str, revision: u64) -> bool {
        self.applied
            .get(key)
            .is_some_and(|&applied| applied > revision)
    }

    fn claim(&mut self, key: String, revision: u64) {
        let applied = self.applied.entry(key).or_insert(0);
        *applied = (*applied).max(revision);
    }

    async fn save(&mut self, record: Record<P>, revision: u64) -> Result<Applied> {
        let key = storage_key(&record.name);
        if self.is_superseded(&key, revision) {
            return Ok(Applied::Superseded);
        }
        self.claim(key, revision);

        let gateway = &*self.gateway;
        let target = &record;
        retry(&self.shared, self.policy, "save", &record.name, move || {
            gateway.save(target)
        })
        .await?;
        (self.on_saved)(&record);
        Ok(Applied::Written)
    }

    async fn delete(&mut self, name: &str, companions: bool, revision: u64) -> Result<Applied> {
        let key = storage_key(name);
        if self.is_superseded(&key, revision) {
            return Ok(Applied::Superseded);
        }
        self.claim(key, revision);

        let gateway = &*self.gateway;
        retry(&self.shared, self.policy, "delete", name, move || {
            gateway.delete(name)
        })
        .await?;
        if companions {
            retry(&self.shared, self.policy, "delete companions", name, move || {
                gateway.delete_companions(name)
            })
            .await?;
        }
        Ok(Applied::Written)
    }

    async fn rename(
        &mut self,
        record: Record<P>,
        previous_name: &str,
        revision: u64,
    ) -> Result<Applied> {
        let new_key = storage_key(&record.name);
        let old_key = storage_key(previous_name);
        let gateway = Arc::clone(&self.gateway);
        let gateway = &*gateway;
        let mut applied = Applied::Superseded;

        if !self.is_superseded(&new_key, revision) {
            self.claim(new_key.clone(), revision);
            let target = &record;
            retry(&self.shared, self.policy, "write renamed", &record.name, move || {
                gateway.save(target)
            })
            .await?;
            (self.on_saved)(&record);
            applied = Applied::Written;
        }

        // Same key means the write above already replaced the old artifact.
        if old_key != new_key && !self.is_superseded(&old_key, revision) {
            self.claim(old_key, revision);
            let new_name = record.name.as_str();
            retry(&self.shared, self.policy, "delete old", previous_name, move || {
                gateway.delete(previous_name)
            })
            .await?;
            retry(&self.shared, self.policy, "migrate companions", previous_name, move || {
                gateway.migrate_companions(previous_name, new_name)
            })
            .await?;
            applied = Applied::Written;
        }

        Ok(applied)
    }
}

async fn retry<F, Fut>(
    shared: &QueueShared,
    policy: RetryPolicy,
    what: &str,
    name: &str,
    mut attempt_once: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match attempt_once().await {
            Ok(()) => return Ok(()),
            Err(err) if attempt < max_attempts => {
                event!(
                    Level::WARN,
                    name,
                    attempt,
                    error = %err,
                    "{} failed, retrying",
                    what
                );
                shared.retries.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryGateway;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Count(u32);

    impl RecordPayload for Count {
        const KIND: &'static str = "count";
        const FILE_EXTENSION: &'static str = "count";
        const DEFAULT_NAME: &'static str = "count";

        fn blank() -> Self {
            Count(0)
        }
    }

    fn record(id: u64, name: &str, value: u32) -> Record<Count> {
        Record::new(id, name, value as i64, Count(value))
    }

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::from_millis(10),
        }
    }

    fn spawn_queue(gateway: &MemoryGateway<Count>, policy: RetryPolicy) -> PersistQueue<Count> {
        PersistQueue::spawn(Arc::new(gateway.clone()), 16, policy, Box::new(|_| {}))
    }

    #[tokio::test]
    async fn test_jobs_apply_in_order_and_flush_waits() {
        let gateway = MemoryGateway::new();
        gateway.set_delay(Some(Duration::from_millis(5)));
        let queue = spawn_queue(&gateway, RetryPolicy::default());

        for value in 1..=5 {
            let _ = queue.submit(PersistOp::Save(record(1, "a", value)), value as u64).await.unwrap();
        }
        queue.flush().await.unwrap();

        assert_eq!(gateway.get("a").unwrap().payload, Count(5));
        assert_eq!(gateway.saves(), 5);
        let stats = queue.stats();
        assert_eq!(stats.submitted, 5);
        assert_eq!(stats.completed, 5);
        assert_eq!(stats.pending(), 0);
    }

    #[tokio::test]
    async fn test_older_revision_is_superseded() {
        let gateway = MemoryGateway::new();
        let queue = spawn_queue(&gateway, RetryPolicy::default());

        let newer = queue.submit(PersistOp::Save(record(1, "a", 2)), 2).await.unwrap();
        let older = queue.submit(PersistOp::Save(record(1, "a", 1)), 1).await.unwrap();
        newer.wait().await.unwrap();
        older.wait().await.unwrap();

        assert_eq!(gateway.get("a").unwrap().payload, Count(2));
        assert_eq!(queue.stats().superseded, 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let gateway = MemoryGateway::new();
        gateway.fail_writes(true);
        let queue = spawn_queue(&gateway, quick_policy(5));

        let ticket = queue.submit(PersistOp::Save(record(1, "a", 1)), 1).await.unwrap();
        let healer = gateway.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            healer.fail_writes(false);
        });

        ticket.wait().await.unwrap();
        assert!(gateway.contains("a"));
        let stats = queue.stats();
        assert!(stats.retries >= 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_permanent_failure_reaches_ticket_and_stats() {
        let gateway = MemoryGateway::new();
        gateway.fail_writes(true);
        let queue = spawn_queue(&gateway, quick_policy(2));

        let err = queue
            .submit(PersistOp::Save(record(1, "a", 1)), 1)
            .await
            .unwrap()
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));

        let stats = queue.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.retries, 1);
        assert!(stats.last_error.unwrap().contains("injected"));
    }

    #[tokio::test]
    async fn test_rename_moves_record_and_companions() {
        let gateway = MemoryGateway::new();
        gateway.insert(record(1, "Old", 1));
        gateway.add_companion("Old", "llama.bin");
        let queue = spawn_queue(&gateway, RetryPolicy::default());

        queue
            .submit(
                PersistOp::Rename {
                    record: record(1, "New", 2),
                    previous_name: "Old".to_string(),
                },
                3,
            )
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert!(!gateway.contains("Old"));
        assert_eq!(gateway.get("New").unwrap().id, 1);
        assert_eq!(gateway.companions(), vec!["new@llama.bin".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_rename_write_keeps_old_artifact() {
        let gateway = MemoryGateway::new();
        gateway.insert(record(1, "Old", 1));
        gateway.fail_writes(true);
        let queue = spawn_queue(&gateway, quick_policy(1));

        let result = queue
            .submit(
                PersistOp::Rename {
                    record: record(1, "New", 2),
                    previous_name: "Old".to_string(),
                },
                1,
            )
            .await
            .unwrap()
            .wait()
            .await;

        assert!(result.is_err());
        assert!(gateway.contains("Old"));
        assert!(!gateway.contains("New"));
    }

    #[tokio::test]
    async fn test_saved_hook_sees_written_records() {
        let gateway = MemoryGateway::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let queue = PersistQueue::spawn(
            Arc::new(gateway.clone()),
            4,
            RetryPolicy::default(),
            Box::new(move |_record: &Record<Count>| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let _ = queue.submit(PersistOp::Save(record(1, "a", 1)), 1).await.unwrap();
        let _ = queue.submit(PersistOp::Delete { name: "a".into(), companions: true }, 2).await.unwrap();
        queue.flush().await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(!gateway.contains("a"));
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_rejects() {
        let gateway = MemoryGateway::new();
        gateway.set_delay(Some(Duration::from_millis(5)));
        let queue = spawn_queue(&gateway, RetryPolicy::default());

        for id in 0..3u64 {
            let _ = queue
                .submit(PersistOp::Save(record(id, &format!("r{}", id), 1)), id + 1)
                .await
                .unwrap();
        }
        queue.shutdown().await.unwrap();

        assert_eq!(gateway.records().len(), 3);
        assert!(queue.is_closed());
        assert!(matches!(
            queue.submit(PersistOp::Flush, 0).await,
            Err(StoreError::QueueClosed)
        ));
    }
}
