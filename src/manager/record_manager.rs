use super::SelectionListener;
use crate::config::StoreConfig;
use crate::core::{Clock, JobId, Record, RecordPayload, Result, StoreError, SystemClock, Timestamp};
use crate::persist::{
    FileGateway, NullGateway, PersistOp, PersistQueue, PersistStats, PersistTicket,
    PersistenceGateway, SavedHook, export_record,
};
use crate::storage::{Hydration, StoreState};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Indexed, selectable, asynchronously persisted collection of named records.
///
/// All in-memory state lives behind one `RwLock`. Reads are synchronous and
/// never wait on disk; mutations finish their critical section, release the
/// lock and only then hand the resulting persistence work to a background
/// queue. Disk failures never roll back memory: the running session is the
/// source of truth and persistence is best effort, observable through
/// [`persist_stats`](Self::persist_stats) and awaitable through
/// [`save`](Self::save) / [`flush`](Self::flush).
pub struct RecordManager<P: RecordPayload> {
    state: Arc<RwLock<StoreState<P>>>,
    queue: PersistQueue<P>,
    gateway: Arc<dyn PersistenceGateway<P>>,
    clock: Arc<dyn Clock>,
    listener: RwLock<Option<Arc<dyn SelectionListener>>>,
    /// Revision of the last delivered selection notification.
    notified: Mutex<u64>,
}

impl<P: RecordPayload> RecordManager<P> {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Opens a file-backed store in `config.data_dir`.
    ///
    /// If the directory cannot be used the manager still starts, seeded with
    /// the default record, but nothing it does reaches disk.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        config.validate().map_err(StoreError::InvalidConfig)?;
        let gateway: Arc<dyn PersistenceGateway<P>> = match Self::file_gateway(&config).await {
            Ok(gateway) => Arc::new(gateway),
            Err(err) => {
                warn!(
                    kind = P::KIND,
                    error = %err,
                    "record directory unavailable, running without persistence"
                );
                Arc::new(NullGateway::new())
            }
        };
        Self::open_with(gateway, Arc::new(SystemClock), &config).await
    }

    pub async fn open_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::open(StoreConfig::new(dir)).await
    }

    /// Opens a store over an arbitrary gateway and clock.
    pub async fn open_with(
        gateway: Arc<dyn PersistenceGateway<P>>,
        clock: Arc<dyn Clock>,
        config: &StoreConfig,
    ) -> Result<Self> {
        config.validate().map_err(StoreError::InvalidConfig)?;

        let state = Arc::new(RwLock::new(StoreState::new()));
        let observed = Arc::downgrade(&state);
        let on_saved: SavedHook<P> = Box::new(move |record: &Record<P>| {
            if let Some(state) = observed.upgrade() {
                let mut state = state.write().unwrap_or_else(PoisonError::into_inner);
                state.mark_persisted(record.id, record.payload.clone());
            }
        });
        let queue = PersistQueue::spawn(
            Arc::clone(&gateway),
            config.queue_capacity,
            config.retry_policy(),
            on_saved,
        );

        let manager = Self {
            state,
            queue,
            gateway,
            clock,
            listener: RwLock::new(None),
            notified: Mutex::new(0),
        };

        let records = match manager.gateway.load_all().await {
            Ok(records) => records,
            Err(err) => {
                warn!(kind = P::KIND, error = %err, "failed to load records, starting empty");
                Vec::new()
            }
        };
        let loaded = manager.hydrate(records).await;
        info!(
            kind = P::KIND,
            loaded,
            persistent = manager.is_persistent(),
            "record store opened"
        );
        Ok(manager)
    }

    async fn file_gateway(config: &StoreConfig) -> Result<FileGateway<P>> {
        if !config.create_dir && !matches!(tokio::fs::try_exists(&config.data_dir).await, Ok(true)) {
            return Err(StoreError::Io(format!(
                "record directory '{}' does not exist",
                config.data_dir.display()
            )));
        }
        FileGateway::open(&config.data_dir).await
    }

    /// False in the degraded mode where writes are discarded.
    pub fn is_persistent(&self) -> bool {
        self.gateway.is_durable()
    }

    // ------------------------------------------------------------------
    // Locking and dispatch
    // ------------------------------------------------------------------

    fn read(&self) -> RwLockReadGuard<'_, StoreState<P>> {
        self.state.read().unwrap_or_else(|poisoned| {
            warn!(kind = P::KIND, "recovering poisoned store lock");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState<P>> {
        self.state.write().unwrap_or_else(|poisoned| {
            warn!(kind = P::KIND, "recovering poisoned store lock");
            poisoned.into_inner()
        })
    }

    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Runs `f` as one exclusive critical section stamped with a fresh revision.
    ///
    /// The selection listener fires afterwards, outside the lock, if the
    /// selected record changed.
    fn mutate<T>(&self, f: impl FnOnce(&mut StoreState<P>) -> T) -> (T, u64) {
        self.mutate_then_notify(f, |_| false)
    }

    /// Like [`mutate`](Self::mutate), but `force` may ask for a notification
    /// even when the selection stayed on the same record.
    fn mutate_then_notify<T>(
        &self,
        f: impl FnOnce(&mut StoreState<P>) -> T,
        force: impl FnOnce(&T) -> bool,
    ) -> (T, u64) {
        let (out, revision, notify) = {
            let mut state = self.write();
            let before = state.current().map(|record| record.id);
            let revision = state.next_revision();
            let out = f(&mut *state);
            let after = state.current().map(|record| (record.id, record.name.clone()));
            let changed = before != after.as_ref().map(|(id, _)| *id);
            let notify = (changed || force(&out)).then(|| after.map(|(_, name)| name));
            (out, revision, notify)
        };

        if let Some(current) = notify {
            self.notify(revision, current.as_deref());
        }
        (out, revision)
    }

    /// Delivers selection notifications one at a time, in revision order.
    ///
    /// A notification older than one already delivered describes a selection
    /// that has since been replaced and is dropped. Listeners must not mutate
    /// the store from inside the callback.
    fn notify(&self, revision: u64, current: Option<&str>) {
        let mut notified = self.notified.lock().unwrap_or_else(PoisonError::into_inner);
        if revision < *notified {
            debug!(kind = P::KIND, revision, "dropping stale selection notification");
            return;
        }
        *notified = revision;

        let listener = self
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener.selection_changed(P::KIND, current);
        }
    }

    /// Queues `op`; a closed queue is logged, not returned.
    async fn dispatch(&self, op: PersistOp<P>, revision: u64) -> Option<PersistTicket> {
        let label = op.label();
        match self.queue.submit(op, revision).await {
            Ok(ticket) => Some(ticket),
            Err(err) => {
                warn!(kind = P::KIND, op = label, error = %err, "persistence job dropped");
                None
            }
        }
    }

    async fn hydrate(&self, records: Vec<Record<P>>) -> usize {
        let now = self.now();
        let (hydration, revision) = self.mutate(|state| state.hydrate(records, now));
        let Hydration {
            loaded,
            stale,
            seeded,
        } = hydration;

        for name in stale {
            debug!(kind = P::KIND, name = %name, "removing superseded artifact");
            self.dispatch(
                PersistOp::Delete {
                    name,
                    companions: false,
                },
                revision,
            )
            .await;
        }
        if let Some(record) = seeded {
            info!(kind = P::KIND, name = %record.name, "no records found, created default");
            self.dispatch(PersistOp::Save(record), revision).await;
        }
        loaded
    }

    pub fn set_selection_listener(&self, listener: Arc<dyn SelectionListener>) {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    pub fn clear_selection_listener(&self) {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Records ordered most recent first, ties broken by name.
    pub fn list_ordered(&self) -> Vec<Record<P>> {
        self.read().ordered()
    }

    pub fn names(&self) -> Vec<String> {
        self.read()
            .ordered()
            .into_iter()
            .map(|record| record.name)
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Record<P>> {
        self.read().get(name).cloned()
    }

    pub fn current(&self) -> Option<Record<P>> {
        self.read().current().cloned()
    }

    pub fn current_name(&self) -> Option<String> {
        self.read().current_name().map(str::to_string)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().get(name).is_some()
    }

    /// Position of `name` in [`list_ordered`](Self::list_ordered).
    pub fn sorted_position(&self, name: &str) -> Option<usize> {
        self.read().sorted_position(name)
    }

    pub fn get_by_timestamp(&self, at: Timestamp) -> Option<Record<P>> {
        self.read().find_at(at).cloned()
    }

    pub fn most_recent(&self) -> Option<String> {
        self.read().most_recent().map(str::to_string)
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Selects `name`. Every successful switch notifies the selection
    /// listener, including a switch to the record already selected.
    pub fn switch_to(&self, name: &str) -> bool {
        let (selected, _) =
            self.mutate_then_notify(|state| state.select(name), |selected: &Result<()>| selected.is_ok());
        match selected {
            Ok(()) => {
                debug!(kind = P::KIND, name, "switched selection");
                true
            }
            Err(err) => {
                warn!(kind = P::KIND, error = %err, "cannot switch selection");
                false
            }
        }
    }

    pub fn select_most_recent(&self) -> Option<String> {
        self.mutate(|state| state.select_most_recent()).0
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Adds a record named after `hint` (made unique with a " (n)" suffix),
    /// selects it and queues its save. Returns the final name.
    pub async fn create(&self, hint: &str) -> String {
        let now = self.now();
        let (record, revision) = self.mutate(|state| state.create(hint, P::blank(), now));
        debug!(kind = P::KIND, name = %record.name, "created record");
        let name = record.name.clone();
        self.dispatch(PersistOp::Save(record), revision).await;
        name
    }

    pub async fn try_rename(&self, old: &str, new: &str) -> Result<Record<P>> {
        let now = self.now();
        let (renamed, revision) = self.mutate(|state| state.rename(old, new, now));
        let renamed = renamed?;
        let record = renamed.record.clone();

        let op = if renamed.name_changed() {
            debug!(kind = P::KIND, from = old, to = new, "renamed record");
            PersistOp::Rename {
                record: renamed.record,
                previous_name: renamed.previous_name,
            }
        } else {
            PersistOp::Save(renamed.record)
        };
        self.dispatch(op, revision).await;
        Ok(record)
    }

    /// Renames `old` to `new`; false if `old` is unknown or `new` is invalid or taken.
    pub async fn rename(&self, old: &str, new: &str) -> bool {
        match self.try_rename(old, new).await {
            Ok(_) => true,
            Err(err) => {
                warn!(kind = P::KIND, error = %err, "rename rejected");
                false
            }
        }
    }

    pub async fn try_delete(&self, name: &str) -> Result<()> {
        let now = self.now();
        let (deleted, revision) = self.mutate(|state| state.delete(name, now));
        let deleted = deleted?;
        debug!(kind = P::KIND, name, "deleted record");

        self.dispatch(
            PersistOp::Delete {
                name: deleted.removed.name,
                companions: true,
            },
            revision,
        )
        .await;
        if let Some(seeded) = deleted.seeded {
            info!(kind = P::KIND, name = %seeded.name, "store emptied, created default");
            self.dispatch(PersistOp::Save(seeded), revision).await;
        }
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> bool {
        match self.try_delete(name).await {
            Ok(()) => true,
            Err(err) => {
                warn!(kind = P::KIND, error = %err, "delete rejected");
                false
            }
        }
    }

    /// Replaces the payload of `name` in memory only. The edit stays pending
    /// until the record is saved.
    pub fn update_payload(&self, name: &str, payload: P) -> bool {
        let now = self.now();
        self.mutate(|state| state.update_payload(name, payload, now))
            .0
            .is_ok()
    }

    /// Refreshes the timestamp of `name` and queues a save.
    pub async fn touch(&self, name: &str) -> bool {
        self.edit(name, |_| {}).await.is_ok()
    }

    /// Applies `f` to the payload of `name`, refreshes its timestamp and queues a save.
    pub async fn edit<F>(&self, name: &str, f: F) -> Result<PersistTicket>
    where
        F: FnOnce(&mut P) + Send,
    {
        let now = self.now();
        let (record, revision) = self.mutate(|state| state.modify(name, now, f));
        self.queue.submit(PersistOp::Save(record?), revision).await
    }

    /// Like [`edit`](Self::edit) for whichever record is selected.
    pub async fn edit_current<F>(&self, f: F) -> Result<PersistTicket>
    where
        F: FnOnce(&mut P) + Send,
    {
        let now = self.now();
        let (record, revision) = self.mutate(|state| {
            let name = state
                .current_name()
                .map(str::to_string)
                .ok_or_else(|| StoreError::NotFound("<current>".to_string()))?;
            state.modify(&name, now, f)
        });
        self.queue.submit(PersistOp::Save(record?), revision).await
    }

    /// Restores the selected record's payload to what was last persisted.
    pub fn revert_current(&self) -> bool {
        self.mutate(|state| state.revert_current()).0.is_some()
    }

    /// Copies the selected record's payload into a new record named `new_name`
    /// and waits for it to reach disk. The copy is removed again if the save fails.
    pub async fn duplicate_current(&self, new_name: &str) -> Result<Record<P>> {
        let now = self.now();
        let (copied, revision) = self.mutate(|state| {
            let payload = state
                .current()
                .map(|record| record.payload.clone())
                .ok_or_else(|| StoreError::NotFound("<current>".to_string()))?;
            state.insert_named(new_name, payload, now)
        });
        let record = copied?;

        let saved = match self.queue.submit(PersistOp::Save(record.clone()), revision).await {
            Ok(ticket) => ticket.wait().await,
            Err(err) => Err(err),
        };
        if let Err(err) = saved {
            warn!(kind = P::KIND, name = new_name, error = %err, "copy not saved, rolling back");
            self.roll_back_copy(record.id, now).await;
            return Err(err);
        }
        info!(kind = P::KIND, name = new_name, "copied current record");
        Ok(record)
    }

    /// Removes the record with `id`, wherever a concurrent rename has taken it.
    async fn roll_back_copy(&self, id: u64, now: Timestamp) {
        let (rolled_back, revision) = self.mutate(|state| {
            let name = state.get_by_id(id).map(|record| record.name.clone())?;
            Some(state.delete(&name, now))
        });
        match rolled_back {
            None => debug!(kind = P::KIND, id, "copy already gone, nothing to roll back"),
            Some(Err(err)) => warn!(kind = P::KIND, id, error = %err, "copy rollback failed"),
            Some(Ok(deleted)) => {
                self.dispatch(
                    PersistOp::Delete {
                        name: deleted.removed.name,
                        companions: true,
                    },
                    revision,
                )
                .await;
                if let Some(seeded) = deleted.seeded {
                    self.dispatch(PersistOp::Save(seeded), revision).await;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// True when the selected record differs from its last persisted payload.
    pub fn has_unsaved_changes(&self) -> bool {
        self.read().has_unsaved_changes()
    }

    /// Queues a save of `name` as it is now.
    pub async fn persist(&self, name: &str) -> Result<PersistTicket> {
        let (record, revision) = {
            let state = self.read();
            (state.get(name).cloned(), state.revision())
        };
        let record = record.ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        self.queue.submit(PersistOp::Save(record), revision).await
    }

    /// Saves `name` and waits for the write to finish.
    pub async fn save(&self, name: &str) -> Result<()> {
        self.persist(name).await?.wait().await
    }

    pub async fn save_current(&self) -> Result<()> {
        let (record, revision) = {
            let state = self.read();
            (state.current().cloned(), state.revision())
        };
        let record = record.ok_or_else(|| StoreError::NotFound("<current>".to_string()))?;
        self.queue
            .submit(PersistOp::Save(record), revision)
            .await?
            .wait()
            .await
    }

    /// Waits until every job queued so far has been processed.
    pub async fn flush(&self) -> Result<()> {
        self.queue.flush().await
    }

    /// Replaces the in-memory state with what the gateway currently holds.
    /// Selection and job bindings survive by name. Returns the number of records loaded.
    pub async fn reload(&self) -> Result<usize> {
        self.flush().await?;
        let records = self.gateway.load_all().await?;
        Ok(self.hydrate(records).await)
    }

    pub fn persist_stats(&self) -> PersistStats {
        self.queue.stats()
    }

    /// Writes `name` as standalone JSON to `path`, outside the store directory.
    pub async fn export(&self, name: &str, path: &Path) -> Result<()> {
        let record = self
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        export_record(&record, path).await
    }

    /// Drains the queue and stops the worker. Later mutations stay in memory only.
    pub async fn shutdown(&self) -> Result<()> {
        self.queue.shutdown().await
    }

    // ------------------------------------------------------------------
    // Artifact paths
    // ------------------------------------------------------------------

    pub fn record_path(&self, name: &str) -> Option<PathBuf> {
        if !self.contains(name) {
            return None;
        }
        self.gateway.record_path(name)
    }

    pub fn current_record_path(&self) -> Option<PathBuf> {
        let name = self.current_name()?;
        self.gateway.record_path(&name)
    }

    /// Where an external component keeps per-model state for `name`.
    pub fn companion_path(&self, name: &str, model: &str, variant: &str) -> Option<PathBuf> {
        if !self.contains(name) {
            return None;
        }
        self.gateway.companion_path(name, model, variant)
    }

    // ------------------------------------------------------------------
    // Job correlation
    // ------------------------------------------------------------------

    /// Binds an external job to the selected record.
    pub fn set_current_job_id(&self, job: JobId) -> bool {
        self.write().assign_current_job(job)
    }

    pub fn remove_job_id(&self, job: JobId) -> bool {
        self.write().release_job(job)
    }

    pub fn current_job_id(&self) -> Option<JobId> {
        self.read().current_job()
    }

    pub fn job_id(&self, name: &str) -> Option<JobId> {
        self.read().job_for(name)
    }

    pub fn job_id_at(&self, slot: usize) -> Option<JobId> {
        self.read().job_at(slot)
    }

    pub fn name_by_job_id(&self, job: JobId) -> Option<String> {
        self.read().name_for_job(job).map(str::to_string)
    }

    pub fn verify_invariants(&self) -> std::result::Result<(), String> {
        self.read().verify()
    }
}
