use super::PersistenceGateway;
use crate::core::naming::storage_key;
use crate::core::{Record, RecordPayload, Result, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug)]
struct MemoryInner<P> {
    records: BTreeMap<String, Record<P>>,
    companions: BTreeSet<String>,
    fail_writes: bool,
    fail_deletes: bool,
    delay: Option<Duration>,
    saves: usize,
    deletes: usize,
}

/// In-process gateway keyed by storage key, the way files are.
///
/// Clones share the same backing map, so a test can hand one clone to a
/// manager and inspect or sabotage the store through another.
#[derive(Debug)]
pub struct MemoryGateway<P> {
    inner: Arc<Mutex<MemoryInner<P>>>,
}

impl<P> Clone for MemoryGateway<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: RecordPayload> Default for MemoryGateway<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: RecordPayload> MemoryGateway<P> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryInner {
                records: BTreeMap::new(),
                companions: BTreeSet::new(),
                fail_writes: false,
                fail_deletes: false,
                delay: None,
                saves: 0,
                deletes: 0,
            })),
        }
    }

    pub fn with_records(records: impl IntoIterator<Item = Record<P>>) -> Self {
        let gateway = Self::new();
        {
            let mut inner = gateway.lock();
            for record in records {
                inner.records.insert(storage_key(&record.name), record);
            }
        }
        gateway
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner<P>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every subsequent `save` fail until switched off.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.lock().fail_deletes = fail;
    }

    /// Adds latency to every write, to keep jobs in flight.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.lock().delay = delay;
    }

    pub fn records(&self) -> Vec<Record<P>> {
        self.lock().records.values().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Record<P>> {
        self.lock()
            .records
            .get(&storage_key(name))
            .filter(|record| record.name == name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn insert(&self, record: Record<P>) {
        self.lock().records.insert(storage_key(&record.name), record);
    }

    pub fn saves(&self) -> usize {
        self.lock().saves
    }

    pub fn deletes(&self) -> usize {
        self.lock().deletes
    }

    /// Registers a companion artifact `{key}@{suffix}`.
    pub fn add_companion(&self, name: &str, suffix: &str) {
        self.lock()
            .companions
            .insert(format!("{}@{}", storage_key(name), suffix));
    }

    pub fn companions(&self) -> Vec<String> {
        self.lock().companions.iter().cloned().collect()
    }

    async fn pause(&self) {
        let delay = self.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl<P: RecordPayload> PersistenceGateway<P> for MemoryGateway<P> {
    async fn load_all(&self) -> Result<Vec<Record<P>>> {
        Ok(self.records())
    }

    async fn save(&self, record: &Record<P>) -> Result<()> {
        self.pause().await;
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(StoreError::Io(format!("injected write failure for '{}'", record.name)));
        }
        inner.saves += 1;
        inner.records.insert(storage_key(&record.name), record.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.pause().await;
        let mut inner = self.lock();
        if inner.fail_deletes {
            return Err(StoreError::Io(format!("injected delete failure for '{}'", name)));
        }
        inner.deletes += 1;
        inner.records.remove(&storage_key(name));
        Ok(())
    }

    async fn delete_companions(&self, name: &str) -> Result<()> {
        let prefix = format!("{}@", storage_key(name));
        self.lock().companions.retain(|c| !c.starts_with(&prefix));
        Ok(())
    }

    async fn migrate_companions(&self, old: &str, new: &str) -> Result<()> {
        let prefix = format!("{}@", storage_key(old));
        let new_key = storage_key(new);
        let mut inner = self.lock();
        let moved: Vec<String> = inner
            .companions
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .cloned()
            .collect();
        for companion in moved {
            inner.companions.remove(&companion);
            let rest = &companion[prefix.len()..];
            inner.companions.insert(format!("{}@{}", new_key, rest));
        }
        Ok(())
    }
}
