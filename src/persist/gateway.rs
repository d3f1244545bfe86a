use crate::core::{Record, RecordPayload, Result};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::path::PathBuf;

/// Durable storage behind a record store.
///
/// Implementations are addressed by record *name*; how a name maps onto an
/// artifact is theirs to decide. Every method may be called concurrently for
/// different names, never for the same name.
#[async_trait]
pub trait PersistenceGateway<P: RecordPayload>: Send + Sync {
    /// Loads every record that parses. Unreadable entries are skipped with a warning.
    async fn load_all(&self) -> Result<Vec<Record<P>>>;

    async fn save(&self, record: &Record<P>) -> Result<()>;

    /// Removes the primary artifact of `name`. A missing artifact is not an error.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Removes companion artifacts keyed by `name`.
    async fn delete_companions(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    /// Re-keys companion artifacts from `old` to `new`.
    async fn migrate_companions(&self, _old: &str, _new: &str) -> Result<()> {
        Ok(())
    }

    fn record_path(&self, _name: &str) -> Option<PathBuf> {
        None
    }

    fn companion_path(&self, _name: &str, _model: &str, _variant: &str) -> Option<PathBuf> {
        None
    }

    /// False for gateways that silently drop writes.
    fn is_durable(&self) -> bool {
        true
    }
}

/// Gateway of the degraded, non-persistent mode: loads nothing, accepts and discards writes.
#[derive(Debug)]
pub struct NullGateway<P> {
    _payload: PhantomData<fn() -> P>,
}

impl<P> NullGateway<P> {
    pub fn new() -> Self {
        Self {
            _payload: PhantomData,
        }
    }
}

impl<P> Default for NullGateway<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<P: RecordPayload> PersistenceGateway<P> for NullGateway<P> {
    async fn load_all(&self) -> Result<Vec<Record<P>>> {
        Ok(Vec::new())
    }

    async fn save(&self, _record: &Record<P>) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}
