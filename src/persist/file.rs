//! One JSON file per record, named after the record's storage key.

use super::PersistenceGateway;
use crate::core::naming::storage_key;
use crate::core::{Record, RecordPayload, Result, StoreError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const COMPANION_EXTENSION: &str = "bin";

pub struct FileGateway<P> {
    root: PathBuf,
    _payload: PhantomData<fn() -> P>,
}

impl<P: RecordPayload> FileGateway<P> {
    /// Opens (creating if needed) the record directory at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await.map_err(|err| {
            StoreError::Io(format!(
                "Failed to create record directory '{}': {}",
                root.display(),
                err
            ))
        })?;
        Ok(Self {
            root,
            _payload: PhantomData,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", storage_key(name), P::FILE_EXTENSION))
    }

    async fn read_record(path: &Path) -> Result<Record<P>> {
        let bytes = fs::read(path).await?;
        serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt {
            path: path.display().to_string(),
            reason: err.to_string(),
        })
    }

    /// Companion files of `name`, as (file name, suffix after the key) pairs.
    async fn companions_of(&self, name: &str) -> Result<Vec<(PathBuf, String)>> {
        let prefix = format!("{}@", storage_key(name));
        let mut found = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(COMPANION_EXTENSION) {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(rest) = file_name.strip_prefix(&prefix) {
                let rest = rest.to_string();
                found.push((path, rest));
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl<P: RecordPayload> PersistenceGateway<P> for FileGateway<P> {
    async fn load_all(&self) -> Result<Vec<Record<P>>> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(P::FILE_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            match Self::read_record(&path).await {
                Ok(record) => records.push(record),
                Err(err) => warn!("skipping unreadable {} file: {}", P::KIND, err),
            }
        }
        debug!(
            "loaded {} {} records from '{}'",
            records.len(),
            P::KIND,
            self.root.display()
        );
        Ok(records)
    }

    async fn save(&self, record: &Record<P>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        atomic_write(&self.path_for(&record.name), &bytes).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        remove_if_present(&self.path_for(name)).await
    }

    async fn delete_companions(&self, name: &str) -> Result<()> {
        for (path, _) in self.companions_of(name).await? {
            remove_if_present(&path).await?;
        }
        Ok(())
    }

    async fn migrate_companions(&self, old: &str, new: &str) -> Result<()> {
        let new_key = storage_key(new);
        for (path, rest) in self.companions_of(old).await? {
            let target = self.root.join(format!("{}@{}", new_key, rest));
            match fs::rename(&path, &target).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(StoreError::Io(format!(
                        "Failed to move companion '{}' -> '{}': {}",
                        path.display(),
                        target.display(),
                        err
                    )));
                }
            }
        }
        Ok(())
    }

    fn record_path(&self, name: &str) -> Option<PathBuf> {
        Some(self.path_for(name))
    }

    fn companion_path(&self, name: &str, model: &str, variant: &str) -> Option<PathBuf> {
        Some(self.root.join(format!(
            "{}@{}{}.{}",
            storage_key(name),
            path_safe(model),
            path_safe(variant),
            COMPANION_EXTENSION
        )))
    }
}

fn path_safe(component: &str) -> String {
    component
        .chars()
        .map(|c| if c.is_control() || "<>:\"/\\|?*".contains(c) { '-' } else { c })
        .collect()
}

/// Writes `bytes` next to `path` and renames over it, so readers never see a torn file.
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|err| {
            StoreError::Io(format!(
                "Failed to create parent directory '{}': {}",
                parent.display(),
                err
            ))
        })?;
    }

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).await.map_err(|err| {
        StoreError::Io(format!(
            "Failed to write temp file '{}': {}",
            tmp.display(),
            err
        ))
    })?;

    fs::rename(&tmp, path).await.map_err(|err| {
        StoreError::Io(format!(
            "Failed to rename temp file '{}' -> '{}': {}",
            tmp.display(),
            path.display(),
            err
        ))
    })?;
    Ok(())
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StoreError::Io(format!(
            "Failed to delete '{}': {}",
            path.display(),
            err
        ))),
    }
}

/// Writes a single record as pretty JSON to an arbitrary path.
pub async fn export_record<P: RecordPayload>(record: &Record<P>, path: &Path) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(record)?;
    atomic_write(path, &bytes).await
}
