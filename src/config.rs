use crate::persist::RetryPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the workspace root.
pub const DATA_DIR_ENV: &str = "RECORDKEEPER_DATA_DIR";

/// Settings of a single record store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Directory holding one file per record
    pub data_dir: PathBuf,

    /// Jobs the persistence queue buffers before submitters wait
    pub queue_capacity: usize,

    /// Attempts per persistence step, including the first
    pub max_attempts: u32,

    /// Delay before the first retry; later retries wait proportionally longer
    pub retry_backoff: Duration,

    /// Create `data_dir` when missing
    pub create_dir: bool,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            queue_capacity: 256,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(50),
            create_dir: true,
        }
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn create_dir(mut self, create: bool) -> Self {
        self.create_dir = create;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.retry_backoff,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.data_dir.as_os_str().is_empty() {
            return Err("data_dir must not be empty".to_string());
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be > 0".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("data")
    }
}

/// Settings of a [`Workspace`](crate::Workspace): one root, one sub-directory per store.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
    pub chat_dir: String,
    pub preset_dir: String,
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl WorkspaceConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let defaults = StoreConfig::default();
        Self {
            root: root.into(),
            chat_dir: "chat".to_string(),
            preset_dir: "presets".to_string(),
            queue_capacity: defaults.queue_capacity,
            max_attempts: defaults.max_attempts,
            retry_backoff: defaults.retry_backoff,
        }
    }

    /// Uses `RECORDKEEPER_DATA_DIR` when set, `./data` otherwise.
    pub fn from_env() -> Self {
        match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) if !dir.is_empty() => Self::new(dir),
            _ => Self::default(),
        }
    }

    pub fn chat_dir(mut self, dir: &str) -> Self {
        self.chat_dir = dir.to_string();
        self
    }

    pub fn preset_dir(mut self, dir: &str) -> Self {
        self.preset_dir = dir.to_string();
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chat_store(&self) -> StoreConfig {
        self.store(&self.chat_dir)
    }

    pub fn preset_store(&self) -> StoreConfig {
        self.store(&self.preset_dir)
    }

    fn store(&self, sub_dir: &str) -> StoreConfig {
        StoreConfig::new(self.root.join(sub_dir))
            .queue_capacity(self.queue_capacity)
            .max_attempts(self.max_attempts)
            .retry_backoff(self.retry_backoff)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.chat_dir.is_empty() || self.preset_dir.is_empty() {
            return Err("store directories must not be empty".to_string());
        }
        if self.chat_dir == self.preset_dir {
            return Err("chat and preset stores need separate directories".to_string());
        }
        self.chat_store().validate()?;
        self.preset_store().validate()
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self::new("data")
    }
}
