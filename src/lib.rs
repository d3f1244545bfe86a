// ============================================================================
// recordkeeper library
// ============================================================================

//! Concurrent, indexed record stores with asynchronous best-effort file persistence.
//!
//! A [`RecordManager`] keeps a collection of named, timestamped records in
//! memory with two indices (by name, and by recency) plus a selection cursor,
//! all guarded by a single lock. Every mutation finishes in memory first and
//! is then queued for a background worker that writes one JSON file per
//! record. Reads never wait on disk.
//!
//! ```no_run
//! use recordkeeper::{ChatManager, Message, StoreConfig};
//!
//! # async fn demo() -> recordkeeper::Result<()> {
//! let chats = ChatManager::open(StoreConfig::new("data/chat")).await?;
//! let name = chats.create("Trip planning").await;
//! chats.append_to_current(Message::user("Where should we go?")).await;
//! chats.save(&name).await?;
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod config;
pub mod core;
pub mod manager;
pub mod persist;
pub mod preset;
pub mod storage;
pub mod workspace;

pub use chat::{ChatManager, ChatPayload, Message, Role};
pub use config::{StoreConfig, WorkspaceConfig};
pub use core::{Clock, JobId, Record, RecordPayload, Result, StoreError, SystemClock, Timestamp};
#[cfg(feature = "test-util")]
pub use core::ManualClock;
pub use manager::{RecordManager, SelectionListener, SelectionLog};
pub use persist::{
    FileGateway, MemoryGateway, NullGateway, PersistStats, PersistTicket, PersistenceGateway,
};
pub use preset::{PresetManager, PresetPayload};
pub use workspace::Workspace;
