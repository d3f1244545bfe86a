pub mod file;
pub mod gateway;
pub mod memory;
pub mod queue;

pub use file::{FileGateway, atomic_write, export_record};
pub use gateway::{NullGateway, PersistenceGateway};
pub use memory::MemoryGateway;
pub use queue::{PersistOp, PersistQueue, PersistStats, PersistTicket, RetryPolicy, SavedHook};
