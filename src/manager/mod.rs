pub mod listener;
pub mod record_manager;

pub use listener::{SelectionListener, SelectionLog};
pub use record_manager::RecordManager;
