pub mod job_table;
pub mod name_index;
pub mod recency_index;
pub mod selection;
pub mod state;

pub use job_table::JobTable;
pub use name_index::NameIndex;
pub use recency_index::{RecencyIndex, RecencyKey};
pub use selection::{CursorShift, SelectionCursor};
pub use state::{Deleted, Hydration, Renamed, StoreState};
