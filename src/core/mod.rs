pub mod clock;
pub mod error;
pub mod naming;
pub mod types;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use error::{Result, StoreError};
pub use types::{JobId, Record, RecordPayload, Timestamp};
