use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix time in whole seconds.
pub type Timestamp = i64;

/// Opaque identifier handed out by an external job runner (e.g. an inference engine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// Payload stored inside a [`Record`].
///
/// Implemented once per record kind (chat histories, model presets). The
/// associated constants drive file naming and the record that is synthesized
/// whenever a store would otherwise become empty.
pub trait RecordPayload:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Short label used in log output.
    const KIND: &'static str;

    /// File extension (without the dot) of persisted records.
    const FILE_EXTENSION: &'static str;

    /// Name given to the synthesized default record.
    const DEFAULT_NAME: &'static str;

    /// Payload of a record made through `create`.
    fn blank() -> Self;

    /// Payload of the synthesized default record.
    fn seed() -> Self {
        Self::blank()
    }
}

/// One named, timestamped unit of state.
///
/// `slot` is the record's position in the backing sequence at the time the
/// copy was taken. It is not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record<P> {
    #[serde(skip)]
    pub slot: usize,
    pub id: u64,
    pub last_modified: Timestamp,
    pub name: String,
    pub payload: P,
}

impl<P> Record<P> {
    pub fn new(id: u64, name: impl Into<String>, last_modified: Timestamp, payload: P) -> Self {
        Self {
            slot: 0,
            id,
            last_modified,
            name: name.into(),
            payload,
        }
    }
}
