use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// One step of a feed: the next raw item, the end of the current query in a
/// multi-query request, or the end of the data altogether.
#[derive(Debug)]
pub enum Step<T> {
    Item(T),
    EndOfQuery,
    EndOfData,
}

/// A raw row as produced by a view or find query.
///
/// Payloads are carried as raw JSON and decoded on demand by the client.
/// `error` is a per-row error (e.g. a view row that failed to compute);
/// row-level errors do not terminate the feed.
#[derive(Debug, Default)]
pub struct Row {
    pub id: String,
    pub rev: Option<String>,
    pub key: Option<Box<RawValue>>,
    pub value: Option<Box<RawValue>>,
    pub doc: Option<Box<RawValue>>,
    pub error: Option<Error>,
}

/// A single entry from a changes feed.
#[derive(Debug, Default)]
pub struct Change {
    pub id: String,
    pub seq: Option<String>,
    pub deleted: bool,
    /// Revisions changed by this event.
    pub changes: Vec<String>,
    /// The changed document, when the feed was opened with `include_docs`.
    pub doc: Option<Box<RawValue>>,
}

/// A single entry from the server-wide database updates feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DbUpdate {
    pub db_name: String,
    /// One of "created", "updated", or "deleted".
    #[serde(rename = "type")]
    pub kind: String,
    pub seq: Option<String>,
}

/// Version and vendor information reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Version {
    pub version: String,
    pub vendor: String,
}
