// Document store abstraction: key-addressed JSON documents with per-document
// versions and a change log that drives subscriptions.

pub mod feed;
pub mod sqlite;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use feed::ChangeFeed;
pub use sqlite::SqliteStore;

/// Top-level fields of a document.
pub type Fields = Map<String, Value>;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid document path `{path}`: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document already exists: {0}")]
    AlreadyExists(String),

    #[error("version conflict on {path}: expected version {expected}")]
    Conflict { path: String, expected: u64 },

    #[error("failed to encode document {path}: {source}")]
    Encode {
        path: String,
        source: serde_json::Error,
    },

    #[error("failed to decode document {path}: {source}")]
    Decode {
        path: String,
        source: serde_json::Error,
    },

    #[error("corrupt stored value in {path}: {message}")]
    Corrupt { path: String, message: String },

    #[error("document store backend error: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("document store task failed: {0}")]
    Task(String),
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Path of a single document: alternating collection and document ids,
/// e.g. `drafts/abc` or `drafts/abc/pages/public`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    path: String,
    split: usize,
}

impl DocPath {
    /// Parse a slash-separated document path.
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        let segments: Vec<&str> = path.split('/').collect();
        Self::from_segments(&segments).map_err(|_| StoreError::InvalidPath {
            path: path.to_string(),
            reason: Self::describe_problem(&segments),
        })
    }

    /// Build a path from its segments. Each segment must be non-empty and
    /// free of `/`, and the segments must pair up as collection/id.
    pub fn from_segments(segments: &[&str]) -> Result<Self, StoreError> {
        let joined = segments.join("/");
        if segments.iter().any(|s| s.is_empty() || s.contains('/'))
            || segments.is_empty()
            || segments.len() % 2 != 0
        {
            return Err(StoreError::InvalidPath {
                reason: Self::describe_problem(segments),
                path: joined,
            });
        }
        let split = joined.rfind('/').unwrap_or(0);
        Ok(Self {
            path: joined,
            split,
        })
    }

    fn describe_problem(segments: &[&str]) -> &'static str {
        if segments.iter().any(|s| s.is_empty()) {
            "empty segment"
        } else if segments.iter().any(|s| s.contains('/')) {
            "segment contains `/`"
        } else {
            "document paths need collection/id pairs"
        }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Path of the collection containing this document.
    pub fn collection(&self) -> &str {
        &self.path[..self.split]
    }

    /// The document's id within its collection.
    pub fn id(&self) -> &str {
        &self.path[self.split + 1..]
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

// ---------------------------------------------------------------------------
// Documents and changes
// ---------------------------------------------------------------------------

/// A stored document with its envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocPath,
    pub fields: Fields,
    /// 1 on create, incremented on every write.
    pub version: u64,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Document {
    /// Decode the document's fields into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|source| {
            StoreError::Decode {
                path: self.path.to_string(),
                source,
            }
        })
    }
}

/// Condition a write must satisfy to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Apply unconditionally.
    None,
    /// The document must not exist yet.
    Missing,
    /// The document must exist at exactly this version.
    Version(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(ChangeKind::Created),
            "updated" => Some(ChangeKind::Updated),
            "deleted" => Some(ChangeKind::Deleted),
            _ => None,
        }
    }
}

/// A change notification for one document write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Position in the store's change log; strictly increasing.
    pub seq: u64,
    pub kind: ChangeKind,
    /// Fully-qualified resource name of the changed document,
    /// see [`resource_name`].
    pub resource: String,
    /// Document version after the write (last version for deletes).
    pub version: u64,
    pub time: DateTime<Utc>,
}

const DOCUMENTS_MARKER: &str = "/documents/";

/// Fully-qualified resource name for a document in `project`.
pub fn resource_name(project_id: &str, path: &DocPath) -> String {
    format!("projects/{project_id}/databases/(default)/documents/{path}")
}

/// The document path portion of a resource name, if it has one.
pub fn relative_path(resource: &str) -> Option<&str> {
    let idx = resource.find(DOCUMENTS_MARKER)?;
    let rel = &resource[idx + DOCUMENTS_MARKER.len()..];
    (!rel.is_empty()).then_some(rel)
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// A key-addressed document store. Calls are blocking; every call is
/// independently fallible and none is retried.
pub trait DocumentStore: Send + Sync {
    fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

    /// Replace the document's fields entirely, creating it if needed.
    fn set(
        &self,
        path: &DocPath,
        fields: Fields,
        precondition: Precondition,
    ) -> Result<Document, StoreError>;

    /// Merge `fields` into an existing document's top-level fields. Fields set
    /// to `null` are removed.
    fn update(
        &self,
        path: &DocPath,
        fields: Fields,
        precondition: Precondition,
    ) -> Result<Document, StoreError>;

    /// Delete a document. Returns `false` if it did not exist.
    fn delete(&self, path: &DocPath) -> Result<bool, StoreError>;

    /// All documents directly inside `collection`, ordered by id.
    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Change events for documents directly inside `collection` with
    /// `seq > after`, oldest first, at most `limit`.
    fn changes_since(
        &self,
        collection: &str,
        after: u64,
        limit: usize,
    ) -> Result<Vec<ChangeEvent>, StoreError>;

    /// Sequence number of the most recent change (0 if none). Never goes
    /// backwards, even after compaction.
    fn latest_seq(&self) -> Result<u64, StoreError>;

    /// Last sequence number `consumer` recorded as handled.
    fn load_cursor(&self, consumer: &str) -> Result<Option<u64>, StoreError>;

    /// Record that `consumer` has handled every change up to `seq`.
    fn save_cursor(&self, consumer: &str, seq: u64) -> Result<(), StoreError>;

    /// Drop change-log entries that every recorded consumer has handled and
    /// return how many were removed. Without any recorded consumer nothing is
    /// removed.
    fn compact_changes(&self) -> Result<usize, StoreError>;
}

/// Run a blocking store call on the blocking thread pool so it cannot stall
/// the async runtime (a write may wait on SQLite's busy timeout).
pub async fn run_blocking<T, F>(store: &Arc<dyn DocumentStore>, call: F) -> Result<T, StoreError>
where
    F: FnOnce(&dyn DocumentStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || call(store.as_ref()))
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

/// Typed helpers over any [`DocumentStore`].
pub trait DocumentStoreExt: DocumentStore {
    /// Fetch and decode a document.
    fn get_as<T: DeserializeOwned>(&self, path: &DocPath) -> Result<Option<(T, u64)>, StoreError> {
        match self.get(path)? {
            Some(doc) => Ok(Some((doc.decode()?, doc.version))),
            None => Ok(None),
        }
    }

    /// Create a document from a serializable value; fails if it exists.
    fn create_from<T: Serialize>(&self, path: &DocPath, value: &T) -> Result<Document, StoreError> {
        self.set(path, to_fields(path, value)?, Precondition::Missing)
    }

    /// Overwrite a document from a serializable value.
    fn set_from<T: Serialize>(
        &self,
        path: &DocPath,
        value: &T,
        precondition: Precondition,
    ) -> Result<Document, StoreError> {
        self.set(path, to_fields(path, value)?, precondition)
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

/// Serialize `value` into top-level document fields. Only values that
/// serialize to a JSON object are valid documents.
pub fn to_fields<T: Serialize>(path: &DocPath, value: &T) -> Result<Fields, StoreError> {
    let encoded = serde_json::to_value(value).map_err(|source| StoreError::Encode {
        path: path.to_string(),
        source,
    })?;
    match encoded {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Corrupt {
            path: path.to_string(),
            message: format!("document must be a JSON object, got {other}"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
