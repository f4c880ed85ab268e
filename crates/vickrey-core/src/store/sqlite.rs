// SQLite-backed document store.
//
// Documents live in one table keyed by path; every write also appends a row
// to the `changes` log, which is what subscribers poll. Subscribers record
// their position in `cursors`, and rows below the lowest cursor can be
// compacted away. Writes run inside
// IMMEDIATE transactions so precondition checks and the write are atomic even
// when several processes share the database file.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use super::{
    resource_name, ChangeEvent, ChangeKind, DocPath, Document, DocumentStore, Fields,
    Precondition, StoreError,
};

/// Document store persisted in a SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    project_id: String,
}

impl SqliteStore {
    /// Open (or create) the store at `path` and ensure the schema exists.
    /// Pass `":memory:"` for an ephemeral store (useful for tests).
    pub fn open(path: &str, project_id: impl Into<String>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                path        TEXT PRIMARY KEY,
                collection  TEXT NOT NULL,
                data        TEXT NOT NULL,
                version     INTEGER NOT NULL,
                create_time TEXT NOT NULL,
                update_time TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);

            CREATE TABLE IF NOT EXISTS changes (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                path       TEXT NOT NULL,
                collection TEXT NOT NULL,
                kind       TEXT NOT NULL,
                version    INTEGER NOT NULL,
                time       TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_changes_collection ON changes(collection, seq);

            CREATE TABLE IF NOT EXISTS cursors (
                consumer   TEXT PRIMARY KEY,
                seq        INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            project_id: project_id.into(),
        })
    }

    /// An in-memory store, discarded on drop.
    pub fn open_in_memory(project_id: impl Into<String>) -> Result<Self, StoreError> {
        Self::open(":memory:", project_id)
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Acquire the connection. A poisoned lock only means another thread
    /// panicked mid-call; SQLite itself rolled back, so keep going.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(
        &self,
        path: &DocPath,
        precondition: Precondition,
        build: impl FnOnce(Option<&Document>) -> Result<Fields, StoreError>,
    ) -> Result<Document, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = read_document(&tx, path)?;
        check_precondition(path, existing.as_ref(), precondition)?;
        let fields = build(existing.as_ref())?;

        let now = Utc::now();
        let version = existing.as_ref().map_or(1, |d| d.version + 1);
        let create_time = existing.as_ref().map_or(now, |d| d.create_time);
        let kind = if existing.is_some() {
            ChangeKind::Updated
        } else {
            ChangeKind::Created
        };
        let data = serde_json::to_string(&fields).map_err(|source| StoreError::Encode {
            path: path.to_string(),
            source,
        })?;

        tx.execute(
            "INSERT INTO documents (path, collection, data, version, create_time, update_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(path) DO UPDATE SET
                data        = excluded.data,
                version     = excluded.version,
                update_time = excluded.update_time",
            params![
                path.as_str(),
                path.collection(),
                data,
                to_sql_int(version),
                format_time(create_time),
                format_time(now),
            ],
        )?;
        append_change(&tx, path, kind, version, now)?;
        tx.commit()?;

        debug!(path = %path, version, kind = kind.as_str(), "document written");

        Ok(Document {
            path: path.clone(),
            fields,
            version,
            create_time,
            update_time: now,
        })
    }
}

impl DocumentStore for SqliteStore {
    fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let conn = self.conn();
        read_document(&conn, path)
    }

    fn set(
        &self,
        path: &DocPath,
        fields: Fields,
        precondition: Precondition,
    ) -> Result<Document, StoreError> {
        self.write(path, precondition, |_| Ok(fields))
    }

    fn update(
        &self,
        path: &DocPath,
        fields: Fields,
        precondition: Precondition,
    ) -> Result<Document, StoreError> {
        self.write(path, precondition, |existing| {
            let Some(existing) = existing else {
                return Err(StoreError::NotFound(path.to_string()));
            };
            let mut merged = existing.fields.clone();
            for (key, value) in fields {
                if value.is_null() {
                    merged.remove(&key);
                } else {
                    merged.insert(key, value);
                }
            }
            Ok(merged)
        })
    }

    fn delete(&self, path: &DocPath) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(existing) = read_document(&tx, path)? else {
            return Ok(false);
        };
        tx.execute(
            "DELETE FROM documents WHERE path = ?1",
            params![path.as_str()],
        )?;
        append_change(&tx, path, ChangeKind::Deleted, existing.version, Utc::now())?;
        tx.commit()?;

        debug!(path = %path, "document deleted");
        Ok(true)
    }

    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT path, data, version, create_time, update_time
             FROM documents WHERE collection = ?1 ORDER BY path",
        )?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok(RawDocument {
                    path: row.get(0)?,
                    data: row.get(1)?,
                    version: row.get(2)?,
                    create_time: row.get(3)?,
                    update_time: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|raw| {
                let path = DocPath::parse(&raw.path)?;
                raw.into_document(path)
            })
            .collect()
    }

    fn changes_since(
        &self,
        collection: &str,
        after: u64,
        limit: usize,
    ) -> Result<Vec<ChangeEvent>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT seq, path, kind, version, time
             FROM changes WHERE collection = ?1 AND seq > ?2
             ORDER BY seq LIMIT ?3",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![collection, to_sql_int(after), limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(seq, path, kind, version, time)| {
                let doc_path = DocPath::parse(&path)?;
                let kind = ChangeKind::parse(&kind).ok_or_else(|| StoreError::Corrupt {
                    path: path.clone(),
                    message: format!("unknown change kind `{kind}`"),
                })?;
                Ok(ChangeEvent {
                    seq: from_sql_int(seq),
                    kind,
                    resource: resource_name(&self.project_id, &doc_path),
                    version: from_sql_int(version),
                    time: parse_time(&path, &time)?,
                })
            })
            .collect()
    }

    fn latest_seq(&self) -> Result<u64, StoreError> {
        let conn = self.conn();
        // AUTOINCREMENT keeps the high-water mark in sqlite_sequence, which
        // survives compaction of the rows themselves.
        let seq: i64 = conn.query_row(
            "SELECT COALESCE((SELECT seq FROM sqlite_sequence WHERE name = 'changes'), 0)",
            [],
            |row| row.get(0),
        )?;
        Ok(from_sql_int(seq))
    }

    fn load_cursor(&self, consumer: &str) -> Result<Option<u64>, StoreError> {
        let conn = self.conn();
        let seq: Option<i64> = conn
            .query_row(
                "SELECT seq FROM cursors WHERE consumer = ?1",
                params![consumer],
                |row| row.get(0),
            )
            .optional()?;
        Ok(seq.map(from_sql_int))
    }

    fn save_cursor(&self, consumer: &str, seq: u64) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO cursors (consumer, seq, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(consumer) DO UPDATE SET
                seq        = excluded.seq,
                updated_at = excluded.updated_at",
            params![consumer, to_sql_int(seq), format_time(Utc::now())],
        )?;
        Ok(())
    }

    fn compact_changes(&self) -> Result<usize, StoreError> {
        let conn = self.conn();
        let removed = conn.execute(
            "DELETE FROM changes WHERE seq <= (SELECT MIN(seq) FROM cursors)",
            [],
        )?;
        if removed > 0 {
            debug!(removed, "compacted change log");
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct RawDocument {
    path: String,
    data: String,
    version: i64,
    create_time: String,
    update_time: String,
}

impl RawDocument {
    fn into_document(self, path: DocPath) -> Result<Document, StoreError> {
        let fields: Fields =
            serde_json::from_str(&self.data).map_err(|e| StoreError::Corrupt {
                path: self.path.clone(),
                message: format!("invalid JSON: {e}"),
            })?;
        Ok(Document {
            fields,
            version: from_sql_int(self.version),
            create_time: parse_time(&self.path, &self.create_time)?,
            update_time: parse_time(&self.path, &self.update_time)?,
            path,
        })
    }
}

fn read_document(conn: &Connection, path: &DocPath) -> Result<Option<Document>, StoreError> {
    let raw = conn
        .query_row(
            "SELECT path, data, version, create_time, update_time
             FROM documents WHERE path = ?1",
            params![path.as_str()],
            |row| {
                Ok(RawDocument {
                    path: row.get(0)?,
                    data: row.get(1)?,
                    version: row.get(2)?,
                    create_time: row.get(3)?,
                    update_time: row.get(4)?,
                })
            },
        )
        .optional()?;

    raw.map(|raw| raw.into_document(path.clone())).transpose()
}

fn check_precondition(
    path: &DocPath,
    existing: Option<&Document>,
    precondition: Precondition,
) -> Result<(), StoreError> {
    match precondition {
        Precondition::None => Ok(()),
        Precondition::Missing => match existing {
            Some(_) => Err(StoreError::AlreadyExists(path.to_string())),
            None => Ok(()),
        },
        Precondition::Version(expected) => match existing {
            Some(doc) if doc.version == expected => Ok(()),
            _ => Err(StoreError::Conflict {
                path: path.to_string(),
                expected,
            }),
        },
    }
}

fn append_change(
    conn: &Connection,
    path: &DocPath,
    kind: ChangeKind,
    version: u64,
    time: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO changes (path, collection, kind, version, time)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            path.as_str(),
            path.collection(),
            kind.as_str(),
            to_sql_int(version),
            format_time(time),
        ],
    )?;
    Ok(())
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(path: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            path: path.to_string(),
            message: format!("invalid timestamp `{value}`: {e}"),
        })
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
