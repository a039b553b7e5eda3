//! SQLite backend.
//!
//! Every operation opens its own connection with a busy timeout, so the store
//! can be shared between threads and processes. Read-modify-write steps run
//! inside `BEGIN IMMEDIATE` transactions.

use crate::error::{Result, StorageError};
use crate::traits::{
    AssignmentStore, DocumentStore, MergeFn, MergeOutcome, SchemaRepository, SubjectDirectory,
};
use crate::types::{Assignment, ResponseDocument};
use chrono::{DateTime, SecondsFormat, Utc};
use intake_ids::{AssignmentId, DocumentId, SchemaId, SubjectRef};
use intake_schema::{FormSchema, ResultMap, SchemaDefinition};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Bumped whenever the table layout changes.
pub const SCHEMA_VERSION: i64 = 1;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS intake_subjects (
    subject_ref TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS intake_schemas (
    schema_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    slug TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    definition_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS intake_documents (
    document_id TEXT PRIMARY KEY,
    subject_ref TEXT NOT NULL,
    schema_id TEXT NOT NULL,
    result_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (subject_ref, schema_id)
);

CREATE TABLE IF NOT EXISTS intake_assignments (
    assignment_id TEXT PRIMARY KEY,
    subject_ref TEXT NOT NULL,
    schema_id TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    completed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (subject_ref, schema_id)
);
"#;

const DOCUMENT_COLUMNS: &str = "document_id, subject_ref, schema_id, result_json, created_at, updated_at";
const ASSIGNMENT_COLUMNS: &str =
    "assignment_id, subject_ref, schema_id, active, completed_at, created_at, updated_at";

/// SQLite-backed store implementing every store trait.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout_ms: u64,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and ensure the tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT_MS)
    }

    pub fn open_with_busy_timeout(path: impl AsRef<Path>, busy_timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self {
            path,
            busy_timeout_ms,
        };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_millis(self.busy_timeout_ms))?;
        Ok(conn)
    }

    fn init(&self) -> Result<()> {
        let conn = self.open_conn()?;
        // WAL is persistent; later connections inherit it.
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.execute_batch(CREATE_TABLES)?;
        let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if version < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        debug!(path = %self.path.display(), journal_mode = %mode, "intake store ready");
        Ok(())
    }

    fn immediate<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.open_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Make a subject known to [`SubjectDirectory::resolve`].
    pub fn register_subject(&self, subject: &SubjectRef) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO intake_subjects (subject_ref, created_at) VALUES (?1, ?2)",
            params![subject.as_str(), timestamp(Utc::now())],
        )?;
        Ok(())
    }
}

fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(table: &'static str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::corrupt(table, format!("timestamp '{}': {}", raw, e)))
}

struct DocumentRow {
    id: String,
    subject: String,
    schema_id: String,
    result_json: String,
    created_at: String,
    updated_at: String,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject: row.get(1)?,
            schema_id: row.get(2)?,
            result_json: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn decode(self) -> Result<ResponseDocument> {
        const TABLE: &str = "intake_documents";
        Ok(ResponseDocument {
            id: DocumentId::parse(&self.id).map_err(|e| StorageError::corrupt(TABLE, e.to_string()))?,
            subject: SubjectRef::parse(&self.subject).map_err(|e| StorageError::corrupt(TABLE, e.to_string()))?,
            schema_id: SchemaId::parse(&self.schema_id).map_err(|e| StorageError::corrupt(TABLE, e.to_string()))?,
            result: serde_json::from_str(&self.result_json)?,
            created_at: parse_timestamp(TABLE, &self.created_at)?,
            updated_at: parse_timestamp(TABLE, &self.updated_at)?,
        })
    }
}

struct AssignmentRow {
    id: String,
    subject: String,
    schema_id: String,
    active: bool,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl AssignmentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject: row.get(1)?,
            schema_id: row.get(2)?,
            active: row.get(3)?,
            completed_at: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn decode(self) -> Result<Assignment> {
        const TABLE: &str = "intake_assignments";
        Ok(Assignment {
            id: AssignmentId::parse(&self.id).map_err(|e| StorageError::corrupt(TABLE, e.to_string()))?,
            subject: SubjectRef::parse(&self.subject).map_err(|e| StorageError::corrupt(TABLE, e.to_string()))?,
            schema_id: SchemaId::parse(&self.schema_id).map_err(|e| StorageError::corrupt(TABLE, e.to_string()))?,
            active: self.active,
            completed_at: self
                .completed_at
                .as_deref()
                .map(|raw| parse_timestamp(TABLE, raw))
                .transpose()?,
            created_at: parse_timestamp(TABLE, &self.created_at)?,
            updated_at: parse_timestamp(TABLE, &self.updated_at)?,
        })
    }
}

fn select_document(conn: &Connection, subject: &SubjectRef, schema_id: &SchemaId) -> Result<Option<ResponseDocument>> {
    let sql = format!(
        "SELECT {} FROM intake_documents WHERE subject_ref = ?1 AND schema_id = ?2",
        DOCUMENT_COLUMNS
    );
    conn.query_row(&sql, params![subject.as_str(), schema_id.as_str()], DocumentRow::from_row)
        .optional()?
        .map(DocumentRow::decode)
        .transpose()
}

/// Insert an empty document for the pair unless one exists, then load it.
fn ensure_document(tx: &Transaction<'_>, subject: &SubjectRef, schema_id: &SchemaId) -> Result<ResponseDocument> {
    let fresh = ResponseDocument::new(subject.clone(), schema_id.clone());
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO intake_documents
            (document_id, subject_ref, schema_id, result_json, created_at, updated_at)
         VALUES (?1, ?2, ?3, '{}', ?4, ?4)",
        params![
            fresh.id.as_str(),
            subject.as_str(),
            schema_id.as_str(),
            timestamp(fresh.created_at)
        ],
    )?;
    if inserted > 0 {
        debug!(subject = %subject, schema_id = %schema_id, document_id = %fresh.id, "created document");
    }
    select_document(tx, subject, schema_id)?
        .ok_or_else(|| StorageError::not_found(format!("document for {} / {}", subject, schema_id)))
}

fn select_assignment(conn: &Connection, subject: &SubjectRef, schema_id: &SchemaId) -> Result<Option<Assignment>> {
    let sql = format!(
        "SELECT {} FROM intake_assignments WHERE subject_ref = ?1 AND schema_id = ?2",
        ASSIGNMENT_COLUMNS
    );
    conn.query_row(&sql, params![subject.as_str(), schema_id.as_str()], AssignmentRow::from_row)
        .optional()?
        .map(AssignmentRow::decode)
        .transpose()
}

fn decode_schema(definition_json: &str) -> Result<FormSchema> {
    let def: SchemaDefinition = serde_json::from_str(definition_json)?;
    FormSchema::from_definition(&def).map_err(|e| StorageError::corrupt("intake_schemas", e.to_string()))
}

impl SubjectDirectory for SqliteStore {
    fn resolve(&self, subject: &SubjectRef) -> Result<bool> {
        let conn = self.open_conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM intake_subjects WHERE subject_ref = ?1",
                params![subject.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl SchemaRepository for SqliteStore {
    fn get_schema(&self, id: &SchemaId) -> Result<Option<FormSchema>> {
        let conn = self.open_conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT definition_json FROM intake_schemas WHERE schema_id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        json.as_deref().map(decode_schema).transpose()
    }

    fn save_schema(&self, schema: &FormSchema) -> Result<()> {
        let definition_json = serde_json::to_string(&schema.to_definition())?;
        let now = timestamp(Utc::now());
        self.immediate(|tx| {
            tx.execute(
                "INSERT INTO intake_schemas
                    (schema_id, name, slug, active, definition_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT (schema_id) DO UPDATE SET
                    name = excluded.name,
                    slug = excluded.slug,
                    active = excluded.active,
                    definition_json = excluded.definition_json,
                    updated_at = excluded.updated_at",
                params![
                    schema.id().as_str(),
                    schema.name(),
                    schema.slug(),
                    schema.is_active(),
                    definition_json,
                    now
                ],
            )?;
            Ok(())
        })?;
        info!(schema_id = %schema.id(), slug = schema.slug(), fields = schema.fields().len(), "saved schema");
        Ok(())
    }

    fn list_schemas(&self) -> Result<Vec<FormSchema>> {
        let conn = self.open_conn()?;
        let mut stmt = conn.prepare("SELECT definition_json FROM intake_schemas ORDER BY name, schema_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut schemas = Vec::new();
        for json in rows {
            schemas.push(decode_schema(&json?)?);
        }
        Ok(schemas)
    }
}

impl DocumentStore for SqliteStore {
    fn get_or_create(&self, subject: &SubjectRef, schema_id: &SchemaId) -> Result<ResponseDocument> {
        self.immediate(|tx| ensure_document(tx, subject, schema_id))
    }

    fn load(&self, subject: &SubjectRef, schema_id: &SchemaId) -> Result<Option<ResponseDocument>> {
        let conn = self.open_conn()?;
        select_document(&conn, subject, schema_id)
    }

    fn update_result(&self, id: &DocumentId, result: &ResultMap) -> Result<ResponseDocument> {
        let result_json = serde_json::to_string(result)?;
        self.immediate(|tx| {
            let updated = tx.execute(
                "UPDATE intake_documents SET result_json = ?1, updated_at = ?2 WHERE document_id = ?3",
                params![result_json, timestamp(Utc::now()), id.as_str()],
            )?;
            if updated == 0 {
                return Err(StorageError::not_found(format!("document {}", id)));
            }
            let sql = format!("SELECT {} FROM intake_documents WHERE document_id = ?1", DOCUMENT_COLUMNS);
            tx.query_row(&sql, params![id.as_str()], DocumentRow::from_row)?
                .decode()
        })
    }

    fn update_with(
        &self,
        subject: &SubjectRef,
        schema_id: &SchemaId,
        merge: &mut MergeFn<'_>,
    ) -> Result<MergeOutcome> {
        self.immediate(|tx| {
            let mut doc = ensure_document(tx, subject, schema_id)?;
            let merged = match merge(&doc.result) {
                Ok(merged) => merged,
                Err(errors) => return Ok(MergeOutcome::Rejected(errors)),
            };
            let now = Utc::now();
            tx.execute(
                "UPDATE intake_documents SET result_json = ?1, updated_at = ?2 WHERE document_id = ?3",
                params![serde_json::to_string(&merged)?, timestamp(now), doc.id.as_str()],
            )?;
            doc.result = merged;
            doc.updated_at = now;
            Ok(MergeOutcome::Merged(doc))
        })
    }
}

impl AssignmentStore for SqliteStore {
    fn get_or_create_assignment(&self, subject: &SubjectRef, schema_id: &SchemaId) -> Result<Assignment> {
        self.immediate(|tx| {
            let fresh = Assignment::new(subject.clone(), schema_id.clone());
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO intake_assignments
                    (assignment_id, subject_ref, schema_id, active, completed_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 1, NULL, ?4, ?4)",
                params![
                    fresh.id.as_str(),
                    subject.as_str(),
                    schema_id.as_str(),
                    timestamp(fresh.created_at)
                ],
            )?;
            if inserted > 0 {
                info!(subject = %subject, schema_id = %schema_id, assignment_id = %fresh.id, "created assignment");
            }
            select_assignment(tx, subject, schema_id)?
                .ok_or_else(|| StorageError::not_found(format!("assignment for {} / {}", subject, schema_id)))
        })
    }

    fn load_assignment(&self, subject: &SubjectRef, schema_id: &SchemaId) -> Result<Option<Assignment>> {
        let conn = self.open_conn()?;
        select_assignment(&conn, subject, schema_id)
    }

    fn save_assignment(&self, assignment: &Assignment) -> Result<()> {
        self.immediate(|tx| {
            tx.execute(
                "INSERT INTO intake_assignments
                    (assignment_id, subject_ref, schema_id, active, completed_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (subject_ref, schema_id) DO UPDATE SET
                    active = excluded.active,
                    completed_at = excluded.completed_at,
                    updated_at = excluded.updated_at",
                params![
                    assignment.id.as_str(),
                    assignment.subject.as_str(),
                    assignment.schema_id.as_str(),
                    assignment.active,
                    assignment.completed_at.map(timestamp),
                    timestamp(assignment.created_at),
                    timestamp(assignment.updated_at)
                ],
            )?;
            Ok(())
        })
    }
}
