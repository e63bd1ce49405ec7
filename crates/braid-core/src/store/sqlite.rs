//! Sqlite Vector Store
//!
//! Durable implementation of [`VectorStore`]: one `records` table per
//! database with scalar indices on the filterable keys and embeddings as
//! little-endian f32 blobs. Separate reader/writer connections give
//! interior mutability, so the store is `Send + Sync` behind `&self`.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::Config;
use crate::embed::cosine_similarity;
use crate::error::{MemoryError, Result};

use super::{sort_hits, Collection, SearchFilter, SearchHit, StoredRecord, VectorStore};

/// Ordered, append-only schema migrations.
const MIGRATIONS: &[&str] = &[
    // v1: the records table and its scalar indices
    "CREATE TABLE IF NOT EXISTS records (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        project TEXT NOT NULL DEFAULT '',
        status TEXT,
        category TEXT,
        source_conversation TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        text TEXT NOT NULL,
        payload TEXT NOT NULL,
        embedding BLOB,
        PRIMARY KEY (collection, id)
    );
    CREATE INDEX IF NOT EXISTS idx_records_project ON records(collection, project);
    CREATE INDEX IF NOT EXISTS idx_records_status ON records(collection, status);
    CREATE INDEX IF NOT EXISTS idx_records_category ON records(collection, category);
    CREATE INDEX IF NOT EXISTS idx_records_source ON records(collection, source_conversation);",
];

/// Durable store backed by sqlite.
pub struct SqliteVectorStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Open (or create) a store at `db_path`; `None` uses the platform
    /// data directory.
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => Config::default_db_path()?,
        };

        let writer = Connection::open(&path)?;
        Self::configure_connection(&writer)?;
        Self::migrate(&writer)?;

        let reader = Connection::open(&path)?;
        Self::configure_connection(&reader)?;

        Ok(Self { writer: Mutex::new(writer), reader: Mutex::new(reader) })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )?;
        let current: i64 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
                row.get(0)
            })?;
        for (index, migration) in MIGRATIONS.iter().enumerate() {
            let version = index as i64 + 1;
            if version > current {
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                    params![version, Utc::now()],
                )?;
            }
        }
        Ok(())
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|e| MemoryError::Internal(format!("writer lock poisoned: {e}")))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|e| MemoryError::Internal(format!("reader lock poisoned: {e}")))
    }

    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn blob_to_embedding(blob: Option<Vec<u8>>) -> Vec<f32> {
        match blob {
            Some(bytes) => bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            None => Vec::new(),
        }
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRecord> {
        let blob: Option<Vec<u8>> = row.get("embedding")?;
        let created_at: DateTime<Utc> = row.get("created_at")?;
        let updated_at: DateTime<Utc> = row.get("updated_at")?;
        Ok(StoredRecord {
            id: row.get("id")?,
            project: row.get("project")?,
            text: row.get("text")?,
            embedding: Self::blob_to_embedding(blob),
            status: row.get("status")?,
            category: row.get("category")?,
            source_conversation: row.get("source_conversation")?,
            created_at,
            updated_at,
            payload: row.get("payload")?,
        })
    }

    /// Build the WHERE tail for a filter. `?1` is always the collection.
    fn filter_clause(filter: &SearchFilter) -> (String, Vec<String>) {
        let mut clause = String::new();
        let mut params = Vec::new();
        let mut bind = 2;
        for (column, value) in [
            ("project", &filter.project),
            ("status", &filter.status),
            ("category", &filter.category),
            ("source_conversation", &filter.source_conversation),
        ] {
            if let Some(value) = value {
                clause.push_str(&format!(" AND {column} = ?{bind}"));
                params.push(value.clone());
                bind += 1;
            }
        }
        (clause, params)
    }

    fn query_records(
        &self,
        collection: Collection,
        filter: &SearchFilter,
        order_and_limit: &str,
    ) -> Result<Vec<StoredRecord>> {
        let (clause, filter_params) = Self::filter_clause(filter);
        let sql = format!(
            "SELECT id, project, status, category, source_conversation, created_at, updated_at, \
             text, payload, embedding FROM records WHERE collection = ?1{clause}{order_and_limit}"
        );
        let conn = self.reader()?;
        let mut stmt = conn.prepare(&sql)?;
        let name = collection_name(collection);
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&name];
        for p in &filter_params {
            values.push(p);
        }
        let rows = stmt.query_map(&values[..], Self::row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

fn collection_name(collection: Collection) -> String {
    collection.as_str().to_string()
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, collection: Collection, record: StoredRecord) -> Result<()> {
        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO records (collection, id, project, status, category, source_conversation, \
             created_at, updated_at, text, payload, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT (collection, id) DO UPDATE SET
                 project = excluded.project,
                 status = excluded.status,
                 category = excluded.category,
                 source_conversation = excluded.source_conversation,
                 updated_at = excluded.updated_at,
                 text = excluded.text,
                 payload = excluded.payload,
                 embedding = excluded.embedding",
            params![
                collection_name(collection),
                record.id,
                record.project,
                record.status,
                record.category,
                record.source_conversation,
                record.created_at,
                record.updated_at,
                record.text,
                record.payload,
                Self::embedding_to_blob(&record.embedding),
            ],
        )?;
        Ok(())
    }

    async fn search(
        &self,
        collection: Collection,
        query: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        let records = self.query_records(collection, filter, "")?;
        let mut hits: Vec<SearchHit> = records
            .into_iter()
            .filter(|r| !r.embedding.is_empty())
            .map(|r| SearchHit {
                id: r.id.clone(),
                score: cosine_similarity(query, &r.embedding),
                record: r,
            })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<StoredRecord>> {
        let conn = self.reader()?;
        let record = conn
            .query_row(
                "SELECT id, project, status, category, source_conversation, created_at, \
                 updated_at, text, payload, embedding FROM records \
                 WHERE collection = ?1 AND id = ?2",
                params![collection_name(collection), id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        let conn = self.writer()?;
        let changed = conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![collection_name(collection), id],
        )?;
        Ok(changed > 0)
    }

    async fn list(
        &self,
        collection: Collection,
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<StoredRecord>> {
        let tail = if limit > 0 {
            format!(" ORDER BY created_at DESC, id ASC LIMIT {limit}")
        } else {
            " ORDER BY created_at DESC, id ASC".to_string()
        };
        self.query_records(collection, filter, &tail)
    }

    async fn count(&self, collection: Collection, filter: &SearchFilter) -> Result<usize> {
        let (clause, filter_params) = Self::filter_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM records WHERE collection = ?1{clause}");
        let conn = self.reader()?;
        let mut stmt = conn.prepare(&sql)?;
        let name = collection_name(collection);
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&name];
        for p in &filter_params {
            values.push(p);
        }
        let count: i64 = stmt.query_row(&values[..], |row| row.get(0))?;
        Ok(count as usize)
    }

    async fn projects(&self) -> Result<Vec<(String, usize)>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT project, COUNT(*) FROM records WHERE project != '' \
             GROUP BY project ORDER BY project ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        let mut projects = Vec::new();
        for row in rows {
            let (project, count) = row?;
            projects.push((project, count));
        }
        Ok(projects)
    }
}

// ============================================================================
// TESTS
// ============================================================================
