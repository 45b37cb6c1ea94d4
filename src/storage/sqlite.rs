//! SQLite storage implementation.
//!
//! Implements both `ChunkStorage` and `SearchHistoryStore` on top of rusqlite.
//! Embeddings are stored as little-endian float32 BLOBs.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::debug;

use super::{ChunkStorage, SearchHistoryStore, StorageError, StorageResult};
use crate::embedding::normalize_text;
use crate::models::{Chunk, EmbeddingConfig};
use crate::session::SearchRecord;

const EMBEDDING_CONFIG_KEY: &str = "embedding_config";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    normalized TEXT NOT NULL UNIQUE,
    source TEXT NOT NULL,
    position INTEGER NOT NULL,
    embedding BLOB
);
CREATE TABLE IF NOT EXISTS searches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    grade TEXT,
    subject TEXT,
    theme TEXT,
    timestamp TEXT
);
";

/// SQLite-backed chunk index and search history.
///
/// # Schema
/// - `config`: embedding configuration as JSON
/// - `chunks`: catalog chunks, their normalized text (for deduplication) and embeddings
/// - `searches`: submitted grade/subject/theme searches
pub struct SqliteStorage {
    /// Path to the SQLite database file (":memory:" for in-memory databases)
    db_path: String,

    connection: Mutex<Connection>,
}

type ChunkRow = (i64, String, String, i64, Option<Vec<u8>>);

impl SqliteStorage {
    /// Open (or create) a database file and make sure the schema exists.
    ///
    /// # Errors
    /// Returns `StorageError::ConnectionError` if the file cannot be opened, or
    /// `StorageError::SchemaError` if the tables cannot be created
    pub fn open(db_path: impl Into<String>) -> StorageResult<Self> {
        let db_path = db_path.into();
        let connection = Connection::open(&db_path)
            .map_err(|e| StorageError::ConnectionError(format!("{}: {}", db_path, e)))?;
        Self::from_connection(db_path, connection)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        let connection = Connection::open_in_memory()
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Self::from_connection(":memory:".to_string(), connection)
    }

    fn from_connection(db_path: String, connection: Connection) -> StorageResult<Self> {
        Self::create_schema(&connection)?;
        debug!("Opened SQLite storage at {}", db_path);
        Ok(Self {
            db_path,
            connection: Mutex::new(connection),
        })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    fn create_schema(connection: &Connection) -> StorageResult<()> {
        connection
            .execute_batch(SCHEMA)
            .map_err(|e| StorageError::SchemaError(e.to_string()))
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| StorageError::Other("connection mutex poisoned".to_string()))
    }

    /// Serialize an embedding vector to bytes for BLOB storage.
    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|value| value.to_le_bytes()).collect()
    }

    /// Deserialize an embedding vector from BLOB bytes.
    ///
    /// # Errors
    /// Returns `StorageError::SerializationError` if the byte length is not a multiple of 4
    fn deserialize_embedding(bytes: &[u8]) -> StorageResult<Vec<f32>> {
        if bytes.len() % 4 != 0 {
            return Err(StorageError::SerializationError(format!(
                "embedding blob length {} is not a multiple of 4",
                bytes.len()
            )));
        }

        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    fn row_to_chunk((id, content, source, position, embedding): ChunkRow) -> StorageResult<Chunk> {
        let embedding = embedding
            .as_deref()
            .map(Self::deserialize_embedding)
            .transpose()?;

        Ok(Chunk {
            id: Some(id),
            content,
            source,
            position: usize::try_from(position).map_err(|_| {
                StorageError::SerializationError(format!("negative chunk position {}", position))
            })?,
            embedding,
        })
    }
}

fn query_error(e: rusqlite::Error) -> StorageError {
    StorageError::QueryError(e.to_string())
}

fn read_chunk_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChunkRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

#[async_trait]
impl ChunkStorage for SqliteStorage {
    async fn initialize(&mut self) -> StorageResult<()> {
        let conn = self.conn()?;
        Self::create_schema(&conn)
    }

    async fn store_config(&mut self, config: &EmbeddingConfig) -> StorageResult<()> {
        let value = serde_json::to_string(config)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        self.conn()?
            .execute(
                "INSERT INTO config (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![EMBEDDING_CONFIG_KEY, value],
            )
            .map_err(query_error)?;
        Ok(())
    }

    async fn get_config(&self) -> StorageResult<Option<EmbeddingConfig>> {
        let value: Option<String> = self
            .conn()?
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![EMBEDDING_CONFIG_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_error)?;

        value
            .map(|json| {
                serde_json::from_str(&json)
                    .map_err(|e| StorageError::SerializationError(e.to_string()))
            })
            .transpose()
    }

    async fn insert_chunk(&mut self, chunk: &Chunk) -> StorageResult<i64> {
        let normalized = normalize_text(&chunk.content);
        let embedding = chunk.embedding.as_deref().map(Self::serialize_embedding);
        let position = i64::try_from(chunk.position)
            .map_err(|_| StorageError::SerializationError("chunk position overflow".to_string()))?;

        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO chunks (content, normalized, source, position, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![chunk.content, normalized, chunk.source, position, embedding],
        );

        match result {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::DuplicateEntry(format!(
                    "chunk {} of {} is already indexed",
                    chunk.position, chunk.source
                )))
            }
            Err(e) => Err(query_error(e)),
        }
    }

    async fn exists_by_content(&self, normalized_content: &str) -> StorageResult<bool> {
        self.conn()?
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM chunks WHERE normalized = ?1)",
                params![normalized_content],
                |row| row.get(0),
            )
            .map_err(query_error)
    }

    async fn get_all_chunks(&self) -> StorageResult<Vec<Chunk>> {
        let rows: Vec<ChunkRow> = {
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, content, source, position, embedding FROM chunks ORDER BY id",
                )
                .map_err(query_error)?;
            let rows = stmt
                .query_map([], read_chunk_row)
                .map_err(query_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(query_error)?;
            rows
        };

        rows.into_iter().map(Self::row_to_chunk).collect()
    }

    async fn get_chunk_by_id(&self, id: i64) -> StorageResult<Chunk> {
        let row = self
            .conn()?
            .query_row(
                "SELECT id, content, source, position, embedding FROM chunks WHERE id = ?1",
                params![id],
                read_chunk_row,
            )
            .optional()
            .map_err(query_error)?
            .ok_or_else(|| StorageError::NotFound(format!("chunk {} not found", id)))?;

        Self::row_to_chunk(row)
    }

    async fn count_chunks(&self) -> StorageResult<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(query_error)?;
        Ok(count.max(0) as usize)
    }
}

#[async_trait]
impl SearchHistoryStore for SqliteStorage {
    async fn save_search(&self, record: &SearchRecord) -> StorageResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO searches (grade, subject, theme, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.grade,
                record.subject,
                record.theme,
                record.timestamp.to_rfc3339()
            ],
        )
        .map_err(query_error)?;
        Ok(conn.last_insert_rowid())
    }

    async fn recent_searches(&self, limit: usize) -> StorageResult<Vec<SearchRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<(String, String, String, String)> = {
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare(
                    "SELECT grade, subject, theme, timestamp FROM searches
                     ORDER BY id DESC LIMIT ?1",
                )
                .map_err(query_error)?;
            let rows = stmt
                .query_map(params![limit], |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                        row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    ))
                })
                .map_err(query_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(query_error)?;
            rows
        };

        rows.into_iter()
            .map(|(grade, subject, theme, timestamp)| {
                let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                    .map_err(|e| {
                        StorageError::SerializationError(format!(
                            "bad search timestamp '{}': {}",
                            timestamp, e
                        ))
                    })?
                    .with_timezone(&Utc);
                Ok(SearchRecord {
                    grade,
                    subject,
                    theme,
                    timestamp,
                })
            })
            .collect()
    }
}
