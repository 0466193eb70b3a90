//! SQLite-backed append-only document store.
//!
//! Every operation opens its own short-lived connection, so concurrent
//! readers never share a handle or hold locks across calls. Each write is a
//! single autocommitted statement and is durable once the call returns.

use crate::types::{BaseStats, ModelInfo, NewDocument, StoredDocument};
use chrono::Utc;
use policykb_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    category TEXT,
    question TEXT,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_category ON documents(category);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const META_PROVIDER: &str = "embedding_provider";
const META_MODEL: &str = "embedding_model";

/// Durable mapping from document id to (content, embedding).
#[derive(Debug, Clone)]
pub struct DocumentStore {
    path: PathBuf,
}

impl DocumentStore {
    /// Open or create the store at `path`, creating parent directories and
    /// the schema as needed.
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Storage(format!("Failed to create store directory: {}", e))
                })?;
            }
        }

        let store = Self { path };
        let conn = store.connect()?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::Storage(format!("Failed to create tables: {}", e)))?;

        tracing::debug!("Opened document store at {:?}", store.path);
        Ok(store)
    }

    /// Location of the SQLite file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> AppResult<Connection> {
        let conn = Connection::open(&self.path).map_err(|e| {
            AppError::Storage(format!("Failed to open store {:?}: {}", self.path, e))
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| AppError::Storage(format!("Failed to configure store: {}", e)))?;
        Ok(conn)
    }

    /// True iff no documents are stored.
    pub fn is_empty(&self) -> AppResult<bool> {
        let conn = self.connect()?;
        let any: Option<i64> = conn
            .query_row("SELECT id FROM documents LIMIT 1", [], |row| row.get(0))
            .optional()
            .map_err(|e| AppError::Storage(format!("Failed to probe documents: {}", e)))?;
        Ok(any.is_none())
    }

    /// Number of stored documents.
    pub fn count(&self) -> AppResult<u64> {
        let conn = self.connect()?;
        conn.query_row("SELECT COUNT(*) FROM documents", [], |row| {
            row.get::<_, i64>(0).map(|v| v as u64)
        })
        .map_err(|e| AppError::Storage(format!("Failed to count documents: {}", e)))
    }

    /// Dimensionality shared by every stored embedding, or `None` when empty.
    pub fn dimensions(&self) -> AppResult<Option<usize>> {
        let conn = self.connect()?;
        dimensions_with(&conn)
    }

    /// Document count, vector width and on-disk size.
    pub fn stats(&self, base_name: &str) -> AppResult<BaseStats> {
        let conn = self.connect()?;
        let documents_count = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get::<_, i64>(0))
            .map_err(|e| AppError::Storage(format!("Failed to count documents: {}", e)))?
            as u64;

        Ok(BaseStats {
            base_name: base_name.to_string(),
            documents_count,
            dimensions: dimensions_with(&conn)?,
            embedding_model: embedding_model_with(&conn)?,
            db_size_bytes: std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0),
        })
    }

    /// Provider and model recorded as the source of the stored vectors.
    pub fn embedding_model(&self) -> AppResult<Option<ModelInfo>> {
        let conn = self.connect()?;
        embedding_model_with(&conn)
    }

    /// Record which provider and model produce this store's vectors,
    /// replacing any earlier record.
    pub fn set_embedding_model(&self, info: &ModelInfo) -> AppResult<()> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| AppError::Storage(format!("Failed to begin transaction: {}", e)))?;

        for (key, value) in [(META_PROVIDER, &info.provider), (META_MODEL, &info.model)] {
            tx.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| AppError::Storage(format!("Failed to record embedding model: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| AppError::Storage(format!("Failed to record embedding model: {}", e)))?;

        tracing::debug!("Recorded embedding model {} for {:?}", info, self.path);
        Ok(())
    }

    /// Append an uncategorised document and return its id.
    pub fn add(&self, content: &str, embedding: &[f32]) -> AppResult<i64> {
        self.add_document(&NewDocument::new(content), embedding)
    }

    /// Append a document and return its id.
    ///
    /// Rejects an empty embedding, or one whose length differs from what is
    /// already stored; nothing is written in either case. The width check
    /// and the insert share one write transaction. Duplicate content is
    /// allowed.
    pub fn add_document(&self, document: &NewDocument, embedding: &[f32]) -> AppResult<i64> {
        if embedding.is_empty() {
            return Err(AppError::Knowledge(
                "Refusing to store a document without an embedding".to_string(),
            ));
        }

        let mut conn = self.connect()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| AppError::Storage(format!("Failed to begin transaction: {}", e)))?;

        if let Some(expected) = dimensions_with(&tx)? {
            if expected != embedding.len() {
                return Err(AppError::Knowledge(format!(
                    "Dimension mismatch: store holds {}-dimensional embeddings, got {}",
                    expected,
                    embedding.len()
                )));
            }
        }

        tx.execute(
            "INSERT INTO documents (content, category, question, embedding, dimensions, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                document.content,
                document.category,
                document.question,
                embedding_to_bytes(embedding),
                embedding.len() as i64,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::Storage(format!("Failed to insert document: {}", e)))?;

        let id = tx.last_insert_rowid();
        tx.commit()
            .map_err(|e| AppError::Storage(format!("Failed to commit document: {}", e)))?;

        tracing::debug!("Stored document {} ({} bytes)", id, document.content.len());
        Ok(id)
    }

    /// Return every stored document, ordered by id.
    pub fn scan_all(&self) -> AppResult<Vec<StoredDocument>> {
        self.scan(None)
    }

    /// Return stored documents ordered by id, restricted to `category` when
    /// one is given.
    pub fn scan(&self, category: Option<&str>) -> AppResult<Vec<StoredDocument>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, content, category, question, embedding FROM documents
                 WHERE ?1 IS NULL OR category = ?1
                 ORDER BY id",
            )
            .map_err(|e| AppError::Storage(format!("Failed to prepare scan: {}", e)))?;

        let rows = stmt
            .query_map(params![category], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Vec<u8>>(4)?,
                ))
            })
            .map_err(|e| AppError::Storage(format!("Failed to scan documents: {}", e)))?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, content, category, question, bytes) =
                row.map_err(|e| AppError::Storage(format!("Failed to read document: {}", e)))?;
            documents.push(StoredDocument {
                id,
                content,
                category,
                question,
                embedding: bytes_to_embedding(&bytes)?,
            });
        }

        tracing::debug!("Scanned {} documents (category: {:?})", documents.len(), category);
        Ok(documents)
    }
}

fn dimensions_with(conn: &Connection) -> AppResult<Option<usize>> {
    conn.query_row("SELECT dimensions FROM documents LIMIT 1", [], |row| {
        row.get::<_, i64>(0)
    })
    .optional()
    .map(|dims| dims.map(|d| d as usize))
    .map_err(|e| AppError::Storage(format!("Failed to read dimensions: {}", e)))
}

fn embedding_model_with(conn: &Connection) -> AppResult<Option<ModelInfo>> {
    let read = |key: &str| -> AppResult<Option<String>> {
        conn.query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| AppError::Storage(format!("Failed to read store metadata: {}", e)))
    };

    Ok(match (read(META_PROVIDER)?, read(META_MODEL)?) {
        (Some(provider), Some(model)) => Some(ModelInfo { provider, model }),
        _ => None,
    })
}

/// Little-endian f32 bytes; decoding yields bit-identical values.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Storage(format!(
            "Corrupt embedding: {} bytes is not a multiple of 4",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
