//! Storage layer: raw page content store and the libSQL vector index.
//!
//! [`ContentStore`] is a plain directory written by the crawler.
//! [`VectorIndex`] is a single libSQL database file inside the index
//! directory holding chunk text, provenance, and embedding vectors.
//!
//! **Access rules:**
//! - Ingestion: read-write (sole writer) via [`VectorIndex::open`]
//! - Chat / retrieval: read-only via [`VectorIndex::open_readonly`]

mod content;
mod migrations;

pub use content::{ContentStore, StoredPage};

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use doki_shared::{DokiError, EmbeddingRecord, RecordMetadata, Result, ScoredRecord};
use libsql::{Connection, Database, params};
use sha2::{Digest, Sha256};

/// Database file name inside the index directory.
pub const INDEX_FILE_NAME: &str = "index.db";

const META_MODEL_ID: &str = "model_id";
const META_DIMENSION: &str = "dimension";
const META_BUILT_AT: &str = "built_at";

/// Summary of what an index holds.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    /// Embedding model the index was built with.
    pub model_id: Option<String>,
    /// Vector dimensionality shared by every record.
    pub dimension: Option<usize>,
    pub record_count: usize,
    /// SHA-256 over (source, ordinal, text) of all records in key order.
    pub fingerprint: String,
    /// When the last full rebuild finished.
    pub built_at: Option<DateTime<Utc>>,
}

/// Persistent nearest-neighbour index over embedding records.
pub struct VectorIndex {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    path: PathBuf,
    readonly: bool,
}

fn storage_err(e: libsql::Error) -> DokiError {
    DokiError::Storage(e.to_string())
}

impl VectorIndex {
    /// Open or create the index under `dir` in read-write mode.
    pub async fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| DokiError::io(dir, e))?;

        let path = dir.join(INDEX_FILE_NAME);
        let db = libsql::Builder::new_local(&path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let index = Self {
            db,
            conn,
            path,
            readonly: false,
        };
        index.run_migrations().await?;
        Ok(index)
    }

    /// Open an existing index under `dir` for queries only.
    ///
    /// Fails with [`DokiError::IndexUnavailable`] when the index was never
    /// built or its schema cannot be read.
    pub async fn open_readonly(dir: &Path) -> Result<Self> {
        let path = dir.join(INDEX_FILE_NAME);
        if !path.is_file() {
            return Err(DokiError::index_unavailable(
                &path,
                "index has not been built; run `doki ingest` first",
            ));
        }

        let db = libsql::Builder::new_local(&path)
            .build()
            .await
            .map_err(|e| DokiError::index_unavailable(&path, e.to_string()))?;
        let conn = db
            .connect()
            .map_err(|e| DokiError::index_unavailable(&path, e.to_string()))?;

        let index = Self {
            db,
            conn,
            path,
            readonly: true,
        };
        if index.get_schema_version().await < migrations::LATEST_VERSION {
            return Err(DokiError::index_unavailable(
                &index.path,
                "index schema is missing or outdated",
            ));
        }
        Ok(index)
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        DokiError::Storage(format!("migration v{} failed: {e}", migration.version))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(DokiError::Storage(
                "vector index is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Insert or update records keyed by `(source, ordinal)`.
    ///
    /// Every vector must match the dimension already recorded for the index.
    pub async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<usize> {
        self.check_writable()?;
        if records.is_empty() {
            return Ok(0);
        }

        let dimension = check_dimensions(records, self.dimension().await?)?;

        let tx = self.conn.transaction().await.map_err(storage_err)?;
        for record in records {
            insert_record(&tx, record).await?;
        }
        if let Some(dimension) = dimension {
            set_meta(&tx, META_DIMENSION, &dimension.to_string()).await?;
        }
        tx.commit().await.map_err(storage_err)?;

        tracing::debug!(records = records.len(), "upserted records");
        Ok(records.len())
    }

    /// Replace the whole index with `records` in one transaction.
    ///
    /// Nothing is changed if any record is rejected.
    pub async fn replace_all(&self, records: &[EmbeddingRecord], model_id: &str) -> Result<IndexStats> {
        self.check_writable()?;
        let dimension = check_dimensions(records, None)?;

        let tx = self.conn.transaction().await.map_err(storage_err)?;
        tx.execute("DELETE FROM embeddings", params![])
            .await
            .map_err(storage_err)?;
        tx.execute("DELETE FROM index_meta", params![])
            .await
            .map_err(storage_err)?;
        for record in records {
            insert_record(&tx, record).await?;
        }
        set_meta(&tx, META_MODEL_ID, model_id).await?;
        set_meta(&tx, META_BUILT_AT, &Utc::now().to_rfc3339()).await?;
        if let Some(dimension) = dimension {
            set_meta(&tx, META_DIMENSION, &dimension.to_string()).await?;
        }
        tx.commit().await.map_err(storage_err)?;

        tracing::info!(records = records.len(), model_id, "vector index rebuilt");
        self.stats().await
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The `k` records most similar to `vector`, best first.
    ///
    /// Scores are cosine similarity; ties keep insertion order. An empty
    /// index yields an empty result.
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let Some(dimension) = self.dimension().await? else {
            return Ok(Vec::new());
        };
        if vector.len() != dimension {
            return Err(DokiError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }

        let mut rows = self
            .conn
            .query(
                "SELECT id, source, ordinal, text, embedding FROM embeddings",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut scored: Vec<(i64, ScoredRecord)> = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let id = row.get::<i64>(0).map_err(storage_err)?;
            let blob = row.get::<Vec<u8>>(4).map_err(storage_err)?;
            let stored = decode_vector(&blob);

            scored.push((
                id,
                ScoredRecord {
                    text: row.get::<String>(3).map_err(storage_err)?,
                    metadata: RecordMetadata {
                        source: row.get::<String>(1).map_err(storage_err)?,
                        ordinal: row.get::<i64>(2).map_err(storage_err)? as usize,
                    },
                    score: cosine_similarity(vector, &stored),
                },
            ));
        }

        scored.sort_by(|(a_id, a), (b_id, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a_id.cmp(b_id))
        });
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, record)| record).collect())
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM embeddings", params![])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)? as usize),
            None => Ok(0),
        }
    }

    /// Recorded vector dimension, if any record was ever written.
    pub async fn dimension(&self) -> Result<Option<usize>> {
        match self.meta(META_DIMENSION).await? {
            Some(value) => value
                .parse::<usize>()
                .map(Some)
                .map_err(|e| DokiError::Storage(format!("corrupt dimension metadata: {e}"))),
            None => Ok(None),
        }
    }

    /// Embedding model recorded by the last rebuild.
    pub async fn model_id(&self) -> Result<Option<String>> {
        self.meta(META_MODEL_ID).await
    }

    /// Content fingerprint over every record's provenance and text.
    pub async fn fingerprint(&self) -> Result<String> {
        let mut rows = self
            .conn
            .query(
                "SELECT source, ordinal, text FROM embeddings ORDER BY source, ordinal",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut hasher = Sha256::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let source = row.get::<String>(0).map_err(storage_err)?;
            let ordinal = row.get::<i64>(1).map_err(storage_err)?;
            let text = row.get::<String>(2).map_err(storage_err)?;
            hasher.update(source.as_bytes());
            hasher.update([0u8]);
            hasher.update(ordinal.to_le_bytes());
            hasher.update(text.as_bytes());
            hasher.update([0u8]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let built_at = self
            .meta(META_BUILT_AT)
            .await?
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(IndexStats {
            model_id: self.model_id().await?,
            dimension: self.dimension().await?,
            record_count: self.count().await?,
            fingerprint: self.fingerprint().await?,
            built_at,
        })
    }

    async fn meta(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM index_meta WHERE key = ?1", params![key])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row.get::<String>(0).map_err(storage_err)?)),
            None => Ok(None),
        }
    }
}

async fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO index_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )
    .await
    .map_err(storage_err)?;
    Ok(())
}

async fn insert_record(conn: &Connection, record: &EmbeddingRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO embeddings (source, ordinal, text, embedding, dimension)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(source, ordinal) DO UPDATE SET
            text = excluded.text,
            embedding = excluded.embedding,
            dimension = excluded.dimension",
        params![
            record.metadata.source.as_str(),
            record.metadata.ordinal as i64,
            record.text.as_str(),
            encode_vector(&record.vector),
            record.vector.len() as i64
        ],
    )
    .await
    .map_err(storage_err)?;
    Ok(())
}

/// Check that all vectors are non-empty and share one dimension.
fn check_dimensions(records: &[EmbeddingRecord], expected: Option<usize>) -> Result<Option<usize>> {
    let mut dimension = expected;
    for record in records {
        let actual = record.vector.len();
        if actual == 0 {
            return Err(DokiError::validation(format!(
                "empty vector for {}#{}",
                record.metadata.source, record.metadata.ordinal
            )));
        }
        match dimension {
            Some(expected) if expected != actual => {
                return Err(DokiError::DimensionMismatch { expected, actual });
            }
            Some(_) => {}
            None => dimension = Some(actual),
        }
    }
    Ok(dimension)
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON { 0.0 } else { dot / denom }
}
