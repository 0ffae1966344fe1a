//! Persistent chunk index over SQLite with the `sqlite-vec` extension.
//!
//! Similarity search is delegated to `vec_distance_cosine`; this module
//! only owns the schema and the idempotent upsert policy. The index
//! directory layout is private to this store; callers hold the path and
//! nothing else.

use crate::error::ServiceError;
use crate::models::{Chunk, ChunkKind, ScoredChunk};
use crate::traits::{ChunkIndex, Embedder};
use async_trait::async_trait;
use std::collections::HashSet;
use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::OnceLock;
use tokio_rusqlite::{ffi, Connection};

const DB_FILE: &str = "chunks.sqlite3";

pub struct SqliteChunkIndex<E> {
    conn: Connection,
    embedder: E,
}

impl<E> SqliteChunkIndex<E>
where
    E: Embedder + Send + Sync,
{
    /// Opens the index under `index_dir`, creating the directory, the
    /// database file and the schema on first use.
    pub async fn open(index_dir: impl AsRef<Path>, embedder: E) -> Result<Self, ServiceError> {
        register_sqlite_vec()?;

        let dir = index_dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|error| ServiceError::Storage(error.to_string()))?;

        let conn = Connection::open(dir.join(DB_FILE))
            .await
            .map_err(|error| ServiceError::Storage(error.to_string()))?;

        conn.call(|conn| {
            // fails loudly if the vec extension did not load
            conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))?;

            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS chunks (
                     id TEXT PRIMARY KEY,
                     source TEXT NOT NULL,
                     chunk_index INTEGER NOT NULL,
                     kind TEXT NOT NULL,
                     content TEXT NOT NULL,
                     extra TEXT NOT NULL DEFAULT '{}'
                 );
                 CREATE TABLE IF NOT EXISTS chunk_vectors (
                     id TEXT PRIMARY KEY,
                     embedding BLOB NOT NULL
                 );",
            )?;
            Ok(())
        })
        .await
        .map_err(storage_error)?;

        Ok(Self { conn, embedder })
    }
}

#[async_trait]
impl<E> ChunkIndex for SqliteChunkIndex<E>
where
    E: Embedder + Send + Sync,
{
    async fn existing_ids(&self) -> Result<HashSet<String>, ServiceError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn
                    .prepare("SELECT id FROM chunks")?;

                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?;

                let mut ids = HashSet::new();
                for row in rows {
                    ids.insert(row?);
                }
                Ok(ids)
            })
            .await
            .map_err(storage_error)
    }

    /// Embeds and persists chunks whose ID is absent. Present IDs are
    /// skipped without re-embedding or comparing content; identical IDs
    /// are assumed to denote identical content. When every ID already
    /// exists, neither the embedder nor the database is touched.
    async fn upsert(&self, chunks: &[Chunk]) -> Result<usize, ServiceError> {
        let existing = self.existing_ids().await?;
        let fresh: Vec<&Chunk> = chunks
            .iter()
            .filter(|chunk| !existing.contains(&chunk.id))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        let contents: Vec<String> = fresh.iter().map(|chunk| chunk.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&contents).await?;
        if embeddings.len() != fresh.len() {
            return Err(ServiceError::BackendResponse {
                backend: "embeddings".to_string(),
                details: format!(
                    "expected {} vectors, got {}",
                    fresh.len(),
                    embeddings.len()
                ),
            });
        }

        let mut rows = Vec::with_capacity(fresh.len());
        for (chunk, embedding) in fresh.iter().zip(embeddings) {
            rows.push((
                chunk.id.clone(),
                chunk.source.clone(),
                chunk.chunk_index as i64,
                chunk.kind.as_str().to_string(),
                chunk.content.clone(),
                serde_json::to_string(&chunk.extra)?,
                serde_json::to_string(&embedding)?,
            ));
        }

        let added = rows.len();
        self.conn
            .call(move |conn| {
                let tx = conn
                    .transaction()?;
                for (id, source, chunk_index, kind, content, extra, vector) in rows {
                    tx.execute(
                        "INSERT INTO chunks (id, source, chunk_index, kind, content, extra)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        (&id, &source, chunk_index, &kind, &content, &extra),
                    )?;
                    tx.execute(
                        "INSERT INTO chunk_vectors (id, embedding) VALUES (?1, vec_f32(?2))",
                        (&id, &vector),
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(storage_error)?;

        Ok(added)
    }

    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, ServiceError> {
        if query_vector.is_empty() {
            return Err(ServiceError::Request("query vector is empty".to_string()));
        }

        let vector_json = serde_json::to_string(query_vector)?;
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT c.id, c.source, c.chunk_index, c.kind, c.content, c.extra, \
                         vec_distance_cosine(v.embedding, vec_f32(?1)) AS distance \
                         FROM chunks c JOIN chunk_vectors v ON c.id = v.id \
                         ORDER BY distance ASC LIMIT {k}"
                    ))?;

                let rows = stmt
                    .query_map([&vector_json], |row| {
                        let kind_raw: String = row.get(3)?;
                        let extra_raw: String = row.get(5)?;
                        let distance: f32 = row.get(6)?;
                        Ok(ScoredChunk {
                            chunk: Chunk {
                                id: row.get(0)?,
                                source: row.get(1)?,
                                chunk_index: row.get::<_, i64>(2)? as usize,
                                kind: ChunkKind::parse(&kind_raw).unwrap_or(ChunkKind::Text),
                                content: row.get(4)?,
                                extra: serde_json::from_str(&extra_raw).unwrap_or_default(),
                            },
                            score: 1.0 - distance,
                        })
                    })?;

                let mut hits = Vec::new();
                for row in rows {
                    hits.push(row?);
                }
                Ok(hits)
            })
            .await
            .map_err(storage_error)
    }

    async fn reset(&self) -> Result<(), ServiceError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("DELETE FROM chunk_vectors; DELETE FROM chunks;")?;
                Ok(())
            })
            .await
            .map_err(storage_error)
    }
}

fn storage_error(error: tokio_rusqlite::Error) -> ServiceError {
    ServiceError::Storage(error.to_string())
}

/// Registers `sqlite-vec` as an auto-loaded extension for every connection
/// opened by this process. Registration happens once; later calls reuse
/// the recorded outcome.
fn register_sqlite_vec() -> Result<(), ServiceError> {
    static REGISTRATION: OnceLock<Result<(), String>> = OnceLock::new();

    REGISTRATION
        .get_or_init(|| unsafe {
            type ExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init = transmute::<unsafe extern "C" fn(), ExtensionInit>(
                sqlite_vec::sqlite3_vec_init as unsafe extern "C" fn(),
            );
            let rc = ffi::sqlite3_auto_extension(Some(init));
            if rc == 0 {
                Ok(())
            } else {
                Err(format!("failed to register sqlite-vec extension (code {rc})"))
            }
        })
        .clone()
        .map_err(ServiceError::Storage)
}

#[cfg(test)]
mod tests {
    use super::SqliteChunkIndex;
    use crate::error::ServiceError;
    use crate::models::{Chunk, ChunkKind};
    use crate::traits::{ChunkIndex, Embedder};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[derive(Clone, Default)]
    struct StubEmbedder {
        vectors: HashMap<String, Vec<f32>>,
        batches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
            let mut vectors = self.embed_batch(&[text.to_string()]).await?;
            Ok(vectors.pop().expect("stub batch is never empty"))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|text| {
                    self.vectors
                        .get(text)
                        .cloned()
                        .unwrap_or_else(|| vec![0.5, 0.5, 0.5])
                })
                .collect())
        }
    }

    fn chunk(index: usize, content: &str) -> Chunk {
        Chunk::new("report.pdf", index, ChunkKind::Text, content.to_string())
    }

    #[tokio::test]
    async fn upsert_is_idempotent_across_reopen() {
        let dir = tempdir().expect("tempdir");
        let embedder = StubEmbedder::default();
        let batches = embedder.batches.clone();

        let index = SqliteChunkIndex::open(dir.path(), embedder.clone())
            .await
            .expect("open");
        let chunks = vec![chunk(0, "alpha"), chunk(1, "beta"), chunk(2, "gamma")];

        assert_eq!(index.upsert(&chunks).await.expect("first upsert"), 3);
        assert_eq!(index.upsert(&chunks).await.expect("second upsert"), 0);
        // the no-op run never reached the embedder
        assert_eq!(batches.load(Ordering::SeqCst), 1);

        drop(index);
        let reopened = SqliteChunkIndex::open(dir.path(), embedder)
            .await
            .expect("reopen");
        let ids = reopened.existing_ids().await.expect("ids");
        assert_eq!(ids.len(), 3);
        assert!(ids.contains("report.pdf-chunk-0"));
        assert_eq!(reopened.upsert(&chunks).await.expect("third upsert"), 0);
    }

    #[tokio::test]
    async fn upsert_adds_only_missing_ids() {
        let dir = tempdir().expect("tempdir");
        let index = SqliteChunkIndex::open(dir.path(), StubEmbedder::default())
            .await
            .expect("open");

        assert_eq!(index.upsert(&[chunk(0, "alpha")]).await.expect("seed"), 1);
        let added = index
            .upsert(&[chunk(0, "alpha"), chunk(1, "beta")])
            .await
            .expect("partial");
        assert_eq!(added, 1);
        assert_eq!(index.existing_ids().await.expect("ids").len(), 2);
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let dir = tempdir().expect("tempdir");
        let mut vectors = HashMap::new();
        vectors.insert("alpha".to_string(), vec![1.0, 0.0, 0.0]);
        vectors.insert("beta".to_string(), vec![1.0, 1.0, 0.0]);
        vectors.insert("gamma".to_string(), vec![0.0, 1.0, 0.0]);
        let embedder = StubEmbedder {
            vectors,
            batches: Arc::default(),
        };

        let index = SqliteChunkIndex::open(dir.path(), embedder)
            .await
            .expect("open");
        index
            .upsert(&[chunk(0, "alpha"), chunk(1, "beta"), chunk(2, "gamma")])
            .await
            .expect("upsert");

        let hits = index.search(&[1.0, 0.0, 0.0], 3).await.expect("search");
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].chunk.content, "alpha");
        assert_eq!(hits[1].chunk.content, "beta");
        assert_eq!(hits[2].chunk.content, "gamma");
        assert!(hits[0].score >= hits[1].score);
        assert!(hits[1].score >= hits[2].score);

        let narrowed = index.search(&[1.0, 0.0, 0.0], 2).await.expect("search");
        assert_eq!(narrowed.len(), 2);
    }

    #[tokio::test]
    async fn reset_clears_every_record() {
        let dir = tempdir().expect("tempdir");
        let index = SqliteChunkIndex::open(dir.path(), StubEmbedder::default())
            .await
            .expect("open");

        index
            .upsert(&[chunk(0, "alpha"), chunk(1, "beta")])
            .await
            .expect("upsert");
        index.reset().await.expect("reset");

        assert!(index.existing_ids().await.expect("ids").is_empty());
        assert!(index
            .search(&[0.5, 0.5, 0.5], 5)
            .await
            .expect("search")
            .is_empty());
    }
}
