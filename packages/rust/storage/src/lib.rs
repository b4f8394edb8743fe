//! libSQL storage for the embedding cache.
//!
//! The [`Storage`] struct wraps a local libSQL database holding embedding
//! vectors keyed by `(content_hash, model_id)`, so restarting the server does
//! not re-embed every page in the indexed databases.
//!
//! **Access rules:**
//! - `pagewright serve` / `pagewright index`: read-write via [`Storage::open`]
//! - `pagewright cache stats`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use pagewright_shared::{PagewrightError, Result};

/// Handle on the embedding cache database.
pub struct Storage {
    // Owns the file handle `conn` was created from.
    _db: Database,
    conn: Connection,
    readonly: bool,
}

/// Row counts for one embedding model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStats {
    pub model_id: String,
    pub entries: u64,
}

fn storage_err(e: impl std::fmt::Display) -> PagewrightError {
    PagewrightError::Storage(e.to_string())
}

impl Storage {
    /// Open the cache at `path`, creating the file and its parent directories
    /// if needed, and bring the schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PagewrightError::io(parent, e))?;
        }
        let storage = Self::connect(path, false).await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing cache for inspection. Writes are rejected.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PagewrightError::Storage(format!(
                "cache database not found: {}",
                path.display()
            )));
        }
        Self::connect(path, true).await
    }

    async fn connect(path: &Path, readonly: bool) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;
        Ok(Self {
            _db: db,
            conn,
            readonly,
        })
    }

    async fn run_migrations(&self) -> Result<()> {
        let applied = self.get_schema_version().await;
        let pending = migrations::all_migrations()
            .into_iter()
            .filter(|m| m.version > applied);

        for migration in pending {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "migrating embedding cache"
            );
            self.conn.execute_batch(migration.sql).await.map_err(|e| {
                PagewrightError::Storage(format!("migration v{} failed: {e}", migration.version))
            })?;
        }
        Ok(())
    }

    /// Highest applied migration; 0 on a fresh file.
    async fn get_schema_version(&self) -> u32 {
        let Ok(mut rows) = self
            .conn
            .query("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", params![])
            .await
        else {
            return 0;
        };
        match rows.next().await {
            Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
            _ => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(PagewrightError::Storage(
                "embedding cache is opened read-only".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Embedding cache
    // -----------------------------------------------------------------------

    /// Look up a cached vector. Rows that fail to decode count as a miss.
    pub async fn get_embedding(&self, content_hash: &str, model_id: &str) -> Result<Option<Vec<f32>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT vector_json FROM embedding_cache
                 WHERE content_hash = ?1 AND model_id = ?2",
                params![content_hash, model_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => {
                let json: String = row.get(0).map_err(storage_err)?;
                match serde_json::from_str::<Vec<f32>>(&json) {
                    Ok(vector) => Ok(Some(vector)),
                    Err(e) => {
                        tracing::warn!(content_hash, model_id, error = %e, "corrupt cache row");
                        Ok(None)
                    }
                }
            }
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Store a vector (upserts).
    pub async fn set_embedding(&self, content_hash: &str, model_id: &str, vector: &[f32]) -> Result<()> {
        self.check_writable()?;
        let json = serde_json::to_string(vector).map_err(storage_err)?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO embedding_cache (content_hash, model_id, dimensions, vector_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(content_hash, model_id) DO UPDATE SET
                   dimensions = excluded.dimensions,
                   vector_json = excluded.vector_json,
                   created_at = excluded.created_at",
                params![content_hash, model_id, vector.len() as i64, json.as_str(), now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Delete every cached vector for `model_id`. Returns the number of rows removed.
    pub async fn clear_model(&self, model_id: &str) -> Result<u64> {
        self.check_writable()?;
        self.conn
            .execute(
                "DELETE FROM embedding_cache WHERE model_id = ?1",
                params![model_id],
            )
            .await
            .map_err(storage_err)
    }

    /// Entry counts grouped by model, ordered by model id.
    pub async fn stats(&self) -> Result<Vec<ModelStats>> {
        let mut rows = self
            .conn
            .query(
                "SELECT model_id, COUNT(*) FROM embedding_cache GROUP BY model_id ORDER BY model_id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(ModelStats {
                model_id: row.get::<String>(0).map_err(storage_err)?,
                entries: row.get::<u64>(1).map_err(storage_err)?,
            });
        }
        Ok(results)
    }
}
