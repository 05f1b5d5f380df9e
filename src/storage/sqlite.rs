//! SQLite snapshot store
//!
//! The state document is kept in a single-row key/value table. SQLite gives
//! atomic replacement and WAL-mode durability without a separate server.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::{Snapshot, SnapshotStore};
use super::error::{StorageError, StorageResult};

const STATE_KEY: &str = "state";

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the database and run migrations
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    #[instrument(skip(self))]
    async fn load_all(&self) -> StorageResult<Option<Snapshot>> {
        let row = sqlx::query("SELECT document FROM snapshots WHERE key = ?")
            .bind(STATE_KEY)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            debug!("no snapshot stored yet");
            return Ok(None);
        };

        let document: String = row.get("document");
        let snapshot = serde_json::from_str(&document)?;
        Ok(Some(snapshot))
    }

    #[instrument(skip_all)]
    async fn persist(&self, snapshot: &Snapshot) -> StorageResult<()> {
        let document = serde_json::to_string(snapshot)?;

        sqlx::query(
            r#"
            INSERT INTO snapshots (key, document, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (key) DO UPDATE SET
                document = excluded.document,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(STATE_KEY)
        .bind(document)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        debug!("snapshot written");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
