pub mod models;
pub mod schema;

use carrot_shared::snapshot::{Snapshot, SnapshotError};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use models::{NewSnapshotRow, SnapshotInfo, SnapshotRow};
use tracing::trace;

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// A stored body could not be encoded or decoded.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Every save appends one snapshot row; loading takes the newest.
#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(4).build(manager)?;

        // Apply embedded migrations so an empty file becomes a usable store
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    /// Appends a snapshot and returns its row id.
    pub async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<i32, StorageError> {
        use schema::snapshots::dsl::*;
        let body_text = snapshot.to_json()?;
        let row_version = snapshot.version as i32;
        let at = snapshot.saved_at.naive_utc();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<i32, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let new_row = NewSnapshotRow {
                version: row_version,
                body: &body_text,
                saved_at: at,
            };
            let new_id = diesel::insert_into(snapshots)
                .values(&new_row)
                .returning(id)
                .get_result::<i32>(&mut conn)?;
            trace!(snapshot_id = new_id, bytes = body_text.len(), "snapshot saved");
            Ok(new_id)
        })
        .await?
    }

    /// Newest snapshot, or `None` for a fresh database.
    pub async fn load_latest(&self) -> Result<Option<Snapshot>, StorageError> {
        use schema::snapshots::dsl::*;
        let pool = self.pool.clone();
        let row = tokio::task::spawn_blocking(move || -> Result<Option<SnapshotRow>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(snapshots
                .order(id.desc())
                .select(SnapshotRow::as_select())
                .first::<SnapshotRow>(&mut conn)
                .optional()?)
        })
        .await??;
        match row {
            None => Ok(None),
            Some(r) => {
                trace!(snapshot_id = r.id, version = r.version, "loading snapshot");
                Ok(Some(Snapshot::from_json(&r.body)?))
            }
        }
    }

    /// Stored snapshots, newest first.
    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, StorageError> {
        use schema::snapshots::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<SnapshotInfo>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(snapshots
                .select((id, version, saved_at))
                .order(id.desc())
                .load::<SnapshotInfo>(&mut conn)?)
        })
        .await?
    }

    /// Deletes all but the newest `keep` snapshots and returns how many rows
    /// went away. `keep == 0` is a no-op.
    pub async fn prune_snapshots(&self, keep: u32) -> Result<usize, StorageError> {
        use schema::snapshots::dsl::*;
        if keep == 0 {
            return Ok(0);
        }
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<usize, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.transaction::<usize, StorageError, _>(|conn| {
                let kept: Vec<i32> = snapshots
                    .select(id)
                    .order(id.desc())
                    .limit(i64::from(keep))
                    .load(conn)?;
                if kept.is_empty() {
                    return Ok(0);
                }
                let removed = diesel::delete(snapshots.filter(id.ne_all(kept))).execute(conn)?;
                trace!(removed, keep, "snapshots pruned");
                Ok(removed)
            })
        })
        .await?
    }
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // WAL plus a busy timeout keeps a second process from failing outright
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    Ok(())
}
