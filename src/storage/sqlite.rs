use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions,
};
use sqlx::Transaction;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use super::{Collection, CollectionStore};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// How long a write waits for another writer to release the database lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const SELECT_COLLECTION: &str = r#"
    SELECT id, name, parent_id, is_virtual, reference_id, query, facets, created_at, updated_at
    FROM collections
"#;

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create an in-memory storage instance.
    ///
    /// The pool is pinned to a single connection that never expires, since
    /// each SQLite in-memory connection owns a separate database.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a write transaction that takes the database write lock up front.
    ///
    /// Edits read before they write; a deferred transaction cannot upgrade
    /// its read lock once another writer holds the lock, while `BEGIN
    /// IMMEDIATE` waits out the busy timeout.
    async fn begin_write(&self) -> StorageResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }
}

fn invalid_edit(collection_id: &str, reason: impl Into<String>) -> StorageError {
    let reason = reason.into();
    warn!(collection_id = %collection_id, reason = %reason, "Rejected collection edit");
    StorageError::InvalidEdit {
        collection_id: collection_id.to_string(),
        reason,
    }
}

async fn collection_exists(conn: &mut SqliteConnection, id: &str) -> StorageResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM collections WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?;

    Ok(found.is_some())
}

/// True when `ancestor_id` lies on the structural path from `start_id` up to
/// its root (inclusive). `UNION` keeps the walk finite on corrupted data.
async fn is_structural_ancestor(
    conn: &mut SqliteConnection,
    start_id: &str,
    ancestor_id: &str,
) -> StorageResult<bool> {
    let hits: i64 = sqlx::query_scalar(
        r#"
        WITH RECURSIVE ancestors(id, parent_id) AS (
            SELECT id, parent_id FROM collections WHERE id = ?
            UNION
            SELECT c.id, c.parent_id
            FROM collections c
            JOIN ancestors a ON c.id = a.parent_id
        )
        SELECT COUNT(*) FROM ancestors WHERE id = ?
        "#,
    )
    .bind(start_id)
    .bind(ancestor_id)
    .fetch_one(conn)
    .await?;

    Ok(hits > 0)
}

/// Check the parent and reference links of a collection about to be written.
async fn validate_links(conn: &mut SqliteConnection, collection: &Collection) -> StorageResult<()> {
    if let Some(parent_id) = &collection.parent_id {
        if parent_id == &collection.id {
            return Err(invalid_edit(
                &collection.id,
                "collection cannot be its own parent",
            ));
        }
        if !collection_exists(&mut *conn, parent_id).await? {
            return Err(invalid_edit(
                &collection.id,
                format!("parent {} does not exist", parent_id),
            ));
        }
        if is_structural_ancestor(&mut *conn, parent_id, &collection.id).await? {
            return Err(invalid_edit(
                &collection.id,
                format!("moving under {} would create a structural cycle", parent_id),
            ));
        }
    }

    if let Some(reference) = &collection.reference {
        if !collection_exists(&mut *conn, reference).await? {
            return Err(invalid_edit(
                &collection.id,
                format!("referenced collection {} does not exist", reference),
            ));
        }
    }

    Ok(())
}

fn facets_to_json(collection: &Collection) -> StorageResult<String> {
    serde_json::to_string(&collection.facets).map_err(|e| StorageError::Query {
        message: format!("Failed to serialize facets: {}", e),
    })
}

#[async_trait]
impl CollectionStore for SqliteStorage {
    async fn create_collection(&self, collection: &Collection) -> StorageResult<()> {
        let facets = facets_to_json(collection)?;

        let mut tx = self.begin_write().await?;
        validate_links(&mut *tx, collection).await?;

        sqlx::query(
            r#"
            INSERT INTO collections (id, name, parent_id, is_virtual, reference_id, query, facets, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&collection.id)
        .bind(&collection.name)
        .bind(&collection.parent_id)
        .bind(collection.is_virtual)
        .bind(&collection.reference)
        .bind(&collection.query)
        .bind(&facets)
        .bind(collection.created_at.to_rfc3339())
        .bind(collection.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            collection_id = %collection.id,
            name = %collection.name,
            parent_id = ?collection.parent_id,
            reference = ?collection.reference,
            "Collection created"
        );
        Ok(())
    }

    async fn get_collection(&self, id: &str) -> StorageResult<Option<Collection>> {
        let row: Option<CollectionRow> =
            sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLLECTION))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Collection::try_from).transpose()
    }

    async fn get_children(&self, parent_id: &str) -> StorageResult<Vec<Collection>> {
        let rows: Vec<CollectionRow> = sqlx::query_as(&format!(
            "{} WHERE parent_id = ? ORDER BY seq ASC",
            SELECT_COLLECTION
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Collection::try_from).collect()
    }

    async fn list_collections(&self) -> StorageResult<Vec<Collection>> {
        let rows: Vec<CollectionRow> =
            sqlx::query_as(&format!("{} ORDER BY seq ASC", SELECT_COLLECTION))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Collection::try_from).collect()
    }

    async fn count_collections(&self) -> StorageResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collections")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn find_by_name(&self, name: &str) -> StorageResult<Option<Collection>> {
        let row: Option<CollectionRow> = sqlx::query_as(&format!(
            "{} WHERE name = ? ORDER BY seq ASC LIMIT 1",
            SELECT_COLLECTION
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Collection::try_from).transpose()
    }

    async fn get_referrers(&self, id: &str) -> StorageResult<Vec<Collection>> {
        let rows: Vec<CollectionRow> = sqlx::query_as(&format!(
            "{} WHERE reference_id = ? ORDER BY seq ASC",
            SELECT_COLLECTION
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Collection::try_from).collect()
    }

    async fn update_collection(&self, collection: &Collection) -> StorageResult<()> {
        let facets = facets_to_json(collection)?;

        let mut tx = self.begin_write().await?;

        if !collection_exists(&mut *tx, &collection.id).await? {
            return Err(StorageError::CollectionNotFound {
                collection_id: collection.id.clone(),
            });
        }
        validate_links(&mut *tx, collection).await?;

        sqlx::query(
            r#"
            UPDATE collections
            SET name = ?, parent_id = ?, is_virtual = ?, reference_id = ?, query = ?, facets = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&collection.name)
        .bind(&collection.parent_id)
        .bind(collection.is_virtual)
        .bind(&collection.reference)
        .bind(&collection.query)
        .bind(&facets)
        .bind(collection.updated_at.to_rfc3339())
        .bind(&collection.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            collection_id = %collection.id,
            parent_id = ?collection.parent_id,
            reference = ?collection.reference,
            "Collection updated"
        );
        Ok(())
    }

    async fn delete_collection(&self, id: &str) -> StorageResult<()> {
        let mut tx = self.begin_write().await?;

        if !collection_exists(&mut *tx, id).await? {
            return Err(StorageError::CollectionNotFound {
                collection_id: id.to_string(),
            });
        }

        let children: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collections WHERE parent_id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if children > 0 {
            return Err(invalid_edit(
                id,
                format!("collection still has {} child collection(s)", children),
            ));
        }

        let referrers: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM collections WHERE reference_id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if referrers > 0 {
            return Err(invalid_edit(
                id,
                format!("collection is still referenced by {} collection(s)", referrers),
            ));
        }

        sqlx::query("DELETE FROM collections WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(collection_id = %id, "Collection deleted");
        Ok(())
    }
}

// Internal row type for SQLx mapping
#[derive(sqlx::FromRow)]
struct CollectionRow {
    id: String,
    name: String,
    parent_id: Option<String>,
    is_virtual: bool,
    reference_id: Option<String>,
    query: Option<String>,
    facets: String,
    created_at: String,
    updated_at: String,
}

fn parse_timestamp(id: &str, column: &str, value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Query {
            message: format!("Invalid {} for collection {}: {}", column, id, e),
        })
}

impl TryFrom<CollectionRow> for Collection {
    type Error = StorageError;

    fn try_from(row: CollectionRow) -> StorageResult<Self> {
        let facets = serde_json::from_str(&row.facets).map_err(|e| StorageError::Query {
            message: format!("Invalid facets for collection {}: {}", row.id, e),
        })?;
        let created_at = parse_timestamp(&row.id, "created_at", &row.created_at)?;
        let updated_at = parse_timestamp(&row.id, "updated_at", &row.updated_at)?;

        Ok(Self {
            id: row.id,
            name: row.name,
            parent_id: row.parent_id,
            is_virtual: row.is_virtual,
            reference: row.reference_id,
            query: row.query,
            facets,
            created_at,
            updated_at,
        })
    }
}
