use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;

use super::{Document, DocumentStore, StoreError};

/// A collection stored as a PostgreSQL table of JSONB documents keyed by id.
#[derive(Clone)]
pub struct PgDocumentStore {
    table: String,
    pool: PgPool,
}

impl PgDocumentStore {
    /// Connects to the database and creates the collection table if missing.
    pub async fn new(
        collection: &str,
        url: &str,
        max_connections: u32,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(StoreError::Connection)?;

        Self::new_from_pool(collection, pool).await
    }

    pub async fn new_from_pool(collection: &str, pool: PgPool) -> Result<Self, StoreError> {
        // The name ends up quoted in SQL, sqlx cannot bind identifiers
        if collection.is_empty()
            || !collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(StoreError::InvalidCollection(collection.to_owned()));
        }

        let store = Self {
            table: collection.to_owned(),
            pool,
        };
        store.ensure_table().await?;
        Ok(store)
    }

    async fn ensure_table(&self) -> Result<(), StoreError> {
        let query = format!(
            r#"
CREATE TABLE IF NOT EXISTS "{0}" (
    id TEXT PRIMARY KEY,
    body JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ
)
            "#,
            &self.table
        );

        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::Query {
                command: "CREATE TABLE",
                error,
            })?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn create(&self, id: &str, body: &Document) -> Result<(), StoreError> {
        let query = format!(
            r#"
INSERT INTO "{0}"
    (id, body)
VALUES
    ($1, $2)
ON CONFLICT (id) DO NOTHING
            "#,
            &self.table
        );

        let result = sqlx::query(&query)
            .bind(id)
            .bind(Json(body))
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::Query {
                command: "INSERT",
                error,
            })?;

        match result.rows_affected() {
            0 => Err(StoreError::Conflict(id.to_owned())),
            _ => Ok(()),
        }
    }

    async fn replace(&self, id: &str, body: &Document) -> Result<(), StoreError> {
        let query = format!(
            r#"
UPDATE "{0}"
SET
    body = $2,
    updated_at = NOW()
WHERE
    id = $1
            "#,
            &self.table
        );

        let result = sqlx::query(&query)
            .bind(id)
            .bind(Json(body))
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::Query {
                command: "UPDATE",
                error,
            })?;

        match result.rows_affected() {
            0 => Err(StoreError::NotFound(id.to_owned())),
            _ => Ok(()),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let query = format!(r#"SELECT body FROM "{0}" WHERE id = $1"#, &self.table);

        let row: Option<(Json<Document>,)> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| StoreError::Query {
                command: "SELECT",
                error,
            })?;

        Ok(row.map(|(Json(body),)| body))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StoreError::Connection)?;
        Ok(())
    }

    fn collection(&self) -> &str {
        &self.table
    }
}
