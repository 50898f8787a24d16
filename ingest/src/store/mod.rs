use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub type Document = Map<String, Value>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("item {0} already exists")]
    Conflict(String),
    #[error("item {0} does not exist")]
    NotFound(String),
    #[error("invalid collection name {0:?}")]
    InvalidCollection(String),
    #[error("store connection failed with: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("{command} query failed with: {error}")]
    Query {
        command: &'static str,
        #[source]
        error: sqlx::Error,
    },
}

/// A keyed document store over one named collection.
///
/// Implementations must accept concurrent calls from independent tasks.
#[async_trait]
pub trait DocumentStore {
    /// Inserts a new document, fails with `Conflict` without touching the
    /// stored one when the id is already present.
    async fn create(&self, id: &str, body: &Document) -> Result<(), StoreError>;

    /// Overwrites an existing document, fails with `NotFound` otherwise.
    async fn replace(&self, id: &str, body: &Document) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// Checks that the store can be reached.
    async fn ping(&self) -> Result<(), StoreError>;

    fn collection(&self) -> &str;
}
