use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Document, DocumentStore, StoreError};

/// Keeps the collection in process memory, for local runs and tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collection: String,
    documents: Arc<RwLock<HashMap<String, Document>>>,
}

impl MemoryStore {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_owned(),
            documents: Default::default(),
        }
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, id: &str, body: &Document) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        if documents.contains_key(id) {
            return Err(StoreError::Conflict(id.to_owned()));
        }
        drop(documents.insert(id.to_owned(), body.clone()));
        Ok(())
    }

    async fn replace(&self, id: &str, body: &Document) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        match documents.get_mut(id) {
            Some(existing) => {
                *existing = body.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(id.to_owned())),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}
