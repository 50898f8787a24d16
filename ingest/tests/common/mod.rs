#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use health::HealthRegistry;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use ingest::router::router;
use ingest::store::{Document, DocumentStore, StoreError};
use ingest::time::TimeSource;

pub const NOW: &str = "2025-06-01T12:00:00Z";

#[derive(Clone)]
pub struct FixedTime {
    pub time: String,
}

impl FixedTime {
    pub fn new(time: &str) -> Self {
        Self {
            time: time.to_string(),
        }
    }
}

impl TimeSource for FixedTime {
    fn current_time(&self) -> String {
        self.time.to_string()
    }
}

/// Fails every call as if the database were unreachable.
#[derive(Clone, Default)]
pub struct FailingStore {}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn create(&self, _: &str, _: &Document) -> Result<(), StoreError> {
        Err(StoreError::Connection(sqlx::Error::PoolTimedOut))
    }

    async fn replace(&self, _: &str, _: &Document) -> Result<(), StoreError> {
        Err(StoreError::Connection(sqlx::Error::PoolTimedOut))
    }

    async fn get(&self, _: &str) -> Result<Option<Document>, StoreError> {
        Err(StoreError::Connection(sqlx::Error::PoolTimedOut))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Connection(sqlx::Error::PoolTimedOut))
    }

    fn collection(&self) -> &str {
        "devices"
    }
}

/// Never answers before the given delay.
#[derive(Clone)]
pub struct SleepStore {
    pub delay: Duration,
}

#[async_trait]
impl DocumentStore for SleepStore {
    async fn create(&self, _: &str, _: &Document) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn replace(&self, _: &str, _: &Document) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn get(&self, _: &str) -> Result<Option<Document>, StoreError> {
        tokio::time::sleep(self.delay).await;
        Ok(None)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn collection(&self) -> &str {
        "devices"
    }
}

pub fn test_router(
    store: Arc<dyn DocumentStore + Send + Sync>,
    event_hub_configured: bool,
) -> Router {
    router(
        FixedTime::new(NOW),
        store,
        HealthRegistry::new("liveness"),
        event_hub_configured,
        false,
    )
}

pub async fn post_item(app: Router, body: impl Into<Body>) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/add_item")
                .header("Content-Type", "application/json")
                .body(body.into())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

pub async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}
