use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use metrics::counter;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::api::{ApiError, HealthResponse, ItemCreatedResponse};
use crate::router;

pub const PROCESSED_BY: &str = "ingest-http";

const REQUIRED_FIELDS: [&str; 2] = ["id", "name"];

/// Validates an item and creates it. An existing id is reported as a
/// conflict and the stored item is left untouched.
#[instrument(skip_all)]
pub async fn add_item(
    State(state): State<router::State>,
    body: Bytes,
) -> Result<(StatusCode, Json<ItemCreatedResponse>), ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::EmptyBody);
    }

    let mut item = match serde_json::from_slice::<Value>(&body)? {
        value if is_blank(&value) => return Err(ApiError::EmptyBody),
        Value::Object(item) => item,
        _ => return Err(ApiError::NotAnObject),
    };

    for field in REQUIRED_FIELDS {
        if !item.contains_key(field) {
            return Err(ApiError::MissingField(field));
        }
    }
    let id = match item.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        _ => return Err(ApiError::InvalidField("id")),
    };

    let created_at = state.timesource.current_time();
    drop(item.insert("created_at".to_owned(), Value::String(created_at.clone())));
    drop(item.insert(
        "processed_by".to_owned(),
        Value::String(PROCESSED_BY.to_owned()),
    ));

    if let Err(err) = state.store.create(&id, &item).await {
        let err = ApiError::from(err);
        match &err {
            ApiError::ItemExists(id) => {
                counter!("ingest_items_total", "outcome" => "conflict").increment(1);
                warn!("item with id {} already exists", id);
            }
            _ => {
                counter!("ingest_items_total", "outcome" => "failed").increment(1);
                error!("failed to create item {}: {:?}", id, err);
            }
        }
        return Err(err);
    }

    counter!("ingest_items_total", "outcome" => "created").increment(1);
    info!("added item {} to {}", id, state.store.collection());

    Ok((
        StatusCode::CREATED,
        Json(ItemCreatedResponse {
            message: "Item added successfully".to_owned(),
            item_id: id,
            created_at,
        }),
    ))
}

/// An empty object, array or string, `null`, `false` and zero all count as a
/// missing body.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Reports store connectivity and whether the stream side is configured.
pub async fn health(State(state): State<router::State>) -> (StatusCode, Json<HealthResponse>) {
    let timestamp = state.timesource.current_time();

    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_owned(),
                timestamp,
                store: Some("connected".to_owned()),
                event_hub_config: Some(
                    match state.event_hub_configured {
                        true => "configured",
                        false => "missing",
                    }
                    .to_owned(),
                ),
                error: None,
            }),
        ),
        Err(err) => {
            error!("health check failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(HealthResponse {
                    status: "unhealthy".to_owned(),
                    timestamp,
                    store: None,
                    event_hub_config: None,
                    error: Some(err.to_string()),
                }),
            )
        }
    }
}

pub async fn deployment_check() -> &'static str {
    "Hello from ingest! Deployment is working correctly."
}
