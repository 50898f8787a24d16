use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ItemCreatedResponse {
    pub message: String,
    pub item_id: String,
    pub created_at: String,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_hub_config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request body is required")]
    EmptyBody,
    #[error("failed to parse request: {0}")]
    RequestParsingError(#[from] serde_json::Error),
    #[error("Request body must be a JSON object")]
    NotAnObject,
    #[error("Field '{0}' is required")]
    MissingField(&'static str),
    #[error("Field '{0}' must be a non-empty string")]
    InvalidField(&'static str),

    #[error("Item with this ID already exists")]
    ItemExists(String),
    #[error("Database operation failed")]
    StoreError(#[source] StoreError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(id) => ApiError::ItemExists(id),
            other => ApiError::StoreError(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::EmptyBody
            | ApiError::RequestParsingError(_)
            | ApiError::NotAnObject
            | ApiError::MissingField(_)
            | ApiError::InvalidField(_) => StatusCode::BAD_REQUEST,

            ApiError::ItemExists(_) => StatusCode::CONFLICT,

            ApiError::StoreError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
