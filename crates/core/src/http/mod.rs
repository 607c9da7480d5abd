use crate::config::{AppConfig, ConfigError};
use crate::service::{PredictError, PredictionService};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[cfg(test)]
mod router_test;

const LOG_TARGET: &str = "http";
const FILE_FIELD: &str = "file";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
}

impl AppState {
    pub fn new(service: PredictionService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PredictResponse {
    pub predicted_emotion: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("No file part")]
    NoFilePart,
    #[error("No selected file")]
    NoSelectedFile,
    #[error("{0}")]
    InvalidUpload(String),
    #[error("{0}")]
    Processing(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoFilePart | ApiError::NoSelectedFile | ApiError::InvalidUpload(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PredictError> for ApiError {
    fn from(e: PredictError) -> Self {
        ApiError::Processing(e.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::InvalidUpload(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Builds the public router: `POST /predict`, `GET /health`, CORS for the
/// configured origin, request tracing and the upload size limit.
pub fn router(state: AppState, config: &AppConfig) -> Result<Router, ConfigError> {
    let origin = HeaderValue::from_str(config.cors_origin.as_str())
        .map_err(|_| ConfigError::InvalidCorsOrigin(config.cors_origin.to_string()))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/predict", post(predict))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(config.upload_limit.max_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

async fn health() -> &'static str {
    "ok"
}

async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let (file_name, bytes) = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(e) => {
            tracing::debug!(target: LOG_TARGET, error = %e, "rejected upload");
            return Err(e);
        }
    };

    match state.service.predict_upload(&file_name, bytes).await {
        Ok(prediction) => Ok(Json(PredictResponse {
            predicted_emotion: prediction.label,
        })),
        Err(e) => {
            tracing::warn!(target: LOG_TARGET, file_name = %file_name, error = %e, "prediction failed");
            Err(e.into())
        }
    }
}

/// First `file` field that carries a filename, with its contents.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(String, Bytes), ApiError> {
    let mut multipart = multipart.map_err(|_| ApiError::NoFilePart)?;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        // A `file` part without a filename is a plain form value.
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        if file_name.is_empty() {
            return Err(ApiError::NoSelectedFile);
        }
        let bytes = field.bytes().await?;
        return Ok((file_name, bytes));
    }
    Err(ApiError::NoFilePart)
}
