pub mod provision;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::inventory::AmbiguousKeyError;
use crate::provision::ProvisionError;

/// Error response format shared by all endpoints
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// API error type
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.into(),
        }
    }

    pub fn precondition_failed(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::PRECONDITION_FAILED,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse::new(self.message)),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Typed workflow errors first (no fragile string matching)
        if let Some(p) = err.downcast_ref::<ProvisionError>() {
            return match p {
                ProvisionError::Validation(_) => Self::bad_request(p.to_string()),
                ProvisionError::PoolExhausted(_) => Self::conflict(p.to_string()),
                ProvisionError::MissingPrerequisite(_) => {
                    Self::precondition_failed(p.to_string())
                }
            };
        }
        if let Some(a) = err.downcast_ref::<AmbiguousKeyError>() {
            return Self::conflict(a.to_string());
        }
        Self::internal(err.to_string())
    }
}

/// Healthcheck endpoint — returns 200 OK with status
pub async fn healthcheck() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "popforge",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
