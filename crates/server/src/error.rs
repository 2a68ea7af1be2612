// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy: internal kinds to compact HTTP envelopes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;
use vulcan_backends::RouteError;
use vulcan_engine::EngineError;
use vulcan_storage::StoreError;

/// An error ready to render as `{"error": "..."}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// Internal faults are logged in full and rendered opaque.
    pub fn internal(message: impl std::fmt::Display) -> Self {
        error!("internal error: {message}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        if e.is_not_found() {
            Self {
                status: StatusCode::NOT_FOUND,
                message: e.to_string(),
            }
        } else if e.is_conflict() {
            Self {
                status: StatusCode::CONFLICT,
                message: e.to_string(),
            }
        } else {
            Self::internal(e)
        }
    }
}

impl From<RouteError> for ApiError {
    fn from(e: RouteError) -> Self {
        let status = match e {
            RouteError::UnsupportedRuntime { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            RouteError::NoBackend(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Validation(message) => Self {
                status: StatusCode::BAD_REQUEST,
                message,
            },
            EngineError::Route(e) => e.into(),
            EngineError::Store(e) => e.into(),
            EngineError::SyncTimeout { id } => Self {
                status: StatusCode::GATEWAY_TIMEOUT,
                message: format!("workload {id} timed out"),
            },
        }
    }
}
