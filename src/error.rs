// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Why a raw parameter value was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    Missing,
    NotANumber,
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationReason::Missing => f.write_str("missing"),
            ValidationReason::NotANumber => f.write_str("not a number"),
        }
    }
}

/// First invalid parameter found while validating a form submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Please check the value for {label} ({reason})")]
pub struct ValidationError {
    pub parameter: &'static str,
    pub label: &'static str,
    pub reason: ValidationReason,
}

/// Failure talking to the external analysis service.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// No response reached us: connect failure, timeout, broken stream.
    #[error("analysis service unreachable: {0}")]
    Transport(String),
    /// The service answered but declined the request.
    #[error("{message}")]
    Service { message: String },
}

impl AnalysisError {
    pub fn service<T: Into<String>>(message: T) -> Self {
        Self::Service {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Transport(_) => "transport",
            AnalysisError::Service { .. } => "service",
        }
    }
}

/// Reading or writing the persisted history archive failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("history storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("history storage backend failed: {0}")]
    Backend(String),
    #[error("failed to encode history archive: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("an analysis is already in progress")]
    Busy,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    pub fn bad_request<T: Into<String>>(message: T) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found<T: Into<String>>(message: T) -> Self {
        Self::NotFound(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Busy => StatusCode::CONFLICT,
            AppError::Analysis(_) => StatusCode::BAD_GATEWAY,
            AppError::Persistence(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
