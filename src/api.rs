// Copyright 2025 Memophor Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP API handlers for the analyzer companion.
//!
//! - `GET /healthz` - Service health and last known upstream status
//! - `GET /metrics` - Prometheus metrics export
//! - `GET /api/parameters` - Parameter catalogue
//! - `GET /api/samples/:kind` - Demo form contents
//! - `POST /api/classify` - Advisory range check of raw form values
//! - `POST /api/analyze` - Validate, analyze and archive
//! - `GET /api/progress` - Server-sent progress stages
//! - `GET|DELETE /api/history` - List or clear the archive
//! - `GET|DELETE /api/history/:id` - One entry
//! - `GET /api/history/:id/export.csv` - CSV report

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::{Stream, StreamExt};
use tokio::sync::watch;

use crate::error::AppError;
use crate::export;
use crate::metrics::Metrics;
use crate::model::{
    AnalyzeRequest, AnalyzeResponse, ClassifyRequest, ClearQuery, ClearResponse,
    HistoryListResponse, RemoveResponse, ServiceStatus,
};
use crate::parameters::{self, Assessment, ParameterDef, SampleKind, PARAMETERS};
use crate::workflow::Workflow;

#[derive(Clone)]
pub struct AppState {
    pub workflow: Workflow,
    pub metrics: Metrics,
    pub upstream: watch::Receiver<ServiceStatus>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .route("/api/parameters", get(list_parameters))
        .route("/api/samples/:kind", get(get_sample))
        .route("/api/classify", post(handle_classify))
        .route("/api/analyze", post(handle_analyze))
        .route("/api/progress", get(progress_stream))
        .route("/api/history", get(list_history).delete(clear_history))
        .route("/api/history/:id", get(get_history_entry).delete(remove_history_entry))
        .route("/api/history/:id/export.csv", get(export_history_entry))
        .with_state(state)
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let upstream = *state.upstream.borrow();
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": "compost-analyzer",
        "version": env!("CARGO_PKG_VERSION"),
        "upstream": upstream,
    })))
}

/// Metrics endpoint
pub async fn metrics(State(state): State<AppState>) -> Result<String, AppError> {
    state.metrics.export()
}

pub async fn list_parameters() -> Json<&'static [ParameterDef]> {
    let catalogue: &'static [ParameterDef] = &PARAMETERS;
    Json(catalogue)
}

pub async fn get_sample(
    Path(kind): Path<String>,
) -> Result<Json<std::collections::HashMap<String, String>>, AppError> {
    let kind: SampleKind = kind.parse().map_err(AppError::not_found)?;
    Ok(Json(parameters::sample(kind)))
}

/// Advisory only; never rejects a well-formed body.
pub async fn handle_classify(
    payload: Result<Json<ClassifyRequest>, JsonRejection>,
) -> Result<Json<Vec<Assessment>>, AppError> {
    let Json(request) = payload?;
    Ok(Json(parameters::assess(&request.into_texts())))
}

/// Validate, analyze and archive one submission
pub async fn handle_analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let Json(request) = payload?;
    let submission = state.workflow.submit(&request.into_texts()).await?;

    let response = AnalyzeResponse {
        assessments: parameters::assess_set(&submission.entry.inputs),
        entry: submission.entry,
        warning: submission.warning,
    };

    Ok(Json(response))
}

pub async fn progress_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = state.workflow.progress().subscribe().map(|event| {
        let sse = Event::default()
            .json_data(&event)
            .unwrap_or_else(|_| Event::default().comment("unencodable progress event"));
        Ok(sse)
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

pub async fn list_history(State(state): State<AppState>) -> Json<HistoryListResponse> {
    let entries = state.workflow.history().list().await;
    Json(HistoryListResponse {
        count: entries.len(),
        entries,
    })
}

pub async fn get_history_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<crate::model::HistoryEntry>, AppError> {
    state
        .workflow
        .history()
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("no history entry {id}")))
}

/// Idempotent: removing an unknown id reports `removed: false`
pub async fn remove_history_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RemoveResponse>, AppError> {
    let history = state.workflow.history();
    let removed = history.remove(id).await;
    state.metrics.update_history_size(history.len().await);

    let removed = removed.inspect_err(|_| state.metrics.record_persistence_failure())?;
    Ok(Json(RemoveResponse { id, removed }))
}

/// Destructive; requires `?confirm=true`
pub async fn clear_history(
    State(state): State<AppState>,
    query: Result<Query<ClearQuery>, QueryRejection>,
) -> Result<Json<ClearResponse>, AppError> {
    let Query(query) = query?;
    if !query.confirm {
        return Err(AppError::bad_request(
            "clearing history is irreversible; repeat with ?confirm=true",
        ));
    }

    let history = state.workflow.history();
    let cleared = history.clear().await;
    state.metrics.update_history_size(history.len().await);

    let cleared = cleared.inspect_err(|_| state.metrics.record_persistence_failure())?;
    Ok(Json(ClearResponse { cleared }))
}

pub async fn export_history_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let entry = state
        .workflow
        .history()
        .get(id)
        .await
        .ok_or_else(|| AppError::not_found(format!("no history entry {id}")))?;

    let disposition = format!("attachment; filename=\"{}\"", export::file_name(&entry));
    Ok((
        [
            (header::CONTENT_TYPE, export::CSV_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export::to_csv(&entry),
    ))
}
