// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST handlers and the SSE log stream.

use crate::dto::{
    BackendBody, CreateWorkloadRequest, LogHistoryResponse, LogLineBody, WorkloadBody,
    WorkloadListResponse,
};
use crate::error::ApiError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;
use vulcan_backends::BackendRegistry;
use vulcan_broker::{LogBroker, LogSubscription};
use vulcan_core::{LogLine, WorkloadId, WorkloadStatus};
use vulcan_engine::Engine;
use vulcan_storage::Store;

/// Shared server context for all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub store: Arc<Store>,
    pub broker: Arc<LogBroker>,
    pub registry: Arc<BackendRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/backends", get(backends))
        .route("/stats", get(stats))
        .route("/v1/workloads", post(create_sync).get(list_workloads))
        .route("/v1/workloads/async", post(create_async))
        .route("/v1/workloads/:id", get(get_workload).delete(delete_workload))
        .route("/v1/workloads/:id/logs", get(stream_logs))
        .route("/v1/workloads/:id/logs/history", get(log_history))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn backends(State(state): State<AppState>) -> Json<Vec<BackendBody>> {
    let bodies = state
        .registry
        .capabilities()
        .into_iter()
        .map(BackendBody::from)
        .collect();
    Json(bodies)
}

async fn stats(State(state): State<AppState>) -> Json<vulcan_storage::WorkloadStats> {
    Json(state.store.stats())
}

/// Body extraction with the error envelope instead of axum's default
/// plain-text rejection.
fn accept_body(
    body: Result<Json<CreateWorkloadRequest>, JsonRejection>,
) -> Result<CreateWorkloadRequest, ApiError> {
    match body {
        Ok(Json(request)) => Ok(request),
        Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
    }
}

async fn create_async(
    State(state): State<AppState>,
    body: Result<Json<CreateWorkloadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<WorkloadBody>), ApiError> {
    let request = accept_body(body)?;
    let row = state.engine.submit_async(request.into_submit())?;
    Ok((StatusCode::ACCEPTED, Json(row.into())))
}

async fn create_sync(
    State(state): State<AppState>,
    body: Result<Json<CreateWorkloadRequest>, JsonRejection>,
) -> Result<Json<WorkloadBody>, ApiError> {
    let request = accept_body(body)?;
    let row = state.engine.submit_sync(request.into_submit()).await?;
    Ok(Json(row.into()))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
    #[serde(default)]
    status: Option<String>,
}

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

async fn list_workloads(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<WorkloadListResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }
    let offset = params.offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::bad_request("offset must not be negative"));
    }

    let filter = match params.status.as_deref() {
        None => None,
        Some(raw) => Some(
            WorkloadStatus::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown status {raw:?}")))?,
        ),
    };

    let (rows, total) = state
        .store
        .list_workloads(limit as usize, offset as usize, filter);
    Ok(Json(WorkloadListResponse {
        workloads: rows.into_iter().map(WorkloadBody::from).collect(),
        total,
        limit: limit as usize,
        offset: offset as usize,
    }))
}

async fn get_workload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkloadBody>, ApiError> {
    let row = state.store.get_workload(&WorkloadId::new(id))?;
    Ok(Json(row.into()))
}

async fn delete_workload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkloadBody>, ApiError> {
    let prior = state.engine.delete(&WorkloadId::new(id))?;
    Ok(Json(prior.into()))
}

async fn log_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LogHistoryResponse>, ApiError> {
    let workload_id = WorkloadId::new(id);
    let lines = state.store.get_log_lines(&workload_id)?;
    Ok(Json(LogHistoryResponse {
        workload_id,
        lines: lines.into_iter().map(LogLineBody::from).collect(),
    }))
}

/// Streaming state for one SSE reader: persisted prefix first, then live
/// entries deduplicated by seq, then the `done` frame.
struct SseReader {
    history: VecDeque<LogLine>,
    next_seq: u64,
    live: Option<LogSubscription>,
    done_sent: bool,
}

impl SseReader {
    async fn next_event(&mut self) -> Option<Event> {
        if let Some(line) = self.history.pop_front() {
            self.next_seq = line.seq + 1;
            return Some(Event::default().data(line.line));
        }

        if let Some(live) = self.live.as_mut() {
            while let Some(entry) = live.recv().await {
                // Entries the history snapshot already covered.
                if entry.seq < self.next_seq {
                    continue;
                }
                self.next_seq = entry.seq + 1;
                return Some(Event::default().data(entry.line));
            }
            self.live = None;
        }

        if !self.done_sent {
            self.done_sent = true;
            return Some(Event::default().event("done").data(""));
        }
        None
    }
}

/// Live-stream + history fusion: one `data:` frame per log line, identical
/// during execution and after termination, closed by an `event: done`
/// frame.
async fn stream_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let workload_id = WorkloadId::new(id);
    let row = state.store.get_workload(&workload_id)?;

    // Subscribe before snapshotting history: every line is persisted
    // before it is published, so the two sources overlap rather than gap,
    // and seq-dedup removes the overlap.
    let live = (!row.is_terminal()).then(|| state.broker.subscribe(&workload_id));
    let history = state.store.get_log_lines(&workload_id).unwrap_or_default();
    debug!(workload_id = %workload_id, history = history.len(), live = live.is_some(), "log stream opened");

    let reader = SseReader {
        history: history.into(),
        next_seq: 0,
        live,
        done_sent: false,
    };

    let stream = futures_util::stream::unfold(reader, |mut reader| async move {
        reader
            .next_event()
            .await
            .map(|event| (Ok::<Event, Infallible>(event), reader))
    });

    let sse = Sse::new(stream).keep_alive(KeepAlive::default());
    let mut response = sse.into_response();
    let headers = response.headers_mut();
    headers.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("none"));
    Ok(response)
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
