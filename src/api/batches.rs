// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::ApiError,
    models::{BatchStatusResponse, IssueBatchRequest, IssueBatchResponse},
    state::AppState,
    storage::EnvelopeStore,
};

#[utoipa::path(
    post,
    path = "/v1/batches/issue",
    request_body = IssueBatchRequest,
    tag = "Batches",
    responses(
        (status = 201, description = "Batch created and first page issued", body = IssueBatchResponse),
        (status = 200, description = "Next page of an existing batch issued", body = IssueBatchResponse),
        (status = 409, description = "Batch already fully issued"),
        (status = 422, description = "Invalid identifier or count")
    )
)]
pub async fn issue_batch(
    State(state): State<AppState>,
    Json(request): Json<IssueBatchRequest>,
) -> Result<(StatusCode, Json<IssueBatchResponse>), ApiError> {
    let outcome = state.issuer.issue(request.into())?;
    let status = if outcome.master.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.into())))
}

#[utoipa::path(
    get,
    path = "/v1/batches/{batch_id}",
    params(
        ("batch_id" = String, Path, description = "Batch identifier")
    ),
    tag = "Batches",
    responses(
        (status = 200, body = BatchStatusResponse),
        (status = 404, description = "Unknown batch")
    )
)]
pub async fn get_batch(
    Path(batch_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<BatchStatusResponse>, ApiError> {
    let record = state
        .store
        .get_batch_record(&batch_id)?
        .ok_or_else(|| ApiError::not_found(format!("Batch {batch_id} not found")))?;
    let batch_scans = state
        .store
        .get_master(&batch_id)?
        .map(|master| master.scan_records.len())
        .unwrap_or(0);
    Ok(Json(BatchStatusResponse::new(record, batch_scans)))
}
