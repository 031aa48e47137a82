// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{
    error::ApiError,
    models::{ScanHistoryQuery, ScanHistoryResponse, ScanRequest, ScanResponse},
    state::AppState,
    storage::EnvelopeStore,
};

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 500;

#[utoipa::path(
    post,
    path = "/v1/scan",
    request_body = ScanRequest,
    tag = "Scans",
    responses(
        (status = 200, description = "Scan recorded", body = ScanResponse),
        (status = 400, description = "Invalid or expired envelope"),
        (status = 404, description = "Product or batch not found"),
        (status = 422, description = "Coordinates out of range")
    )
)]
pub async fn scan_envelope(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, ApiError> {
    let outcome = state
        .router
        .classify_and_dispatch(&request.envelope, request.location)
        .await?;
    Ok(Json(outcome.into()))
}

#[utoipa::path(
    get,
    path = "/v1/products/{uuid}/scans",
    params(
        ("uuid" = String, Path, description = "Product identifier"),
        ScanHistoryQuery
    ),
    tag = "Scans",
    responses(
        (status = 200, body = ScanHistoryResponse),
        (status = 404, description = "Unknown product")
    )
)]
pub async fn list_product_scans(
    Path(uuid): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<ScanHistoryQuery>,
) -> Result<Json<ScanHistoryResponse>, ApiError> {
    if state.store.find_by_uuid(&uuid)?.is_none() {
        return Err(ApiError::not_found(format!("Product {uuid} not found")));
    }
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let scans = state.store.list_scans(&uuid, limit)?;
    Ok(Json(ScanHistoryResponse { uuid, scans }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::INVALID_ENVELOPE_MESSAGE;
    use crate::geocode::PLACEHOLDER_LOCATION;
    use crate::issuance::IssueRequest;
    use crate::models::ScanKind;
    use crate::state::tests::test_state;
    use crate::storage::GeoPoint;
    use axum::http::StatusCode;

    fn issue(state: &AppState, count: u32) -> crate::issuance::IssueOutcome {
        state
            .issuer
            .issue(IssueRequest {
                batch_id: None,
                name: "A1".to_string(),
                station_id: "ST1".to_string(),
                requested_count: count,
                total_count: None,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn master_scan_records_every_product() {
        let (state, _dir) = test_state();
        let outcome = issue(&state, 3);

        let Json(response) = scan_envelope(
            State(state.clone()),
            Json(ScanRequest {
                envelope: outcome.master.clone().unwrap(),
                location: GeoPoint::new(48.8566, 2.3522),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.kind, ScanKind::Batch);
        assert_eq!(response.batch_id, outcome.batch_id);
        assert_eq!(response.products.len(), 3);
        assert_eq!(response.recorded, 3);
        // Provider is unreachable in tests.
        assert_eq!(response.location_name, PLACEHOLDER_LOCATION);

        let uuid = outcome.envelopes[0].uuid.clone();
        let Json(history) = list_product_scans(
            Path(uuid.clone()),
            State(state),
            Query(ScanHistoryQuery { limit: None }),
        )
        .await
        .unwrap();
        assert_eq!(history.uuid, uuid);
        assert_eq!(history.scans.len(), 1);
    }

    #[tokio::test]
    async fn tampered_envelope_gets_uniform_error() {
        let (state, _dir) = test_state();
        let outcome = issue(&state, 1);

        let mut envelope = outcome.envelopes[0].envelope.clone();
        envelope.hmac = Some("00".repeat(32));

        let err = scan_envelope(
            State(state.clone()),
            Json(ScanRequest {
                envelope,
                location: GeoPoint::new(0.0, 0.0),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, INVALID_ENVELOPE_MESSAGE);

        let scans = state
            .store
            .list_scans(&outcome.envelopes[0].uuid, 10)
            .unwrap();
        assert!(scans.is_empty());
    }

    #[tokio::test]
    async fn out_of_range_location_rejected() {
        let (state, _dir) = test_state();
        let outcome = issue(&state, 1);

        let err = scan_envelope(
            State(state),
            Json(ScanRequest {
                envelope: outcome.envelopes[0].envelope.clone(),
                location: GeoPoint::new(120.0, 0.0),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn history_of_unknown_product_is_not_found() {
        let (state, _dir) = test_state();
        let err = list_product_scans(
            Path("missing".to_string()),
            State(state),
            Query(ScanHistoryQuery { limit: Some(5) }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
