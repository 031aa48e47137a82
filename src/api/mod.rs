// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    envelope::Envelope,
    models::{
        BatchStatusResponse, IssueBatchRequest, IssueBatchResponse, IssuedProduct,
        ScanHistoryResponse, ScanKind, ScanRequest, ScanResponse,
    },
    scan::ProductSummary,
    state::AppState,
    storage::{BatchScanEntry, BatchState, GeoPoint, ScanRecord},
};

pub mod batches;
pub mod health;
pub mod scans;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/batches/issue", post(batches::issue_batch))
        .route("/batches/{batch_id}", get(batches::get_batch))
        .route("/scan", post(scans::scan_envelope))
        .route("/products/{uuid}/scans", get(scans::list_product_scans))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        batches::issue_batch,
        batches::get_batch,
        scans::scan_envelope,
        scans::list_product_scans,
        health::health,
        health::liveness
    ),
    components(
        schemas(
            Envelope,
            GeoPoint,
            BatchState,
            BatchScanEntry,
            ScanRecord,
            ProductSummary,
            IssueBatchRequest,
            IssueBatchResponse,
            IssuedProduct,
            BatchStatusResponse,
            ScanRequest,
            ScanResponse,
            ScanKind,
            ScanHistoryResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Batches", description = "Batch envelope issuance"),
        (name = "Scans", description = "Envelope verification and scan recording"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
