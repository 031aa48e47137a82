// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the REST API. Field names are camelCase on
//! the wire to match the envelope payload format.
//!
//! ## Model Categories
//!
//! - **Issuance**: paging through a batch's envelopes
//! - **Scanning**: presenting an envelope with the scan location
//! - **History**: batch status and per-product scan history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::envelope::Envelope;
use crate::issuance::{IssueOutcome, IssueRequest, IssuedEnvelope};
use crate::scan::{ProductSummary, ScanOutcome};
use crate::storage::{BatchRecord, BatchState, GeoPoint, ScanRecord};

// =============================================================================
// Issuance Models
// =============================================================================

/// Request one page of envelopes for a batch.
///
/// Omit `batchId` to start a new batch under a generated id. Repeat the call
/// with the returned `batchId` until `state` is `complete`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueBatchRequest {
    #[serde(default)]
    pub batch_id: Option<String>,
    /// Station label, `[A-Za-z0-9-]{1,50}`.
    pub name: String,
    /// Station identifier, `[A-Za-z0-9-]{1,50}`.
    pub station_id: String,
    /// Units to mint in this call.
    pub requested_count: u32,
    /// Size of a new batch; defaults to `requestedCount`. Ignored when resuming.
    #[serde(default)]
    pub total_count: Option<u32>,
}

impl From<IssueBatchRequest> for IssueRequest {
    fn from(request: IssueBatchRequest) -> Self {
        IssueRequest {
            batch_id: request.batch_id,
            name: request.name,
            station_id: request.station_id,
            requested_count: request.requested_count,
            total_count: request.total_count,
        }
    }
}

/// Envelope minted for one product.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssuedProduct {
    pub uuid: String,
    pub envelope: Envelope,
}

impl From<IssuedEnvelope> for IssuedProduct {
    fn from(issued: IssuedEnvelope) -> Self {
        Self {
            uuid: issued.uuid,
            envelope: issued.envelope,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueBatchResponse {
    pub batch_id: String,
    pub envelopes: Vec<IssuedProduct>,
    /// Batch-level envelope; present only on the call that created the batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_envelope: Option<Envelope>,
    pub issued_count: u32,
    pub total_count: u32,
    pub state: BatchState,
}

impl From<IssueOutcome> for IssueBatchResponse {
    fn from(outcome: IssueOutcome) -> Self {
        Self {
            batch_id: outcome.batch_id,
            envelopes: outcome.envelopes.into_iter().map(Into::into).collect(),
            master_envelope: outcome.master,
            issued_count: outcome.issued_count,
            total_count: outcome.total_count,
            state: outcome.state,
        }
    }
}

/// Issuance progress of a batch.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusResponse {
    pub batch_id: String,
    pub total_count: u32,
    pub issued_count: u32,
    pub state: BatchState,
    pub created_at: DateTime<Utc>,
    /// Number of times the master envelope has been scanned.
    pub batch_scan_count: usize,
}

impl BatchStatusResponse {
    pub fn new(record: BatchRecord, batch_scan_count: usize) -> Self {
        Self {
            state: record.state(),
            batch_id: record.batch_id,
            total_count: record.total_count,
            issued_count: record.issued_count,
            created_at: record.created_at,
            batch_scan_count,
        }
    }
}

// =============================================================================
// Scan Models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    /// Envelope decoded from the QR code. Missing or ill-typed envelopes are
    /// rejected by verification, not by body parsing.
    #[serde(default)]
    pub envelope: Envelope,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanKind {
    Product,
    Batch,
}

/// Result of a recorded scan.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub kind: ScanKind,
    pub batch_id: String,
    /// The scanned product, or every product of the scanned batch.
    pub products: Vec<ProductSummary>,
    pub location_name: String,
    pub scanned_at: DateTime<Utc>,
    /// Number of scan entries written.
    pub recorded: usize,
}

impl From<ScanOutcome> for ScanResponse {
    fn from(outcome: ScanOutcome) -> Self {
        match outcome {
            ScanOutcome::Individual { product, scan } => Self {
                kind: ScanKind::Product,
                batch_id: product.batch_id.clone(),
                products: vec![product],
                location_name: scan.location_name,
                scanned_at: scan.scanned_at,
                recorded: 1,
            },
            ScanOutcome::Batch {
                batch_id,
                products,
                location_name,
                scanned_at,
            } => Self {
                kind: ScanKind::Batch,
                batch_id,
                recorded: products.len(),
                products,
                location_name,
                scanned_at,
            },
        }
    }
}

// =============================================================================
// History Models
// =============================================================================

#[derive(Debug, Deserialize, IntoParams)]
pub struct ScanHistoryQuery {
    /// Maximum entries to return (default 50, max 500).
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanHistoryResponse {
    pub uuid: String,
    /// Newest first.
    pub scans: Vec<ScanRecord>,
}
