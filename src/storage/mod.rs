// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage
//!
//! Records owned by the store and the [`EnvelopeStore`] trait the core
//! consumes. [`RedbStore`] is the embedded ACID implementation.
//!
//! ## Atomicity
//!
//! - [`EnvelopeStore::reserve_and_issue`] reads the batch counter, mints,
//!   inserts the products and advances `issued_count` in one serialized
//!   transaction. Concurrent calls on the same batch can never jointly
//!   exceed `total_count`.
//! - [`EnvelopeStore::insert_scan_batch`] writes every scan entry (and the
//!   batch's own history entry) or none of them.

pub mod database;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::envelope::Envelope;

pub use database::RedbStore;

/// Errors raised by store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// WGS84 coordinates of a scan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite and inside [-90, 90] x [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Lifecycle of a batch. A batch without a record is uninitialized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    InProgress,
    Complete,
}

/// Issuance counters of a batch. `issued_count` only ever grows and never
/// passes `total_count`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub batch_id: String,
    pub total_count: u32,
    pub issued_count: u32,
    pub created_at: DateTime<Utc>,
}

impl BatchRecord {
    pub fn new(batch_id: impl Into<String>, total_count: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            batch_id: batch_id.into(),
            total_count,
            issued_count: 0,
            created_at,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.total_count.saturating_sub(self.issued_count)
    }

    pub fn state(&self) -> BatchState {
        if self.remaining() == 0 {
            BatchState::Complete
        } else {
            BatchState::InProgress
        }
    }
}

/// An issued product. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub uuid: String,
    pub batch_id: String,
    pub name: String,
    pub station_id: String,
    pub envelope: Envelope,
    pub created_at: DateTime<Utc>,
}

/// One entry of a batch's own scan history.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchScanEntry {
    pub scanned_at: DateTime<Utc>,
    pub location: GeoPoint,
    pub location_name: String,
}

/// The batch-level ("master") envelope and its scan history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MasterRecord {
    pub batch_id: String,
    pub envelope: Envelope,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub scan_records: Vec<BatchScanEntry>,
}

/// A recorded scan of one product.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub scan_id: String,
    pub product_uuid: String,
    pub batch_id: String,
    pub location: GeoPoint,
    pub location_name: String,
    pub scanned_at: DateTime<Utc>,
}

/// Batch history append that accompanies a batch-scan fan-out.
#[derive(Debug, Clone)]
pub struct BatchScan {
    pub batch_id: String,
    pub entry: BatchScanEntry,
}

/// Input of [`EnvelopeStore::reserve_and_issue`].
#[derive(Debug, Clone)]
pub struct SlotRequest {
    pub batch_id: String,
    /// Units asked for in this call.
    pub requested: u32,
    /// Total of the batch if this call creates it; ignored otherwise.
    pub total_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Slots granted to the minting closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotGrant {
    pub batch_id: String,
    /// `true` when this call created the batch record.
    pub created: bool,
    pub effective_count: u32,
    pub issued_before: u32,
    pub total_count: u32,
}

impl SlotGrant {
    pub fn issued_after(&self) -> u32 {
        self.issued_before + self.effective_count
    }
}

/// Records produced by the minting closure for a grant.
#[derive(Debug, Clone, Default)]
pub struct MintedUnits {
    pub products: Vec<ProductRecord>,
    /// Master envelope, present only when the grant created the batch.
    pub master: Option<MasterRecord>,
}

/// Outcome of a reservation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    Granted(SlotGrant),
    /// Nothing left; no state was touched.
    Exhausted { total_count: u32 },
}

/// Store operations consumed by issuance and scanning.
pub trait EnvelopeStore: Send + Sync + 'static {
    fn find_by_uuid(&self, uuid: &str) -> StoreResult<Option<ProductRecord>>;

    fn find_by_batch_id(&self, batch_id: &str) -> StoreResult<Vec<ProductRecord>>;

    /// Insert a single product; fails with `Conflict` on a duplicate uuid.
    fn insert_product(&self, product: &ProductRecord) -> StoreResult<()>;

    /// Write all entries plus the optional batch history append atomically.
    fn insert_scan_batch(&self, entries: &[ScanRecord], batch_scan: Option<&BatchScan>)
        -> StoreResult<()>;

    fn get_batch_record(&self, batch_id: &str) -> StoreResult<Option<BatchRecord>>;

    fn upsert_batch_record(&self, record: &BatchRecord) -> StoreResult<()>;

    fn get_master(&self, batch_id: &str) -> StoreResult<Option<MasterRecord>>;

    /// Newest-first scans of a product.
    fn list_scans(&self, uuid: &str, limit: usize) -> StoreResult<Vec<ScanRecord>>;

    /// Reserve up to `request.requested` slots, run `mint` for the grant and
    /// persist its output, all in one transaction. An error from `mint`
    /// rolls everything back.
    fn reserve_and_issue<F, E>(&self, request: &SlotRequest, mint: F) -> Result<Reservation, E>
    where
        F: FnOnce(&SlotGrant) -> Result<MintedUnits, E>,
        E: From<StoreError>;

    /// Cheap liveness probe.
    fn health_check(&self) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_point_bounds() {
        assert!(GeoPoint::new(48.85, 2.35).is_valid());
        assert!(GeoPoint::new(-90.0, 180.0).is_valid());
        assert!(!GeoPoint::new(90.1, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, -180.5).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn batch_record_state() {
        let mut record = BatchRecord::new("B-1", 3, Utc::now());
        assert_eq!(record.remaining(), 3);
        assert_eq!(record.state(), BatchState::InProgress);
        record.issued_count = 3;
        assert_eq!(record.remaining(), 0);
        assert_eq!(record.state(), BatchState::Complete);
    }

    #[test]
    fn grant_issued_after() {
        let grant = SlotGrant {
            batch_id: "B-1".into(),
            created: false,
            effective_count: 2,
            issued_before: 3,
            total_count: 5,
        };
        assert_eq!(grant.issued_after(), 5);
    }
}
