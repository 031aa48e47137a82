// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Batch Issuance
//!
//! Mints product envelopes for a batch, a page at a time.
//!
//! ```text
//! Uninitialized ──issue──▶ InProgress ──issue (last slot)──▶ Complete
//!                              │  ▲                              │
//!                              └──┘ issue                issue ──▶ BatchComplete
//! ```
//!
//! The first call for a batch creates its record (with `total_count`
//! defaulting to the requested count) and mints the master envelope. Every
//! call is one store transaction: reservation, minting and persistence
//! commit together, so concurrent calls can never jointly overshoot the
//! total.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::envelope::{is_valid_identifier, Envelope, EnvelopeError, EnvelopeService, Payload};
use crate::storage::{
    BatchState, EnvelopeStore, MasterRecord, MintedUnits, ProductRecord, Reservation,
    SlotGrant, SlotRequest, StoreError,
};

/// Upper bound on the declared size of a new batch.
pub const MAX_BATCH_TOTAL: u32 = 10_000;

fn invalid_total() -> IssueError {
    IssueError::InvalidCount(format!(
        "totalCount must be between 1 and {MAX_BATCH_TOTAL}"
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error("batch {batch_id} is complete ({total_count} units issued)")]
    BatchComplete { batch_id: String, total_count: u32 },

    #[error("invalid {field}: expected 1-50 characters of [A-Za-z0-9-]")]
    InvalidIdentifier { field: &'static str },

    #[error("invalid count: {0}")]
    InvalidCount(String),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Input of [`BatchIssuer::issue`].
#[derive(Debug, Clone)]
pub struct IssueRequest {
    /// Existing batch to resume, or `None` for a fresh batch id.
    pub batch_id: Option<String>,
    pub name: String,
    pub station_id: String,
    pub requested_count: u32,
    /// Declared size of a new batch. Ignored when resuming.
    pub total_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedEnvelope {
    pub uuid: String,
    pub envelope: Envelope,
}

/// Result of one issuance page.
#[derive(Debug, Clone)]
pub struct IssueOutcome {
    pub batch_id: String,
    pub envelopes: Vec<IssuedEnvelope>,
    /// Master envelope, only on the call that created the batch.
    pub master: Option<Envelope>,
    pub issued_count: u32,
    pub total_count: u32,
    pub state: BatchState,
}

pub struct BatchIssuer<S> {
    store: Arc<S>,
    envelopes: Arc<EnvelopeService>,
}

impl<S: EnvelopeStore> BatchIssuer<S> {
    pub fn new(store: Arc<S>, envelopes: Arc<EnvelopeService>) -> Self {
        Self { store, envelopes }
    }

    pub fn issue(&self, request: IssueRequest) -> Result<IssueOutcome, IssueError> {
        validate(&request)?;

        let batch_id = request
            .batch_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now();
        let slot_request = SlotRequest {
            batch_id: batch_id.clone(),
            requested: request.requested_count,
            total_count: request.total_count.unwrap_or(request.requested_count),
            created_at: now,
        };

        let mut issued = Vec::new();
        let mut master = None;

        let mint = |grant: &SlotGrant| -> Result<MintedUnits, IssueError> {
            // Only a new batch takes its total from the request.
            if grant.created && grant.total_count > MAX_BATCH_TOTAL {
                return Err(invalid_total());
            }
            let mut units = MintedUnits::default();

            for _ in 0..grant.effective_count {
                let uuid = Uuid::new_v4().to_string();
                let payload = Payload::individual(&request.name, &request.station_id, &uuid);
                let envelope = self.envelopes.seal(&payload)?;

                units.products.push(ProductRecord {
                    uuid: uuid.clone(),
                    batch_id: grant.batch_id.clone(),
                    name: request.name.clone(),
                    station_id: request.station_id.clone(),
                    envelope: envelope.clone(),
                    created_at: now,
                });
                issued.push(IssuedEnvelope { uuid, envelope });
            }

            if grant.created {
                let envelope = self.envelopes.seal(&Payload::batch(&grant.batch_id))?;
                units.master = Some(MasterRecord {
                    batch_id: grant.batch_id.clone(),
                    envelope: envelope.clone(),
                    created_at: now,
                    scan_records: Vec::new(),
                });
                master = Some(envelope);
            }

            Ok(units)
        };
        let reservation = self.store.reserve_and_issue(&slot_request, mint)?;

        let grant = match reservation {
            Reservation::Granted(grant) => grant,
            // Stored batches always have a positive total, so a zero here is
            // a new batch declared empty.
            Reservation::Exhausted { total_count: 0 } => return Err(invalid_total()),
            Reservation::Exhausted { total_count } => {
                return Err(IssueError::BatchComplete {
                    batch_id,
                    total_count,
                })
            }
        };

        let issued_count = grant.issued_after();
        let state = if issued_count >= grant.total_count {
            BatchState::Complete
        } else {
            BatchState::InProgress
        };

        info!(
            batch_id = %batch_id,
            created = grant.created,
            minted = grant.effective_count,
            issued_count,
            total_count = grant.total_count,
            "Issued batch envelopes"
        );

        Ok(IssueOutcome {
            batch_id,
            envelopes: issued,
            master,
            issued_count,
            total_count: grant.total_count,
            state,
        })
    }
}

fn validate(request: &IssueRequest) -> Result<(), IssueError> {
    if !is_valid_identifier(&request.name) {
        return Err(IssueError::InvalidIdentifier { field: "name" });
    }
    if !is_valid_identifier(&request.station_id) {
        return Err(IssueError::InvalidIdentifier { field: "stationId" });
    }
    if let Some(batch_id) = &request.batch_id {
        if !is_valid_identifier(batch_id) {
            return Err(IssueError::InvalidIdentifier { field: "batchId" });
        }
    }
    if request.requested_count == 0 {
        return Err(IssueError::InvalidCount(
            "requestedCount must be at least 1".to_string(),
        ));
    }
    // totalCount is checked inside the transaction, once it is known
    // whether the batch already exists.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::tests::test_service;
    use crate::storage::database::tests::temp_store;
    use crate::storage::RedbStore;
    use std::collections::HashSet;
    use std::thread;

    fn issuer() -> (BatchIssuer<RedbStore>, Arc<RedbStore>, tempfile::TempDir) {
        let (store, dir) = temp_store();
        let store = Arc::new(store);
        let issuer = BatchIssuer::new(Arc::clone(&store), Arc::new(test_service()));
        (issuer, store, dir)
    }

    fn request(batch_id: Option<&str>, requested: u32, total: Option<u32>) -> IssueRequest {
        IssueRequest {
            batch_id: batch_id.map(str::to_string),
            name: "A1".to_string(),
            station_id: "ST1".to_string(),
            requested_count: requested,
            total_count: total,
        }
    }

    #[test]
    fn new_batch_mints_distinct_openable_envelopes() {
        let (issuer, store, _dir) = issuer();
        let outcome = issuer.issue(request(None, 3, None)).unwrap();

        assert_eq!(outcome.envelopes.len(), 3);
        assert_eq!(outcome.issued_count, 3);
        assert_eq!(outcome.total_count, 3);
        assert_eq!(outcome.state, BatchState::Complete);

        let uuids: HashSet<_> = outcome.envelopes.iter().map(|e| e.uuid.clone()).collect();
        assert_eq!(uuids.len(), 3);

        let service = test_service();
        for issued in &outcome.envelopes {
            assert_eq!(
                service.open(&issued.envelope).unwrap(),
                Payload::individual("A1", "ST1", &issued.uuid)
            );
            let product = store.find_by_uuid(&issued.uuid).unwrap().unwrap();
            assert_eq!(product.batch_id, outcome.batch_id);
        }

        let master = outcome.master.expect("first call mints the master");
        assert_eq!(
            service.open(&master).unwrap(),
            Payload::batch(&outcome.batch_id)
        );
        assert!(Uuid::parse_str(&outcome.batch_id).is_ok());
    }

    #[test]
    fn resumes_until_complete() {
        let (issuer, store, _dir) = issuer();

        let first = issuer.issue(request(Some("BATCH-7"), 2, Some(5))).unwrap();
        assert_eq!(first.envelopes.len(), 2);
        assert_eq!(first.state, BatchState::InProgress);
        assert!(first.master.is_some());

        let second = issuer.issue(request(Some("BATCH-7"), 10, None)).unwrap();
        assert_eq!(second.envelopes.len(), 3);
        assert_eq!(second.issued_count, 5);
        assert_eq!(second.state, BatchState::Complete);
        assert!(second.master.is_none());

        match issuer.issue(request(Some("BATCH-7"), 1, None)) {
            Err(IssueError::BatchComplete {
                batch_id,
                total_count,
            }) => {
                assert_eq!(batch_id, "BATCH-7");
                assert_eq!(total_count, 5);
            }
            other => panic!("expected BatchComplete, got {other:?}"),
        }

        assert_eq!(store.find_by_batch_id("BATCH-7").unwrap().len(), 5);
        let record = store.get_batch_record("BATCH-7").unwrap().unwrap();
        assert_eq!(record.issued_count, 5);
    }

    #[test]
    fn total_is_fixed_at_creation() {
        let (issuer, _store, _dir) = issuer();
        issuer.issue(request(Some("B-1"), 1, Some(2))).unwrap();
        let outcome = issuer.issue(request(Some("B-1"), 1, Some(9000))).unwrap();
        assert_eq!(outcome.total_count, 2);
        assert_eq!(outcome.state, BatchState::Complete);
    }

    #[test]
    fn resume_ignores_out_of_range_total() {
        let (issuer, store, _dir) = issuer();
        issuer.issue(request(Some("B-3"), 1, Some(3))).unwrap();

        let outcome = issuer
            .issue(request(Some("B-3"), MAX_BATCH_TOTAL + 1, None))
            .unwrap();
        assert_eq!(outcome.envelopes.len(), 2);
        assert_eq!(outcome.total_count, 3);
        assert_eq!(outcome.state, BatchState::Complete);
        assert_eq!(store.find_by_batch_id("B-3").unwrap().len(), 3);
    }

    #[test]
    fn resume_accepts_zero_total() {
        let (issuer, _store, _dir) = issuer();
        issuer.issue(request(Some("B-4"), 1, Some(2))).unwrap();

        let outcome = issuer.issue(request(Some("B-4"), 1, Some(0))).unwrap();
        assert_eq!(outcome.envelopes.len(), 1);
        assert_eq!(outcome.state, BatchState::Complete);
    }

    #[test]
    fn new_batch_total_is_bounded() {
        let (issuer, store, _dir) = issuer();

        for (id, requested, total) in [
            ("B-5", 1, Some(0)),
            ("B-6", 1, Some(MAX_BATCH_TOTAL + 1)),
            ("B-7", MAX_BATCH_TOTAL + 1, None),
        ] {
            assert!(matches!(
                issuer.issue(request(Some(id), requested, total)),
                Err(IssueError::InvalidCount(_))
            ));
            assert!(store.get_batch_record(id).unwrap().is_none());
            assert!(store.find_by_batch_id(id).unwrap().is_empty());
        }

        let at_limit = issuer
            .issue(request(Some("B-8"), 1, Some(MAX_BATCH_TOTAL)))
            .unwrap();
        assert_eq!(at_limit.total_count, MAX_BATCH_TOTAL);
    }

    #[test]
    fn rejects_invalid_input_without_state_change() {
        let (issuer, store, _dir) = issuer();

        let mut bad_name = request(Some("B-2"), 1, None);
        bad_name.name = "A 1".to_string();
        assert!(matches!(
            issuer.issue(bad_name),
            Err(IssueError::InvalidIdentifier { field: "name" })
        ));

        let mut bad_station = request(Some("B-2"), 1, None);
        bad_station.station_id = "x".repeat(51);
        assert!(matches!(
            issuer.issue(bad_station),
            Err(IssueError::InvalidIdentifier { field: "stationId" })
        ));

        assert!(matches!(
            issuer.issue(request(Some("B/2"), 1, None)),
            Err(IssueError::InvalidIdentifier { field: "batchId" })
        ));
        assert!(matches!(
            issuer.issue(request(Some("B-2"), 0, None)),
            Err(IssueError::InvalidCount(_))
        ));
        assert!(matches!(
            issuer.issue(request(Some("B-2"), 1, Some(MAX_BATCH_TOTAL + 1))),
            Err(IssueError::InvalidCount(_))
        ));

        assert!(store.get_batch_record("B-2").unwrap().is_none());
    }

    #[test]
    fn concurrent_issuance_never_exceeds_total() {
        let (issuer, store, _dir) = issuer();
        let issuer = Arc::new(issuer);
        issuer.issue(request(Some("RACE"), 1, Some(25))).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let issuer = Arc::clone(&issuer);
                thread::spawn(move || {
                    let mut minted = 0;
                    loop {
                        match issuer.issue(request(Some("RACE"), 3, None)) {
                            Ok(outcome) => {
                                assert!(outcome.issued_count <= 25);
                                minted += outcome.envelopes.len();
                            }
                            Err(IssueError::BatchComplete { .. }) => return minted,
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                })
            })
            .collect();

        let minted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(minted, 24);

        let record = store.get_batch_record("RACE").unwrap().unwrap();
        assert_eq!(record.issued_count, 25);
        assert_eq!(store.find_by_batch_id("RACE").unwrap().len(), 25);
    }
}
