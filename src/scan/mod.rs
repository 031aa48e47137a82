// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Scan Routing
//!
//! [`EnvelopeRouter::classify_and_dispatch`] verifies a scanned envelope and
//! records the scan against whatever the verified payload names:
//!
//! - `Payload::Individual` → one scan entry for that product
//! - `Payload::Batch` → one entry per product of the batch plus one entry in
//!   the batch's own history, written in a single store transaction
//!
//! Nothing is written unless verification, location validation and the
//! lookup all succeed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::envelope::{Envelope, EnvelopeError, EnvelopeService, Payload};
use crate::geocode::{GeocodeProvider, GeocodeResolver};
use crate::storage::{
    BatchScan, BatchScanEntry, EnvelopeStore, GeoPoint, ProductRecord, ScanRecord, StoreError,
};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("batch {0} not found")]
    BatchNotFound(String),

    #[error("product {0} not found")]
    ProductNotFound(String),

    #[error("latitude must be within [-90, 90] and longitude within [-180, 180]")]
    InvalidLocation,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Public view of a product, without its envelope.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub uuid: String,
    pub batch_id: String,
    pub name: String,
    pub station_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ProductRecord> for ProductSummary {
    fn from(product: &ProductRecord) -> Self {
        Self {
            uuid: product.uuid.clone(),
            batch_id: product.batch_id.clone(),
            name: product.name.clone(),
            station_id: product.station_id.clone(),
            created_at: product.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Individual {
        product: ProductSummary,
        scan: ScanRecord,
    },
    Batch {
        batch_id: String,
        products: Vec<ProductSummary>,
        location_name: String,
        scanned_at: DateTime<Utc>,
    },
}

pub struct EnvelopeRouter<S, P> {
    store: Arc<S>,
    envelopes: Arc<EnvelopeService>,
    geocoder: GeocodeResolver<P>,
}

impl<S: EnvelopeStore, P: GeocodeProvider> EnvelopeRouter<S, P> {
    pub fn new(
        store: Arc<S>,
        envelopes: Arc<EnvelopeService>,
        geocoder: GeocodeResolver<P>,
    ) -> Self {
        Self {
            store,
            envelopes,
            geocoder,
        }
    }

    pub fn geocoder(&self) -> &GeocodeResolver<P> {
        &self.geocoder
    }

    pub async fn classify_and_dispatch(
        &self,
        envelope: &Envelope,
        location: GeoPoint,
    ) -> Result<ScanOutcome, ScanError> {
        let payload = self.envelopes.open(envelope)?;
        check_hint(envelope, &payload);

        if !location.is_valid() {
            return Err(ScanError::InvalidLocation);
        }

        match payload {
            Payload::Individual { uuid, .. } => self.scan_product(&uuid, location).await,
            Payload::Batch { batch_id } => self.scan_batch(&batch_id, location).await,
        }
    }

    async fn scan_product(&self, uuid: &str, location: GeoPoint) -> Result<ScanOutcome, ScanError> {
        let product = self
            .store
            .find_by_uuid(uuid)?
            .ok_or_else(|| ScanError::ProductNotFound(uuid.to_string()))?;

        let location_name = self
            .geocoder
            .resolve(location.latitude, location.longitude)
            .await;
        let scan = scan_entry(&product, location, &location_name, Utc::now());
        self.store.insert_scan_batch(std::slice::from_ref(&scan), None)?;

        info!(uuid = %product.uuid, batch_id = %product.batch_id, "Recorded product scan");

        Ok(ScanOutcome::Individual {
            product: ProductSummary::from(&product),
            scan,
        })
    }

    async fn scan_batch(&self, batch_id: &str, location: GeoPoint) -> Result<ScanOutcome, ScanError> {
        let products = self.store.find_by_batch_id(batch_id)?;
        if products.is_empty() {
            return Err(ScanError::BatchNotFound(batch_id.to_string()));
        }

        let location_name = self
            .geocoder
            .resolve(location.latitude, location.longitude)
            .await;
        let scanned_at = Utc::now();

        let entries: Vec<ScanRecord> = products
            .iter()
            .map(|product| scan_entry(product, location, &location_name, scanned_at))
            .collect();
        let history = BatchScan {
            batch_id: batch_id.to_string(),
            entry: BatchScanEntry {
                scanned_at,
                location,
                location_name: location_name.clone(),
            },
        };
        self.store.insert_scan_batch(&entries, Some(&history))?;

        info!(batch_id = %batch_id, products = products.len(), "Recorded batch scan");

        Ok(ScanOutcome::Batch {
            batch_id: batch_id.to_string(),
            products: products.iter().map(ProductSummary::from).collect(),
            location_name,
            scanned_at,
        })
    }
}

fn scan_entry(
    product: &ProductRecord,
    location: GeoPoint,
    location_name: &str,
    scanned_at: DateTime<Utc>,
) -> ScanRecord {
    ScanRecord {
        scan_id: Uuid::new_v4().to_string(),
        product_uuid: product.uuid.clone(),
        batch_id: product.batch_id.clone(),
        location,
        location_name: location_name.to_string(),
        scanned_at,
    }
}

/// Log when the unauthenticated hint disagrees with the verified payload.
fn check_hint(envelope: &Envelope, payload: &Payload) {
    let verified = match payload {
        Payload::Individual { uuid, .. } => uuid.as_str(),
        Payload::Batch { batch_id } => batch_id.as_str(),
    };
    if let Some(hint) = envelope.routing_hint() {
        if hint != verified {
            warn!(hint = %hint, verified = %verified, "Envelope routing hint does not match payload");
        }
    }
}
