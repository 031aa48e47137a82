// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded envelope database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `products`: uuid → serialized ProductRecord
//! - `batch_products`: composite key (batch_id|uuid) → uuid
//! - `batches`: batch_id → serialized BatchRecord
//! - `masters`: batch_id → serialized MasterRecord
//! - `scans`: composite key (uuid|!timestamp|scan_id) → serialized ScanRecord
//!
//! redb runs one write transaction at a time, which is what makes the
//! check-and-reserve in [`RedbStore::reserve_and_issue`] atomic.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::{
    BatchRecord, BatchScan, EnvelopeStore, MasterRecord, MintedUnits, ProductRecord,
    Reservation, ScanRecord, SlotGrant, SlotRequest, StoreError, StoreResult,
};

// =============================================================================
// Table Definitions
// =============================================================================

const PRODUCTS: TableDefinition<&str, &[u8]> = TableDefinition::new("products");

/// Key format: `batch_id|uuid`.
const BATCH_PRODUCTS: TableDefinition<&[u8], &str> = TableDefinition::new("batch_products");

const BATCHES: TableDefinition<&str, &[u8]> = TableDefinition::new("batches");

const MASTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("masters");

/// Key format: `uuid|!timestamp_be|scan_id` for newest-first range scans.
const SCANS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("scans");

// =============================================================================
// Index Key Helpers
// =============================================================================

fn make_batch_key(batch_id: &str, uuid: &str) -> Vec<u8> {
    let mut key = make_prefix(batch_id);
    key.extend_from_slice(uuid.as_bytes());
    key
}

/// Composite scan key. The inverted timestamp sorts newer scans first.
fn make_scan_key(uuid: &str, timestamp_millis: i64, scan_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(uuid.len() + 1 + 8 + 1 + scan_id.len());
    key.extend_from_slice(uuid.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&(!timestamp_millis as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(scan_id.as_bytes());
    key
}

fn make_prefix(id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(id.len() + 1);
    prefix.extend_from_slice(id.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Exclusive upper bound for a prefix scan. Identifiers never contain `|`,
/// so the successor byte of the separator bounds every key of `id`.
fn make_prefix_end(id: &str) -> Vec<u8> {
    let mut end = Vec::with_capacity(id.len() + 1);
    end.extend_from_slice(id.as_bytes());
    end.push(b'|' + 1);
    end
}

// =============================================================================
// RedbStore
// =============================================================================

/// redb-backed [`EnvelopeStore`].
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PRODUCTS)?;
            let _ = write_txn.open_table(BATCH_PRODUCTS)?;
            let _ = write_txn.open_table(BATCHES)?;
            let _ = write_txn.open_table(MASTERS)?;
            let _ = write_txn.open_table(SCANS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    fn put_product(
        products: &mut redb::Table<'_, &'static str, &'static [u8]>,
        index: &mut redb::Table<'_, &'static [u8], &'static str>,
        product: &ProductRecord,
    ) -> StoreResult<()> {
        if products.get(product.uuid.as_str())?.is_some() {
            return Err(StoreError::Conflict(format!("Product {}", product.uuid)));
        }
        let json = serde_json::to_vec(product)?;
        products.insert(product.uuid.as_str(), json.as_slice())?;
        let key = make_batch_key(&product.batch_id, &product.uuid);
        index.insert(key.as_slice(), product.uuid.as_str())?;
        Ok(())
    }

    fn read_batch(
        table: &impl ReadableTable<&'static str, &'static [u8]>,
        batch_id: &str,
    ) -> StoreResult<Option<BatchRecord>> {
        match table.get(batch_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }
}

impl EnvelopeStore for RedbStore {
    fn find_by_uuid(&self, uuid: &str) -> StoreResult<Option<ProductRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRODUCTS)?;
        match table.get(uuid)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn find_by_batch_id(&self, batch_id: &str) -> StoreResult<Vec<ProductRecord>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(BATCH_PRODUCTS)?;
        let products = read_txn.open_table(PRODUCTS)?;

        let start = make_prefix(batch_id);
        let end = make_prefix_end(batch_id);

        let mut results = Vec::new();
        for entry in index.range(start.as_slice()..end.as_slice())? {
            let (_, uuid) = entry?;
            if let Some(value) = products.get(uuid.value())? {
                results.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(results)
    }

    fn insert_product(&self, product: &ProductRecord) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut products = write_txn.open_table(PRODUCTS)?;
            let mut index = write_txn.open_table(BATCH_PRODUCTS)?;
            Self::put_product(&mut products, &mut index, product)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn insert_scan_batch(
        &self,
        entries: &[ScanRecord],
        batch_scan: Option<&BatchScan>,
    ) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut scans = write_txn.open_table(SCANS)?;
            for scan in entries {
                let key = make_scan_key(
                    &scan.product_uuid,
                    scan.scanned_at.timestamp_millis(),
                    &scan.scan_id,
                );
                let json = serde_json::to_vec(scan)?;
                scans.insert(key.as_slice(), json.as_slice())?;
            }

            if let Some(batch_scan) = batch_scan {
                let mut masters = write_txn.open_table(MASTERS)?;
                // Read and deserialize before mutating
                let existing = {
                    let value = masters.get(batch_scan.batch_id.as_str())?.ok_or_else(|| {
                        StoreError::NotFound(format!("Master envelope {}", batch_scan.batch_id))
                    })?;
                    value.value().to_vec()
                };
                let mut master: MasterRecord = serde_json::from_slice(&existing)?;
                master.scan_records.push(batch_scan.entry.clone());
                let json = serde_json::to_vec(&master)?;
                masters.insert(batch_scan.batch_id.as_str(), json.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_batch_record(&self, batch_id: &str) -> StoreResult<Option<BatchRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BATCHES)?;
        Self::read_batch(&table, batch_id)
    }

    fn upsert_batch_record(&self, record: &BatchRecord) -> StoreResult<()> {
        let json = serde_json::to_vec(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(BATCHES)?;
            table.insert(record.batch_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_master(&self, batch_id: &str) -> StoreResult<Option<MasterRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MASTERS)?;
        match table.get(batch_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn list_scans(&self, uuid: &str, limit: usize) -> StoreResult<Vec<ScanRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SCANS)?;

        let start = make_prefix(uuid);
        let end = make_prefix_end(uuid);

        let mut results = Vec::with_capacity(limit.min(64));
        for entry in table.range(start.as_slice()..end.as_slice())? {
            if results.len() >= limit {
                break;
            }
            let (_, value) = entry?;
            results.push(serde_json::from_slice(value.value())?);
        }
        Ok(results)
    }

    fn reserve_and_issue<F, E>(&self, request: &SlotRequest, mint: F) -> Result<Reservation, E>
    where
        F: FnOnce(&SlotGrant) -> Result<MintedUnits, E>,
        E: From<StoreError>,
    {
        let write_txn = self.db.begin_write().map_err(StoreError::from)?;
        let grant = {
            let mut batches = write_txn.open_table(BATCHES).map_err(StoreError::from)?;

            let (mut record, created) = match Self::read_batch(&batches, &request.batch_id)? {
                Some(record) => (record, false),
                None => (
                    BatchRecord::new(&request.batch_id, request.total_count, request.created_at),
                    true,
                ),
            };

            let remaining = record.remaining();
            if remaining == 0 {
                // Dropping the transaction aborts it; nothing was written.
                return Ok(Reservation::Exhausted {
                    total_count: record.total_count,
                });
            }

            let grant = SlotGrant {
                batch_id: request.batch_id.clone(),
                created,
                effective_count: request.requested.min(remaining),
                issued_before: record.issued_count,
                total_count: record.total_count,
            };

            let minted = mint(&grant)?;
            if minted.products.len() != grant.effective_count as usize {
                return Err(StoreError::Conflict(format!(
                    "minted {} products for {} reserved slots",
                    minted.products.len(),
                    grant.effective_count
                ))
                .into());
            }

            {
                let mut products = write_txn.open_table(PRODUCTS).map_err(StoreError::from)?;
                let mut index = write_txn.open_table(BATCH_PRODUCTS).map_err(StoreError::from)?;
                for product in &minted.products {
                    Self::put_product(&mut products, &mut index, product)?;
                }
            }

            if let Some(master) = &minted.master {
                let mut masters = write_txn.open_table(MASTERS).map_err(StoreError::from)?;
                if masters
                    .get(master.batch_id.as_str())
                    .map_err(StoreError::from)?
                    .is_some()
                {
                    return Err(StoreError::Conflict(format!(
                        "Master envelope {}",
                        master.batch_id
                    ))
                    .into());
                }
                let json = serde_json::to_vec(master).map_err(StoreError::from)?;
                masters
                    .insert(master.batch_id.as_str(), json.as_slice())
                    .map_err(StoreError::from)?;
            }

            record.issued_count = grant.issued_after();
            let json = serde_json::to_vec(&record).map_err(StoreError::from)?;
            batches
                .insert(record.batch_id.as_str(), json.as_slice())
                .map_err(StoreError::from)?;
            grant
        };
        write_txn.commit().map_err(StoreError::from)?;
        Ok(Reservation::Granted(grant))
    }

    fn health_check(&self) -> StoreResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(BATCHES)?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
