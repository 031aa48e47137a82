// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! QR Envelope Server - tamper-evident product identity tokens
//!
//! Issues encrypted, signed and HMAC-tagged envelopes for product and batch
//! QR codes, verifies scanned envelopes and records geolocated scans.
//!
//! ## Modules
//!
//! - `envelope` - Cipher, token signer, HMAC guard and the payload type
//! - `issuance` - Resumable batch issuance
//! - `scan` - Envelope classification and scan recording
//! - `geocode` - Single-flight reverse geocoding with a TTL cache
//! - `storage` - Store trait and the redb implementation
//! - `api` - HTTP API handlers (Axum)

pub mod api;
pub mod config;
pub mod envelope;
pub mod error;
pub mod geocode;
pub mod issuance;
pub mod models;
pub mod scan;
pub mod state;
pub mod storage;
