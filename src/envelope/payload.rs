// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Plaintext payloads carried inside envelopes.
//!
//! A payload identifies exactly one product (`uuid`) or one batch
//! (`batchId`). [`Payload::parse`] is the only way to build one from
//! decrypted bytes, so a payload with both or neither tag cannot exist.

use serde::{Deserialize, Serialize};

use super::EnvelopeError;

/// Maximum length of station labels and identifiers.
pub const MAX_IDENTIFIER_LEN: usize = 50;

/// Check the `[A-Za-z0-9-]{1,50}` identifier constraint.
pub fn is_valid_identifier(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_IDENTIFIER_LEN
        && value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

/// Verified envelope payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Individual {
        name: String,
        station_id: String,
        uuid: String,
    },
    Batch {
        batch_id: String,
    },
}

/// Wire shape of the plaintext. Every field is optional so that the tag
/// check happens in [`Payload::parse`] rather than in serde.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    station_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    batch_id: Option<String>,
}

impl Payload {
    pub fn individual(
        name: impl Into<String>,
        station_id: impl Into<String>,
        uuid: impl Into<String>,
    ) -> Self {
        Payload::Individual {
            name: name.into(),
            station_id: station_id.into(),
            uuid: uuid.into(),
        }
    }

    pub fn batch(batch_id: impl Into<String>) -> Self {
        Payload::Batch {
            batch_id: batch_id.into(),
        }
    }

    /// Classify decrypted bytes.
    ///
    /// Bytes that are not a JSON object of string fields are `PayloadCorrupt`;
    /// an object with neither or both of `uuid`/`batchId` is
    /// `UnrecognizedEnvelopeType`.
    pub fn parse(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let raw: RawPayload =
            serde_json::from_slice(bytes).map_err(|_| EnvelopeError::PayloadCorrupt)?;

        match (raw.uuid, raw.batch_id) {
            (Some(uuid), None) => {
                let name = raw.name.ok_or(EnvelopeError::PayloadCorrupt)?;
                let station_id = raw.station_id.ok_or(EnvelopeError::PayloadCorrupt)?;
                Ok(Payload::Individual {
                    name,
                    station_id,
                    uuid,
                })
            }
            (None, Some(batch_id)) => Ok(Payload::Batch { batch_id }),
            _ => Err(EnvelopeError::UnrecognizedEnvelopeType),
        }
    }

    /// Serialize to the JSON plaintext that gets encrypted.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        let raw = match self {
            Payload::Individual {
                name,
                station_id,
                uuid,
            } => RawPayload {
                name: Some(name.clone()),
                station_id: Some(station_id.clone()),
                uuid: Some(uuid.clone()),
                ..Default::default()
            },
            Payload::Batch { batch_id } => RawPayload {
                batch_id: Some(batch_id.clone()),
                ..Default::default()
            },
        };
        serde_json::to_vec(&raw).map_err(|_| EnvelopeError::EncryptionFailed)
    }
}
