// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outer integrity tag (HMAC-SHA256 over the raw container string).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::EnvelopeError;

type HmacSha256 = Hmac<Sha256>;

/// Computes and checks envelope tags with a secret independent of the
/// cipher key and the signing secret.
#[derive(Clone)]
pub struct EnvelopeGuard {
    key: Vec<u8>,
}

impl std::fmt::Debug for EnvelopeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeGuard").finish_non_exhaustive()
    }
}

impl EnvelopeGuard {
    pub fn new(key: &[u8]) -> Self {
        Self { key: key.to_vec() }
    }

    fn mac(&self, container: &str) -> HmacSha256 {
        // HMAC accepts keys of any length.
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC key size is always valid");
        mac.update(container.as_bytes());
        mac
    }

    /// Hex tag for `container`.
    pub fn tag(&self, container: &str) -> String {
        hex::encode(self.mac(container).finalize().into_bytes())
    }

    /// Constant-time check of a supplied hex tag.
    ///
    /// Only the canonical lowercase hex form is accepted; anything else,
    /// including a wrong length, is reported as a mismatch.
    pub fn check(&self, container: &str, tag_hex: &str) -> Result<(), EnvelopeError> {
        if !tag_hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(EnvelopeError::HmacMismatch);
        }
        let supplied = hex::decode(tag_hex).map_err(|_| EnvelopeError::HmacMismatch)?;
        self.mac(container)
            .verify_slice(&supplied)
            .map_err(|_| EnvelopeError::HmacMismatch)
    }
}
