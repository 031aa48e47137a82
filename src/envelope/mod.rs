// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Envelope Cryptography
//!
//! An envelope is the JSON object printed into a QR code:
//!
//! ```text
//! { "token": <HS256 JWT { data: "<iv-hex>:<ct-hex>", exp }>, "hmac": <hex> }
//! ```
//!
//! Sealing runs `Cipher -> TokenSigner -> EnvelopeGuard`. Opening runs the
//! mirror image as an ordered chain that stops at the first failure:
//!
//! 1. structural check (`MalformedEnvelope`)
//! 2. HMAC tag, constant time (`HmacMismatch`)
//! 3. signature and expiry (`TokenInvalid` / `TokenExpired`)
//! 4. decryption (`DecryptionFailed`)
//! 5. payload parse (`PayloadCorrupt` / `UnrecognizedEnvelopeType`)
//!
//! Each stage uses its own secret, so leaking one of them is not enough to
//! forge an envelope.

pub mod cipher;
pub mod guard;
pub mod payload;
pub mod signer;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

pub use cipher::{Cipher, InvalidKeyLength};
pub use guard::EnvelopeGuard;
pub use payload::{is_valid_identifier, Payload};
pub use signer::{TokenSigner, TOKEN_LIFETIME};

/// Envelope verification and minting failures.
///
/// The variants stay distinct internally; the HTTP layer collapses them to
/// one uniform message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope is missing its token or hmac")]
    MalformedEnvelope,
    #[error("envelope hmac does not match")]
    HmacMismatch,
    #[error("token signature is invalid")]
    TokenInvalid,
    #[error("token has expired")]
    TokenExpired,
    #[error("payload could not be decrypted")]
    DecryptionFailed,
    #[error("payload is corrupt")]
    PayloadCorrupt,
    #[error("payload is neither a product nor a batch reference")]
    UnrecognizedEnvelopeType,
    #[error("payload encryption failed")]
    EncryptionFailed,
    #[error("token signing failed")]
    SigningFailed,
}

impl EnvelopeError {
    /// Stable identifier for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EnvelopeError::MalformedEnvelope => "malformed_envelope",
            EnvelopeError::HmacMismatch => "hmac_mismatch",
            EnvelopeError::TokenInvalid => "token_invalid",
            EnvelopeError::TokenExpired => "token_expired",
            EnvelopeError::DecryptionFailed => "decryption_failed",
            EnvelopeError::PayloadCorrupt => "payload_corrupt",
            EnvelopeError::UnrecognizedEnvelopeType => "unrecognized_envelope_type",
            EnvelopeError::EncryptionFailed => "encryption_failed",
            EnvelopeError::SigningFailed => "signing_failed",
        }
    }
}

/// Wire envelope.
///
/// `uuid` / `batchId` are unauthenticated routing hints. Nothing that reads
/// or writes state may rely on them; use the verified [`Payload`] instead.
///
/// Deserialization never fails: any JSON value is accepted and fields that
/// are absent or not strings become `None`, leaving the structural check to
/// [`EnvelopeService::unwrap`].
#[derive(Debug, Clone, Default, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Signed container (JWT).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Hex HMAC-SHA256 tag over `token`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
    /// Unauthenticated product hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Unauthenticated batch hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);
        Ok(Envelope {
            token: field("token"),
            hmac: field("hmac"),
            uuid: field("uuid"),
            batch_id: field("batchId"),
        })
    }
}

impl Envelope {
    /// Hint copy of the identifier, if any.
    pub fn routing_hint(&self) -> Option<&str> {
        self.uuid.as_deref().or(self.batch_id.as_deref())
    }
}

/// Seals payloads into envelopes and opens them again.
#[derive(Debug, Clone)]
pub struct EnvelopeService {
    cipher: Cipher,
    signer: TokenSigner,
    guard: EnvelopeGuard,
}

impl EnvelopeService {
    pub fn new(cipher: Cipher, signer: TokenSigner, guard: EnvelopeGuard) -> Self {
        Self {
            cipher,
            signer,
            guard,
        }
    }

    /// Wrap a signed container in the outer envelope.
    pub fn wrap(&self, container: String) -> Envelope {
        let hmac = self.guard.tag(&container);
        Envelope {
            token: Some(container),
            hmac: Some(hmac),
            ..Default::default()
        }
    }

    /// Encrypt, sign and tag `payload`, valid for [`TOKEN_LIFETIME`].
    pub fn seal(&self, payload: &Payload) -> Result<Envelope, EnvelopeError> {
        let blob = self.cipher.encrypt(&payload.to_bytes()?)?;
        let container = self.signer.sign(&blob, TOKEN_LIFETIME)?;

        let mut envelope = self.wrap(container);
        match payload {
            Payload::Individual { uuid, .. } => envelope.uuid = Some(uuid.clone()),
            Payload::Batch { batch_id } => envelope.batch_id = Some(batch_id.clone()),
        }
        Ok(envelope)
    }

    /// Check the tag and recover the signed container.
    pub fn unwrap<'a>(&self, envelope: &'a Envelope) -> Result<&'a str, EnvelopeError> {
        let (token, hmac) = match (envelope.token.as_deref(), envelope.hmac.as_deref()) {
            (Some(token), Some(hmac)) if !token.is_empty() && !hmac.is_empty() => (token, hmac),
            _ => return Err(EnvelopeError::MalformedEnvelope),
        };
        self.guard.check(token, hmac)?;
        Ok(token)
    }

    /// Fully verify an envelope and return its payload.
    pub fn open(&self, envelope: &Envelope) -> Result<Payload, EnvelopeError> {
        let container = self.unwrap(envelope)?;
        let blob = self.signer.verify(container)?;
        let plaintext = self.cipher.decrypt(&blob)?;
        Payload::parse(&plaintext)
    }

    #[cfg(test)]
    pub(crate) fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    #[cfg(test)]
    pub(crate) fn cipher(&self) -> &Cipher {
        &self.cipher
    }
}
