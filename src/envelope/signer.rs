// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed, expiring containers (HS256 JWT).
//!
//! The container embeds the cipher blob under `data` plus an absolute `exp`.
//! `jsonwebtoken` checks the signature before it deserializes or validates
//! any claim, so a bad signature never reveals anything about the content.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::EnvelopeError;

/// Validity window of every issued token.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Serialize, Deserialize)]
struct ContainerClaims {
    data: String,
    exp: i64,
}

/// Signs and verifies token containers.
#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign `data` with an expiry `expires_in` from now.
    pub fn sign(&self, data: &str, expires_in: Duration) -> Result<String, EnvelopeError> {
        let lifetime =
            chrono::Duration::from_std(expires_in).map_err(|_| EnvelopeError::SigningFailed)?;
        self.sign_until(data, Utc::now() + lifetime)
    }

    /// Sign `data` with an absolute expiry.
    pub fn sign_until(&self, data: &str, expires_at: DateTime<Utc>) -> Result<String, EnvelopeError> {
        let claims = ContainerClaims {
            data: data.to_string(),
            exp: expires_at.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| EnvelopeError::SigningFailed)
    }

    /// Verify the signature and expiry, returning the embedded data.
    pub fn verify(&self, container: &str) -> Result<String, EnvelopeError> {
        let token = decode::<ContainerClaims>(container, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => EnvelopeError::TokenExpired,
                _ => EnvelopeError::TokenInvalid,
            })?;
        Ok(token.claims.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new(b"signing-secret-signing-secret-0001")
    }

    #[test]
    fn sign_and_verify() {
        let signer = signer();
        let container = signer.sign("abcd:ef01", TOKEN_LIFETIME).unwrap();
        assert_eq!(signer.verify(&container).unwrap(), "abcd:ef01");
    }

    #[test]
    fn expired_container_rejected() {
        let signer = signer();
        let container = signer
            .sign_until("abcd:ef01", Utc::now() - chrono::Duration::seconds(30))
            .unwrap();
        assert!(matches!(signer.verify(&container), Err(EnvelopeError::TokenExpired)));
    }

    #[test]
    fn foreign_secret_rejected() {
        let container = TokenSigner::new(b"another-secret-another-secret-0002")
            .sign("abcd:ef01", TOKEN_LIFETIME)
            .unwrap();
        assert!(matches!(signer().verify(&container), Err(EnvelopeError::TokenInvalid)));
    }

    #[test]
    fn bad_signature_checked_before_expiry() {
        let container = TokenSigner::new(b"another-secret-another-secret-0002")
            .sign_until("abcd:ef01", Utc::now() - chrono::Duration::days(2))
            .unwrap();
        assert!(matches!(signer().verify(&container), Err(EnvelopeError::TokenInvalid)));
    }

    #[test]
    fn garbage_rejected() {
        let signer = signer();
        for container in ["", "not-a-token", "a.b.c"] {
            assert!(matches!(signer.verify(container), Err(EnvelopeError::TokenInvalid)));
        }
    }
}
