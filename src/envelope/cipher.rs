// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Symmetric payload encryption.
//!
//! AES-256-GCM with a 16-byte random IV per call. The blob format is
//! `<iv-hex>:<ciphertext-hex>`; the GCM tag travels at the end of the
//! ciphertext segment.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use rand::RngCore;

use super::EnvelopeError;

/// Required key length in bytes.
pub const KEY_LEN: usize = 32;

/// IV length in bytes.
pub const IV_LEN: usize = 16;

/// Separator between the IV and ciphertext hex segments.
const BLOB_DELIMITER: char = ':';

type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Error raised when the configured key has the wrong size.
#[derive(Debug, thiserror::Error)]
#[error("cipher key must be {KEY_LEN} bytes, got {0}")]
pub struct InvalidKeyLength(pub usize);

/// Process-wide payload cipher.
#[derive(Clone)]
pub struct Cipher {
    inner: Aes256Gcm16,
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

impl Cipher {
    /// Build a cipher from raw key bytes.
    ///
    /// Called once at startup so a bad key fails before any request is served.
    pub fn new(key: &[u8]) -> Result<Self, InvalidKeyLength> {
        if key.len() != KEY_LEN {
            return Err(InvalidKeyLength(key.len()));
        }
        let inner = Aes256Gcm16::new_from_slice(key).map_err(|_| InvalidKeyLength(key.len()))?;
        Ok(Self { inner })
    }

    /// Encrypt `plaintext` under a fresh IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, EnvelopeError> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = self
            .inner
            .encrypt(Nonce::<U16>::from_slice(&iv), plaintext)
            .map_err(|_| EnvelopeError::EncryptionFailed)?;

        Ok(format!(
            "{}{BLOB_DELIMITER}{}",
            hex::encode(iv),
            hex::encode(ciphertext)
        ))
    }

    /// Recover the plaintext from a blob produced by [`Cipher::encrypt`].
    pub fn decrypt(&self, blob: &str) -> Result<Vec<u8>, EnvelopeError> {
        let (iv_hex, ct_hex) = blob
            .split_once(BLOB_DELIMITER)
            .ok_or(EnvelopeError::DecryptionFailed)?;

        let iv = hex::decode(iv_hex).map_err(|_| EnvelopeError::DecryptionFailed)?;
        if iv.len() != IV_LEN {
            return Err(EnvelopeError::DecryptionFailed);
        }
        let ciphertext = hex::decode(ct_hex).map_err(|_| EnvelopeError::DecryptionFailed)?;

        self.inner
            .decrypt(Nonce::<U16>::from_slice(&iv), ciphertext.as_slice())
            .map_err(|_| EnvelopeError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> Cipher {
        Cipher::new(&[7u8; KEY_LEN]).unwrap()
    }

    #[test]
    fn roundtrip_recovers_plaintext() {
        let cipher = cipher();
        for plaintext in [&b"x"[..], b"{\"batchId\":\"B-1\"}", &[0u8, 255, 1, 2, 3][..]] {
            let blob = cipher.encrypt(plaintext).unwrap();
            assert_eq!(cipher.decrypt(&blob).unwrap(), plaintext);
        }
    }

    #[test]
    fn blob_has_hex_iv_and_ciphertext() {
        let blob = cipher().encrypt(b"payload").unwrap();
        let (iv, ct) = blob.split_once(':').unwrap();
        assert_eq!(iv.len(), IV_LEN * 2);
        assert!(hex::decode(iv).is_ok());
        assert!(hex::decode(ct).is_ok());
    }

    #[test]
    fn fresh_iv_per_call() {
        let cipher = cipher();
        let a = cipher.encrypt(b"same").unwrap();
        let b = cipher.encrypt(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_size_rejected() {
        assert!(matches!(Cipher::new(&[0u8; 16]), Err(InvalidKeyLength(16))));
        assert!(Cipher::new(&[]).is_err());
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let blob = cipher().encrypt(b"secret").unwrap();
        let other = Cipher::new(&[8u8; KEY_LEN]).unwrap();
        assert!(matches!(other.decrypt(&blob), Err(EnvelopeError::DecryptionFailed)));
    }

    #[test]
    fn malformed_blobs_fail() {
        let cipher = cipher();
        for blob in ["", "nodelimiter", "zz:00", "0011:abcd", ":"] {
            assert!(
                matches!(cipher.decrypt(blob), Err(EnvelopeError::DecryptionFailed)),
                "blob {blob:?} should fail"
            );
        }
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let cipher = cipher();
        let blob = cipher.encrypt(b"payload").unwrap();
        let (iv, ct) = blob.split_once(':').unwrap();
        let mut bytes = hex::decode(ct).unwrap();
        bytes[0] ^= 0x01;
        let tampered = format!("{iv}:{}", hex::encode(bytes));
        assert!(matches!(cipher.decrypt(&tampered), Err(EnvelopeError::DecryptionFailed)));
    }
}
