//! AES-256-GCM bid codec.
//!
//! Sealed layout: `nonce (12 bytes) || ciphertext+tag`. The plaintext is the
//! JSON form of [`BidPayload`] and the associated data is the bid's
//! [`SealContext`], so a sealed payload only opens for the (round, team) it
//! was sealed for.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::RngCore;
use sealdraft_types::constants::{KEY_LEN, NONCE_LEN};
use sealdraft_types::{AuctionError, BidCodec, BidPayload, CodecConfig, Result, SealContext, SealedBid};
use sha2::{Digest, Sha256};

/// Bid codec backed by a single AES-256-GCM key.
pub struct AesBidCodec {
    cipher: Aes256Gcm,
}

impl AesBidCodec {
    #[must_use]
    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new(&key.into()),
        }
    }

    /// Derive the key as `SHA-256(secret)`.
    #[must_use]
    pub fn from_secret(secret: &str) -> Self {
        let digest: [u8; KEY_LEN] = Sha256::digest(secret.as_bytes()).into();
        Self::from_key(digest)
    }

    /// Parse a 64-character hex key.
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let bytes = hex::decode(key_hex)
            .map_err(|e| AuctionError::Configuration(format!("codec key: {e}")))?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            AuctionError::Configuration(format!("codec key must be {KEY_LEN} bytes, got {}", b.len()))
        })?;
        Ok(Self::from_key(key))
    }

    /// Build from validated configuration.
    pub fn from_config(config: &CodecConfig) -> Result<Self> {
        match (&config.key_hex, &config.secret) {
            (Some(key), _) => Self::from_hex(key),
            (None, Some(secret)) => Ok(Self::from_secret(secret)),
            (None, None) => Err(AuctionError::Configuration(
                "codec: key_hex or secret is required".into(),
            )),
        }
    }

    /// A codec with a random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        Self::from_key(key)
    }
}

impl BidCodec for AesBidCodec {
    fn seal(&self, context: &SealContext, payload: &BidPayload) -> Result<SealedBid> {
        let plaintext = serde_json::to_vec(payload)?;
        let aad = context.aad();

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, Payload { msg: &plaintext, aad: &aad })
            .map_err(|e| AuctionError::SealFailed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(SealedBid::from_bytes(sealed))
    }

    fn unseal(&self, context: &SealContext, sealed: &SealedBid) -> Result<BidPayload> {
        let bytes = sealed.as_bytes();
        if bytes.len() <= NONCE_LEN {
            return Err(AuctionError::UnsealFailed("sealed bid too short".into()));
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        let aad = context.aad();

        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload { msg: ciphertext, aad: &aad },
            )
            .map_err(|e| AuctionError::UnsealFailed(e.to_string()))?;

        serde_json::from_slice(&plaintext).map_err(|e| AuctionError::UnsealFailed(e.to_string()))
    }
}
