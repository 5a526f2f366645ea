//! Configuration for an auction engine instance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{AuctionError, Result};

/// Top-level configuration, loadable from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuctionConfig {
    pub codec: CodecConfig,
    pub rounds: RoundDefaults,
    pub tiebreaker: TiebreakerConfig,
    pub settlement: SettlementConfig,
}

impl AuctionConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AuctionError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.codec.validate()?;
        if self.rounds.max_bids_per_team == 0 {
            return Err(AuctionError::Configuration(
                "rounds.max_bids_per_team must be at least 1".into(),
            ));
        }
        if self.rounds.base_price <= Decimal::ZERO {
            return Err(AuctionError::Configuration(
                "rounds.base_price must be positive".into(),
            ));
        }
        if self.tiebreaker.duration_secs == Some(0) {
            return Err(AuctionError::Configuration(
                "tiebreaker.duration_secs must be positive when set".into(),
            ));
        }
        if self.settlement.idempotency_cache_size == 0 {
            return Err(AuctionError::Configuration(
                "settlement.idempotency_cache_size must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Where the bid sealing key comes from.
///
/// Exactly one of `key_hex` (64 hex chars) or `secret` (hashed to a key)
/// must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub key_hex: Option<String>,
    pub secret: Option<String>,
}

impl CodecConfig {
    fn validate(&self) -> Result<()> {
        match (&self.key_hex, &self.secret) {
            (Some(_), Some(_)) => Err(AuctionError::Configuration(
                "codec: set key_hex or secret, not both".into(),
            )),
            (None, None) => Err(AuctionError::Configuration(
                "codec: key_hex or secret is required".into(),
            )),
            (Some(key), None) => {
                let bytes = hex::decode(key)
                    .map_err(|e| AuctionError::Configuration(format!("codec.key_hex: {e}")))?;
                if bytes.len() == constants::KEY_LEN {
                    Ok(())
                } else {
                    Err(AuctionError::Configuration(format!(
                        "codec.key_hex must be {} bytes, got {}",
                        constants::KEY_LEN,
                        bytes.len()
                    )))
                }
            }
            (None, Some(secret)) if secret.is_empty() => Err(AuctionError::Configuration(
                "codec.secret must not be empty".into(),
            )),
            (None, Some(_)) => Ok(()),
        }
    }
}

/// Defaults applied when a new round omits a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundDefaults {
    pub max_bids_per_team: u32,
    pub base_price: Decimal,
}

impl Default for RoundDefaults {
    fn default() -> Self {
        Self {
            max_bids_per_team: constants::DEFAULT_MAX_BIDS_PER_TEAM,
            base_price: Decimal::new(constants::DEFAULT_BASE_PRICE, 0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TiebreakerConfig {
    /// Timer started on activation. `None` means tiebreakers never expire.
    pub duration_secs: Option<u64>,
    pub max_cas_retries: u32,
}

impl Default for TiebreakerConfig {
    fn default() -> Self {
        Self {
            duration_secs: None,
            max_cas_retries: constants::DEFAULT_MAX_CAS_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    pub idempotency_cache_size: usize,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            idempotency_cache_size: constants::DEFAULT_IDEMPOTENCY_CACHE_SIZE,
        }
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl AuctionConfig {
    /// A valid config with a freshly generated codec key.
    pub fn for_tests() -> Self {
        use rand::RngCore;
        let mut key = [0u8; constants::KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        Self {
            codec: CodecConfig {
                key_hex: Some(hex::encode(key)),
                secret: None,
            },
            ..Self::default()
        }
    }
}
