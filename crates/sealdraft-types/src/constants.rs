//! System-wide constants for the SealDraft auction engine.

/// Default cap on pending bids a team may hold in one round.
pub const DEFAULT_MAX_BIDS_PER_TEAM: u32 = 5;

/// Default round base price, in whole budget units.
pub const DEFAULT_BASE_PRICE: i64 = 10;

/// AES-256-GCM key length in bytes.
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes, prepended to every sealed bid.
pub const NONCE_LEN: usize = 12;

/// Tiebreaker submit/withdraw retries after losing a version race.
pub const DEFAULT_MAX_CAS_RETRIES: u32 = 8;

/// Budget-adjustment keys remembered by the idempotency guard.
pub const DEFAULT_IDEMPOTENCY_CACHE_SIZE: usize = 100_000;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "SealDraft";
