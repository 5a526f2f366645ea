//! Globally unique identifiers used throughout SealDraft.
//!
//! Entity IDs use UUIDv7 for time-ordered lexicographic sorting. Settlement
//! intents use a deterministic ID derived from the bid they settle, so that
//! a retried settlement pass always lands on the same intent record.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUIDv7 newtype with `new`, `Default`, and `Display`.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of an auction round.
    RoundId,
    ""
);

uuid_id!(
    /// Identifier of a sealed bid.
    BidId,
    ""
);

uuid_id!(
    /// Identifier of a drafting team.
    TeamId,
    "team:"
);

uuid_id!(
    /// Identifier of a player that can be drafted.
    PlayerId,
    "player:"
);

uuid_id!(
    /// Identifier of a season. Budgets are scoped per (team, season).
    SeasonId,
    "season:"
);

uuid_id!(
    /// Identifier of a tiebreaker sub-auction.
    TiebreakerId,
    "tb:"
);

uuid_id!(
    /// Identifier of one team's submission record inside a tiebreaker.
    SubmissionId,
    "sub:"
);

// ---------------------------------------------------------------------------
// IntentId
// ---------------------------------------------------------------------------

/// Identifier of a settlement intent (one saga record per bid and direction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct IntentId(pub Uuid);

impl IntentId {
    /// Deterministic `IntentId` from the bid being settled and the direction.
    ///
    /// Every settlement pass over the same bid derives the same ID, which is
    /// what makes intent creation "insert or reuse" instead of duplicating.
    #[must_use]
    pub fn deterministic(bid_id: BidId, direction: &str) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(b"sealdraft:intent:v1:");
        hasher.update(bid_id.0.as_bytes());
        hasher.update(direction.as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Self(Uuid::from_bytes(bytes))
    }

    /// The idempotency key handed to the budget store for this intent.
    #[must_use]
    pub fn budget_key(&self) -> String {
        format!("intent:{}", hex::encode(self.0.as_bytes()))
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "intent:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
