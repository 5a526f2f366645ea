//! Sealed bid types.
//!
//! A bid's amount never sits in the ledger in the clear: the ledger stores a
//! [`SealedBid`] produced by the bid codec, and only settlement, tie
//! detection, and aggregate reporting unseal it.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BidId, PlayerId, RoundId, TeamId};

/// Lifecycle status of a bid.
///
/// `Pending → Won` or `Pending → Lost`. Re-applying the same terminal status
/// is a no-op, which keeps tie detection idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Won,
    Lost,
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Won => write!(f, "won"),
            Self::Lost => write!(f, "lost"),
        }
    }
}

/// The plaintext inside a sealed bid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidPayload {
    pub player_id: PlayerId,
    pub amount: Decimal,
}

/// Associated data a sealed bid is bound to.
///
/// A ciphertext sealed for one (round, team) fails to open under another, so
/// a sealed payload cannot be moved between bids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealContext {
    pub round_id: RoundId,
    pub team_id: TeamId,
}

impl SealContext {
    #[must_use]
    pub fn new(round_id: RoundId, team_id: TeamId) -> Self {
        Self { round_id, team_id }
    }

    /// Canonical associated-data bytes: `"sealdraft:bid:v1:" || round || team`.
    #[must_use]
    pub fn aad(&self) -> Vec<u8> {
        let mut aad = Vec::with_capacity(17 + 32);
        aad.extend_from_slice(b"sealdraft:bid:v1:");
        aad.extend_from_slice(self.round_id.0.as_bytes());
        aad.extend_from_slice(self.team_id.0.as_bytes());
        aad
    }
}

/// Opaque sealed bid bytes (`nonce || ciphertext`). Serialized as hex.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SealedBid(Vec<u8>);

impl SealedBid {
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SealedBid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealedBid({} bytes)", self.0.len())
    }
}

impl Serialize for SealedBid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for SealedBid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map(Self).map_err(serde::de::Error::custom)
    }
}

/// A bid as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub round_id: RoundId,
    pub team_id: TeamId,
    /// Kept in the clear for scoping; the amount is only in `sealed`.
    pub player_id: PlayerId,
    pub sealed: SealedBid,
    pub status: BidStatus,
    /// Settled amount once won. Differs from the sealed amount when the bid
    /// won through a tiebreaker.
    pub won_amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bid {
    #[must_use]
    pub fn seal_context(&self) -> SealContext {
        SealContext::new(self.round_id, self.team_id)
    }
}

/// A bid together with its unsealed amount.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenBid {
    pub bid: Bid,
    pub amount: Decimal,
}

impl OpenBid {
    /// The amount settlement charges: the tiebreaker amount when one was
    /// recorded, otherwise the sealed amount.
    #[must_use]
    pub fn settled_amount(&self) -> Decimal {
        self.bid.won_amount.unwrap_or(self.amount)
    }
}

/// Aggregate bid statistics for one player in a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerBidStats {
    pub player_id: PlayerId,
    pub bid_count: usize,
    pub highest_bid: Decimal,
    pub lowest_bid: Decimal,
    pub teams_count: usize,
}
