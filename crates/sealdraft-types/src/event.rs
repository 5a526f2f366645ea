//! Round lifecycle events published on the broadcast channel.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RoundId, RoundStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundEventKind {
    RoundCreated,
    RoundUpdated,
    RoundTimeExtended,
    RoundDeleted,
    RoundFinalized,
    RoundReversed,
    TiebreakerCreated,
    TiebreakerResolved,
}

impl fmt::Display for RoundEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RoundCreated => "round_created",
            Self::RoundUpdated => "round_updated",
            Self::RoundTimeExtended => "round_time_extended",
            Self::RoundDeleted => "round_deleted",
            Self::RoundFinalized => "round_finalized",
            Self::RoundReversed => "round_reversed",
            Self::TiebreakerCreated => "tiebreaker_created",
            Self::TiebreakerResolved => "tiebreaker_resolved",
        };
        f.write_str(s)
    }
}

/// Payload of a round event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundEvent {
    #[serde(rename = "type")]
    pub kind: RoundEventKind,
    pub round_id: RoundId,
    pub status: RoundStatus,
    pub end_time: Option<DateTime<Utc>>,
    pub position: Option<String>,
}

impl RoundEvent {
    /// Broadcast topic for this event: `rounds/<round_id>`.
    #[must_use]
    pub fn topic(&self) -> String {
        round_topic(self.round_id)
    }
}

#[must_use]
pub fn round_topic(round_id: RoundId) -> String {
    format!("rounds/{round_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_type_field() {
        let event = RoundEvent {
            kind: RoundEventKind::RoundTimeExtended,
            round_id: RoundId::new(),
            status: RoundStatus::Active,
            end_time: None,
            position: Some("FWD".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "round_time_extended");
        assert_eq!(json["status"], "active");
        assert_eq!(event.topic(), format!("rounds/{}", event.round_id));
    }
}
