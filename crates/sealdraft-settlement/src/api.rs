//! Resource handlers behind the HTTP surface.
//!
//! Each handler takes typed path parameters plus a raw JSON body where the
//! route has one, and returns an [`ApiResponse`] carrying the status code
//! and the `{success, data | error}` envelope. Transport is left to the
//! embedding server.

use std::sync::Arc;

use rust_decimal::Decimal;
use sealdraft_tiebreak::{TiebreakerView, WithdrawOutcome};
use sealdraft_types::{
    AuctionError, Bid, BidId, PlayerId, Result, Round, RoundId, RoundPatch, TeamId, Tiebreaker,
    TiebreakerId,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::pending::SettlementPreview;
use crate::service::{AuctionService, CreateRoundRequest, DeleteOutcome, RoundDetail};
use crate::settler::SettlementReport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl From<&AuctionError> for ApiError {
    fn from(err: &AuctionError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    #[serde(skip)]
    pub status: u16,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self::with_status(200, data)
    }

    #[must_use]
    pub fn with_status(status: u16, data: T) -> Self {
        Self {
            status,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn from_error(err: &AuctionError) -> Self {
        Self {
            status: err.kind().http_status(),
            success: false,
            data: None,
            error: Some(ApiError::from(err)),
        }
    }

    #[must_use]
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => {
                tracing::debug!(code = %err.code(), error = %err, "request rejected");
                Self::from_error(&err)
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaceBidRequest {
    pub team_id: TeamId,
    pub player_id: PlayerId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitRequest {
    pub team_id: TeamId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeamRequest {
    pub team_id: TeamId,
}

fn parse<T: DeserializeOwned>(body: &str) -> Result<T> {
    Ok(serde_json::from_str(body)?)
}

/// Route handlers over a shared [`AuctionService`].
#[derive(Clone)]
pub struct Api {
    service: Arc<AuctionService>,
}

impl Api {
    #[must_use]
    pub fn new(service: Arc<AuctionService>) -> Self {
        Self { service }
    }

    #[must_use]
    pub fn service(&self) -> &Arc<AuctionService> {
        &self.service
    }

    /// `POST /rounds`
    pub fn create_round(&self, body: &str) -> ApiResponse<Round> {
        match parse::<CreateRoundRequest>(body).and_then(|req| self.service.create_round(req)) {
            Ok(round) => ApiResponse::with_status(201, round),
            Err(err) => ApiResponse::from_error(&err),
        }
    }

    /// `GET /rounds/{id}`
    pub fn get_round(&self, round_id: RoundId) -> ApiResponse<RoundDetail> {
        ApiResponse::from_result(self.service.round_detail(round_id))
    }

    /// `PATCH /rounds/{id}`
    pub fn patch_round(&self, round_id: RoundId, body: &str) -> ApiResponse<Round> {
        ApiResponse::from_result(
            parse::<RoundPatch>(body).and_then(|patch| self.service.update_round(round_id, &patch)),
        )
    }

    /// `DELETE /rounds/{id}`
    ///
    /// An incomplete reversal answers with the reversal error and still
    /// carries the outcome, so the caller sees which bids failed.
    pub fn delete_round(&self, round_id: RoundId) -> ApiResponse<DeleteOutcome> {
        match self.service.delete_round(round_id) {
            Ok(outcome) if !outcome.removed => {
                let failed = outcome.reversal.as_ref().map_or(0, |r| r.failed.len());
                let err = AuctionError::ReversalIncomplete { failed };
                ApiResponse {
                    data: Some(outcome),
                    ..ApiResponse::from_error(&err)
                }
            }
            result => ApiResponse::from_result(result),
        }
    }

    /// `GET /tiebreakers/{id}?team=`
    pub fn get_tiebreaker(&self, id: TiebreakerId, team: Option<TeamId>) -> ApiResponse<TiebreakerView> {
        ApiResponse::from_result(self.service.tiebreaker(id, team))
    }

    /// `POST /rounds/{id}/bids`
    pub fn place_bid(&self, round_id: RoundId, body: &str) -> ApiResponse<Bid> {
        match parse::<PlaceBidRequest>(body)
            .and_then(|req| self.service.place_bid(round_id, req.team_id, req.player_id, req.amount))
        {
            Ok(bid) => ApiResponse::with_status(201, bid),
            Err(err) => ApiResponse::from_error(&err),
        }
    }

    /// `DELETE /bids/{id}`
    pub fn cancel_bid(&self, bid_id: BidId, body: &str) -> ApiResponse<Bid> {
        ApiResponse::from_result(
            parse::<TeamRequest>(body).and_then(|req| self.service.cancel_bid(bid_id, req.team_id)),
        )
    }

    /// `POST /rounds/{id}/finalize`
    pub fn finalize(&self, round_id: RoundId) -> ApiResponse<SettlementReport> {
        ApiResponse::from_result(self.service.finalize(round_id))
    }

    /// `POST /rounds/{id}/preview-finalization`
    pub fn preview_finalization(&self, round_id: RoundId) -> ApiResponse<SettlementPreview> {
        ApiResponse::from_result(self.service.preview_finalization(round_id))
    }

    /// `GET /rounds/{id}/pending-allocations`
    pub fn pending_allocations(&self, round_id: RoundId) -> ApiResponse<SettlementPreview> {
        ApiResponse::from_result(self.service.pending_allocations(round_id))
    }

    /// `DELETE /rounds/{id}/pending-allocations`
    pub fn discard_pending_allocations(&self, round_id: RoundId) -> ApiResponse<SettlementPreview> {
        ApiResponse::from_result(self.service.discard_pending_allocations(round_id))
    }

    /// `POST /rounds/{id}/apply-pending-allocations`
    pub fn apply_pending_allocations(&self, round_id: RoundId) -> ApiResponse<SettlementReport> {
        ApiResponse::from_result(self.service.apply_pending_allocations(round_id))
    }

    /// `POST /tiebreakers/{id}/submit`
    pub fn submit_tiebreaker(&self, id: TiebreakerId, body: &str) -> ApiResponse<Tiebreaker> {
        ApiResponse::from_result(
            parse::<SubmitRequest>(body)
                .and_then(|req| self.service.submit_tiebreaker(id, req.team_id, req.amount)),
        )
    }

    /// `POST /tiebreakers/{id}/withdraw`
    pub fn withdraw_tiebreaker(&self, id: TiebreakerId, body: &str) -> ApiResponse<WithdrawOutcome> {
        ApiResponse::from_result(
            parse::<TeamRequest>(body).and_then(|req| self.service.withdraw_tiebreaker(id, req.team_id)),
        )
    }
}
