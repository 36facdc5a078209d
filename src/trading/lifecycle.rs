//! Trade request state machine
//!
//! ```text
//! pending --accept (owner)--> accepted --complete (either party)--> completed
//!    \
//!     --decline (owner)--> declined
//! ```
//!
//! Declined and completed are terminal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{ParseEnumError, TradeRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Pending,
    Accepted,
    Declined,
    Completed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Accepted => "accepted",
            TradeStatus::Declined => "declined",
            TradeStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TradeStatus::Pending),
            "accepted" => Ok(TradeStatus::Accepted),
            "declined" => Ok(TradeStatus::Declined),
            "completed" => Ok(TradeStatus::Completed),
            other => Err(ParseEnumError {
                kind: "trade status",
                value: other.to_string(),
            }),
        }
    }
}

/// Something a user asks to do to a trade request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeAction {
    Accept,
    Decline,
    Complete,
}

impl TradeAction {
    pub fn target(&self) -> TradeStatus {
        match self {
            TradeAction::Accept => TradeStatus::Accepted,
            TradeAction::Decline => TradeStatus::Declined,
            TradeAction::Complete => TradeStatus::Completed,
        }
    }

    /// The only status this action may start from
    pub fn source(&self) -> TradeStatus {
        match self {
            TradeAction::Accept | TradeAction::Decline => TradeStatus::Pending,
            TradeAction::Complete => TradeStatus::Accepted,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            TradeAction::Accept => "accept",
            TradeAction::Decline => "decline",
            TradeAction::Complete => "complete",
        };
        f.write_str(verb)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("only the item owner can {0} a trade request")]
    NotOwner(TradeAction),
    #[error("user is not a participant in this trade")]
    NotParticipant,
    #[error("cannot {action} a trade request that is {from}")]
    InvalidTransition { action: TradeAction, from: TradeStatus },
}

/// Check that `actor` may apply `action` to `trade`, returning the new status
pub fn authorize(trade: &TradeRequest, actor: Uuid, action: TradeAction) -> Result<TradeStatus, TransitionError> {
    if !trade.is_participant(actor) {
        return Err(TransitionError::NotParticipant);
    }

    match action {
        TradeAction::Accept | TradeAction::Decline if trade.to_user_id != actor => {
            return Err(TransitionError::NotOwner(action));
        }
        _ => {}
    }

    if trade.status != action.source() {
        return Err(TransitionError::InvalidTransition {
            action,
            from: trade.status,
        });
    }

    Ok(action.target())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn trade(status: TradeStatus) -> (TradeRequest, Uuid, Uuid) {
        let requester = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let trade = TradeRequest {
            id: Uuid::new_v4(),
            from_user_id: requester,
            to_user_id: owner,
            item_id: Uuid::new_v4(),
            status,
            message: None,
            meeting_location: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        (trade, requester, owner)
    }

    #[test]
    fn test_owner_accepts_pending() {
        let (t, _, owner) = trade(TradeStatus::Pending);
        assert_eq!(authorize(&t, owner, TradeAction::Accept), Ok(TradeStatus::Accepted));
        assert_eq!(authorize(&t, owner, TradeAction::Decline), Ok(TradeStatus::Declined));
    }

    #[test]
    fn test_requester_cannot_accept_own_request() {
        let (t, requester, _) = trade(TradeStatus::Pending);
        assert_eq!(
            authorize(&t, requester, TradeAction::Accept),
            Err(TransitionError::NotOwner(TradeAction::Accept))
        );
    }

    #[test]
    fn test_outsider_is_rejected_before_status_check() {
        let (t, _, _) = trade(TradeStatus::Completed);
        assert_eq!(
            authorize(&t, Uuid::new_v4(), TradeAction::Complete),
            Err(TransitionError::NotParticipant)
        );
    }

    #[test]
    fn test_either_party_completes_accepted() {
        let (t, requester, owner) = trade(TradeStatus::Accepted);
        assert_eq!(authorize(&t, requester, TradeAction::Complete), Ok(TradeStatus::Completed));
        assert_eq!(authorize(&t, owner, TradeAction::Complete), Ok(TradeStatus::Completed));
    }

    #[test]
    fn test_pending_cannot_be_completed() {
        let (t, _, owner) = trade(TradeStatus::Pending);
        let err = authorize(&t, owner, TradeAction::Complete).unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                action: TradeAction::Complete,
                from: TradeStatus::Pending
            }
        );
        assert_eq!(err.to_string(), "cannot complete a trade request that is pending");
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for status in [TradeStatus::Declined, TradeStatus::Completed] {
            let (t, _, owner) = trade(status);
            for action in [TradeAction::Accept, TradeAction::Decline, TradeAction::Complete] {
                assert!(authorize(&t, owner, action).is_err(), "{} from {}", action, status);
            }
        }
    }

    #[test]
    fn test_accepted_cannot_be_declined() {
        let (t, _, owner) = trade(TradeStatus::Accepted);
        assert!(matches!(
            authorize(&t, owner, TradeAction::Decline),
            Err(TransitionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_status_text_round_trip() {
        for status in [
            TradeStatus::Pending,
            TradeStatus::Accepted,
            TradeStatus::Declined,
            TradeStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<TradeStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<TradeStatus>().is_err());
    }
}
