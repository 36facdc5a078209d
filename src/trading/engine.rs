//! Trade engine
//!
//! Runs trade requests through their lifecycle: validation, state checks,
//! the compare-and-set database transition, then notifications and
//! SmartMatch tracking as side effects.

use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::lifecycle::{authorize, TradeAction, TransitionError};
use crate::carbon::ItemSavings;
use crate::db::{ChatMessage, Database, DbError, ItemWithOwner, TradeRequest, TradeRequestView};
use crate::notifications::{self, Notifier};
use crate::smartmatch::{Activity, ActivityKind, SmartMatch};
use crate::validation::{self, NewTradeRequest, ValidationError};

#[derive(Error, Debug)]
pub enum TradeError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("you cannot request a trade for your own item")]
    OwnItem,
    #[error("item is not available for trade")]
    Unavailable,
    #[error("trade request was modified by another action, please retry")]
    Concurrent,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Database(#[from] DbError),
}

/// Result of completing a trade
#[derive(Debug, Clone, Serialize)]
pub struct TradeCompletion {
    pub trade: TradeRequest,
    pub savings: ItemSavings,
}

#[derive(Clone)]
pub struct TradeEngine {
    db: Database,
    notifier: Notifier,
    smartmatch: SmartMatch,
}

impl TradeEngine {
    pub fn new(db: Database, notifier: Notifier, smartmatch: SmartMatch) -> Self {
        Self { db, notifier, smartmatch }
    }

    async fn load_trade(&self, trade_id: Uuid) -> Result<TradeRequest, TradeError> {
        self.db
            .get_trade(trade_id)
            .await?
            .ok_or(TradeError::NotFound("Trade request"))
    }

    async fn load_item(&self, item_id: Uuid) -> Result<ItemWithOwner, TradeError> {
        self.db.get_item(item_id).await?.ok_or(TradeError::NotFound("Item"))
    }

    // ==========================================
    // Lifecycle
    // ==========================================

    pub async fn create_request(
        &self,
        requester: Uuid,
        request: NewTradeRequest,
    ) -> Result<TradeRequest, TradeError> {
        let listing = self.load_item(request.item_id).await?;
        let item = &listing.item;

        if item.user_id == requester {
            return Err(TradeError::OwnItem);
        }
        if !item.is_available() {
            return Err(TradeError::Unavailable);
        }

        let record = request.into_record(requester, item.user_id)?;
        // The insert re-checks availability, so an accept racing this request wins
        let trade = self
            .db
            .create_trade(&record)
            .await?
            .ok_or(TradeError::Unavailable)?;

        info!("Trade request {} created by {} for item {}", trade.id, requester, item.id);

        self.notifier.send_best_effort(notifications::trade_requested(&trade)).await;
        self.smartmatch
            .track_best_effort(requester, Activity::with_item(ActivityKind::Trade, item))
            .await;

        Ok(trade)
    }

    /// Accept a pending request; competing pending requests are declined
    pub async fn accept(&self, actor: Uuid, trade_id: Uuid) -> Result<TradeRequest, TradeError> {
        let trade = self.load_trade(trade_id).await?;
        authorize(&trade, actor, TradeAction::Accept)?;

        let (accepted, declined) = match self.db.accept_trade(trade_id).await {
            Ok(Some(result)) => result,
            Ok(None) => return Err(TradeError::Concurrent),
            Err(DbError::Conflict(_)) => return Err(TradeError::Unavailable),
            Err(e) => return Err(e.into()),
        };

        info!(
            "Trade request {} accepted, {} competing request(s) declined",
            accepted.id,
            declined.len()
        );

        self.notifier.send_best_effort(notifications::trade_accepted(&accepted)).await;
        self.notifier
            .send_all_best_effort(declined.iter().map(notifications::trade_declined))
            .await;

        Ok(accepted)
    }

    pub async fn decline(&self, actor: Uuid, trade_id: Uuid) -> Result<TradeRequest, TradeError> {
        let trade = self.load_trade(trade_id).await?;
        authorize(&trade, actor, TradeAction::Decline)?;

        let declined = self
            .db
            .decline_trade(trade_id)
            .await?
            .ok_or(TradeError::Concurrent)?;

        info!("Trade request {} declined", declined.id);
        self.notifier.send_best_effort(notifications::trade_declined(&declined)).await;

        Ok(declined)
    }

    /// Complete an accepted request and credit both sides with the carbon saved
    pub async fn complete(&self, actor: Uuid, trade_id: Uuid) -> Result<TradeCompletion, TradeError> {
        let trade = self.load_trade(trade_id).await?;
        authorize(&trade, actor, TradeAction::Complete)?;

        let listing = self.load_item(trade.item_id).await?;
        let footprint = self
            .db
            .carbon_footprint(&listing.item.category, listing.item.subcategory.as_deref())
            .await?;
        let savings = ItemSavings::from_footprint(footprint.as_ref());

        let (completed, declined) = self
            .db
            .complete_trade(trade_id, &savings)
            .await?
            .ok_or(TradeError::Concurrent)?;

        info!(
            "Trade request {} completed, {:.1} kg CO2 saved per participant",
            completed.id, savings.co2_saved_kg
        );

        self.notifier
            .send_all_best_effort(notifications::trade_completed(&completed, &listing.item.name))
            .await;
        self.notifier
            .send_all_best_effort(declined.iter().map(notifications::trade_declined))
            .await;

        Ok(TradeCompletion {
            trade: completed,
            savings,
        })
    }

    pub async fn trades_for_user(&self, user_id: Uuid) -> Result<Vec<TradeRequestView>, TradeError> {
        Ok(self.db.trades_for_user(user_id).await?)
    }

    // ==========================================
    // Trade Chat
    // ==========================================

    async fn participant_trade(&self, user_id: Uuid, trade_id: Uuid) -> Result<TradeRequest, TradeError> {
        let trade = self.load_trade(trade_id).await?;
        if !trade.is_participant(user_id) {
            return Err(TransitionError::NotParticipant.into());
        }
        Ok(trade)
    }

    pub async fn chat_messages(&self, user_id: Uuid, trade_id: Uuid) -> Result<Vec<ChatMessage>, TradeError> {
        self.participant_trade(user_id, trade_id).await?;
        Ok(self.db.chat_messages(trade_id).await?)
    }

    pub async fn post_chat_message(
        &self,
        sender_id: Uuid,
        trade_id: Uuid,
        text: &str,
    ) -> Result<ChatMessage, TradeError> {
        let trade = self.participant_trade(sender_id, trade_id).await?;
        let text = validation::message_text(text)?;

        let message = self.db.create_chat_message(trade_id, sender_id, &text).await?;
        self.notifier
            .send_best_effort(notifications::trade_chat_message(&trade, sender_id, message.id))
            .await;

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{testing, ItemStatus, NewTradeRecord, SavingsType};
    use crate::error::ApiError;
    use crate::notifications::{NotificationHub, NotificationKind};
    use crate::trading::TradeStatus;
    use axum::http::StatusCode;
    use std::sync::Arc;

    fn engine(db: Database) -> TradeEngine {
        let notifier = Notifier::new(db.clone(), Arc::new(NotificationHub::new(16)));
        let smartmatch = SmartMatch::new(db.clone(), 100);
        TradeEngine::new(db, notifier, smartmatch)
    }

    fn request(item_id: Uuid) -> NewTradeRequest {
        NewTradeRequest {
            item_id,
            message: Some("Still available?".to_string()),
            meeting_location: None,
        }
    }

    fn status_of(err: TradeError) -> StatusCode {
        ApiError::from(err).status()
    }

    #[tokio::test]
    async fn test_accept_declines_competitors_then_complete_trades_item() {
        let Some(db) = testing::database().await else { return };
        let engine = engine(db.clone());

        let owner = testing::user(&db).await;
        let buyer = testing::user(&db).await;
        let rival = testing::user(&db).await;
        let item = testing::item(&db, owner, "Books", None).await;

        let chosen = engine.create_request(buyer, request(item.id)).await.unwrap();
        let competing = engine.create_request(rival, request(item.id)).await.unwrap();
        assert_eq!(chosen.status, TradeStatus::Pending);

        let mut rival_feed = engine.notifier.hub().subscribe(rival);

        let accepted = engine.accept(owner, chosen.id).await.unwrap();
        assert_eq!(accepted.status, TradeStatus::Accepted);

        let competing = db.get_trade(competing.id).await.unwrap().unwrap();
        assert_eq!(competing.status, TradeStatus::Declined);
        let reserved = db.get_item(item.id).await.unwrap().unwrap().item;
        assert_eq!(reserved.status, ItemStatus::Pending);

        let declined = rival_feed.try_recv().unwrap();
        assert_eq!(declined.kind, NotificationKind::TradeDeclined);
        assert_eq!(declined.related_trade_request_id, Some(competing.id));

        // A reserved item takes no new requests, even past the engine's own check
        let late = testing::user(&db).await;
        let err = engine.create_request(late, request(item.id)).await.unwrap_err();
        assert!(matches!(err, TradeError::Unavailable));
        let record = NewTradeRecord {
            from_user_id: late,
            to_user_id: owner,
            item_id: item.id,
            message: None,
            meeting_location: None,
        };
        assert!(db.create_trade(&record).await.unwrap().is_none());

        // A request that slipped in before the reservation is declined on completion
        let (straggler,): (Uuid,) = sqlx::query_as(
            "INSERT INTO trade_requests (from_user_id, to_user_id, item_id) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(late)
        .bind(owner)
        .bind(item.id)
        .fetch_one(db.pool())
        .await
        .unwrap();

        let completion = engine.complete(buyer, chosen.id).await.unwrap();
        assert_eq!(completion.trade.status, TradeStatus::Completed);
        assert_eq!(completion.savings.co2_saved_kg, 20.0);

        let traded = db.get_item(item.id).await.unwrap().unwrap().item;
        assert_eq!(traded.status, ItemStatus::Traded);
        assert!(traded.is_traded);
        assert!(traded.traded_at.is_some());
        assert_eq!(traded.traded_to_user_id, Some(buyer));

        for participant in [owner, buyer] {
            let savings = db.carbon_savings_for_user(participant).await.unwrap();
            assert_eq!(savings.len(), 1);
            assert_eq!(savings[0].savings_type, SavingsType::TradeCompleted);
            assert_eq!(savings[0].trade_id, Some(chosen.id));
            assert_eq!(savings[0].co2_saved_kg, 20.0);
        }

        let straggler = db.get_trade(straggler).await.unwrap().unwrap();
        assert_eq!(straggler.status, TradeStatus::Declined);
    }

    #[tokio::test]
    async fn test_duplicate_open_request_conflicts() {
        let Some(db) = testing::database().await else { return };
        let engine = engine(db.clone());

        let owner = testing::user(&db).await;
        let buyer = testing::user(&db).await;
        let item = testing::item(&db, owner, "Electronics", Some("Laptops")).await;

        let first = engine.create_request(buyer, request(item.id)).await.unwrap();
        let err = engine.create_request(buyer, request(item.id)).await.unwrap_err();
        assert!(matches!(err, TradeError::Database(DbError::Conflict(_))));
        assert_eq!(status_of(err), StatusCode::CONFLICT);

        // once declined the request is no longer open
        engine.decline(owner, first.id).await.unwrap();
        let again = engine.create_request(buyer, request(item.id)).await.unwrap();
        assert_eq!(again.status, TradeStatus::Pending);
    }

    #[tokio::test]
    async fn test_lost_transition_is_conflict() {
        let Some(db) = testing::database().await else { return };
        let engine = engine(db.clone());

        let owner = testing::user(&db).await;
        let buyer = testing::user(&db).await;
        let item = testing::item(&db, owner, "Dorm Items", None).await;
        let trade = engine.create_request(buyer, request(item.id)).await.unwrap();

        let (first, second) = tokio::join!(engine.accept(owner, trade.id), engine.accept(owner, trade.id));
        let (winner, loser) = match (first, second) {
            (Ok(t), Err(e)) | (Err(e), Ok(t)) => (t, e),
            other => panic!("expected exactly one accept to win: {:?}", other),
        };
        assert_eq!(winner.status, TradeStatus::Accepted);
        assert_eq!(status_of(loser), StatusCode::CONFLICT);

        // the stored status no longer matches, so the compare-and-set misses
        assert!(db.accept_trade(trade.id).await.unwrap().is_none());
        assert!(db.decline_trade(trade.id).await.unwrap().is_none());
        assert_eq!(status_of(TradeError::Concurrent), StatusCode::CONFLICT);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(TradeError::NotFound("Item").to_string(), "Item not found");
        let err: TradeError = TransitionError::InvalidTransition {
            action: TradeAction::Complete,
            from: TradeStatus::Declined,
        }
        .into();
        assert_eq!(err.to_string(), "cannot complete a trade request that is declined");
    }
}
