//! In-app notifications
//!
//! Every notification is persisted first and then pushed to any live
//! WebSocket subscribers of its recipient through the [`NotificationHub`].

mod hub;

pub use hub::NotificationHub;

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::{Database, DbError, NewNotification, Notification, ParseEnumError, TradeRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ChatMessage,
    TradeRequest,
    TradeAccepted,
    TradeDeclined,
    ItemSold,
    ItemBought,
    Recommendation,
}

/// Default wording and landing page for a notification kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub title: &'static str,
    pub body: &'static str,
    pub action_url: &'static str,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ChatMessage => "chat_message",
            NotificationKind::TradeRequest => "trade_request",
            NotificationKind::TradeAccepted => "trade_accepted",
            NotificationKind::TradeDeclined => "trade_declined",
            NotificationKind::ItemSold => "item_sold",
            NotificationKind::ItemBought => "item_bought",
            NotificationKind::Recommendation => "recommendation",
        }
    }

    pub fn template(&self) -> Template {
        match self {
            NotificationKind::TradeRequest => Template {
                title: "New Trade Request",
                body: "You received a new trade request for your item.",
                action_url: "/trades",
            },
            NotificationKind::TradeAccepted => Template {
                title: "Trade Request Accepted",
                body: "Your trade request has been accepted! You can now coordinate the exchange.",
                action_url: "/trades",
            },
            NotificationKind::TradeDeclined => Template {
                title: "Trade Request Declined",
                body: "Your trade request has been declined.",
                action_url: "/trades",
            },
            NotificationKind::ChatMessage => Template {
                title: "New Message",
                body: "You received a new message about your trade.",
                action_url: "/trades",
            },
            NotificationKind::ItemSold => Template {
                title: "Item Successfully Traded",
                body: "Your item has been successfully traded!",
                action_url: "/profile",
            },
            NotificationKind::ItemBought => Template {
                title: "Trade Completed",
                body: "You successfully traded for an item!",
                action_url: "/profile",
            },
            NotificationKind::Recommendation => Template {
                title: "New Recommendations",
                body: "Check out these items we think you'll love!",
                action_url: "/browse",
            },
        }
    }
}

impl FromStr for NotificationKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat_message" => Ok(NotificationKind::ChatMessage),
            "trade_request" => Ok(NotificationKind::TradeRequest),
            "trade_accepted" => Ok(NotificationKind::TradeAccepted),
            "trade_declined" => Ok(NotificationKind::TradeDeclined),
            "item_sold" => Ok(NotificationKind::ItemSold),
            "item_bought" => Ok(NotificationKind::ItemBought),
            "recommendation" => Ok(NotificationKind::Recommendation),
            other => Err(ParseEnumError {
                kind: "notification type",
                value: other.to_string(),
            }),
        }
    }
}

impl NewNotification {
    /// Notification using the kind's default title, body and action URL
    pub fn from_template(user_id: Uuid, kind: NotificationKind) -> Self {
        let template = kind.template();
        Self {
            user_id,
            kind,
            title: template.title.to_string(),
            message: template.body.to_string(),
            related_item_id: None,
            related_trade_request_id: None,
            related_chat_message_id: None,
            action_url: Some(template.action_url.to_string()),
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_action_url(mut self, url: &str) -> Self {
        self.action_url = Some(url.to_string());
        self
    }

    pub fn about_item(mut self, item_id: Option<Uuid>) -> Self {
        self.related_item_id = item_id;
        self
    }

    pub fn about_trade(mut self, trade: &TradeRequest) -> Self {
        self.related_item_id = Some(trade.item_id);
        self.related_trade_request_id = Some(trade.id);
        self
    }

    pub fn about_chat_message(mut self, chat_message_id: Uuid) -> Self {
        self.related_chat_message_id = Some(chat_message_id);
        self
    }
}

// ==========================================
// Event -> notification mapping
// ==========================================

/// Owner learns about a new request for their item
pub fn trade_requested(trade: &TradeRequest) -> NewNotification {
    NewNotification::from_template(trade.to_user_id, NotificationKind::TradeRequest).about_trade(trade)
}

pub fn trade_accepted(trade: &TradeRequest) -> NewNotification {
    NewNotification::from_template(trade.from_user_id, NotificationKind::TradeAccepted).about_trade(trade)
}

pub fn trade_declined(trade: &TradeRequest) -> NewNotification {
    NewNotification::from_template(trade.from_user_id, NotificationKind::TradeDeclined).about_trade(trade)
}

/// Owner and requester are both told the trade went through
pub fn trade_completed(trade: &TradeRequest, item_name: &str) -> [NewNotification; 2] {
    [
        NewNotification::from_template(trade.to_user_id, NotificationKind::ItemSold)
            .with_message(format!("Your item \"{}\" has been successfully traded!", item_name))
            .about_trade(trade),
        NewNotification::from_template(trade.from_user_id, NotificationKind::ItemBought)
            .with_message(format!("You successfully traded for \"{}\"!", item_name))
            .about_trade(trade),
    ]
}

/// The participant who did not send the chat message is notified
pub fn trade_chat_message(trade: &TradeRequest, sender_id: Uuid, chat_message_id: Uuid) -> NewNotification {
    NewNotification::from_template(trade.counterpart(sender_id), NotificationKind::ChatMessage)
        .about_trade(trade)
        .about_chat_message(chat_message_id)
}

pub fn direct_message(recipient_id: Uuid, item: Option<(Uuid, &str)>) -> NewNotification {
    let message = match item {
        Some((_, name)) => format!("You received a new message about {}.", name),
        None => "You received a new message.".to_string(),
    };
    NewNotification::from_template(recipient_id, NotificationKind::ChatMessage)
        .with_message(message)
        .with_action_url("/messages")
        .about_item(item.map(|(id, _)| id))
}

// ==========================================
// Delivery
// ==========================================

/// Persists notifications and fans them out to live subscribers
#[derive(Clone)]
pub struct Notifier {
    db: Database,
    hub: Arc<NotificationHub>,
}

impl Notifier {
    pub fn new(db: Database, hub: Arc<NotificationHub>) -> Self {
        Self { db, hub }
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    pub async fn send(&self, notification: NewNotification) -> Result<Notification, DbError> {
        let stored = self.db.insert_notification(&notification).await?;
        let delivered = self.hub.publish(&stored);
        debug!(
            "Notification {} ({}) stored for {}, {} live subscriber(s)",
            stored.id,
            stored.kind.as_str(),
            stored.user_id,
            delivered
        );
        Ok(stored)
    }

    /// Send without failing the caller; the triggering operation already succeeded
    pub async fn send_best_effort(&self, notification: NewNotification) {
        let kind = notification.kind;
        let user_id = notification.user_id;
        if let Err(e) = self.send(notification).await {
            warn!("Failed to create {} notification for {}: {}", kind.as_str(), user_id, e);
        }
    }

    pub async fn send_all_best_effort<I>(&self, notifications: I)
    where
        I: IntoIterator<Item = NewNotification>,
    {
        for notification in notifications {
            self.send_best_effort(notification).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::TradeStatus;
    use chrono::Utc;

    fn sample_trade() -> TradeRequest {
        TradeRequest {
            id: Uuid::new_v4(),
            from_user_id: Uuid::new_v4(),
            to_user_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            status: TradeStatus::Pending,
            message: Some("Still available?".to_string()),
            meeting_location: Some("Kirby Quad".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_request_goes_to_owner() {
        let trade = sample_trade();
        let n = trade_requested(&trade);
        assert_eq!(n.user_id, trade.to_user_id);
        assert_eq!(n.kind, NotificationKind::TradeRequest);
        assert_eq!(n.related_trade_request_id, Some(trade.id));
        assert_eq!(n.related_item_id, Some(trade.item_id));
        assert_eq!(n.action_url.as_deref(), Some("/trades"));
    }

    #[test]
    fn test_accept_and_decline_go_to_requester() {
        let trade = sample_trade();
        assert_eq!(trade_accepted(&trade).user_id, trade.from_user_id);
        assert_eq!(trade_declined(&trade).user_id, trade.from_user_id);
        assert_eq!(trade_declined(&trade).title, "Trade Request Declined");
    }

    #[test]
    fn test_completion_notifies_both_sides_with_item_name() {
        let trade = sample_trade();
        let [sold, bought] = trade_completed(&trade, "Calculus Textbook");
        assert_eq!(sold.user_id, trade.to_user_id);
        assert_eq!(sold.kind, NotificationKind::ItemSold);
        assert!(sold.message.contains("\"Calculus Textbook\""));
        assert_eq!(bought.user_id, trade.from_user_id);
        assert_eq!(bought.kind, NotificationKind::ItemBought);
        assert_eq!(bought.action_url.as_deref(), Some("/profile"));
    }

    #[test]
    fn test_chat_message_goes_to_other_participant() {
        let trade = sample_trade();
        let chat_id = Uuid::new_v4();
        let n = trade_chat_message(&trade, trade.to_user_id, chat_id);
        assert_eq!(n.user_id, trade.from_user_id);
        assert_eq!(n.related_chat_message_id, Some(chat_id));
    }

    #[test]
    fn test_direct_message_wording() {
        let recipient = Uuid::new_v4();
        let item_id = Uuid::new_v4();
        let with_item = direct_message(recipient, Some((item_id, "Desk Lamp")));
        assert_eq!(with_item.message, "You received a new message about Desk Lamp.");
        assert_eq!(with_item.related_item_id, Some(item_id));
        assert_eq!(with_item.action_url.as_deref(), Some("/messages"));

        let general = direct_message(recipient, None);
        assert_eq!(general.message, "You received a new message.");
        assert_eq!(general.related_item_id, None);
    }

    #[test]
    fn test_kind_text_round_trip() {
        for kind in [
            NotificationKind::ChatMessage,
            NotificationKind::TradeRequest,
            NotificationKind::TradeAccepted,
            NotificationKind::TradeDeclined,
            NotificationKind::ItemSold,
            NotificationKind::ItemBought,
            NotificationKind::Recommendation,
        ] {
            assert_eq!(kind.as_str().parse::<NotificationKind>().unwrap(), kind);
        }
    }
}
