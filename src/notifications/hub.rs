//! Per-user broadcast channels for live notification delivery

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::db::Notification;

pub struct NotificationHub {
    channels: DashMap<Uuid, broadcast::Sender<Notification>>,
    capacity: usize,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to a user's notifications; the channel is created on demand
    pub fn subscribe(&self, user_id: Uuid) -> broadcast::Receiver<Notification> {
        self.channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver to live subscribers, returning how many received it.
    /// Channels whose subscribers have all gone are dropped.
    pub fn publish(&self, notification: &Notification) -> usize {
        let user_id = notification.user_id;

        let delivered = match self.channels.get(&user_id) {
            Some(sender) => sender.send(notification.clone()).unwrap_or(0),
            None => return 0,
        };

        if delivered == 0 {
            self.channels.remove_if(&user_id, |_, sender| sender.receiver_count() == 0);
            debug!("Dropped idle notification channel for {}", user_id);
        }

        delivered
    }

    /// Users with at least one open channel
    pub fn connected_users(&self) -> usize {
        self.channels
            .iter()
            .filter(|entry| entry.value().receiver_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationKind;
    use chrono::Utc;

    fn notification_for(user_id: Uuid) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id,
            kind: NotificationKind::TradeRequest,
            title: "New Trade Request".to_string(),
            message: "You received a new trade request for your item.".to_string(),
            is_read: false,
            read_at: None,
            related_item_id: None,
            related_trade_request_id: None,
            related_chat_message_id: None,
            action_url: Some("/trades".to_string()),
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_own_notifications_only() {
        let hub = NotificationHub::new(8);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut alice_rx = hub.subscribe(alice);
        let mut bob_rx = hub.subscribe(bob);

        let n = notification_for(alice);
        assert_eq!(hub.publish(&n), 1);

        assert_eq!(alice_rx.recv().await.unwrap().id, n.id);
        assert!(bob_rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let hub = NotificationHub::new(8);
        assert_eq!(hub.publish(&notification_for(Uuid::new_v4())), 0);
        assert_eq!(hub.connected_users(), 0);
    }

    #[test]
    fn test_dropped_subscriber_channel_is_pruned() {
        let hub = NotificationHub::new(8);
        let user = Uuid::new_v4();
        let rx = hub.subscribe(user);
        assert_eq!(hub.connected_users(), 1);
        drop(rx);

        assert_eq!(hub.publish(&notification_for(user)), 0);
        assert!(hub.channels.get(&user).is_none());
    }

    #[tokio::test]
    async fn test_slow_subscriber_sees_lag() {
        let hub = NotificationHub::new(2);
        let user = Uuid::new_v4();
        let mut rx = hub.subscribe(user);
        for _ in 0..4 {
            hub.publish(&notification_for(user));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        assert!(rx.recv().await.is_ok());
    }
}
