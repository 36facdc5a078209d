//! Direct messages between users
//!
//! Messages are stored flat; the inbox view groups them into conversations
//! keyed by the other user and the item being discussed (or none).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::db::{Database, DirectMessage, ProfileSummary};
use crate::error::{ApiError, ApiResult};
use crate::notifications::{self, Notifier};
use crate::validation;

/// One inbox entry
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub other_user_id: Uuid,
    pub other_user: Option<ProfileSummary>,
    pub item_id: Option<Uuid>,
    pub item_name: Option<String>,
    pub last_message_at: DateTime<Utc>,
    pub unread_count: usize,
    /// Newest first
    pub messages: Vec<DirectMessage>,
}

/// Group a user's messages into conversations, most recently active first
pub fn group_conversations(user_id: Uuid, messages: Vec<DirectMessage>) -> Vec<Conversation> {
    let mut groups: HashMap<(Uuid, Option<Uuid>), Vec<DirectMessage>> = HashMap::new();

    for message in messages {
        let other = if message.sender_id == user_id {
            message.recipient_id
        } else {
            message.sender_id
        };
        groups.entry((other, message.item_id)).or_default().push(message);
    }

    let mut conversations: Vec<Conversation> = groups
        .into_iter()
        .filter_map(|((other_user_id, item_id), mut messages)| {
            messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));

            let latest = messages.first()?;
            let other_user = if latest.sender_id == other_user_id {
                latest.sender.clone()
            } else {
                latest.recipient.clone()
            };
            let item_name = messages.iter().find_map(|m| m.item_name.clone());
            let unread_count = messages
                .iter()
                .filter(|m| m.recipient_id == user_id && !m.is_read)
                .count();

            Some(Conversation {
                other_user_id,
                other_user,
                item_id,
                item_name,
                last_message_at: latest.created_at,
                unread_count,
                messages,
            })
        })
        .collect();

    conversations.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    conversations
}

#[derive(Clone)]
pub struct Messenger {
    db: Database,
    notifier: Notifier,
}

impl Messenger {
    pub fn new(db: Database, notifier: Notifier) -> Self {
        Self { db, notifier }
    }

    pub async fn send(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        item_id: Option<Uuid>,
        text: &str,
    ) -> ApiResult<DirectMessage> {
        if sender_id == recipient_id {
            return Err(ApiError::bad_request("cannot send a message to yourself"));
        }
        let text = validation::message_text(text)?;

        let item = match item_id {
            Some(id) => Some(self.db.get_item(id).await?.ok_or_else(|| ApiError::not_found("Item"))?),
            None => None,
        };

        let message = self
            .db
            .create_direct_message(sender_id, recipient_id, item_id, &text)
            .await?;
        debug!("Direct message {} from {} to {}", message.id, sender_id, recipient_id);

        let about = item.as_ref().map(|listing| (listing.item.id, listing.item.name.as_str()));
        self.notifier
            .send_best_effort(notifications::direct_message(recipient_id, about))
            .await;

        Ok(message)
    }

    pub async fn thread(&self, user_id: Uuid, other_user_id: Uuid, item_id: Option<Uuid>) -> ApiResult<Vec<DirectMessage>> {
        Ok(self.db.direct_thread(user_id, other_user_id, item_id).await?)
    }

    pub async fn conversations(&self, user_id: Uuid) -> ApiResult<Vec<Conversation>> {
        let messages = self.db.direct_messages_for_user(user_id).await?;
        Ok(group_conversations(user_id, messages))
    }

    /// Only the recipient can mark a message read
    pub async fn mark_read(&self, user_id: Uuid, message_id: Uuid) -> ApiResult<()> {
        if self.db.mark_direct_message_read(message_id, user_id).await? {
            Ok(())
        } else {
            Err(ApiError::not_found("Message"))
        }
    }

    pub async fn mark_thread_read(&self, user_id: Uuid, other_user_id: Uuid, item_id: Option<Uuid>) -> ApiResult<u64> {
        Ok(self.db.mark_thread_read(user_id, other_user_id, item_id).await?)
    }
}
