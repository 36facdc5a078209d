//! Database module for PostgreSQL operations using SQLx
//! Uses runtime query checking (no compile-time DATABASE_URL needed)

mod models;
#[cfg(test)]
pub mod testing;

pub use models::*;

use std::collections::HashMap;

use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, Row};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::carbon::ItemSavings;
use crate::trading::TradeStatus;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Record not found")]
    NotFound,
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl DbError {
    fn from_insert(err: sqlx::Error, conflict: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => DbError::Conflict(conflict.to_string()),
            _ => DbError::Sqlx(err),
        }
    }
}

macro_rules! item_columns {
    () => {
        "i.id, i.user_id, i.name, i.brand, i.category, i.subcategory, i.condition, i.size,
         i.description, i.images, i.status, i.is_traded, i.traded_at, i.traded_to_user_id,
         i.created_at, i.updated_at"
    };
}

macro_rules! owner_columns {
    () => {
        "p.username AS owner_username, p.full_name AS owner_full_name, p.avatar_url AS owner_avatar_url"
    };
}

macro_rules! trade_columns {
    () => {
        "id, from_user_id, to_user_id, item_id, status, message, meeting_location, created_at, updated_at"
    };
}

macro_rules! preference_columns {
    () => {
        "user_id, favorite_categories, favorite_brands, preferred_sizes, size_preferences,
         browsing_history, search_history, ai_preferences, updated_at, last_recommendation_update"
    };
}

macro_rules! notification_columns {
    () => {
        "id, user_id, type, title, message, is_read, read_at, related_item_id,
         related_trade_request_id, related_chat_message_id, action_url, metadata, created_at"
    };
}

macro_rules! direct_message_select {
    ($source:literal) => {
        concat!(
            "SELECT dm.id, dm.sender_id, dm.recipient_id, dm.item_id, dm.message, dm.is_read,
                    dm.read_at, dm.created_at,
                    s.username AS sender_username, s.full_name AS sender_full_name,
                    s.avatar_url AS sender_avatar_url,
                    r.username AS recipient_username, r.full_name AS recipient_full_name,
                    r.avatar_url AS recipient_avatar_url,
                    i.name AS item_name
             FROM ",
            $source,
            " dm
             LEFT JOIN profiles s ON s.id = dm.sender_id
             LEFT JOIN profiles r ON r.id = dm.recipient_id
             LEFT JOIN items i ON i.id = dm.item_id"
        )
    };
}

/// Escape LIKE wildcards in user-supplied search text
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Database connection wrapper
#[derive(Clone)]
pub struct Database {
    pool: Arc<PgPool>,
}

impl Database {
    /// Create a new database connection pool
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Database pool created with max {} connections", max_connections);

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Pool that connects on first use
    pub fn connect_lazy(database_url: &str) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new().max_connections(1).connect_lazy(database_url)?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema (idempotent)
    pub async fn migrate(&self) -> Result<(), DbError> {
        sqlx::raw_sql(include_str!("schema.sql"))
            .execute(self.pool())
            .await?;
        info!("Database schema applied");
        Ok(())
    }

    // ==========================================
    // Profile Operations
    // ==========================================

    pub async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, DbError> {
        let row = sqlx::query(
            r#"
            SELECT id, username, full_name, avatar_url, created_at
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|row| Profile::from_row(&row)).transpose()?)
    }

    pub async fn upsert_profile(
        &self,
        user_id: Uuid,
        username: &str,
        full_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<Profile, DbError> {
        let row = sqlx::query(
            r#"
            INSERT INTO profiles (id, username, full_name, avatar_url)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET
                username = EXCLUDED.username,
                full_name = EXCLUDED.full_name,
                avatar_url = EXCLUDED.avatar_url
            RETURNING id, username, full_name, avatar_url, created_at
            "#,
        )
        .bind(user_id)
        .bind(username)
        .bind(full_name)
        .bind(avatar_url)
        .fetch_one(self.pool())
        .await
        .map_err(|e| DbError::from_insert(e, "username already taken"))?;

        Ok(Profile::from_row(&row)?)
    }

    // ==========================================
    // Item Operations
    // ==========================================

    pub async fn create_item(&self, item: &NewItemRecord) -> Result<Item, DbError> {
        let row = sqlx::query(
            r#"
            INSERT INTO items AS i (
                user_id, name, brand, category, subcategory,
                condition, size, description, images
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING
                id, user_id, name, brand, category, subcategory, condition, size,
                description, images, status, is_traded, traded_at, traded_to_user_id,
                created_at, updated_at
            "#,
        )
        .bind(item.user_id)
        .bind(&item.name)
        .bind(&item.brand)
        .bind(&item.category)
        .bind(&item.subcategory)
        .bind(&item.condition)
        .bind(&item.size)
        .bind(&item.description)
        .bind(&item.images)
        .fetch_one(self.pool())
        .await?;

        Ok(Item::from_row(&row)?)
    }

    /// Untraded items, newest first
    pub async fn list_available_items(&self, filter: &ItemFilter) -> Result<Vec<ItemWithOwner>, DbError> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(escape_like);

        let rows = sqlx::query(concat!(
            "SELECT ",
            item_columns!(),
            ", ",
            owner_columns!(),
            r#"
            FROM items i
            LEFT JOIN profiles p ON p.id = i.user_id
            WHERE
                NOT i.is_traded
                AND ($1::text IS NULL OR i.category = $1)
                AND ($5::text IS NULL OR i.subcategory = $5)
                AND (
                    $2::text IS NULL
                    OR i.name ILIKE '%' || $2 || '%'
                    OR i.brand ILIKE '%' || $2 || '%'
                    OR i.description ILIKE '%' || $2 || '%'
                    OR i.category ILIKE '%' || $2 || '%'
                    OR i.subcategory ILIKE '%' || $2 || '%'
                )
            ORDER BY i.created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(&filter.category)
        .bind(search)
        .bind(filter.limit)
        .bind(filter.offset)
        .bind(&filter.subcategory)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| ItemWithOwner::from_row(row).map_err(DbError::from))
            .collect()
    }

    pub async fn get_item(&self, item_id: Uuid) -> Result<Option<ItemWithOwner>, DbError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            item_columns!(),
            ", ",
            owner_columns!(),
            r#"
            FROM items i
            LEFT JOIN profiles p ON p.id = i.user_id
            WHERE i.id = $1
            "#
        ))
        .bind(item_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|row| ItemWithOwner::from_row(&row)).transpose()?)
    }

    pub async fn items_by_user(&self, user_id: Uuid) -> Result<Vec<Item>, DbError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            item_columns!(),
            r#"
            FROM items i
            WHERE i.user_id = $1
            ORDER BY i.created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| Item::from_row(row).map_err(DbError::from))
            .collect()
    }

    /// Overwrite the editable fields of an untraded item
    pub async fn update_item(&self, item_id: Uuid, fields: &NewItemRecord) -> Result<Item, DbError> {
        let row = sqlx::query(
            r#"
            UPDATE items
            SET
                name = $2,
                brand = $3,
                category = $4,
                subcategory = $5,
                condition = $6,
                size = $7,
                description = $8,
                images = $9,
                updated_at = NOW()
            WHERE id = $1 AND user_id = $10 AND NOT is_traded
            RETURNING
                id, user_id, name, brand, category, subcategory, condition, size,
                description, images, status, is_traded, traded_at, traded_to_user_id,
                created_at, updated_at
            "#,
        )
        .bind(item_id)
        .bind(&fields.name)
        .bind(&fields.brand)
        .bind(&fields.category)
        .bind(&fields.subcategory)
        .bind(&fields.condition)
        .bind(&fields.size)
        .bind(&fields.description)
        .bind(&fields.images)
        .bind(fields.user_id)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => Ok(Item::from_row(&row)?),
            None => Err(DbError::NotFound),
        }
    }

    pub async fn delete_item(&self, item_id: Uuid, owner_id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM items WHERE id = $1 AND user_id = $2")
            .bind(item_id)
            .bind(owner_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ==========================================
    // Trade Request Operations
    // ==========================================

    pub async fn get_trade(&self, trade_id: Uuid) -> Result<Option<TradeRequest>, DbError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            trade_columns!(),
            " FROM trade_requests WHERE id = $1"
        ))
        .bind(trade_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|row| TradeRequest::from_row(&row)).transpose()?)
    }

    /// Insert a pending request while the item is still available; `None` when it
    /// is not. An existing open request from the same user is a conflict.
    pub async fn create_trade(&self, trade: &NewTradeRecord) -> Result<Option<TradeRequest>, DbError> {
        let row = sqlx::query(concat!(
            r#"
            INSERT INTO trade_requests (from_user_id, to_user_id, item_id, message, meeting_location)
            SELECT $1::uuid, $2::uuid, $3::uuid, $4::text, $5::text
            WHERE EXISTS (
                SELECT 1 FROM items
                WHERE id = $3 AND user_id = $2 AND status = 'available' AND NOT is_traded
            )
            RETURNING "#,
            trade_columns!()
        ))
        .bind(trade.from_user_id)
        .bind(trade.to_user_id)
        .bind(trade.item_id)
        .bind(&trade.message)
        .bind(&trade.meeting_location)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| DbError::from_insert(e, "an open trade request for this item already exists"))?;

        Ok(row.map(|row| TradeRequest::from_row(&row)).transpose()?)
    }

    /// Requests sent or received by the user, newest first
    pub async fn trades_for_user(&self, user_id: Uuid) -> Result<Vec<TradeRequestView>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT
                t.id, t.from_user_id, t.to_user_id, t.item_id, t.status, t.message,
                t.meeting_location, t.created_at, t.updated_at,
                i.name AS item_name, i.images AS item_images,
                f.username AS from_username, o.username AS to_username
            FROM trade_requests t
            LEFT JOIN items i ON i.id = t.item_id
            LEFT JOIN profiles f ON f.id = t.from_user_id
            LEFT JOIN profiles o ON o.id = t.to_user_id
            WHERE t.from_user_id = $1 OR t.to_user_id = $1
            ORDER BY t.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| TradeRequestView::from_row(row).map_err(DbError::from))
            .collect()
    }

    /// Compare-and-set a trade's status; `None` when the stored status was not `from`
    async fn set_trade_status(
        conn: &mut PgConnection,
        trade_id: Uuid,
        from: TradeStatus,
        to: TradeStatus,
    ) -> Result<Option<TradeRequest>, DbError> {
        let row = sqlx::query(concat!(
            r#"
            UPDATE trade_requests
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING "#,
            trade_columns!()
        ))
        .bind(trade_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(|row| TradeRequest::from_row(&row)).transpose()?)
    }

    pub async fn decline_trade(&self, trade_id: Uuid) -> Result<Option<TradeRequest>, DbError> {
        let mut conn = self.pool().acquire().await?;
        Self::set_trade_status(&mut *conn, trade_id, TradeStatus::Pending, TradeStatus::Declined).await
    }

    /// Accept a pending request, reserve the item and decline competing requests.
    /// Returns the accepted request and the requests declined alongside it.
    pub async fn accept_trade(
        &self,
        trade_id: Uuid,
    ) -> Result<Option<(TradeRequest, Vec<TradeRequest>)>, DbError> {
        let mut tx = self.pool().begin().await?;

        let accepted =
            match Self::set_trade_status(&mut *tx, trade_id, TradeStatus::Pending, TradeStatus::Accepted).await? {
                Some(trade) => trade,
                None => return Ok(None),
            };

        let reserved = sqlx::query(
            r#"
            UPDATE items
            SET status = 'pending', updated_at = NOW()
            WHERE id = $1 AND status = 'available' AND NOT is_traded
            "#,
        )
        .bind(accepted.item_id)
        .execute(&mut *tx)
        .await?;

        if reserved.rows_affected() == 0 {
            // Item already reserved or traded; the transaction rolls back on drop
            return Err(DbError::Conflict("item is no longer available".to_string()));
        }

        let declined = Self::decline_pending_for_item(&mut *tx, accepted.item_id, accepted.id).await?;

        tx.commit().await?;

        Ok(Some((accepted, declined)))
    }

    /// Decline every pending request on an item other than `keep`
    async fn decline_pending_for_item(
        conn: &mut PgConnection,
        item_id: Uuid,
        keep: Uuid,
    ) -> Result<Vec<TradeRequest>, DbError> {
        let rows = sqlx::query(concat!(
            r#"
            UPDATE trade_requests
            SET status = 'declined', updated_at = NOW()
            WHERE item_id = $1 AND id <> $2 AND status = 'pending'
            RETURNING "#,
            trade_columns!()
        ))
        .bind(item_id)
        .bind(keep)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .iter()
            .map(TradeRequest::from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Complete an accepted request: mark the item traded, credit both
    /// participants with the item's carbon savings and decline any request
    /// still pending on the item.
    pub async fn complete_trade(
        &self,
        trade_id: Uuid,
        savings: &ItemSavings,
    ) -> Result<Option<(TradeRequest, Vec<TradeRequest>)>, DbError> {
        let mut tx = self.pool().begin().await?;

        let completed =
            match Self::set_trade_status(&mut *tx, trade_id, TradeStatus::Accepted, TradeStatus::Completed).await? {
                Some(trade) => trade,
                None => return Ok(None),
            };

        sqlx::query(
            r#"
            UPDATE items
            SET
                status = 'traded',
                is_traded = TRUE,
                traded_at = NOW(),
                traded_to_user_id = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(completed.item_id)
        .bind(completed.from_user_id)
        .execute(&mut *tx)
        .await?;

        for user_id in [completed.from_user_id, completed.to_user_id] {
            sqlx::query(
                r#"
                INSERT INTO user_carbon_savings (
                    user_id, item_id, trade_id, co2_saved_kg,
                    water_saved_liters, waste_diverted_kg, savings_type
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(user_id)
            .bind(completed.item_id)
            .bind(completed.id)
            .bind(savings.co2_saved_kg)
            .bind(savings.water_saved_liters)
            .bind(savings.waste_diverted_kg)
            .bind(SavingsType::TradeCompleted.as_str())
            .execute(&mut *tx)
            .await?;
        }

        let declined = Self::decline_pending_for_item(&mut *tx, completed.item_id, completed.id).await?;

        tx.commit().await?;

        Ok(Some((completed, declined)))
    }

    // ==========================================
    // Trade Chat Operations
    // ==========================================

    pub async fn chat_messages(&self, trade_id: Uuid) -> Result<Vec<ChatMessage>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT
                c.id, c.trade_request_id, c.sender_id, c.message, c.is_read, c.created_at,
                p.username AS sender_username, p.full_name AS sender_full_name,
                p.avatar_url AS sender_avatar_url
            FROM chat_messages c
            LEFT JOIN profiles p ON p.id = c.sender_id
            WHERE c.trade_request_id = $1
            ORDER BY c.created_at ASC
            "#,
        )
        .bind(trade_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| ChatMessage::from_row(row).map_err(DbError::from))
            .collect()
    }

    pub async fn create_chat_message(
        &self,
        trade_id: Uuid,
        sender_id: Uuid,
        message: &str,
    ) -> Result<ChatMessage, DbError> {
        let row = sqlx::query(
            r#"
            WITH inserted AS (
                INSERT INTO chat_messages (trade_request_id, sender_id, message)
                VALUES ($1, $2, $3)
                RETURNING id, trade_request_id, sender_id, message, is_read, created_at
            )
            SELECT
                inserted.*,
                p.username AS sender_username, p.full_name AS sender_full_name,
                p.avatar_url AS sender_avatar_url
            FROM inserted
            LEFT JOIN profiles p ON p.id = inserted.sender_id
            "#,
        )
        .bind(trade_id)
        .bind(sender_id)
        .bind(message)
        .fetch_one(self.pool())
        .await?;

        Ok(ChatMessage::from_row(&row)?)
    }

    // ==========================================
    // Direct Message Operations
    // ==========================================

    pub async fn create_direct_message(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        item_id: Option<Uuid>,
        message: &str,
    ) -> Result<DirectMessage, DbError> {
        let row = sqlx::query(concat!(
            r#"
            WITH inserted AS (
                INSERT INTO direct_messages (sender_id, recipient_id, item_id, message)
                VALUES ($1, $2, $3, $4)
                RETURNING *
            )
            "#,
            direct_message_select!("inserted")
        ))
        .bind(sender_id)
        .bind(recipient_id)
        .bind(item_id)
        .bind(message)
        .fetch_one(self.pool())
        .await?;

        Ok(DirectMessage::from_row(&row)?)
    }

    /// Messages between two users, oldest first, optionally about one item
    pub async fn direct_thread(
        &self,
        user_id: Uuid,
        other_user_id: Uuid,
        item_id: Option<Uuid>,
    ) -> Result<Vec<DirectMessage>, DbError> {
        let rows = sqlx::query(concat!(
            direct_message_select!("direct_messages"),
            r#"
            WHERE
                ((dm.sender_id = $1 AND dm.recipient_id = $2)
                 OR (dm.sender_id = $2 AND dm.recipient_id = $1))
                AND ($3::uuid IS NULL OR dm.item_id = $3)
            ORDER BY dm.created_at ASC
            "#
        ))
        .bind(user_id)
        .bind(other_user_id)
        .bind(item_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| DirectMessage::from_row(row).map_err(DbError::from))
            .collect()
    }

    /// Every message the user sent or received, newest first
    pub async fn direct_messages_for_user(&self, user_id: Uuid) -> Result<Vec<DirectMessage>, DbError> {
        let rows = sqlx::query(concat!(
            direct_message_select!("direct_messages"),
            r#"
            WHERE dm.sender_id = $1 OR dm.recipient_id = $1
            ORDER BY dm.created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| DirectMessage::from_row(row).map_err(DbError::from))
            .collect()
    }

    /// Mark one message read; only its recipient may do so
    pub async fn mark_direct_message_read(&self, message_id: Uuid, recipient_id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE direct_messages
            SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND recipient_id = $2
            "#,
        )
        .bind(message_id)
        .bind(recipient_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_thread_read(
        &self,
        recipient_id: Uuid,
        sender_id: Uuid,
        item_id: Option<Uuid>,
    ) -> Result<u64, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE direct_messages
            SET is_read = TRUE, read_at = NOW()
            WHERE
                recipient_id = $1
                AND sender_id = $2
                AND NOT is_read
                AND ($3::uuid IS NULL OR item_id = $3)
            "#,
        )
        .bind(recipient_id)
        .bind(sender_id)
        .bind(item_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }

    // ==========================================
    // Notification Operations
    // ==========================================

    pub async fn insert_notification(&self, notification: &NewNotification) -> Result<Notification, DbError> {
        let row = sqlx::query(concat!(
            r#"
            INSERT INTO notifications (
                user_id, type, title, message, related_item_id,
                related_trade_request_id, related_chat_message_id, action_url, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING "#,
            notification_columns!()
        ))
        .bind(notification.user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.related_item_id)
        .bind(notification.related_trade_request_id)
        .bind(notification.related_chat_message_id)
        .bind(&notification.action_url)
        .bind(Json(&notification.metadata))
        .fetch_one(self.pool())
        .await?;

        Ok(Notification::from_row(&row)?)
    }

    pub async fn notifications(&self, user_id: Uuid, limit: i64) -> Result<Vec<Notification>, DbError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            notification_columns!(),
            r#"
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| Notification::from_row(row).map_err(DbError::from))
            .collect()
    }

    pub async fn unread_notification_count(&self, user_id: Uuid) -> Result<i64, DbError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .fetch_one(self.pool())
        .await?;

        Ok(row.0)
    }

    /// Only the notification's owner can mark it read
    pub async fn mark_notification_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = NOW()
            WHERE user_id = $1 AND NOT is_read
            "#,
        )
        .bind(user_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }

    // ==========================================
    // Wishlist Operations
    // ==========================================

    /// Returns false when the item was already wishlisted
    pub async fn add_to_wishlist(&self, user_id: Uuid, item_id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO wishlist (user_id, item_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, item_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_from_wishlist(&self, user_id: Uuid, item_id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM wishlist WHERE user_id = $1 AND item_id = $2")
            .bind(user_id)
            .bind(item_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistEntry>, DbError> {
        let rows = sqlx::query(concat!(
            "SELECT w.id AS wishlist_id, w.user_id AS wishlist_user_id, w.created_at AS wishlisted_at, ",
            item_columns!(),
            ", ",
            owner_columns!(),
            r#"
            FROM wishlist w
            JOIN items i ON i.id = w.item_id
            LEFT JOIN profiles p ON p.id = i.user_id
            WHERE w.user_id = $1
            ORDER BY w.created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| WishlistEntry::from_row(row).map_err(DbError::from))
            .collect()
    }

    // ==========================================
    // Preference Operations
    // ==========================================

    pub async fn get_preferences(&self, user_id: Uuid) -> Result<Option<UserPreferences>, DbError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            preference_columns!(),
            " FROM user_preferences WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|row| UserPreferences::from_row(&row)).transpose()?)
    }

    /// Read-modify-write a user's preferences under a row lock, creating the row if needed
    pub async fn modify_preferences<F>(&self, user_id: Uuid, apply: F) -> Result<UserPreferences, DbError>
    where
        F: FnOnce(&mut UserPreferences),
    {
        let mut tx = self.pool().begin().await?;

        sqlx::query("INSERT INTO user_preferences (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(concat!(
            "SELECT ",
            preference_columns!(),
            " FROM user_preferences WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut preferences = UserPreferences::from_row(&row)?;
        apply(&mut preferences);

        let row = sqlx::query(concat!(
            r#"
            UPDATE user_preferences
            SET
                favorite_categories = $2,
                favorite_brands = $3,
                preferred_sizes = $4,
                size_preferences = $5,
                browsing_history = $6,
                search_history = $7,
                ai_preferences = $8,
                updated_at = $9,
                last_recommendation_update = $10
            WHERE user_id = $1
            RETURNING "#,
            preference_columns!()
        ))
        .bind(user_id)
        .bind(&preferences.favorite_categories)
        .bind(&preferences.favorite_brands)
        .bind(&preferences.preferred_sizes)
        .bind(Json(&preferences.size_preferences))
        .bind(Json(&preferences.browsing_history))
        .bind(Json(&preferences.search_history))
        .bind(Json(&preferences.ai_preferences))
        .bind(preferences.updated_at)
        .bind(preferences.last_recommendation_update)
        .fetch_one(&mut *tx)
        .await?;

        let saved = UserPreferences::from_row(&row)?;
        tx.commit().await?;

        Ok(saved)
    }

    pub async fn update_size_preferences(
        &self,
        user_id: Uuid,
        sizes: HashMap<String, Vec<String>>,
    ) -> Result<UserPreferences, DbError> {
        self.modify_preferences(user_id, move |prefs| {
            prefs.size_preferences = sizes;
            prefs.updated_at = Some(chrono::Utc::now());
        })
        .await
    }

    /// Untraded items not owned or wishlisted by the user, newest first
    pub async fn recommendation_candidates(&self, user_id: Uuid, limit: i64) -> Result<Vec<ItemWithOwner>, DbError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            item_columns!(),
            ", ",
            owner_columns!(),
            r#"
            FROM items i
            LEFT JOIN profiles p ON p.id = i.user_id
            WHERE
                NOT i.is_traded
                AND i.user_id <> $1
                AND NOT EXISTS (
                    SELECT 1 FROM wishlist w WHERE w.user_id = $1 AND w.item_id = i.id
                )
            ORDER BY i.created_at DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| ItemWithOwner::from_row(row).map_err(DbError::from))
            .collect()
    }

    /// Like [`Self::recommendation_candidates`], restricted by explicit favorites
    /// (an empty list imposes no restriction)
    pub async fn favorite_matches(
        &self,
        user_id: Uuid,
        preferences: &UserPreferences,
        limit: i64,
    ) -> Result<Vec<ItemWithOwner>, DbError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            item_columns!(),
            ", ",
            owner_columns!(),
            r#"
            FROM items i
            LEFT JOIN profiles p ON p.id = i.user_id
            WHERE
                NOT i.is_traded
                AND i.user_id <> $1
                AND NOT EXISTS (
                    SELECT 1 FROM wishlist w WHERE w.user_id = $1 AND w.item_id = i.id
                )
                AND (cardinality($2::text[]) = 0 OR i.category = ANY($2))
                AND (cardinality($3::text[]) = 0 OR i.brand = ANY($3))
                AND (cardinality($4::text[]) = 0 OR i.size = ANY($4))
            ORDER BY i.created_at DESC
            LIMIT $5
            "#
        ))
        .bind(user_id)
        .bind(&preferences.favorite_categories)
        .bind(&preferences.favorite_brands)
        .bind(&preferences.preferred_sizes)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| ItemWithOwner::from_row(row).map_err(DbError::from))
            .collect()
    }

    // ==========================================
    // Carbon Operations
    // ==========================================

    /// Reference footprint, preferring the exact subcategory over the category default
    pub async fn carbon_footprint(
        &self,
        category: &str,
        subcategory: Option<&str>,
    ) -> Result<Option<CarbonFootprint>, DbError> {
        let row = sqlx::query(
            r#"
            SELECT
                category, subcategory, kg_co2_per_item, manufacturing_emissions,
                transportation_emissions, disposal_emissions, water_usage_liters, description
            FROM carbon_footprint_categories
            WHERE category = $1 AND (subcategory = $2 OR subcategory IS NULL)
            ORDER BY subcategory IS NULL
            LIMIT 1
            "#,
        )
        .bind(category)
        .bind(subcategory)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|row| CarbonFootprint::from_row(&row)).transpose()?)
    }

    pub async fn carbon_savings_for_user(&self, user_id: Uuid) -> Result<Vec<CarbonSaving>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id, user_id, item_id, trade_id, co2_saved_kg, water_saved_liters,
                waste_diverted_kg, savings_type, created_at
            FROM user_carbon_savings
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| CarbonSaving::from_row(row).map_err(DbError::from))
            .collect()
    }

    pub async fn campus_carbon_impact(&self) -> Result<CampusCarbonImpact, DbError> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(co2_saved_kg), 0)::float8 AS total_co2_saved_kg,
                COALESCE(SUM(water_saved_liters), 0)::float8 AS total_water_saved_liters,
                COALESCE(SUM(waste_diverted_kg), 0)::float8 AS total_waste_diverted_kg,
                COUNT(DISTINCT trade_id) FILTER (WHERE savings_type = 'trade_completed') AS total_trades_completed,
                COUNT(DISTINCT item_id) FILTER (WHERE savings_type = 'trade_completed') AS total_items_traded,
                COUNT(DISTINCT user_id) AS active_traders_count
            FROM user_carbon_savings
            "#,
        )
        .fetch_one(self.pool())
        .await?;

        Ok(CampusCarbonImpact::from_row(&row)?)
    }

    pub async fn carbon_leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT
                s.user_id,
                p.username,
                p.full_name,
                p.avatar_url,
                SUM(s.co2_saved_kg)::float8 AS total_co2_saved,
                COUNT(*) FILTER (WHERE s.savings_type = 'trade_completed') AS total_trades
            FROM user_carbon_savings s
            JOIN profiles p ON p.id = s.user_id
            GROUP BY s.user_id, p.username, p.full_name, p.avatar_url
            ORDER BY total_co2_saved DESC, total_trades DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| LeaderboardEntry::from_row(row).map_err(DbError::from))
            .collect()
    }

    /// Counts used by the health endpoint
    pub async fn marketplace_counts(&self) -> Result<(i64, i64), DbError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM items WHERE NOT is_traded) AS available_items,
                (SELECT COUNT(*) FROM trade_requests WHERE status = 'pending') AS pending_trades
            "#,
        )
        .fetch_one(self.pool())
        .await?;

        Ok((row.try_get("available_items")?, row.try_get("pending_trades")?))
    }
}
