//! Database models matching the PostgreSQL schema in `schema.sql`

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};
use thiserror::Error;
use uuid::Uuid;

use crate::notifications::NotificationKind;
use crate::trading::TradeStatus;

/// Unknown text value in an enum-like column
#[derive(Debug, Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Read a TEXT column into one of our string-backed enums
fn decode_text<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = ParseEnumError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: ParseEnumError| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

// ==========================================
// Profiles
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Profile {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            full_name: row.try_get("full_name")?,
            avatar_url: row.try_get("avatar_url")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Public fields of a profile embedded in other responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileSummary {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfileSummary {
    /// Read `<prefix>username` etc. from a joined row; `None` when the join missed
    fn from_prefixed(row: &PgRow, id_column: &str, prefix: &str) -> Result<Option<Self>, sqlx::Error> {
        let username: Option<String> = row.try_get(format!("{}username", prefix).as_str())?;
        match username {
            Some(username) => Ok(Some(Self {
                id: row.try_get(id_column)?,
                username,
                full_name: row.try_get(format!("{}full_name", prefix).as_str())?,
                avatar_url: row.try_get(format!("{}avatar_url", prefix).as_str())?,
            })),
            None => Ok(None),
        }
    }
}

// ==========================================
// Items
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Available,
    /// A trade request for the item has been accepted
    Pending,
    Traded,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Available => "available",
            ItemStatus::Pending => "pending",
            ItemStatus::Traded => "traded",
        }
    }
}

impl FromStr for ItemStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(ItemStatus::Available),
            "pending" => Ok(ItemStatus::Pending),
            "traded" => Ok(ItemStatus::Traded),
            other => Err(ParseEnumError {
                kind: "item status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub condition: String,
    pub size: String,
    pub description: String,
    pub images: Vec<String>,
    pub status: ItemStatus,
    pub is_traded: bool,
    pub traded_at: Option<DateTime<Utc>>,
    pub traded_to_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Open for new trade requests
    pub fn is_available(&self) -> bool {
        !self.is_traded && self.status == ItemStatus::Available
    }
}

impl<'r> FromRow<'r, PgRow> for Item {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            brand: row.try_get("brand")?,
            category: row.try_get("category")?,
            subcategory: row.try_get("subcategory")?,
            condition: row.try_get("condition")?,
            size: row.try_get("size")?,
            description: row.try_get("description")?,
            images: row.try_get("images")?,
            status: decode_text(row, "status")?,
            is_traded: row.try_get("is_traded")?,
            traded_at: row.try_get("traded_at")?,
            traded_to_user_id: row.try_get("traded_to_user_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Item joined with its owner's profile (`owner_*` columns)
#[derive(Debug, Clone, Serialize)]
pub struct ItemWithOwner {
    #[serde(flatten)]
    pub item: Item,
    pub owner: Option<ProfileSummary>,
}

impl<'r> FromRow<'r, PgRow> for ItemWithOwner {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            item: Item::from_row(row)?,
            owner: ProfileSummary::from_prefixed(row, "user_id", "owner_")?,
        })
    }
}

/// Column values for an item insert, already validated
#[derive(Debug, Clone)]
pub struct NewItemRecord {
    pub user_id: Uuid,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub condition: String,
    pub size: String,
    pub description: String,
    pub images: Vec<String>,
}

/// Filters for browsing available items
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

// ==========================================
// Trade Requests
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    pub id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub item_id: Uuid,
    pub status: TradeStatus,
    pub message: Option<String>,
    pub meeting_location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TradeRequest {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.from_user_id == user_id || self.to_user_id == user_id
    }

    /// The other side of the trade from `user_id`'s point of view
    pub fn counterpart(&self, user_id: Uuid) -> Uuid {
        if self.from_user_id == user_id {
            self.to_user_id
        } else {
            self.from_user_id
        }
    }
}

impl<'r> FromRow<'r, PgRow> for TradeRequest {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            from_user_id: row.try_get("from_user_id")?,
            to_user_id: row.try_get("to_user_id")?,
            item_id: row.try_get("item_id")?,
            status: decode_text(row, "status")?,
            message: row.try_get("message")?,
            meeting_location: row.try_get("meeting_location")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Trade request with the item and both usernames, for the trades page
#[derive(Debug, Clone, Serialize)]
pub struct TradeRequestView {
    #[serde(flatten)]
    pub trade: TradeRequest,
    pub item_name: Option<String>,
    pub item_images: Vec<String>,
    pub from_username: Option<String>,
    pub to_username: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for TradeRequestView {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let item_images: Option<Vec<String>> = row.try_get("item_images")?;
        Ok(Self {
            trade: TradeRequest::from_row(row)?,
            item_name: row.try_get("item_name")?,
            item_images: item_images.unwrap_or_default(),
            from_username: row.try_get("from_username")?,
            to_username: row.try_get("to_username")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewTradeRecord {
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub item_id: Uuid,
    pub message: Option<String>,
    pub meeting_location: Option<String>,
}

// ==========================================
// Messages
// ==========================================

/// Message inside a trade request's chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub trade_request_id: Uuid,
    pub sender_id: Uuid,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub sender: Option<ProfileSummary>,
}

impl<'r> FromRow<'r, PgRow> for ChatMessage {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            trade_request_id: row.try_get("trade_request_id")?,
            sender_id: row.try_get("sender_id")?,
            message: row.try_get("message")?,
            is_read: row.try_get("is_read")?,
            created_at: row.try_get("created_at")?,
            sender: ProfileSummary::from_prefixed(row, "sender_id", "sender_")?,
        })
    }
}

/// User-to-user message, optionally about an item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub item_id: Option<Uuid>,
    pub message: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub sender: Option<ProfileSummary>,
    pub recipient: Option<ProfileSummary>,
    pub item_name: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for DirectMessage {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            sender_id: row.try_get("sender_id")?,
            recipient_id: row.try_get("recipient_id")?,
            item_id: row.try_get("item_id")?,
            message: row.try_get("message")?,
            is_read: row.try_get("is_read")?,
            read_at: row.try_get("read_at")?,
            created_at: row.try_get("created_at")?,
            sender: ProfileSummary::from_prefixed(row, "sender_id", "sender_")?,
            recipient: ProfileSummary::from_prefixed(row, "recipient_id", "recipient_")?,
            item_name: row.try_get("item_name")?,
        })
    }
}

// ==========================================
// Notifications
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub related_item_id: Option<Uuid>,
    pub related_trade_request_id: Option<Uuid>,
    pub related_chat_message_id: Option<Uuid>,
    pub action_url: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Notification {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            kind: decode_text(row, "type")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            is_read: row.try_get("is_read")?,
            read_at: row.try_get("read_at")?,
            related_item_id: row.try_get("related_item_id")?,
            related_trade_request_id: row.try_get("related_trade_request_id")?,
            related_chat_message_id: row.try_get("related_chat_message_id")?,
            action_url: row.try_get("action_url")?,
            metadata: row
                .try_get::<Option<serde_json::Value>, _>("metadata")?
                .unwrap_or_else(|| serde_json::json!({})),
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Notification to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_item_id: Option<Uuid>,
    pub related_trade_request_id: Option<Uuid>,
    pub related_chat_message_id: Option<Uuid>,
    pub action_url: Option<String>,
    pub metadata: serde_json::Value,
}

// ==========================================
// Wishlist
// ==========================================

#[derive(Debug, Clone, Serialize)]
pub struct WishlistEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub item: ItemWithOwner,
}

impl<'r> FromRow<'r, PgRow> for WishlistEntry {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("wishlist_id")?,
            user_id: row.try_get("wishlist_user_id")?,
            item_id: row.try_get("id")?,
            created_at: row.try_get("wishlisted_at")?,
            item: ItemWithOwner::from_row(row)?,
        })
    }
}

// ==========================================
// SmartMatch Preferences
// ==========================================

/// Per-user interaction counters and explicit preferences
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserPreferences {
    pub user_id: Uuid,
    pub favorite_categories: Vec<String>,
    pub favorite_brands: Vec<String>,
    pub preferred_sizes: Vec<String>,
    /// Size group (subcategory or category) -> accepted sizes
    pub size_preferences: HashMap<String, Vec<String>>,
    /// `<category>_<subcategory>` -> views/browses
    pub browsing_history: HashMap<String, i64>,
    /// Lowercased search term -> searches
    pub search_history: HashMap<String, i64>,
    /// `category_<c>`, `brand_<b>`, `size_<s>` -> interactions
    pub ai_preferences: HashMap<String, i64>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_recommendation_update: Option<DateTime<Utc>>,
}

impl UserPreferences {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }
}

impl<'r> FromRow<'r, PgRow> for UserPreferences {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let size_preferences: Json<HashMap<String, Vec<String>>> = row.try_get("size_preferences")?;
        let browsing_history: Json<HashMap<String, i64>> = row.try_get("browsing_history")?;
        let search_history: Json<HashMap<String, i64>> = row.try_get("search_history")?;
        let ai_preferences: Json<HashMap<String, i64>> = row.try_get("ai_preferences")?;

        Ok(Self {
            user_id: row.try_get("user_id")?,
            favorite_categories: row.try_get("favorite_categories")?,
            favorite_brands: row.try_get("favorite_brands")?,
            preferred_sizes: row.try_get("preferred_sizes")?,
            size_preferences: size_preferences.0,
            browsing_history: browsing_history.0,
            search_history: search_history.0,
            ai_preferences: ai_preferences.0,
            updated_at: row.try_get("updated_at")?,
            last_recommendation_update: row.try_get("last_recommendation_update")?,
        })
    }
}

/// Explicit favorites update (all fields optional)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencesUpdate {
    pub favorite_categories: Option<Vec<String>>,
    pub favorite_brands: Option<Vec<String>>,
    pub preferred_sizes: Option<Vec<String>>,
}

// ==========================================
// Carbon Impact
// ==========================================

/// Reference emissions for a category (and optionally subcategory)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarbonFootprint {
    pub category: String,
    pub subcategory: Option<String>,
    pub kg_co2_per_item: f64,
    pub manufacturing_emissions: f64,
    pub transportation_emissions: f64,
    pub disposal_emissions: f64,
    pub water_usage_liters: Option<f64>,
    pub description: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for CarbonFootprint {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            category: row.try_get("category")?,
            subcategory: row.try_get("subcategory")?,
            kg_co2_per_item: row.try_get("kg_co2_per_item")?,
            manufacturing_emissions: row.try_get::<f64, _>("manufacturing_emissions").unwrap_or(0.0),
            transportation_emissions: row.try_get::<f64, _>("transportation_emissions").unwrap_or(0.0),
            disposal_emissions: row.try_get::<f64, _>("disposal_emissions").unwrap_or(0.0),
            water_usage_liters: row.try_get("water_usage_liters")?,
            description: row.try_get("description")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavingsType {
    TradeCompleted,
    ItemListed,
    WishlistAdded,
}

impl SavingsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SavingsType::TradeCompleted => "trade_completed",
            SavingsType::ItemListed => "item_listed",
            SavingsType::WishlistAdded => "wishlist_added",
        }
    }
}

impl FromStr for SavingsType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trade_completed" => Ok(SavingsType::TradeCompleted),
            "item_listed" => Ok(SavingsType::ItemListed),
            "wishlist_added" => Ok(SavingsType::WishlistAdded),
            other => Err(ParseEnumError {
                kind: "savings type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarbonSaving {
    pub id: Uuid,
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub trade_id: Option<Uuid>,
    pub co2_saved_kg: f64,
    pub water_saved_liters: Option<f64>,
    pub waste_diverted_kg: Option<f64>,
    pub savings_type: SavingsType,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for CarbonSaving {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            item_id: row.try_get("item_id")?,
            trade_id: row.try_get("trade_id")?,
            co2_saved_kg: row.try_get("co2_saved_kg")?,
            water_saved_liters: row.try_get("water_saved_liters")?,
            waste_diverted_kg: row.try_get("waste_diverted_kg")?,
            savings_type: decode_text(row, "savings_type")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampusCarbonImpact {
    pub total_co2_saved_kg: f64,
    pub total_water_saved_liters: f64,
    pub total_waste_diverted_kg: f64,
    pub total_trades_completed: i64,
    pub total_items_traded: i64,
    pub active_traders_count: i64,
}

impl<'r> FromRow<'r, PgRow> for CampusCarbonImpact {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            total_co2_saved_kg: row.try_get("total_co2_saved_kg")?,
            total_water_saved_liters: row.try_get("total_water_saved_liters")?,
            total_waste_diverted_kg: row.try_get("total_waste_diverted_kg")?,
            total_trades_completed: row.try_get("total_trades_completed")?,
            total_items_traded: row.try_get("total_items_traded")?,
            active_traders_count: row.try_get("active_traders_count")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub total_co2_saved: f64,
    pub total_trades: i64,
}

impl<'r> FromRow<'r, PgRow> for LeaderboardEntry {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            full_name: row.try_get("full_name")?,
            avatar_url: row.try_get("avatar_url")?,
            total_co2_saved: row.try_get("total_co2_saved")?,
            total_trades: row.try_get("total_trades")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_status_round_trips_through_text() {
        for status in [ItemStatus::Available, ItemStatus::Pending, ItemStatus::Traded] {
            assert_eq!(status.as_str().parse::<ItemStatus>().unwrap(), status);
        }
        assert!("sold".parse::<ItemStatus>().is_err());
    }

    #[test]
    fn test_trade_counterpart() {
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        let trade = TradeRequest {
            id: Uuid::new_v4(),
            from_user_id: from,
            to_user_id: to,
            item_id: Uuid::new_v4(),
            status: TradeStatus::Pending,
            message: None,
            meeting_location: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(trade.counterpart(from), to);
        assert_eq!(trade.counterpart(to), from);
        assert!(trade.is_participant(from));
        assert!(!trade.is_participant(Uuid::new_v4()));
    }

    #[test]
    fn test_notification_serializes_kind_as_type() {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind: NotificationKind::TradeAccepted,
            title: "Trade Request Accepted".to_string(),
            message: "ok".to_string(),
            is_read: false,
            read_at: None,
            related_item_id: None,
            related_trade_request_id: None,
            related_chat_message_id: None,
            action_url: Some("/trades".to_string()),
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["type"], "trade_accepted");
    }
}
