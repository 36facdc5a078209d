//! API request handlers
//!
//! All endpoint handlers for the marketplace API. Successful responses use
//! `{"success": true, "data": ...}`; failures go through [`ApiError`].

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::extract::{ApiJson, AuthUser};
use crate::carbon::{self, ItemSavings};
use crate::catalog;
use crate::db::{DbError, ItemFilter, PreferencesUpdate};
use crate::error::{ApiError, ApiResult};
use crate::smartmatch::{Activity, ActivityKind};
use crate::validation::{ChatMessageBody, DirectMessageBody, ItemUpdate, NewItem, NewTradeRequest, ProfileUpdate};
use crate::AppState;

// ==========================================
// Response Helpers
// ==========================================

fn ok<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "data": data
    }))
}

fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, ok(data)).into_response()
}

fn message(text: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "message": text
    }))
}

fn clamp_limit(requested: Option<i64>, default: i64, max: i64) -> i64 {
    requested.unwrap_or(default).clamp(1, max)
}

// ==========================================
// Request Types
// ==========================================

#[derive(Debug, Deserialize)]
pub struct ItemsQuery {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub q: Option<String>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ThreadQuery {
    pub item_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct EstimateQuery {
    pub category: String,
    pub subcategory: Option<String>,
}

// ==========================================
// Health & Catalog
// ==========================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let connected = state.notifier.hub().connected_users();

    match state.db.marketplace_counts().await {
        Ok((available_items, pending_trades)) => Json(serde_json::json!({
            "status": "healthy",
            "service": "campus_trade",
            "version": env!("CARGO_PKG_VERSION"),
            "database": "connected",
            "available_items": available_items,
            "pending_trades": pending_trades,
            "live_connections": connected,
        }))
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "degraded",
                "service": "campus_trade",
                "version": env!("CARGO_PKG_VERSION"),
                "database": e.to_string(),
                "live_connections": connected,
            })),
        )
            .into_response(),
    }
}

pub async fn get_catalog() -> impl IntoResponse {
    ok(catalog::as_json())
}

// ==========================================
// Item Handlers
// ==========================================

/// Listing filters treat an empty value or "all" as no filter
fn selected(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty() && v != "all")
}

pub async fn list_items(
    State(state): State<Arc<AppState>>,
    user: Option<AuthUser>,
    Query(query): Query<ItemsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let filter = ItemFilter {
        category: selected(query.category),
        subcategory: selected(query.subcategory),
        search: query.q.clone(),
        limit: clamp_limit(query.limit, 50, 200),
        offset: query.offset.max(0),
    };

    let items = state.db.list_available_items(&filter).await?;

    if let Some(AuthUser(user_id)) = user {
        let browse = Activity::browse(filter.category.as_deref(), filter.subcategory.as_deref());
        state.smartmatch.track_best_effort(user_id, browse).await;

        if let Some(term) = query.q.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            state.smartmatch.track_best_effort(user_id, Activity::search(term)).await;
        }
    }

    Ok(ok(items))
}

pub async fn create_item(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<NewItem>,
) -> ApiResult<Response> {
    let record = body.into_record(user_id)?;
    let item = state.db.create_item(&record).await?;
    info!("Item {} listed by {}", item.id, user_id);
    Ok(created(item))
}

pub async fn get_item(
    State(state): State<Arc<AppState>>,
    user: Option<AuthUser>,
    Path(item_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let listing = state
        .db
        .get_item(item_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Item"))?;

    if let Some(AuthUser(user_id)) = user {
        if user_id != listing.item.user_id {
            state
                .smartmatch
                .track_best_effort(user_id, Activity::with_item(ActivityKind::View, &listing.item))
                .await;
        }
    }

    Ok(ok(listing))
}

pub async fn update_item(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(item_id): Path<Uuid>,
    ApiJson(body): ApiJson<ItemUpdate>,
) -> ApiResult<Json<serde_json::Value>> {
    let listing = state
        .db
        .get_item(item_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Item"))?;

    if listing.item.user_id != user_id {
        return Err(ApiError::forbidden("only the owner can edit this item"));
    }
    if listing.item.is_traded {
        return Err(ApiError::conflict("traded items cannot be edited"));
    }

    let record = body.merge(&listing.item)?;
    let item = state.db.update_item(item_id, &record).await.map_err(|e| match e {
        DbError::NotFound => ApiError::conflict("traded items cannot be edited"),
        other => other.into(),
    })?;

    Ok(ok(item))
}

pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(item_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let listing = state
        .db
        .get_item(item_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Item"))?;

    if listing.item.user_id != user_id {
        return Err(ApiError::forbidden("only the owner can delete this item"));
    }

    if !state.db.delete_item(item_id, user_id).await? {
        return Err(ApiError::not_found("Item"));
    }

    info!("Item {} deleted by {}", item_id, user_id);
    Ok(message("Item deleted"))
}

pub async fn get_user_items(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(ok(state.db.items_by_user(owner_id).await?))
}

// ==========================================
// Trade Handlers
// ==========================================

pub async fn list_trades(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(ok(state.trades.trades_for_user(user_id).await?))
}

pub async fn create_trade(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<NewTradeRequest>,
) -> ApiResult<Response> {
    let trade = state.trades.create_request(user_id, body).await?;
    Ok(created(trade))
}

pub async fn accept_trade(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(trade_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(ok(state.trades.accept(user_id, trade_id).await?))
}

pub async fn decline_trade(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(trade_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(ok(state.trades.decline(user_id, trade_id).await?))
}

pub async fn complete_trade(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(trade_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let completion = state.trades.complete(user_id, trade_id).await?;
    let formatted = carbon::format_savings(completion.savings.co2_saved_kg);
    Ok(ok(serde_json::json!({
        "trade": completion.trade,
        "savings": completion.savings,
        "formatted": formatted,
    })))
}

pub async fn get_trade_messages(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(trade_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(ok(state.trades.chat_messages(user_id, trade_id).await?))
}

pub async fn post_trade_message(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(trade_id): Path<Uuid>,
    ApiJson(body): ApiJson<ChatMessageBody>,
) -> ApiResult<Response> {
    let message = state
        .trades
        .post_chat_message(user_id, trade_id, &body.message)
        .await?;
    Ok(created(message))
}

// ==========================================
// Direct Message Handlers
// ==========================================

pub async fn get_conversations(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(ok(state.messenger.conversations(user_id).await?))
}

pub async fn get_thread(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(other_user_id): Path<Uuid>,
    Query(query): Query<ThreadQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(ok(state
        .messenger
        .thread(user_id, other_user_id, query.item_id)
        .await?))
}

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<DirectMessageBody>,
) -> ApiResult<Response> {
    let message = state
        .messenger
        .send(user_id, body.recipient_id, body.item_id, &body.message)
        .await?;
    Ok(created(message))
}

pub async fn mark_message_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.messenger.mark_read(user_id, message_id).await?;
    Ok(message("Message marked as read"))
}

pub async fn mark_thread_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(other_user_id): Path<Uuid>,
    Query(query): Query<ThreadQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = state
        .messenger
        .mark_thread_read(user_id, other_user_id, query.item_id)
        .await?;
    Ok(ok(serde_json::json!({ "updated": updated })))
}

// ==========================================
// Wishlist Handlers
// ==========================================

pub async fn get_wishlist(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(ok(state.db.wishlist(user_id).await?))
}

pub async fn add_to_wishlist(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(item_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let listing = state
        .db
        .get_item(item_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Item"))?;

    if listing.item.user_id == user_id {
        return Err(ApiError::bad_request("you cannot wishlist your own item"));
    }

    let added = state.db.add_to_wishlist(user_id, item_id).await?;
    if added {
        state
            .smartmatch
            .track_best_effort(user_id, Activity::with_item(ActivityKind::Wishlist, &listing.item))
            .await;
    }

    Ok(ok(serde_json::json!({ "item_id": item_id, "added": added })))
}

pub async fn remove_from_wishlist(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(item_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let removed = state.db.remove_from_wishlist(user_id, item_id).await?;
    Ok(ok(serde_json::json!({ "item_id": item_id, "removed": removed })))
}

// ==========================================
// Notification Handlers
// ==========================================

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let limit = clamp_limit(query.limit, 20, 100);
    Ok(ok(state.db.notifications(user_id, limit).await?))
}

pub async fn unread_notification_count(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let count = state.db.unread_notification_count(user_id).await?;
    Ok(ok(serde_json::json!({ "count": count })))
}

pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(notification_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.db.mark_notification_read(notification_id, user_id).await? {
        return Err(ApiError::not_found("Notification"));
    }
    Ok(message("Notification marked as read"))
}

pub async fn mark_all_notifications_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = state.db.mark_all_notifications_read(user_id).await?;
    Ok(ok(serde_json::json!({ "updated": updated })))
}

// ==========================================
// SmartMatch Handlers
// ==========================================

pub async fn get_smartmatch(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let default = state.config.smartmatch_default_limit as i64;
    let limit = clamp_limit(query.limit, default, 50) as usize;
    Ok(ok(state.smartmatch.recommend(user_id, limit).await?))
}

pub async fn get_recommendations(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let limit = clamp_limit(query.limit, 6, 50);
    Ok(ok(state.smartmatch.favorites(user_id, limit).await?))
}

pub async fn track_activity(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    ApiJson(activity): ApiJson<Activity>,
) -> ApiResult<Json<serde_json::Value>> {
    if activity.kind.is_none() {
        return Err(ApiError::bad_request("activity type is required"));
    }
    state.smartmatch.track(user_id, &activity).await?;
    Ok(message("Activity recorded"))
}

pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(ok(state.smartmatch.preferences(user_id).await?))
}

pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    ApiJson(update): ApiJson<PreferencesUpdate>,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(ok(state.smartmatch.update_favorites(user_id, update).await?))
}

pub async fn update_size_preferences(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    ApiJson(sizes): ApiJson<HashMap<String, Vec<String>>>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(unknown) = sizes.values().flatten().find(|s| !catalog::is_valid_size(s)) {
        return Err(ApiError::bad_request(format!("unknown size: {}", unknown)));
    }
    Ok(ok(state.smartmatch.update_sizes(user_id, sizes).await?))
}

// ==========================================
// Carbon Handlers
// ==========================================

pub async fn get_my_carbon(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let savings = state.db.carbon_savings_for_user(user_id).await?;
    Ok(ok(carbon::summarize(savings)))
}

pub async fn get_campus_carbon(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let impact = state.db.campus_carbon_impact().await?;
    let formatted = carbon::format_savings(impact.total_co2_saved_kg);
    Ok(ok(serde_json::json!({
        "impact": impact,
        "formatted": formatted,
    })))
}

pub async fn get_carbon_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let limit = clamp_limit(query.limit, 10, 50);
    Ok(ok(state.db.carbon_leaderboard(limit).await?))
}

pub async fn get_carbon_comparison() -> impl IntoResponse {
    ok(carbon::comparison())
}

pub async fn estimate_carbon(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EstimateQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    if !catalog::is_valid_category(&query.category) {
        return Err(ApiError::bad_request(format!("unknown category: {}", query.category)));
    }

    let footprint = state
        .db
        .carbon_footprint(&query.category, query.subcategory.as_deref())
        .await?;
    let savings = ItemSavings::from_footprint(footprint.as_ref());

    Ok(ok(serde_json::json!({
        "category": query.category,
        "subcategory": query.subcategory,
        "savings": savings,
        "formatted": carbon::format_savings(savings.co2_saved_kg),
    })))
}

// ==========================================
// Profile Handlers
// ==========================================

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let profile = state
        .db
        .get_profile(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Profile"))?;
    Ok(ok(profile))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<ProfileUpdate>,
) -> ApiResult<Json<serde_json::Value>> {
    let (username, full_name, avatar_url) = body.normalized()?;
    let profile = state
        .db
        .upsert_profile(user_id, &username, full_name.as_deref(), avatar_url.as_deref())
        .await?;
    Ok(ok(profile))
}
