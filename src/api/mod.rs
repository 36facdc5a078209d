//! API module - Axum HTTP server and routes
//!
//! All endpoints for the campus marketplace. User-scoped routes read the
//! caller from the `x-user-id` header.

mod extract;
mod handlers;
mod websocket;

use crate::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main application router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ==========================================
        // Health & Catalog
        // ==========================================
        .route("/api/health", get(handlers::health_check))
        .route("/api/catalog", get(handlers::get_catalog))

        // ==========================================
        // Items
        // ==========================================
        .route("/api/items", get(handlers::list_items).post(handlers::create_item))
        .route(
            "/api/items/:id",
            get(handlers::get_item)
                .put(handlers::update_item)
                .delete(handlers::delete_item),
        )
        .route("/api/users/:id/items", get(handlers::get_user_items))

        // ==========================================
        // Trade Requests
        // ==========================================
        .route("/api/trades", get(handlers::list_trades).post(handlers::create_trade))
        .route("/api/trades/:id/accept", post(handlers::accept_trade))
        .route("/api/trades/:id/decline", post(handlers::decline_trade))
        .route("/api/trades/:id/complete", post(handlers::complete_trade))
        .route(
            "/api/trades/:id/messages",
            get(handlers::get_trade_messages).post(handlers::post_trade_message),
        )

        // ==========================================
        // Direct Messages
        // ==========================================
        .route("/api/messages", post(handlers::send_message))
        .route("/api/messages/conversations", get(handlers::get_conversations))
        .route("/api/messages/:id", get(handlers::get_thread))
        .route("/api/messages/:id/read", post(handlers::mark_message_read))
        .route("/api/messages/:id/read-all", post(handlers::mark_thread_read))

        // ==========================================
        // Wishlist
        // ==========================================
        .route("/api/wishlist", get(handlers::get_wishlist))
        .route(
            "/api/wishlist/:id",
            post(handlers::add_to_wishlist).delete(handlers::remove_from_wishlist),
        )

        // ==========================================
        // Notifications
        // ==========================================
        .route("/api/notifications", get(handlers::list_notifications))
        .route("/api/notifications/unread-count", get(handlers::unread_notification_count))
        .route("/api/notifications/read-all", post(handlers::mark_all_notifications_read))
        .route("/api/notifications/:id/read", post(handlers::mark_notification_read))

        // ==========================================
        // SmartMatch
        // ==========================================
        .route("/api/smartmatch", get(handlers::get_smartmatch))
        .route("/api/recommendations", get(handlers::get_recommendations))
        .route("/api/activity", post(handlers::track_activity))
        .route(
            "/api/preferences",
            get(handlers::get_preferences).put(handlers::update_preferences),
        )
        .route("/api/preferences/sizes", put(handlers::update_size_preferences))

        // ==========================================
        // Carbon Impact
        // ==========================================
        .route("/api/carbon/me", get(handlers::get_my_carbon))
        .route("/api/carbon/campus", get(handlers::get_campus_carbon))
        .route("/api/carbon/leaderboard", get(handlers::get_carbon_leaderboard))
        .route("/api/carbon/comparison", get(handlers::get_carbon_comparison))
        .route("/api/carbon/estimate", get(handlers::estimate_carbon))

        // ==========================================
        // Profiles
        // ==========================================
        .route("/api/profiles/:id", get(handlers::get_profile))
        .route("/api/profile", put(handlers::update_profile))

        // ==========================================
        // WebSocket
        // ==========================================
        .route("/ws", get(websocket::ws_handler))
        .route("/api/ws", get(websocket::ws_handler))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::extract::USER_ID_HEADER;
    use super::*;
    use crate::config::AppConfig;
    use crate::db::Database;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app() -> Router {
        let db = Database::connect_lazy("postgresql://nobody@127.0.0.1:1/none").unwrap();
        create_router(Arc::new(AppState::new(AppConfig::default(), db)))
    }

    async fn send(request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    fn json_request(method: Method, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_ID_HEADER, Uuid::new_v4().to_string())
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_catalog_is_public() {
        let (status, body) = send(Request::get("/api/catalog").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["data"]["categories"].is_object());
    }

    #[tokio::test]
    async fn test_carbon_comparison_is_static() {
        let (status, body) = send(Request::get("/api/carbon/comparison").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["new_item_co2"], 25.0);
    }

    #[tokio::test]
    async fn test_user_routes_require_identity() {
        let (status, body) = send(Request::get("/api/trades").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "missing x-user-id header");

        let request = Request::get("/api/notifications")
            .header(USER_ID_HEADER, "not-a-uuid")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid x-user-id header");
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let (status, body) = send(json_request(Method::POST, "/api/items", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_invalid_item_rejected_before_storage() {
        let item = serde_json::json!({
            "name": "Hoodie",
            "brand": "Champion",
            "category": "Clothing",
            "condition": "Decent",
            "description": "Cozy",
            "images": ["https://img.example/hoodie.jpg"]
        });
        let (status, body) = send(json_request(Method::POST, "/api/items", &item.to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "size is required for clothing");
    }

    #[tokio::test]
    async fn test_unknown_size_preferences_rejected() {
        let (status, body) = send(json_request(
            Method::PUT,
            "/api/preferences/sizes",
            r#"{"Tops": ["M", "Gigantic"]}"#,
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unknown size: Gigantic");
    }

    #[tokio::test]
    async fn test_activity_requires_type() {
        let (status, _) = send(json_request(Method::POST, "/api/activity", r#"{"category": "Books"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bad_profile_username() {
        let (status, body) = send(json_request(Method::PUT, "/api/profile", r#"{"username": "no spaces"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "username may only contain letters, numbers, underscores and dots"
        );
    }

    #[tokio::test]
    async fn test_estimate_rejects_unknown_category() {
        let (status, _) = send(
            Request::get("/api/carbon/estimate?category=Spaceships")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (status, _) = send(Request::get("/api/nope").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
