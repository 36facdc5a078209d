//! API error type
//!
//! Every failure leaves the server as `{"success": false, "error": "..."}`
//! with a status code matching the error kind.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::db::DbError;
use crate::trading::{TradeError, TransitionError};
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{} not found", what))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({
                "success": false,
                "error": self.to_string()
            })),
        )
            .into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => ApiError::NotFound("Record not found".to_string()),
            DbError::Conflict(message) => ApiError::Conflict(message),
            DbError::Sqlx(e) => {
                error!("Database error: {}", e);
                ApiError::Internal("Database error".to_string())
            }
        }
    }
}

impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NotOwner(_) | TransitionError::NotParticipant => ApiError::Forbidden(err.to_string()),
            TransitionError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<TradeError> for ApiError {
    fn from(err: TradeError) -> Self {
        match err {
            TradeError::NotFound(what) => ApiError::not_found(what),
            TradeError::OwnItem => ApiError::BadRequest(err.to_string()),
            TradeError::Unavailable | TradeError::Concurrent => ApiError::Conflict(err.to_string()),
            TradeError::Invalid(e) => e.into(),
            TradeError::Transition(e) => e.into(),
            TradeError::Database(e) => e.into(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::{TradeAction, TradeStatus};

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::not_found("Item").to_string(), "Item not found");
        assert_eq!(
            ApiError::from(DbError::Conflict("dup".to_string())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError::from(DbError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(DbError::Sqlx(sqlx::Error::PoolTimedOut)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_transition_errors() {
        let forbidden = ApiError::from(TransitionError::NotOwner(TradeAction::Accept));
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let conflict = ApiError::from(TransitionError::InvalidTransition {
            action: TradeAction::Accept,
            from: TradeStatus::Declined,
        });
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_trade_errors() {
        assert_eq!(ApiError::from(TradeError::OwnItem).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(TradeError::Concurrent).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(TradeError::NotFound("Trade request")).to_string(),
            "Trade request not found"
        );
    }

    #[tokio::test]
    async fn test_envelope_body() {
        let response = ApiError::forbidden("nope").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({"success": false, "error": "nope"}));
    }
}
