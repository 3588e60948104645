pub mod automations;
pub mod contacts;
pub mod deals;

pub use automations::automation_routes;
pub use contacts::contact_routes;
pub use deals::deal_routes;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts, response::Json};
use uuid::Uuid;

use crate::error::AppError;

/// The authenticated tenant. Authentication itself is an upstream concern;
/// the gateway injects the verified user id as `X-User-Id`.
pub struct OwnerId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .map(OwnerId)
            .ok_or_else(|| AppError::Unauthorized("missing or invalid X-User-Id header".to_string()))
    }
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
