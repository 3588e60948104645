// Deal CRUD collaborator
//
// Same contract as the contacts routes, plus stage-transition detection: an
// update that moves the deal to a new stage dispatches `deal_stage_changed`
// in addition to `deal_updated`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use cadence_shared::Deal;

use crate::automations::AutomationEvent;
use crate::error::{AppError, ApiResult};
use crate::AppState;

use super::OwnerId;

#[derive(Deserialize, Validate)]
pub struct DealCreate {
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub title: String,
    pub contact_id: Option<Uuid>,
    pub value: Option<Decimal>,
    pub currency: Option<String>,
    pub pipeline: Option<String>,
    pub stage: Option<String>,
    pub status: Option<String>,
    pub expected_close_date: Option<NaiveDate>,
    #[serde(rename = "customFields")]
    pub custom_fields: Option<JsonValue>,
}

#[derive(Deserialize, Validate)]
pub struct DealUpdate {
    pub title: Option<String>,
    pub contact_id: Option<Uuid>,
    pub value: Option<Decimal>,
    pub currency: Option<String>,
    pub pipeline: Option<String>,
    pub stage: Option<String>,
    pub status: Option<String>,
    pub expected_close_date: Option<NaiveDate>,
    #[serde(rename = "customFields")]
    pub custom_fields: Option<JsonValue>,
}

#[derive(Deserialize)]
pub struct DealQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub stage: Option<String>,
    pub pipeline: Option<String>,
}

pub fn deal_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_deals).post(create_deal))
        .route("/:id", get(get_deal).put(update_deal).delete(delete_deal))
}

async fn create_deal(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Json(payload): Json<DealCreate>,
) -> ApiResult<(StatusCode, Json<Deal>)> {
    payload.validate()?;

    let deal = sqlx::query_as::<_, Deal>(
        r#"
        INSERT INTO deals
            (id, user_id, contact_id, title, value, currency, pipeline, stage,
             status, expected_close_date, custom_fields, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(payload.contact_id)
    .bind(&payload.title)
    .bind(payload.value.unwrap_or_default())
    .bind(payload.currency.unwrap_or_else(|| "USD".to_string()))
    .bind(payload.pipeline.unwrap_or_else(|| "default".to_string()))
    .bind(payload.stage.unwrap_or_else(|| "new".to_string()))
    .bind(payload.status.unwrap_or_else(|| "open".to_string()))
    .bind(payload.expected_close_date)
    .bind(payload.custom_fields.unwrap_or_else(|| serde_json::json!({})))
    .fetch_one(&state.db_pool)
    .await?;

    state.dispatcher.dispatch(AutomationEvent::deal_created(&deal));

    Ok((StatusCode::CREATED, Json(deal)))
}

async fn list_deals(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Query(params): Query<DealQuery>,
) -> ApiResult<Json<Vec<Deal>>> {
    let deals = sqlx::query_as::<_, Deal>(
        "SELECT * FROM deals \
         WHERE user_id = $1 \
           AND ($2::text IS NULL OR stage = $2) \
           AND ($3::text IS NULL OR pipeline = $3) \
         ORDER BY created_at DESC LIMIT $4 OFFSET $5",
    )
    .bind(user_id)
    .bind(&params.stage)
    .bind(&params.pipeline)
    .bind(params.limit.unwrap_or(50))
    .bind(params.offset.unwrap_or(0))
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(deals))
}

async fn get_deal(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Deal>> {
    let deal = fetch_owned(&state, id, user_id).await?;
    Ok(Json(deal))
}

async fn update_deal(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Path(id): Path<Uuid>,
    Json(payload): Json<DealUpdate>,
) -> ApiResult<Json<Deal>> {
    payload.validate()?;

    let before = fetch_owned(&state, id, user_id).await?;

    let after = sqlx::query_as::<_, Deal>(
        r#"
        UPDATE deals
        SET title = COALESCE($3, title),
            contact_id = COALESCE($4, contact_id),
            value = COALESCE($5, value),
            currency = COALESCE($6, currency),
            pipeline = COALESCE($7, pipeline),
            stage = COALESCE($8, stage),
            status = COALESCE($9, status),
            expected_close_date = COALESCE($10, expected_close_date),
            custom_fields = COALESCE($11, custom_fields),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(&payload.title)
    .bind(payload.contact_id)
    .bind(payload.value)
    .bind(&payload.currency)
    .bind(&payload.pipeline)
    .bind(&payload.stage)
    .bind(&payload.status)
    .bind(payload.expected_close_date)
    .bind(&payload.custom_fields)
    .fetch_one(&state.db_pool)
    .await?;

    let changed = changed_fields(&before, &after);
    state
        .dispatcher
        .dispatch(AutomationEvent::deal_updated(&after, changed));

    if before.stage != after.stage {
        state
            .dispatcher
            .dispatch(AutomationEvent::deal_stage_changed(&after, &before.stage));
    }

    Ok(Json(after))
}

async fn delete_deal(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let result = sqlx::query("DELETE FROM deals WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Deal".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_owned(state: &AppState, id: Uuid, user_id: Uuid) -> ApiResult<Deal> {
    sqlx::query_as::<_, Deal>("SELECT * FROM deals WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Deal".to_string()))
}

fn changed_fields(before: &Deal, after: &Deal) -> Vec<String> {
    let mut changed = Vec::new();
    if before.title != after.title {
        changed.push("title".to_string());
    }
    if before.contact_id != after.contact_id {
        changed.push("contact_id".to_string());
    }
    if before.value != after.value {
        changed.push("value".to_string());
    }
    if before.currency != after.currency {
        changed.push("currency".to_string());
    }
    if before.pipeline != after.pipeline {
        changed.push("pipeline".to_string());
    }
    if before.stage != after.stage {
        changed.push("stage".to_string());
    }
    if before.status != after.status {
        changed.push("status".to_string());
    }
    if before.expected_close_date != after.expected_close_date {
        changed.push("expected_close_date".to_string());
    }
    if before.custom_fields != after.custom_fields {
        changed.push("customFields".to_string());
    }
    changed
}
