// Contact CRUD collaborator
//
// Persists contacts, then hands a canonicalized snapshot to the automation
// dispatcher. The engine sees entities only through these events and the
// CrmStore mutation calls.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use cadence_shared::Contact;

use crate::automations::AutomationEvent;
use crate::error::{AppError, ApiResult};
use crate::AppState;

use super::OwnerId;

#[derive(Deserialize, Validate)]
pub struct ContactCreate {
    #[validate(length(min = 1, max = 200, message = "first_name must be 1-200 characters"))]
    pub first_name: String,
    pub last_name: Option<String>,
    #[validate(email(message = "email must be a valid address"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub status: Option<String>,
    pub source: Option<String>,
    pub tags: Option<Vec<String>>,
    #[serde(rename = "customFields")]
    pub custom_fields: Option<JsonValue>,
}

#[derive(Deserialize, Validate)]
pub struct ContactUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[validate(email(message = "email must be a valid address"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub status: Option<String>,
    pub source: Option<String>,
    pub tags: Option<Vec<String>>,
    #[serde(rename = "customFields")]
    pub custom_fields: Option<JsonValue>,
}

#[derive(Deserialize)]
pub struct ContactQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub status: Option<String>,
}

pub fn contact_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_contacts).post(create_contact))
        .route("/:id", get(get_contact).put(update_contact).delete(delete_contact))
}

async fn create_contact(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Json(payload): Json<ContactCreate>,
) -> ApiResult<(StatusCode, Json<Contact>)> {
    payload.validate()?;

    let contact = sqlx::query_as::<_, Contact>(
        r#"
        INSERT INTO contacts
            (id, user_id, first_name, last_name, email, phone, company, title,
             status, source, tags, custom_fields, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&payload.first_name)
    .bind(payload.last_name.unwrap_or_default())
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&payload.company)
    .bind(&payload.title)
    .bind(payload.status.unwrap_or_else(|| "lead".to_string()))
    .bind(&payload.source)
    .bind(payload.tags.unwrap_or_default())
    .bind(payload.custom_fields.unwrap_or_else(|| serde_json::json!({})))
    .fetch_one(&state.db_pool)
    .await?;

    state.dispatcher.dispatch(AutomationEvent::contact_created(&contact));

    Ok((StatusCode::CREATED, Json(contact)))
}

async fn list_contacts(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Query(params): Query<ContactQuery>,
) -> ApiResult<Json<Vec<Contact>>> {
    let contacts = sqlx::query_as::<_, Contact>(
        "SELECT * FROM contacts \
         WHERE user_id = $1 AND ($2::text IS NULL OR status = $2) \
         ORDER BY created_at DESC LIMIT $3 OFFSET $4",
    )
    .bind(user_id)
    .bind(&params.status)
    .bind(params.limit.unwrap_or(50))
    .bind(params.offset.unwrap_or(0))
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(contacts))
}

async fn get_contact(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Contact>> {
    let contact = fetch_owned(&state, id, user_id).await?;
    Ok(Json(contact))
}

async fn update_contact(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Path(id): Path<Uuid>,
    Json(payload): Json<ContactUpdate>,
) -> ApiResult<Json<Contact>> {
    payload.validate()?;

    let before = fetch_owned(&state, id, user_id).await?;

    let after = sqlx::query_as::<_, Contact>(
        r#"
        UPDATE contacts
        SET first_name = COALESCE($3, first_name),
            last_name = COALESCE($4, last_name),
            email = COALESCE($5, email),
            phone = COALESCE($6, phone),
            company = COALESCE($7, company),
            title = COALESCE($8, title),
            status = COALESCE($9, status),
            source = COALESCE($10, source),
            tags = COALESCE($11, tags),
            custom_fields = COALESCE($12, custom_fields),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&payload.company)
    .bind(&payload.title)
    .bind(&payload.status)
    .bind(&payload.source)
    .bind(&payload.tags)
    .bind(&payload.custom_fields)
    .fetch_one(&state.db_pool)
    .await?;

    let changed = changed_fields(&before, &after);
    state
        .dispatcher
        .dispatch(AutomationEvent::contact_updated(&after, changed));

    Ok(Json(after))
}

async fn delete_contact(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let result = sqlx::query("DELETE FROM contacts WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Contact".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_owned(state: &AppState, id: Uuid, user_id: Uuid) -> ApiResult<Contact> {
    sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Contact".to_string()))
}

fn changed_fields(before: &Contact, after: &Contact) -> Vec<String> {
    let mut changed = Vec::new();
    if before.first_name != after.first_name {
        changed.push("first_name".to_string());
    }
    if before.last_name != after.last_name {
        changed.push("last_name".to_string());
    }
    if before.email != after.email {
        changed.push("email".to_string());
    }
    if before.phone != after.phone {
        changed.push("phone".to_string());
    }
    if before.company != after.company {
        changed.push("company".to_string());
    }
    if before.title != after.title {
        changed.push("title".to_string());
    }
    if before.status != after.status {
        changed.push("status".to_string());
    }
    if before.source != after.source {
        changed.push("source".to_string());
    }
    if before.tags != after.tags {
        changed.push("tags".to_string());
    }
    if before.custom_fields != after.custom_fields {
        changed.push("customFields".to_string());
    }
    changed
}
