// Automation definition and observability API
//
// Create/read/update/deactivate automations, list the condition targets a
// rule builder may offer, and expose enrollments and logs read-only. The
// engine itself never writes through this surface.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch},
    Router,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

use cadence_shared::{
    Action, Automation, AutomationLog, Condition, Enrollment, EntityKind, FieldDescriptor,
    TriggerType,
};

use crate::automations::postgres::{AutomationRow, AUTOMATION_COLUMNS};
use crate::error::{AppError, ApiResult};
use crate::AppState;

use super::OwnerId;

#[derive(Deserialize, Validate)]
pub struct AutomationPayload {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub trigger_type: TriggerType,
    #[serde(default = "default_config")]
    pub trigger_config: JsonValue,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_config() -> JsonValue {
    serde_json::json!({})
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub fn automation_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_automations).post(create_automation))
        .route("/fields/:entity_type", get(list_fields))
        .route("/:id", get(get_automation).put(update_automation).delete(delete_automation))
        .route("/:id/activate", patch(activate_automation))
        .route("/:id/deactivate", patch(deactivate_automation))
        .route("/:id/enrollments", get(list_enrollments))
        .route("/:id/logs", get(list_logs))
}

async fn create_automation(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Json(payload): Json<AutomationPayload>,
) -> ApiResult<(StatusCode, Json<Automation>)> {
    payload.validate()?;

    let row = sqlx::query_as::<_, AutomationRow>(&format!(
        r#"
        INSERT INTO automations
            (id, user_id, name, description, trigger_type, trigger_config,
             conditions, actions, is_active, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
        RETURNING {}
        "#,
        AUTOMATION_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(payload.trigger_type.as_str())
    .bind(&payload.trigger_config)
    .bind(serde_json::to_value(&payload.conditions).unwrap_or_default())
    .bind(serde_json::to_value(&payload.actions).unwrap_or_default())
    .bind(payload.is_active)
    .fetch_one(&state.db_pool)
    .await?;

    let automation = row
        .parse()
        .map_err(|e| AppError::InternalError(e.to_string()))?;

    Ok((StatusCode::CREATED, Json(automation)))
}

async fn list_automations(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Query(params): Query<ListQuery>,
) -> ApiResult<Json<Vec<Automation>>> {
    let rows = sqlx::query_as::<_, AutomationRow>(&format!(
        "SELECT {} FROM automations WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        AUTOMATION_COLUMNS
    ))
    .bind(user_id)
    .bind(params.limit.unwrap_or(50))
    .bind(params.offset.unwrap_or(0))
    .fetch_all(&state.db_pool)
    .await?;

    let automations = rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id;
            match row.parse() {
                Ok(automation) => Some(automation),
                Err(e) => {
                    warn!(automation = %id, error = %e, "skipping malformed automation");
                    None
                }
            }
        })
        .collect();

    Ok(Json(automations))
}

async fn get_automation(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Automation>> {
    let row = fetch_owned(&state, id, user_id).await?;
    let automation = row
        .parse()
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    Ok(Json(automation))
}

async fn update_automation(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Path(id): Path<Uuid>,
    Json(payload): Json<AutomationPayload>,
) -> ApiResult<Json<Automation>> {
    payload.validate()?;

    let row = sqlx::query_as::<_, AutomationRow>(&format!(
        r#"
        UPDATE automations
        SET name = $3, description = $4, trigger_type = $5, trigger_config = $6,
            conditions = $7, actions = $8, is_active = $9, updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING {}
        "#,
        AUTOMATION_COLUMNS
    ))
    .bind(id)
    .bind(user_id)
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(payload.trigger_type.as_str())
    .bind(&payload.trigger_config)
    .bind(serde_json::to_value(&payload.conditions).unwrap_or_default())
    .bind(serde_json::to_value(&payload.actions).unwrap_or_default())
    .bind(payload.is_active)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Automation".to_string()))?;

    let automation = row
        .parse()
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    Ok(Json(automation))
}

async fn activate_automation(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    set_active(&state, id, user_id, true).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn deactivate_automation(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    set_active(&state, id, user_id, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_automation(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let has_enrollments: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM automation_enrollments WHERE automation_id = $1)",
    )
    .bind(id)
    .fetch_one(&state.db_pool)
    .await?;

    if has_enrollments {
        return Err(AppError::Conflict(
            "automation has enrollments; deactivate it instead of deleting".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM automations WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Automation".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Condition targets for the rule builder: built-in columns plus every
/// custom-field key present on the tenant's entities.
async fn list_fields(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Path(entity_type): Path<String>,
) -> ApiResult<Json<Vec<FieldDescriptor>>> {
    let kind = match entity_type.as_str() {
        "contact" => EntityKind::Contact,
        "deal" => EntityKind::Deal,
        other => {
            return Err(AppError::BadRequest(format!("unknown entity type '{}'", other)));
        }
    };

    let mut fields = match kind {
        EntityKind::Contact => vec![
            FieldDescriptor::builtin("first_name", "First name", "text"),
            FieldDescriptor::builtin("last_name", "Last name", "text"),
            FieldDescriptor::builtin("email", "Email", "text"),
            FieldDescriptor::builtin("phone", "Phone", "text"),
            FieldDescriptor::builtin("company", "Company", "text"),
            FieldDescriptor::builtin("title", "Title", "text"),
            FieldDescriptor::builtin("status", "Status", "text"),
            FieldDescriptor::builtin("source", "Source", "text"),
            FieldDescriptor::builtin("tags", "Tags", "list"),
        ],
        EntityKind::Deal => vec![
            FieldDescriptor::builtin("title", "Title", "text"),
            FieldDescriptor::builtin("value", "Value", "number"),
            FieldDescriptor::builtin("currency", "Currency", "text"),
            FieldDescriptor::builtin("pipeline", "Pipeline", "text"),
            FieldDescriptor::builtin("stage", "Stage", "text"),
            FieldDescriptor::builtin("status", "Status", "text"),
            FieldDescriptor::builtin("expected_close_date", "Expected close date", "date"),
        ],
    };

    let table = match kind {
        EntityKind::Contact => "contacts",
        EntityKind::Deal => "deals",
    };
    let custom_keys: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT DISTINCT jsonb_object_keys(custom_fields) \
         FROM {} WHERE user_id = $1 ORDER BY 1",
        table
    ))
    .bind(user_id)
    .fetch_all(&state.db_pool)
    .await?;

    fields.extend(custom_keys.iter().map(|key| FieldDescriptor::custom(key)));

    Ok(Json(fields))
}

async fn list_enrollments(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Path(id): Path<Uuid>,
    Query(params): Query<ListQuery>,
) -> ApiResult<Json<Vec<Enrollment>>> {
    fetch_owned(&state, id, user_id).await?;

    let enrollments = sqlx::query_as::<_, Enrollment>(
        "SELECT id, automation_id, entity_type, entity_id, status, enrolled_at, completed_at, error \
         FROM automation_enrollments \
         WHERE automation_id = $1 \
         ORDER BY enrolled_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(id)
    .bind(params.limit.unwrap_or(100))
    .bind(params.offset.unwrap_or(0))
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(enrollments))
}

async fn list_logs(
    State(state): State<Arc<AppState>>,
    OwnerId(user_id): OwnerId,
    Path(id): Path<Uuid>,
    Query(params): Query<ListQuery>,
) -> ApiResult<Json<Vec<AutomationLog>>> {
    fetch_owned(&state, id, user_id).await?;

    let logs = sqlx::query_as::<_, AutomationLog>(
        "SELECT id, automation_id, user_id, trigger_type, conditions_met, actions_executed, \
                status, error, payload, created_at \
         FROM automation_logs \
         WHERE automation_id = $1 \
         ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(id)
    .bind(params.limit.unwrap_or(100))
    .bind(params.offset.unwrap_or(0))
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(logs))
}

async fn set_active(state: &AppState, id: Uuid, user_id: Uuid, active: bool) -> ApiResult<()> {
    let result =
        sqlx::query("UPDATE automations SET is_active = $3, updated_at = NOW() WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .bind(active)
            .execute(&state.db_pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Automation".to_string()));
    }
    Ok(())
}

async fn fetch_owned(state: &AppState, id: Uuid, user_id: Uuid) -> ApiResult<AutomationRow> {
    sqlx::query_as::<_, AutomationRow>(&format!(
        "SELECT {} FROM automations WHERE id = $1 AND user_id = $2",
        AUTOMATION_COLUMNS
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Automation".to_string()))
}
