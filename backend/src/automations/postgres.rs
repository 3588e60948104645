// Postgres-backed collaborator stores
//
// The active-enrollment invariant is enforced here, not in application code:
// a partial unique index on (automation_id, entity_type, entity_id) WHERE
// status = 'active' plus INSERT .. ON CONFLICT DO NOTHING makes concurrent
// enrollment attempts race-free. Counters are bumped with a single
// conditional UPDATE to avoid lost updates under concurrent events.

use std::str::FromStr;

use async_trait::async_trait;
use cadence_shared::{
    Automation, Contact, Deal, Enrollment, EnrollmentStatus, EntityKind, EntitySnapshot,
    TriggerType,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::store::{CrmStore, EngineStore, NewLogEntry, StoreError, StoreResult};

/// Built-in contact columns a rule may write through `set_field`.
const CONTACT_COLUMNS: &[&str] = &[
    "first_name",
    "last_name",
    "email",
    "phone",
    "company",
    "title",
    "status",
    "source",
];

/// Built-in deal text columns; `value` is handled separately as numeric.
const DEAL_COLUMNS: &[&str] = &["title", "stage", "pipeline", "status", "currency"];

/// Raw automation row; conditions/actions/trigger parse in a second step so
/// one malformed rule degrades to a warning instead of failing the lookup.
#[derive(Debug, sqlx::FromRow)]
pub struct AutomationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger_type: String,
    pub trigger_config: JsonValue,
    pub conditions: JsonValue,
    pub actions: JsonValue,
    pub is_active: bool,
    pub execution_count: i64,
    pub enrolled_count: i64,
    pub completed_enrollments: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AutomationRow {
    pub fn parse(self) -> StoreResult<Automation> {
        let trigger_type = TriggerType::parse(&self.trigger_type).ok_or_else(|| {
            StoreError::Invalid(format!("unknown trigger type '{}'", self.trigger_type))
        })?;

        Ok(Automation {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            description: self.description,
            trigger_type,
            trigger_config: self.trigger_config,
            conditions: serde_json::from_value(self.conditions)?,
            actions: serde_json::from_value(self.actions)?,
            is_active: self.is_active,
            execution_count: self.execution_count,
            enrolled_count: self.enrolled_count,
            completed_enrollments: self.completed_enrollments,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub const AUTOMATION_COLUMNS: &str = "id, user_id, name, description, trigger_type, \
     trigger_config, conditions, actions, is_active, execution_count, enrolled_count, \
     completed_enrollments, created_at, updated_at";

#[derive(Clone)]
pub struct PgEngineStore {
    pool: PgPool,
}

impl PgEngineStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EngineStore for PgEngineStore {
    async fn active_automations(
        &self,
        user_id: Uuid,
        trigger: TriggerType,
    ) -> StoreResult<Vec<Automation>> {
        let rows = sqlx::query_as::<_, AutomationRow>(&format!(
            "SELECT {} FROM automations \
             WHERE user_id = $1 AND trigger_type = $2 AND is_active = true \
             ORDER BY created_at ASC",
            AUTOMATION_COLUMNS
        ))
        .bind(user_id)
        .bind(trigger.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
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
            .collect())
    }

    async fn begin_enrollment(
        &self,
        automation_id: Uuid,
        entity_type: EntityKind,
        entity_id: Uuid,
    ) -> StoreResult<Option<Enrollment>> {
        let enrollment = sqlx::query_as::<_, Enrollment>(
            r#"
            INSERT INTO automation_enrollments (id, automation_id, entity_type, entity_id, status, enrolled_at)
            VALUES ($1, $2, $3, $4, 'active', NOW())
            ON CONFLICT (automation_id, entity_type, entity_id) WHERE status = 'active' DO NOTHING
            RETURNING id, automation_id, entity_type, entity_id, status, enrolled_at, completed_at, error
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(automation_id)
        .bind(entity_type)
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(enrollment)
    }

    async fn finish_enrollment(
        &self,
        enrollment_id: Uuid,
        status: EnrollmentStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE automation_enrollments \
             SET status = $2, completed_at = NOW(), error = $3 \
             WHERE id = $1 AND status = 'active'",
        )
        .bind(enrollment_id)
        .bind(status)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn bump_execution_count(&self, automation_id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE automations SET execution_count = execution_count + 1 WHERE id = $1")
            .bind(automation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn bump_enrolled_count(&self, automation_id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE automations SET enrolled_count = enrolled_count + 1 WHERE id = $1")
            .bind(automation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn bump_completed_enrollments(&self, automation_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE automations SET completed_enrollments = completed_enrollments + 1 WHERE id = $1",
        )
        .bind(automation_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_log(&self, entry: NewLogEntry) -> StoreResult<Uuid> {
        let actions = serde_json::to_value(&entry.actions_executed)?;
        let id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO automation_logs
                (id, automation_id, user_id, trigger_type, conditions_met,
                 actions_executed, status, error, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.automation_id)
        .bind(entry.user_id)
        .bind(entry.trigger_type.as_str())
        .bind(entry.conditions_met)
        .bind(actions)
        .bind(entry.status)
        .bind(&entry.error)
        .bind(&entry.payload)
        .fetch_one(&self.pool)
        .await?;

        Ok(id.0)
    }
}

#[derive(Clone)]
pub struct PgCrmStore {
    pool: PgPool,
}

impl PgCrmStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CrmStore for PgCrmStore {
    async fn entity_snapshot(&self, kind: EntityKind, id: Uuid) -> StoreResult<Option<JsonValue>> {
        let snapshot = match kind {
            EntityKind::Contact => {
                sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(|c| EntitySnapshot::Contact(c).to_value())
            }
            EntityKind::Deal => sqlx::query_as::<_, Deal>("SELECT * FROM deals WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .map(|d| EntitySnapshot::Deal(d).to_value()),
        };

        Ok(snapshot)
    }

    async fn add_contact_tag(&self, id: Uuid, tag: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE contacts \
             SET tags = CASE WHEN tags @> ARRAY[$2] THEN tags ELSE array_append(tags, $2) END, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(tag)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("contact"));
        }
        Ok(())
    }

    async fn remove_contact_tag(&self, id: Uuid, tag: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE contacts SET tags = array_remove(tags, $2), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(tag)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("contact"));
        }
        Ok(())
    }

    async fn set_field(
        &self,
        kind: EntityKind,
        id: Uuid,
        field: &str,
        value: &JsonValue,
    ) -> StoreResult<()> {
        let rows_affected = match kind {
            EntityKind::Deal if field == "value" => {
                let amount = scalar_text(value)
                    .and_then(|s| Decimal::from_str(s.trim()).ok())
                    .ok_or_else(|| {
                        StoreError::Invalid(format!("deal value must be numeric, got {}", value))
                    })?;
                sqlx::query("UPDATE deals SET value = $2, updated_at = NOW() WHERE id = $1")
                    .bind(id)
                    .bind(amount)
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
            }
            _ => {
                let (table, columns) = match kind {
                    EntityKind::Contact => ("contacts", CONTACT_COLUMNS),
                    EntityKind::Deal => ("deals", DEAL_COLUMNS),
                };
                let column = columns.iter().find(|c| **c == field).ok_or_else(|| {
                    StoreError::Invalid(format!("unknown {} field '{}'", kind.as_str(), field))
                })?;

                let text = match value {
                    JsonValue::Null => None,
                    other => Some(scalar_text(other).ok_or_else(|| {
                        StoreError::Invalid(format!("field '{}' requires a scalar value", field))
                    })?),
                };

                let query =
                    format!("UPDATE {} SET {} = $2, updated_at = NOW() WHERE id = $1", table, column);
                sqlx::query(&query)
                    .bind(id)
                    .bind(text)
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
            }
        };

        if rows_affected == 0 {
            return Err(StoreError::NotFound(kind.as_str()));
        }
        Ok(())
    }

    async fn set_custom_field(
        &self,
        kind: EntityKind,
        id: Uuid,
        name: &str,
        value: &JsonValue,
    ) -> StoreResult<()> {
        let table = match kind {
            EntityKind::Contact => "contacts",
            EntityKind::Deal => "deals",
        };
        let path: Vec<String> = name.split('.').map(str::to_string).collect();

        let query = format!(
            "UPDATE {} \
             SET custom_fields = jsonb_set(COALESCE(custom_fields, '{{}}'::jsonb), $2, $3, true), \
                 updated_at = NOW() \
             WHERE id = $1",
            table
        );
        let result = sqlx::query(&query)
            .bind(id)
            .bind(&path)
            .bind(value)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(kind.as_str()));
        }
        Ok(())
    }

    async fn move_deal_to_stage(&self, id: Uuid, stage: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE deals SET stage = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(stage)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("deal"));
        }
        Ok(())
    }
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
