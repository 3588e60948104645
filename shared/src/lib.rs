use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// The CRM entity kinds the automation engine can enroll.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "entity_kind", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Contact,
    Deal,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Deal => "deal",
        }
    }
}

/// Domain events that can trigger an automation. Closed set: an automation is
/// only considered when its trigger tag equals the incoming event's tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    ContactCreated,
    ContactUpdated,
    DealCreated,
    DealUpdated,
    DealStageChanged,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContactCreated => "contact_created",
            Self::ContactUpdated => "contact_updated",
            Self::DealCreated => "deal_created",
            Self::DealUpdated => "deal_updated",
            Self::DealStageChanged => "deal_stage_changed",
        }
    }

    /// Which entity kind this trigger carries in its event payload.
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Self::ContactCreated | Self::ContactUpdated => EntityKind::Contact,
            Self::DealCreated | Self::DealUpdated | Self::DealStageChanged => EntityKind::Deal,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_str(&format!("\"{}\"", s)).ok()
    }
}

/// How a condition combines with the accumulated result of the conditions
/// before it. AND is the default.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ConditionLogic {
    #[default]
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

/// Condition operators. A tag we do not recognize deserializes to `Unknown`,
/// which always evaluates to false instead of failing the enrollment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    IsEmpty,
    IsNotEmpty,
    GreaterThan,
    LessThan,
    HasTag,
    NotHasTag,
    #[serde(other)]
    Unknown,
}

/// A single predicate over a resolved field value.
///
/// `field` is a dotted path into the entity snapshot; the `customFields.`
/// prefix addresses user-defined attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: JsonValue,
    #[serde(default)]
    pub logic: ConditionLogic,
}

impl Condition {
    pub fn new(field: &str, operator: ConditionOperator, value: JsonValue) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
            logic: ConditionLogic::And,
        }
    }

    pub fn equals(field: &str, value: JsonValue) -> Self {
        Self::new(field, ConditionOperator::Equals, value)
    }

    pub fn not_equals(field: &str, value: JsonValue) -> Self {
        Self::new(field, ConditionOperator::NotEquals, value)
    }

    pub fn contains(field: &str, value: &str) -> Self {
        Self::new(field, ConditionOperator::Contains, JsonValue::String(value.to_string()))
    }

    pub fn is_empty(field: &str) -> Self {
        Self::new(field, ConditionOperator::IsEmpty, JsonValue::Null)
    }

    pub fn is_not_empty(field: &str) -> Self {
        Self::new(field, ConditionOperator::IsNotEmpty, JsonValue::Null)
    }

    pub fn greater_than(field: &str, value: f64) -> Self {
        Self::new(field, ConditionOperator::GreaterThan, serde_json::json!(value))
    }

    pub fn less_than(field: &str, value: f64) -> Self {
        Self::new(field, ConditionOperator::LessThan, serde_json::json!(value))
    }

    pub fn has_tag(field: &str, tag: &str) -> Self {
        Self::new(field, ConditionOperator::HasTag, JsonValue::String(tag.to_string()))
    }

    pub fn or(mut self) -> Self {
        self.logic = ConditionLogic::Or;
        self
    }
}

/// Action types the executor supports. Closed set with an exhaustive match at
/// execution time; an unrecognized tag deserializes to `Unknown` and fails the
/// action with a descriptive error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    AddContactTag,
    RemoveContactTag,
    UpdateContactField,
    UpdateDealField,
    UpdateCustomField,
    MoveDealToStage,
    SendEmail,
    #[serde(other)]
    Unknown,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddContactTag => "add_contact_tag",
            Self::RemoveContactTag => "remove_contact_tag",
            Self::UpdateContactField => "update_contact_field",
            Self::UpdateDealField => "update_deal_field",
            Self::UpdateCustomField => "update_custom_field",
            Self::MoveDealToStage => "move_deal_to_stage",
            Self::SendEmail => "send_email",
            Self::Unknown => "unknown",
        }
    }
}

/// A single entity mutation or side effect performed when conditions hold.
/// Required config keys are checked at execution time, not at authoring time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub config: JsonValue,
}

impl Action {
    pub fn new(action_type: ActionType, config: JsonValue) -> Self {
        Self { action_type, config }
    }

    pub fn add_contact_tag(tag: &str) -> Self {
        Self::new(ActionType::AddContactTag, serde_json::json!({ "tag": tag }))
    }

    pub fn remove_contact_tag(tag: &str) -> Self {
        Self::new(ActionType::RemoveContactTag, serde_json::json!({ "tag": tag }))
    }

    pub fn update_contact_field(field: &str, value: JsonValue) -> Self {
        Self::new(
            ActionType::UpdateContactField,
            serde_json::json!({ "field": field, "value": value }),
        )
    }

    pub fn update_deal_field(field: &str, value: JsonValue) -> Self {
        Self::new(
            ActionType::UpdateDealField,
            serde_json::json!({ "field": field, "value": value }),
        )
    }

    pub fn update_custom_field(entity_type: EntityKind, field_name: &str, value: JsonValue) -> Self {
        Self::new(
            ActionType::UpdateCustomField,
            serde_json::json!({
                "entityType": entity_type,
                "fieldName": field_name,
                "value": value
            }),
        )
    }

    pub fn move_deal_to_stage(stage: &str) -> Self {
        Self::new(ActionType::MoveDealToStage, serde_json::json!({ "stage": stage }))
    }

    pub fn send_email(to: &str, subject: &str, body: &str) -> Self {
        Self::new(
            ActionType::SendEmail,
            serde_json::json!({ "to": to, "subject": subject, "body": body }),
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Failed,
}

/// Outcome of one action execution, recorded on the automation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
}

impl ActionOutcome {
    pub fn success(action_type: ActionType, output: Option<JsonValue>) -> Self {
        Self {
            action_type,
            status: ActionStatus::Success,
            error: None,
            output,
        }
    }

    pub fn failure(action_type: ActionType, error: impl Into<String>) -> Self {
        Self {
            action_type,
            status: ActionStatus::Failed,
            error: Some(error.into()),
            output: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }
}

/// A stored rule: one trigger, an ordered condition list, an ordered action
/// list, plus running counters maintained by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger_type: TriggerType,
    pub trigger_config: JsonValue,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    pub is_active: bool,
    pub execution_count: i64,
    pub enrolled_count: i64,
    pub completed_enrollments: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Enrollment lifecycle. `active -> completed` and `active -> failed` are the
/// only transitions; a terminal enrollment is immutable.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "enrollment_status", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Failed,
}

/// One entity's participation in one automation for one triggering event.
/// At most one `active` enrollment exists per (automation, entity) tuple.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: Uuid,
    pub automation_id: Uuid,
    pub entity_type: EntityKind,
    pub entity_id: Uuid,
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Append-only record of one automation execution attempt.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationLog {
    pub id: Uuid,
    pub automation_id: Uuid,
    pub user_id: Uuid,
    pub trigger_type: String,
    pub conditions_met: bool,
    pub actions_executed: JsonValue,
    pub status: EnrollmentStatus,
    pub error: Option<String>,
    pub payload: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

/// A person record. Built-in attributes are typed columns; user-defined
/// attributes live in the `customFields` map.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub status: String,
    pub source: Option<String>,
    pub tags: Vec<String>,
    #[serde(rename = "customFields")]
    pub custom_fields: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub title: String,
    pub value: Decimal,
    pub currency: String,
    pub pipeline: String,
    pub stage: String,
    pub status: String,
    pub expected_close_date: Option<NaiveDate>,
    #[serde(rename = "customFields")]
    pub custom_fields: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Tagged union over the entity kinds an event can carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitySnapshot {
    Contact(Contact),
    Deal(Deal),
}

impl EntitySnapshot {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Contact(_) => EntityKind::Contact,
            Self::Deal(_) => EntityKind::Deal,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Contact(c) => c.id,
            Self::Deal(d) => d.id,
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            Self::Contact(c) => c.user_id,
            Self::Deal(d) => d.user_id,
        }
    }

    /// Plain serializable key/value tree for condition evaluation and logging.
    pub fn to_value(&self) -> JsonValue {
        let value = match self {
            Self::Contact(c) => serde_json::to_value(c),
            Self::Deal(d) => serde_json::to_value(d),
        };
        value.unwrap_or(JsonValue::Null)
    }
}

/// A condition target offered to rule builders: a built-in column or a
/// discovered custom field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    pub label: String,
    pub field_type: String,
    pub is_custom: bool,
}

impl FieldDescriptor {
    pub fn builtin(name: &str, label: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            field_type: field_type.to_string(),
            is_custom: false,
        }
    }

    pub fn custom(name: &str) -> Self {
        Self {
            name: format!("customFields.{}", name),
            label: name.to_string(),
            field_type: "custom".to_string(),
            is_custom: true,
        }
    }
}
