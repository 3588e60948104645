// Collaborator contracts the engine depends on but does not implement.
//
// The engine owns no storage or transport: automation lookup, enrollment
// lifecycle, counters, and log rows go through `EngineStore`; entity
// mutations go through `CrmStore`; outbound mail goes through `MailSender`.
// Postgres implementations live in `postgres.rs`; tests provide in-memory
// ones.

use async_trait::async_trait;
use cadence_shared::{
    ActionOutcome, Automation, EnrollmentStatus, Enrollment, EntityKind, TriggerType,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Invalid(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("email send failed: {0}")]
    Send(String),
    #[error("invalid recipient: {0}")]
    Recipient(String),
}

/// One row to append to the automation log, built by the audit recorder.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub automation_id: Uuid,
    pub user_id: Uuid,
    pub trigger_type: TriggerType,
    pub conditions_met: bool,
    pub actions_executed: Vec<ActionOutcome>,
    pub status: EnrollmentStatus,
    pub error: Option<String>,
    pub payload: Option<JsonValue>,
}

/// Engine-owned state: automations, enrollments, counters, logs.
#[async_trait]
pub trait EngineStore: Send + Sync {
    /// All active automations owned by `user_id` whose trigger matches.
    async fn active_automations(
        &self,
        user_id: Uuid,
        trigger: TriggerType,
    ) -> StoreResult<Vec<Automation>>;

    /// Atomically create an `active` enrollment for the tuple, or return
    /// `None` when one is already in flight. Prior terminal enrollments do
    /// not block a new one.
    async fn begin_enrollment(
        &self,
        automation_id: Uuid,
        entity_type: EntityKind,
        entity_id: Uuid,
    ) -> StoreResult<Option<Enrollment>>;

    /// Transition an `active` enrollment to a terminal status. Terminal
    /// enrollments are immutable; finishing one again is a no-op.
    async fn finish_enrollment(
        &self,
        enrollment_id: Uuid,
        status: EnrollmentStatus,
        error: Option<&str>,
    ) -> StoreResult<()>;

    async fn bump_execution_count(&self, automation_id: Uuid) -> StoreResult<()>;

    async fn bump_enrolled_count(&self, automation_id: Uuid) -> StoreResult<()>;

    async fn bump_completed_enrollments(&self, automation_id: Uuid) -> StoreResult<()>;

    async fn append_log(&self, entry: NewLogEntry) -> StoreResult<Uuid>;
}

/// Narrow mutation calls against live CRM entities.
#[async_trait]
pub trait CrmStore: Send + Sync {
    /// Current snapshot of the live entity, `None` when it no longer exists.
    async fn entity_snapshot(&self, kind: EntityKind, id: Uuid) -> StoreResult<Option<JsonValue>>;

    /// Add a tag to a contact's tag set. Adding a present tag is a no-op.
    async fn add_contact_tag(&self, id: Uuid, tag: &str) -> StoreResult<()>;

    async fn remove_contact_tag(&self, id: Uuid, tag: &str) -> StoreResult<()>;

    /// Set a built-in field on an entity.
    async fn set_field(
        &self,
        kind: EntityKind,
        id: Uuid,
        field: &str,
        value: &JsonValue,
    ) -> StoreResult<()>;

    /// Set one key in the entity's custom-field map, leaving siblings intact.
    async fn set_custom_field(
        &self,
        kind: EntityKind,
        id: Uuid,
        name: &str,
        value: &JsonValue,
    ) -> StoreResult<()>;

    async fn move_deal_to_stage(&self, id: Uuid, stage: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}
