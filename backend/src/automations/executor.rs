// Action execution against live entities via the collaborator stores

use std::sync::Arc;

use cadence_shared::{Action, ActionOutcome, ActionType, EntityKind};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use uuid::Uuid;

use super::fields;
use super::store::{CrmStore, MailError, MailSender, StoreError};

#[derive(Debug, thiserror::Error)]
enum ActionError {
    #[error("{action} action config missing '{key}'")]
    MissingConfig { action: &'static str, key: &'static str },
    #[error("{action} targets {expected} entities but the enrolled entity is a {actual}")]
    WrongEntity {
        action: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("unsupported action type")]
    Unsupported,
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Mail(#[from] MailError),
}

/// Executes one action at a time. Every failure mode — bad config, wrong
/// entity kind, collaborator error — is converted into a failed outcome;
/// nothing propagates to the caller.
pub struct ActionExecutor {
    crm: Arc<dyn CrmStore>,
    mailer: Arc<dyn MailSender>,
}

impl ActionExecutor {
    pub fn new(crm: Arc<dyn CrmStore>, mailer: Arc<dyn MailSender>) -> Self {
        Self { crm, mailer }
    }

    /// Execute a single action against the live entity. `live` is the
    /// entity's current snapshot, used for template rendering.
    pub async fn execute(
        &self,
        action: &Action,
        kind: EntityKind,
        entity_id: Uuid,
        live: &JsonValue,
    ) -> ActionOutcome {
        debug!(action = action.action_type.as_str(), %entity_id, "executing action");

        let result = match action.action_type {
            ActionType::AddContactTag => self.add_tag(action, kind, entity_id).await,
            ActionType::RemoveContactTag => self.remove_tag(action, kind, entity_id).await,
            ActionType::UpdateContactField => {
                self.update_field(action, kind, entity_id, EntityKind::Contact).await
            }
            ActionType::UpdateDealField => {
                self.update_field(action, kind, entity_id, EntityKind::Deal).await
            }
            ActionType::UpdateCustomField => self.update_custom_field(action, kind, entity_id).await,
            ActionType::MoveDealToStage => self.move_to_stage(action, kind, entity_id).await,
            ActionType::SendEmail => self.send_email(action, live).await,
            ActionType::Unknown => Err(ActionError::Unsupported),
        };

        match result {
            Ok(output) => ActionOutcome::success(action.action_type, output),
            Err(e) => {
                warn!(action = action.action_type.as_str(), error = %e, "action failed");
                ActionOutcome::failure(action.action_type, e.to_string())
            }
        }
    }

    async fn add_tag(
        &self,
        action: &Action,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<Option<JsonValue>, ActionError> {
        require_contact("add_contact_tag", kind)?;
        let tag = config_str(&action.config, "add_contact_tag", "tag")?;
        self.crm.add_contact_tag(entity_id, tag).await?;
        Ok(Some(serde_json::json!({ "tag": tag })))
    }

    async fn remove_tag(
        &self,
        action: &Action,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<Option<JsonValue>, ActionError> {
        require_contact("remove_contact_tag", kind)?;
        let tag = config_str(&action.config, "remove_contact_tag", "tag")?;
        self.crm.remove_contact_tag(entity_id, tag).await?;
        Ok(Some(serde_json::json!({ "removed_tag": tag })))
    }

    async fn update_field(
        &self,
        action: &Action,
        kind: EntityKind,
        entity_id: Uuid,
        expected: EntityKind,
    ) -> Result<Option<JsonValue>, ActionError> {
        let name = match expected {
            EntityKind::Contact => "update_contact_field",
            EntityKind::Deal => "update_deal_field",
        };
        if kind != expected {
            return Err(ActionError::WrongEntity {
                action: name,
                expected: expected.as_str(),
                actual: kind.as_str(),
            });
        }

        let field = config_str(&action.config, name, "field")?;
        let value = config_value(&action.config, name, "value")?;

        match field.strip_prefix("customFields.") {
            Some(custom) if !custom.is_empty() => {
                self.crm.set_custom_field(kind, entity_id, custom, value).await?
            }
            _ => self.crm.set_field(kind, entity_id, field, value).await?,
        }

        Ok(Some(serde_json::json!({ "field": field, "value": value })))
    }

    async fn update_custom_field(
        &self,
        action: &Action,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<Option<JsonValue>, ActionError> {
        let name = config_str(&action.config, "update_custom_field", "fieldName")?;
        let value = config_value(&action.config, "update_custom_field", "value")?;

        if let Some(target) = action.config.get("entityType") {
            let target: EntityKind = serde_json::from_value(target.clone())
                .map_err(|_| ActionError::Invalid(format!("unknown entityType '{}'", target)))?;
            if target != kind {
                return Err(ActionError::WrongEntity {
                    action: "update_custom_field",
                    expected: target.as_str(),
                    actual: kind.as_str(),
                });
            }
        }

        self.crm.set_custom_field(kind, entity_id, name, value).await?;
        Ok(Some(serde_json::json!({ "fieldName": name, "value": value })))
    }

    async fn move_to_stage(
        &self,
        action: &Action,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<Option<JsonValue>, ActionError> {
        if kind != EntityKind::Deal {
            return Err(ActionError::WrongEntity {
                action: "move_deal_to_stage",
                expected: "deal",
                actual: kind.as_str(),
            });
        }
        let stage = config_str(&action.config, "move_deal_to_stage", "stage")?;
        self.crm.move_deal_to_stage(entity_id, stage).await?;
        Ok(Some(serde_json::json!({ "stage": stage })))
    }

    async fn send_email(
        &self,
        action: &Action,
        live: &JsonValue,
    ) -> Result<Option<JsonValue>, ActionError> {
        let subject_tpl = config_str(&action.config, "send_email", "subject")?;
        let body_tpl = config_str(&action.config, "send_email", "body")?;

        let to = match action.config.get("to").and_then(JsonValue::as_str) {
            Some(to) => fields::render_template(to, live),
            None => live
                .get("email")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string(),
        };
        if to.is_empty() {
            return Err(ActionError::Invalid(
                "send_email has no recipient: config 'to' missing and entity has no email".to_string(),
            ));
        }

        let subject = fields::render_template(subject_tpl, live);
        let body = fields::render_template(body_tpl, live);

        self.mailer.send(&to, &subject, &body).await?;
        Ok(Some(serde_json::json!({ "sent_to": to, "subject": subject })))
    }
}

fn require_contact(action: &'static str, kind: EntityKind) -> Result<(), ActionError> {
    if kind != EntityKind::Contact {
        return Err(ActionError::WrongEntity {
            action,
            expected: "contact",
            actual: kind.as_str(),
        });
    }
    Ok(())
}

fn config_str<'a>(
    config: &'a JsonValue,
    action: &'static str,
    key: &'static str,
) -> Result<&'a str, ActionError> {
    config
        .get(key)
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(ActionError::MissingConfig { action, key })
}

fn config_value<'a>(
    config: &'a JsonValue,
    action: &'static str,
    key: &'static str,
) -> Result<&'a JsonValue, ActionError> {
    config.get(key).ok_or(ActionError::MissingConfig { action, key })
}
