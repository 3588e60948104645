// Domain events handed to the automation engine by the CRUD collaborators

use cadence_shared::{Contact, Deal, EntityKind, EntitySnapshot, TriggerType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

/// An ephemeral unit of work: one trigger tag, the owning user, and a
/// canonicalized payload carrying the entity snapshot under its kind key
/// (`contact` / `deal`) plus optional event metadata such as `changedFields`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationEvent {
    pub event_id: Uuid,
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    pub user_id: Uuid,
    pub data: JsonValue,
    pub timestamp: DateTime<Utc>,
}

impl AutomationEvent {
    pub fn new(trigger_type: TriggerType, entity: &EntitySnapshot, extra: Map<String, JsonValue>) -> Self {
        let mut data = Map::new();
        data.insert(entity.kind().as_str().to_string(), entity.to_value());
        data.extend(extra);

        Self {
            event_id: Uuid::new_v4(),
            trigger_type,
            user_id: entity.user_id(),
            data: JsonValue::Object(data),
            timestamp: Utc::now(),
        }
    }

    pub fn contact_created(contact: &Contact) -> Self {
        Self::new(
            TriggerType::ContactCreated,
            &EntitySnapshot::Contact(contact.clone()),
            Map::new(),
        )
    }

    pub fn contact_updated(contact: &Contact, changed_fields: Vec<String>) -> Self {
        Self::new(
            TriggerType::ContactUpdated,
            &EntitySnapshot::Contact(contact.clone()),
            changed_fields_entry(changed_fields),
        )
    }

    pub fn deal_created(deal: &Deal) -> Self {
        Self::new(
            TriggerType::DealCreated,
            &EntitySnapshot::Deal(deal.clone()),
            Map::new(),
        )
    }

    pub fn deal_updated(deal: &Deal, changed_fields: Vec<String>) -> Self {
        Self::new(
            TriggerType::DealUpdated,
            &EntitySnapshot::Deal(deal.clone()),
            changed_fields_entry(changed_fields),
        )
    }

    pub fn deal_stage_changed(deal: &Deal, previous_stage: &str) -> Self {
        let mut extra = Map::new();
        extra.insert("previousStage".to_string(), JsonValue::String(previous_stage.to_string()));
        extra.insert("newStage".to_string(), JsonValue::String(deal.stage.clone()));
        Self::new(TriggerType::DealStageChanged, &EntitySnapshot::Deal(deal.clone()), extra)
    }

    /// The entity kind this event's trigger carries.
    pub fn entity_kind(&self) -> EntityKind {
        self.trigger_type.entity_kind()
    }

    /// The entity snapshot under the event's kind key, if well formed.
    pub fn entity_value(&self) -> Option<&JsonValue> {
        self.data.get(self.entity_kind().as_str())
    }

    pub fn entity_id(&self) -> Option<Uuid> {
        self.entity_value()?
            .get("id")?
            .as_str()?
            .parse()
            .ok()
    }

    /// The root conditions resolve against: the entity's own fields at the
    /// top level (unqualified paths), the snapshot nested under its kind key
    /// (qualified paths), and any event metadata such as `changedFields`.
    pub fn evaluation_root(&self) -> JsonValue {
        let mut root = match self.entity_value() {
            Some(JsonValue::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        if let JsonValue::Object(data) = &self.data {
            for (key, value) in data {
                root.insert(key.clone(), value.clone());
            }
        }
        JsonValue::Object(root)
    }
}

fn changed_fields_entry(changed_fields: Vec<String>) -> Map<String, JsonValue> {
    let mut extra = Map::new();
    extra.insert(
        "changedFields".to_string(),
        JsonValue::Array(changed_fields.into_iter().map(JsonValue::String).collect()),
    );
    extra
}
