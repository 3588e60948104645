// Builders and harness shared by the engine test suites

use std::sync::Arc;

use cadence_shared::{Action, Automation, Condition, Contact, Deal, TriggerType};
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::automations::AutomationEngine;

use super::fixtures::{MemoryCrmStore, MemoryEngineStore, RecordingMailer};

pub struct EngineHarness {
    pub engine: Arc<AutomationEngine>,
    pub store: Arc<MemoryEngineStore>,
    pub crm: Arc<MemoryCrmStore>,
    pub mailer: Arc<RecordingMailer>,
}

pub fn harness() -> EngineHarness {
    let store = Arc::new(MemoryEngineStore::new());
    let crm = Arc::new(MemoryCrmStore::new());
    let mailer = Arc::new(RecordingMailer::new());
    let engine = Arc::new(AutomationEngine::new(
        store.clone(),
        crm.clone(),
        mailer.clone(),
    ));
    EngineHarness {
        engine,
        store,
        crm,
        mailer,
    }
}

pub fn contact(user_id: Uuid) -> Contact {
    Contact {
        id: Uuid::new_v4(),
        user_id,
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: Some("ada@example.com".to_string()),
        phone: None,
        company: None,
        title: None,
        status: "lead".to_string(),
        source: None,
        tags: vec![],
        custom_fields: serde_json::json!({}),
        created_at: Utc::now(),
        updated_at: None,
    }
}

pub fn deal(user_id: Uuid) -> Deal {
    Deal {
        id: Uuid::new_v4(),
        user_id,
        contact_id: None,
        title: "New business".to_string(),
        value: Decimal::new(100_000, 2),
        currency: "USD".to_string(),
        pipeline: "default".to_string(),
        stage: "new".to_string(),
        status: "open".to_string(),
        expected_close_date: None,
        custom_fields: serde_json::json!({}),
        created_at: Utc::now(),
        updated_at: None,
    }
}

pub fn automation(
    user_id: Uuid,
    trigger_type: TriggerType,
    conditions: Vec<Condition>,
    actions: Vec<Action>,
) -> Automation {
    Automation {
        id: Uuid::new_v4(),
        user_id,
        name: "test automation".to_string(),
        description: None,
        trigger_type,
        trigger_config: serde_json::json!({}),
        conditions,
        actions,
        is_active: true,
        execution_count: 0,
        enrolled_count: 0,
        completed_enrollments: 0,
        created_at: Utc::now(),
        updated_at: None,
    }
}
