// Execution audit trail
//
// One append-only row per execution attempt. Recording must never fail the
// enrollment: payloads are sanitized before serialization and store errors
// are traced and swallowed.

use std::sync::Arc;

use cadence_shared::{ActionOutcome, EnrollmentStatus, TriggerType};
use serde_json::Value as JsonValue;
use tracing::error;
use uuid::Uuid;

use super::store::{EngineStore, NewLogEntry};

/// Nesting depth kept when logging an entity payload.
const MAX_PAYLOAD_DEPTH: usize = 8;
/// Array elements kept per level when logging an entity payload.
const MAX_PAYLOAD_ITEMS: usize = 64;

pub struct AutomationAudit {
    store: Arc<dyn EngineStore>,
}

impl AutomationAudit {
    pub fn new(store: Arc<dyn EngineStore>) -> Self {
        Self { store }
    }

    /// Append one log row for an execution attempt. Failures are traced, not
    /// propagated.
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        automation_id: Uuid,
        user_id: Uuid,
        trigger_type: TriggerType,
        conditions_met: bool,
        actions_executed: Vec<ActionOutcome>,
        status: EnrollmentStatus,
        error: Option<String>,
        payload: Option<&JsonValue>,
    ) {
        let entry = NewLogEntry {
            automation_id,
            user_id,
            trigger_type,
            conditions_met,
            actions_executed,
            status,
            error,
            payload: payload.map(|p| sanitize(p, MAX_PAYLOAD_DEPTH)),
        };

        if let Err(e) = self.store.append_log(entry).await {
            error!(%automation_id, error = %e, "failed to append automation log");
        }
    }
}

/// Depth- and size-limited deep copy of an arbitrary payload so that log
/// serialization cannot recurse without bound or balloon on large object
/// graphs.
pub fn sanitize(value: &JsonValue, depth: usize) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            if depth == 0 {
                return JsonValue::String("[truncated]".to_string());
            }
            JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), sanitize(v, depth - 1)))
                    .collect(),
            )
        }
        JsonValue::Array(items) => {
            if depth == 0 {
                return JsonValue::String("[truncated]".to_string());
            }
            JsonValue::Array(
                items
                    .iter()
                    .take(MAX_PAYLOAD_ITEMS)
                    .map(|v| sanitize(v, depth - 1))
                    .collect(),
            )
        }
        scalar => scalar.clone(),
    }
}
