// Enrollment lifecycle - the core state machine of the automation engine
//
// One enrollment per (automation, entity) attempt: created `active`, moved to
// `completed` or `failed` exactly once, never reopened. A prior terminal
// enrollment does not block re-enrollment on a later event.

use std::sync::Arc;

use cadence_shared::{ActionOutcome, Automation, EnrollmentStatus};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use super::audit::AutomationAudit;
use super::conditions;
use super::executor::ActionExecutor;
use super::fields;
use super::store::{CrmStore, EngineStore, MailSender};
use super::triggers::AutomationEvent;

pub struct AutomationEngine {
    store: Arc<dyn EngineStore>,
    crm: Arc<dyn CrmStore>,
    executor: ActionExecutor,
    audit: AutomationAudit,
}

impl AutomationEngine {
    pub fn new(
        store: Arc<dyn EngineStore>,
        crm: Arc<dyn CrmStore>,
        mailer: Arc<dyn MailSender>,
    ) -> Self {
        let executor = ActionExecutor::new(crm.clone(), mailer);
        let audit = AutomationAudit::new(store.clone());
        Self {
            store,
            crm,
            executor,
            audit,
        }
    }

    /// Fan an event out to every matching active automation owned by the
    /// event's user. Automations are independent: no ordering guarantee, and
    /// one automation's failure never reaches another. Nothing propagates to
    /// the caller.
    pub async fn process_event(&self, event: &AutomationEvent) {
        let automations = match self
            .store
            .active_automations(event.user_id, event.trigger_type)
            .await
        {
            Ok(automations) => automations,
            Err(e) => {
                error!(trigger = event.trigger_type.as_str(), error = %e, "automation lookup failed");
                return;
            }
        };

        debug!(
            trigger = event.trigger_type.as_str(),
            matches = automations.len(),
            "processing event"
        );

        for automation in &automations {
            if !matches_trigger_config(automation, event) {
                continue;
            }
            self.enroll_and_run(automation, event).await;
        }
    }

    /// Run one automation against one event, per the enrollment state
    /// machine. Every exit path leaves a terminal enrollment, bumped
    /// counters, and one log row.
    async fn enroll_and_run(&self, automation: &Automation, event: &AutomationEvent) {
        let Some(entity_id) = event.entity_id() else {
            warn!(
                automation = %automation.id,
                trigger = event.trigger_type.as_str(),
                "event payload has no entity id, skipping"
            );
            return;
        };
        let kind = event.entity_kind();

        let enrollment = match self.store.begin_enrollment(automation.id, kind, entity_id).await {
            Ok(Some(enrollment)) => enrollment,
            Ok(None) => {
                // An enrollment is already in flight for this tuple.
                debug!(automation = %automation.id, %entity_id, "active enrollment exists, skipping");
                return;
            }
            Err(e) => {
                error!(automation = %automation.id, error = %e, "failed to begin enrollment");
                return;
            }
        };

        if let Err(e) = self.store.bump_enrolled_count(automation.id).await {
            error!(automation = %automation.id, error = %e, "failed to bump enrolled count");
        }

        let root = event.evaluation_root();
        let conditions_met = conditions::evaluate_all(&automation.conditions, &root);

        let mut outcomes: Vec<ActionOutcome> = Vec::new();
        if conditions_met {
            // Actions run against the live entity, not the event snapshot.
            let live = match self.crm.entity_snapshot(kind, entity_id).await {
                Ok(Some(live)) => live,
                Ok(None) | Err(_) => event.entity_value().cloned().unwrap_or(JsonValue::Null),
            };

            for action in &automation.actions {
                let outcome = self.executor.execute(action, kind, entity_id, &live).await;
                outcomes.push(outcome);
            }
        }

        let first_error = outcomes
            .iter()
            .find(|o| !o.is_success())
            .map(|o| o.error.clone().unwrap_or_else(|| "action failed".to_string()));
        let status = if first_error.is_some() {
            EnrollmentStatus::Failed
        } else {
            EnrollmentStatus::Completed
        };

        if let Err(e) = self
            .store
            .finish_enrollment(enrollment.id, status, first_error.as_deref())
            .await
        {
            error!(enrollment = %enrollment.id, error = %e, "failed to finish enrollment");
        }

        if conditions_met && status == EnrollmentStatus::Completed {
            if let Err(e) = self.store.bump_completed_enrollments(automation.id).await {
                error!(automation = %automation.id, error = %e, "failed to bump completion count");
            }
        }
        if let Err(e) = self.store.bump_execution_count(automation.id).await {
            error!(automation = %automation.id, error = %e, "failed to bump execution count");
        }

        self.audit
            .record(
                automation.id,
                automation.user_id,
                event.trigger_type,
                conditions_met,
                outcomes,
                status,
                first_error,
                event.entity_value(),
            )
            .await;

        info!(
            automation = %automation.id,
            %entity_id,
            conditions_met,
            status = ?status,
            "automation executed"
        );
    }
}

/// Trigger-level filtering: every key in the automation's trigger config must
/// match the resolved value at that path in the evaluation root. An empty
/// config matches everything.
fn matches_trigger_config(automation: &Automation, event: &AutomationEvent) -> bool {
    let JsonValue::Object(config) = &automation.trigger_config else {
        return true;
    };
    if config.is_empty() {
        return true;
    }

    let root = event.evaluation_root();
    config.iter().all(|(path, expected)| {
        fields::resolve(path, &root).is_some_and(|actual| actual == expected)
    })
}
