// Enrollment lifecycle scenarios, end to end through the engine

use cadence_shared::{Action, Condition, EnrollmentStatus, EntityKind, TriggerType};
use serde_json::json;
use uuid::Uuid;

use crate::automations::AutomationEvent;
use crate::tests::helpers::{automation, contact, deal, harness};

#[tokio::test]
async fn tags_new_contact_without_conditions() {
    let h = harness();
    let user_id = Uuid::new_v4();

    let contact = contact(user_id);
    h.crm.insert_contact(&contact);

    let automation = automation(
        user_id,
        TriggerType::ContactCreated,
        vec![],
        vec![Action::add_contact_tag("new-lead")],
    );
    h.store.insert_automation(automation.clone());

    h.engine.process_event(&AutomationEvent::contact_created(&contact)).await;

    assert_eq!(h.crm.tags(contact.id), vec!["new-lead"]);

    let enrollments = h.store.enrollments();
    assert_eq!(enrollments.len(), 1);
    assert_eq!(enrollments[0].status, EnrollmentStatus::Completed);
    assert_eq!(enrollments[0].entity_type, EntityKind::Contact);
    assert_eq!(enrollments[0].entity_id, contact.id);
    assert!(enrollments[0].completed_at.is_some());

    let stats = h.store.automation(automation.id).unwrap();
    assert_eq!(stats.execution_count, 1);
    assert_eq!(stats.enrolled_count, 1);
    assert_eq!(stats.completed_enrollments, 1);

    let logs = h.store.logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].conditions_met);
    assert_eq!(logs[0].status, EnrollmentStatus::Completed);
    assert!(logs[0].error.is_none());
}

#[tokio::test]
async fn condition_gates_the_action_on_company() {
    let h = harness();
    let user_id = Uuid::new_v4();

    let mut vip = contact(user_id);
    vip.company = Some("Acme Corp".to_string());
    let mut other = contact(user_id);
    other.company = Some("Other Corp".to_string());
    h.crm.insert_contact(&vip);
    h.crm.insert_contact(&other);

    let automation = automation(
        user_id,
        TriggerType::ContactCreated,
        vec![Condition::equals("company", json!("Acme Corp"))],
        vec![Action::add_contact_tag("vip")],
    );
    h.store.insert_automation(automation.clone());

    h.engine.process_event(&AutomationEvent::contact_created(&vip)).await;
    h.engine.process_event(&AutomationEvent::contact_created(&other)).await;

    assert_eq!(h.crm.tags(vip.id), vec!["vip"]);
    assert!(h.crm.tags(other.id).is_empty());

    // Both runs enrolled and completed; only the matching one executed actions.
    let stats = h.store.automation(automation.id).unwrap();
    assert_eq!(stats.execution_count, 2);
    assert_eq!(stats.enrolled_count, 2);
    assert_eq!(stats.completed_enrollments, 1);

    let logs = h.store.logs();
    assert_eq!(logs.len(), 2);
    assert!(logs[0].conditions_met);
    assert!(!logs[1].conditions_met);
    assert_eq!(logs[1].actions_executed, json!([]));
}

#[tokio::test]
async fn and_conditions_combine_over_custom_and_builtin_fields() {
    let h = harness();
    let user_id = Uuid::new_v4();

    let mut hot = deal(user_id);
    hot.custom_fields = json!({ "priority": "High" });
    hot.value = rust_decimal::Decimal::new(600_000, 2);
    let mut cold = deal(user_id);
    cold.custom_fields = json!({ "priority": "High" });
    cold.value = rust_decimal::Decimal::new(300_000, 2);
    h.crm.insert_deal(&hot);
    h.crm.insert_deal(&cold);

    let automation = automation(
        user_id,
        TriggerType::DealUpdated,
        vec![
            Condition::equals("customFields.priority", json!("High")),
            Condition::greater_than("value", 5000.0),
        ],
        vec![Action::move_deal_to_stage("fast-track")],
    );
    h.store.insert_automation(automation.clone());

    h.engine
        .process_event(&AutomationEvent::deal_updated(&hot, vec!["value".to_string()]))
        .await;
    h.engine
        .process_event(&AutomationEvent::deal_updated(&cold, vec!["value".to_string()]))
        .await;

    let hot_after = h.crm.entity(EntityKind::Deal, hot.id).unwrap();
    let cold_after = h.crm.entity(EntityKind::Deal, cold.id).unwrap();
    assert_eq!(hot_after["stage"], "fast-track");
    assert_eq!(cold_after["stage"], "new");

    let stats = h.store.automation(automation.id).unwrap();
    assert_eq!(stats.completed_enrollments, 1);
}

#[tokio::test]
async fn invalid_action_config_fails_the_enrollment() {
    let h = harness();
    let user_id = Uuid::new_v4();

    let contact = contact(user_id);
    h.crm.insert_contact(&contact);

    // update_contact_field without a 'value' key
    let broken = Action::new(
        cadence_shared::ActionType::UpdateContactField,
        json!({ "field": "status" }),
    );
    let automation = automation(user_id, TriggerType::ContactCreated, vec![], vec![broken]);
    h.store.insert_automation(automation.clone());

    h.engine.process_event(&AutomationEvent::contact_created(&contact)).await;

    let enrollments = h.store.enrollments();
    assert_eq!(enrollments.len(), 1);
    assert_eq!(enrollments[0].status, EnrollmentStatus::Failed);
    assert!(enrollments[0].error.as_deref().unwrap().contains("missing 'value'"));

    let logs = h.store.logs();
    assert_eq!(logs[0].status, EnrollmentStatus::Failed);
    assert!(logs[0].error.as_deref().unwrap().contains("missing 'value'"));
    assert_eq!(logs[0].actions_executed[0]["status"], "failed");

    let stats = h.store.automation(automation.id).unwrap();
    assert_eq!(stats.execution_count, 1);
    assert_eq!(stats.enrolled_count, 1);
    assert_eq!(stats.completed_enrollments, 0);
}

#[tokio::test]
async fn one_failed_action_does_not_stop_the_rest() {
    let h = harness();
    let user_id = Uuid::new_v4();

    let contact = contact(user_id);
    h.crm.insert_contact(&contact);

    let broken = Action::new(
        cadence_shared::ActionType::UpdateContactField,
        json!({ "field": "status" }),
    );
    let automation = automation(
        user_id,
        TriggerType::ContactCreated,
        vec![],
        vec![broken, Action::add_contact_tag("still-ran")],
    );
    h.store.insert_automation(automation.clone());

    h.engine.process_event(&AutomationEvent::contact_created(&contact)).await;

    // The second action still executed, but the enrollment failed with the
    // first failure's error.
    assert_eq!(h.crm.tags(contact.id), vec!["still-ran"]);

    let enrollments = h.store.enrollments();
    assert_eq!(enrollments[0].status, EnrollmentStatus::Failed);

    let logs = h.store.logs();
    let outcomes = logs[0].actions_executed.as_array().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0]["status"], "failed");
    assert_eq!(outcomes[1]["status"], "success");
}

#[tokio::test]
async fn terminal_enrollment_permits_re_enrollment() {
    let h = harness();
    let user_id = Uuid::new_v4();

    let contact = contact(user_id);
    h.crm.insert_contact(&contact);

    let automation = automation(
        user_id,
        TriggerType::ContactUpdated,
        vec![],
        vec![Action::add_contact_tag("touched")],
    );
    h.store.insert_automation(automation.clone());

    let event = AutomationEvent::contact_updated(&contact, vec!["status".to_string()]);
    h.engine.process_event(&event).await;
    h.engine.process_event(&event).await;

    let enrollments = h.store.enrollments();
    assert_eq!(enrollments.len(), 2);
    assert!(enrollments.iter().all(|e| e.status == EnrollmentStatus::Completed));
}

#[tokio::test]
async fn active_enrollment_blocks_a_duplicate() {
    let h = harness();
    let user_id = Uuid::new_v4();

    let contact = contact(user_id);
    h.crm.insert_contact(&contact);

    let automation = automation(
        user_id,
        TriggerType::ContactCreated,
        vec![],
        vec![Action::add_contact_tag("once")],
    );
    h.store.insert_automation(automation.clone());

    // Simulate an enrollment still in flight for this tuple.
    use crate::automations::EngineStore;
    h.store
        .begin_enrollment(automation.id, EntityKind::Contact, contact.id)
        .await
        .unwrap()
        .unwrap();

    h.engine.process_event(&AutomationEvent::contact_created(&contact)).await;

    // Silently aborted: no second enrollment, no log row, no counter bumps.
    assert_eq!(h.store.enrollments().len(), 1);
    assert!(h.store.logs().is_empty());
    let stats = h.store.automation(automation.id).unwrap();
    assert_eq!(stats.execution_count, 0);
    assert_eq!(stats.enrolled_count, 0);
}

#[tokio::test]
async fn automations_of_other_tenants_do_not_fire() {
    let h = harness();
    let user_id = Uuid::new_v4();

    let contact = contact(user_id);
    h.crm.insert_contact(&contact);

    let foreign = automation(
        Uuid::new_v4(),
        TriggerType::ContactCreated,
        vec![],
        vec![Action::add_contact_tag("leaked")],
    );
    let mismatched = automation(
        user_id,
        TriggerType::DealCreated,
        vec![],
        vec![Action::add_contact_tag("leaked")],
    );
    h.store.insert_automation(foreign);
    h.store.insert_automation(mismatched);

    h.engine.process_event(&AutomationEvent::contact_created(&contact)).await;

    assert!(h.crm.tags(contact.id).is_empty());
    assert!(h.store.enrollments().is_empty());
    assert!(h.store.logs().is_empty());
}

#[tokio::test]
async fn inactive_automations_are_ignored() {
    let h = harness();
    let user_id = Uuid::new_v4();

    let contact = contact(user_id);
    h.crm.insert_contact(&contact);

    let mut paused = automation(
        user_id,
        TriggerType::ContactCreated,
        vec![],
        vec![Action::add_contact_tag("paused")],
    );
    paused.is_active = false;
    h.store.insert_automation(paused);

    h.engine.process_event(&AutomationEvent::contact_created(&contact)).await;

    assert!(h.crm.tags(contact.id).is_empty());
    assert!(h.store.enrollments().is_empty());
}

#[tokio::test]
async fn welcome_email_renders_against_the_live_entity() {
    let h = harness();
    let user_id = Uuid::new_v4();

    let mut contact = contact(user_id);
    contact.company = Some("Acme Corp".to_string());
    h.crm.insert_contact(&contact);

    let automation = automation(
        user_id,
        TriggerType::ContactCreated,
        vec![],
        vec![Action::send_email(
            "{{email}}",
            "Welcome to {{company || 'Cadence'}}",
            "Hi {{first_name}}!",
        )],
    );
    h.store.insert_automation(automation.clone());

    h.engine.process_event(&AutomationEvent::contact_created(&contact)).await;

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ada@example.com");
    assert_eq!(sent[0].subject, "Welcome to Acme Corp");
    assert_eq!(sent[0].body, "Hi Ada!");
    assert_eq!(h.store.enrollments()[0].status, EnrollmentStatus::Completed);
}

#[tokio::test]
async fn failed_email_send_fails_the_enrollment() {
    let h = harness();
    let user_id = Uuid::new_v4();

    let contact = contact(user_id);
    h.crm.insert_contact(&contact);
    h.mailer.fail_with("connection refused");

    let automation = automation(
        user_id,
        TriggerType::ContactCreated,
        vec![],
        vec![Action::send_email("{{email}}", "Hello", "Body")],
    );
    h.store.insert_automation(automation.clone());

    h.engine.process_event(&AutomationEvent::contact_created(&contact)).await;

    let enrollments = h.store.enrollments();
    assert_eq!(enrollments[0].status, EnrollmentStatus::Failed);
    assert!(enrollments[0].error.as_deref().unwrap().contains("connection refused"));
    assert_eq!(h.store.automation(automation.id).unwrap().completed_enrollments, 0);
}

#[tokio::test]
async fn stage_change_trigger_sees_previous_stage() {
    let h = harness();
    let user_id = Uuid::new_v4();

    let mut deal = deal(user_id);
    deal.stage = "won".to_string();
    h.crm.insert_deal(&deal);

    let automation = automation(
        user_id,
        TriggerType::DealStageChanged,
        vec![Condition::equals("previousStage", json!("negotiation"))],
        vec![Action::update_custom_field(EntityKind::Deal, "closedFrom", json!("negotiation"))],
    );
    h.store.insert_automation(automation.clone());

    h.engine
        .process_event(&AutomationEvent::deal_stage_changed(&deal, "negotiation"))
        .await;

    let after = h.crm.entity(EntityKind::Deal, deal.id).unwrap();
    assert_eq!(after["customFields"]["closedFrom"], "negotiation");
    assert_eq!(h.store.automation(automation.id).unwrap().completed_enrollments, 1);
}
