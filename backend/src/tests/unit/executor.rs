// Action executor behavior against the in-memory collaborators

use std::sync::Arc;

use cadence_shared::{Action, ActionStatus, ActionType, EntityKind};
use serde_json::json;
use uuid::Uuid;

use crate::automations::ActionExecutor;
use crate::tests::fixtures::{MemoryCrmStore, RecordingMailer};
use crate::tests::helpers::{contact, deal};

fn executor() -> (ActionExecutor, Arc<MemoryCrmStore>, Arc<RecordingMailer>) {
    let crm = Arc::new(MemoryCrmStore::new());
    let mailer = Arc::new(RecordingMailer::new());
    (ActionExecutor::new(crm.clone(), mailer.clone()), crm, mailer)
}

#[tokio::test]
async fn adding_a_tag_twice_is_idempotent() {
    let (executor, crm, _) = executor();
    let contact = contact(Uuid::new_v4());
    crm.insert_contact(&contact);

    let action = Action::add_contact_tag("new-lead");
    let live = crm.entity(EntityKind::Contact, contact.id).unwrap();

    let first = executor.execute(&action, EntityKind::Contact, contact.id, &live).await;
    let second = executor.execute(&action, EntityKind::Contact, contact.id, &live).await;

    assert_eq!(first.status, ActionStatus::Success);
    assert_eq!(second.status, ActionStatus::Success);
    assert_eq!(crm.tags(contact.id), vec!["new-lead"]);
}

#[tokio::test]
async fn custom_field_update_preserves_siblings() {
    let (executor, crm, _) = executor();
    let mut contact = contact(Uuid::new_v4());
    contact.custom_fields = json!({ "customerType": "Silver", "region": "EMEA" });
    crm.insert_contact(&contact);

    let action = Action::update_contact_field("customFields.customerType", json!("Gold"));
    let live = crm.entity(EntityKind::Contact, contact.id).unwrap();
    let outcome = executor.execute(&action, EntityKind::Contact, contact.id, &live).await;

    assert_eq!(outcome.status, ActionStatus::Success);
    let after = crm.entity(EntityKind::Contact, contact.id).unwrap();
    assert_eq!(after["customFields"]["customerType"], "Gold");
    assert_eq!(after["customFields"]["region"], "EMEA");
}

#[tokio::test]
async fn explicit_custom_field_action_checks_entity_type() {
    let (executor, crm, _) = executor();
    let deal = deal(Uuid::new_v4());
    crm.insert_deal(&deal);

    let mismatched = Action::update_custom_field(EntityKind::Contact, "score", json!(10));
    let live = crm.entity(EntityKind::Deal, deal.id).unwrap();
    let outcome = executor.execute(&mismatched, EntityKind::Deal, deal.id, &live).await;

    assert_eq!(outcome.status, ActionStatus::Failed);
    assert!(outcome.error.unwrap().contains("contact"));

    let matched = Action::update_custom_field(EntityKind::Deal, "score", json!(10));
    let outcome = executor.execute(&matched, EntityKind::Deal, deal.id, &live).await;
    assert_eq!(outcome.status, ActionStatus::Success);
    assert_eq!(
        crm.entity(EntityKind::Deal, deal.id).unwrap()["customFields"]["score"],
        10
    );
}

#[tokio::test]
async fn missing_config_keys_fail_with_named_key() {
    let (executor, crm, _) = executor();
    let contact = contact(Uuid::new_v4());
    crm.insert_contact(&contact);
    let live = crm.entity(EntityKind::Contact, contact.id).unwrap();

    let no_value = Action::new(ActionType::UpdateContactField, json!({ "field": "status" }));
    let outcome = executor.execute(&no_value, EntityKind::Contact, contact.id, &live).await;
    assert_eq!(outcome.status, ActionStatus::Failed);
    assert!(outcome.error.unwrap().contains("missing 'value'"));

    let no_tag = Action::new(ActionType::AddContactTag, json!({}));
    let outcome = executor.execute(&no_tag, EntityKind::Contact, contact.id, &live).await;
    assert!(outcome.error.unwrap().contains("missing 'tag'"));
}

#[tokio::test]
async fn stage_move_requires_a_deal() {
    let (executor, crm, _) = executor();
    let contact = contact(Uuid::new_v4());
    crm.insert_contact(&contact);
    let live = crm.entity(EntityKind::Contact, contact.id).unwrap();

    let action = Action::move_deal_to_stage("won");
    let outcome = executor.execute(&action, EntityKind::Contact, contact.id, &live).await;

    assert_eq!(outcome.status, ActionStatus::Failed);
    assert!(outcome.error.unwrap().contains("deal"));
}

#[tokio::test]
async fn send_email_renders_templates_with_fallbacks() {
    let (executor, crm, mailer) = executor();
    let mut contact = contact(Uuid::new_v4());
    contact.company = None;
    crm.insert_contact(&contact);

    let action = Action::send_email(
        "{{email}}",
        "Welcome {{first_name}}",
        "Hi {{first_name || 'friend'}}, greetings from {{company || 'our team'}}.",
    );
    let live = crm.entity(EntityKind::Contact, contact.id).unwrap();
    let outcome = executor.execute(&action, EntityKind::Contact, contact.id, &live).await;

    assert_eq!(outcome.status, ActionStatus::Success);
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ada@example.com");
    assert_eq!(sent[0].subject, "Welcome Ada");
    assert_eq!(sent[0].body, "Hi Ada, greetings from our team.");
}

#[tokio::test]
async fn send_email_defaults_to_entity_email() {
    let (executor, crm, mailer) = executor();
    let contact = contact(Uuid::new_v4());
    crm.insert_contact(&contact);

    let action = Action::new(
        ActionType::SendEmail,
        json!({ "subject": "Hello", "body": "Plain body" }),
    );
    let live = crm.entity(EntityKind::Contact, contact.id).unwrap();
    let outcome = executor.execute(&action, EntityKind::Contact, contact.id, &live).await;

    assert_eq!(outcome.status, ActionStatus::Success);
    assert_eq!(mailer.sent()[0].to, "ada@example.com");
}

#[tokio::test]
async fn mailer_failure_fails_the_action() {
    let (executor, crm, mailer) = executor();
    let contact = contact(Uuid::new_v4());
    crm.insert_contact(&contact);
    mailer.fail_with("smtp unreachable");

    let action = Action::send_email("{{email}}", "Subject", "Body");
    let live = crm.entity(EntityKind::Contact, contact.id).unwrap();
    let outcome = executor.execute(&action, EntityKind::Contact, contact.id, &live).await;

    assert_eq!(outcome.status, ActionStatus::Failed);
    assert!(outcome.error.unwrap().contains("smtp unreachable"));
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn unrecognized_action_type_fails_cleanly() {
    let (executor, crm, _) = executor();
    let contact = contact(Uuid::new_v4());
    crm.insert_contact(&contact);
    let live = crm.entity(EntityKind::Contact, contact.id).unwrap();

    let action: Action =
        serde_json::from_str(r#"{"type":"launch_rocket","config":{}}"#).unwrap();
    assert_eq!(action.action_type, ActionType::Unknown);

    let outcome = executor.execute(&action, EntityKind::Contact, contact.id, &live).await;
    assert_eq!(outcome.status, ActionStatus::Failed);
    assert!(outcome.error.unwrap().contains("unsupported"));
}

#[tokio::test]
async fn deal_field_action_rejects_contacts() {
    let (executor, crm, _) = executor();
    let contact = contact(Uuid::new_v4());
    crm.insert_contact(&contact);
    let live = crm.entity(EntityKind::Contact, contact.id).unwrap();

    let action = Action::update_deal_field("stage", json!("won"));
    let outcome = executor.execute(&action, EntityKind::Contact, contact.id, &live).await;

    assert_eq!(outcome.status, ActionStatus::Failed);
    assert!(outcome.error.unwrap().contains("deal"));
}
