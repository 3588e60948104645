// Dispatch boundary: events cross the channel and reach the engine

use std::time::Duration;

use cadence_shared::{Action, TriggerType};
use tokio::time::{sleep, timeout};
use tokio_test::assert_ok;
use uuid::Uuid;

use crate::automations::{AutomationDispatcher, AutomationEvent};
use crate::tests::helpers::{automation, contact, harness};

#[tokio::test]
async fn dispatched_events_are_processed_by_the_worker() {
    let h = harness();
    let user_id = Uuid::new_v4();

    let contact = contact(user_id);
    h.crm.insert_contact(&contact);
    h.store.insert_automation(automation(
        user_id,
        TriggerType::ContactCreated,
        vec![],
        vec![Action::add_contact_tag("queued")],
    ));

    let dispatcher = AutomationDispatcher::start(h.engine.clone());
    dispatcher.dispatch(AutomationEvent::contact_created(&contact));

    let waited = timeout(Duration::from_secs(2), async {
        while h.store.logs().is_empty() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert_ok!(waited);

    assert_eq!(h.crm.tags(contact.id), vec!["queued"]);
    assert_eq!(h.store.logs().len(), 1);
}

#[tokio::test]
async fn dispatch_returns_immediately_even_when_processing_is_slow() {
    let h = harness();
    let user_id = Uuid::new_v4();

    let contact = contact(user_id);
    h.crm.insert_contact(&contact);

    let dispatcher = AutomationDispatcher::start(h.engine.clone());

    // No automations registered: events drain without effect, and dispatch
    // itself never blocks the caller.
    for _ in 0..50 {
        dispatcher.dispatch(AutomationEvent::contact_created(&contact));
    }

    sleep(Duration::from_millis(50)).await;
    assert!(h.store.enrollments().is_empty());
}
