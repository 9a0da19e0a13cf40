mod common;

use chatbot_core::domain::{ChangeOp, ConfigChange, Persona, PersonaEvent, SyncStatus, Tone};
use chatbot_core::LiveConfigPropagator;
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(2);

async fn wait_for_status(propagator: &LiveConfigPropagator, tenant: Uuid, wanted: SyncStatus) {
    let mut status = propagator.watch_status(tenant).expect("feed not started");
    timeout(WAIT, status.wait_for(|s| *s == wanted))
        .await
        .expect("timed out waiting for status")
        .expect("status channel closed");
}

fn edited(persona: &Persona, instruction: &str) -> Persona {
    Persona {
        system_instruction: instruction.to_string(),
        ..persona.clone()
    }
}

#[tokio::test]
async fn first_read_loads_and_goes_live() {
    let tenant = Uuid::new_v4();
    let original = persona(tenant, "Help.", Tone::Friendly);
    let store = Arc::new(MemoryConfig::with_persona(original.clone()));
    let propagator = LiveConfigPropagator::new(store.clone());

    assert_eq!(propagator.status(tenant), SyncStatus::Uninitialized);
    assert_eq!(propagator.current(tenant).await.unwrap(), Some(original));
    wait_for_status(&propagator, tenant, SyncStatus::Live).await;
    assert_eq!(store.subscribe_calls(), 1);

    // Later reads are served from memory.
    propagator.current(tenant).await.unwrap();
    assert_eq!(store.subscribe_calls(), 1);
}

#[tokio::test]
async fn updates_reach_every_listener() {
    let tenant = Uuid::new_v4();
    let original = persona(tenant, "Help.", Tone::Friendly);
    let store = Arc::new(MemoryConfig::with_persona(original.clone()));
    let propagator = LiveConfigPropagator::new(store.clone());

    let mut first = propagator.subscribe(tenant).await.unwrap();
    let mut second = propagator.subscribe(tenant).await.unwrap();
    wait_for_status(&propagator, tenant, SyncStatus::Live).await;

    let updated = edited(&original, "Only talk about tandems.");
    store.save(updated.clone());

    let expected = PersonaEvent::Updated(updated.clone());
    assert_eq!(timeout(WAIT, first.next()).await.unwrap(), Some(expected.clone()));
    assert_eq!(timeout(WAIT, second.next()).await.unwrap(), Some(expected));
    assert_eq!(propagator.current(tenant).await.unwrap(), Some(updated));
}

#[tokio::test]
async fn delete_clears_the_persona() {
    let tenant = Uuid::new_v4();
    let store = Arc::new(MemoryConfig::with_persona(persona(tenant, "Help.", Tone::Casual)));
    let propagator = LiveConfigPropagator::new(store.clone());

    let mut listener = propagator.subscribe(tenant).await.unwrap();
    wait_for_status(&propagator, tenant, SyncStatus::Live).await;

    store.delete(tenant);

    assert_eq!(
        timeout(WAIT, listener.next()).await.unwrap(),
        Some(PersonaEvent::Cleared)
    );
    assert_eq!(propagator.current(tenant).await.unwrap(), None);
}

#[tokio::test]
async fn changes_for_another_tenant_are_ignored() {
    let tenant = Uuid::new_v4();
    let original = persona(tenant, "Help.", Tone::Friendly);
    let store = Arc::new(MemoryConfig::with_persona(original.clone()));
    let propagator = LiveConfigPropagator::new(store.clone());

    let mut listener = propagator.subscribe(tenant).await.unwrap();
    wait_for_status(&propagator, tenant, SyncStatus::Live).await;

    let stranger = persona(Uuid::new_v4(), "Not yours.", Tone::Formal);
    store.push(
        tenant,
        ConfigChange {
            op: ChangeOp::Update,
            new_value: Some(stranger),
        },
    );
    let mine = edited(&original, "Still mine.");
    store.save(mine.clone());

    assert_eq!(
        timeout(WAIT, listener.next()).await.unwrap(),
        Some(PersonaEvent::Updated(mine))
    );
}

#[tokio::test]
async fn stale_feed_keeps_serving_the_last_value() {
    let tenant = Uuid::new_v4();
    let original = persona(tenant, "Help.", Tone::Friendly);
    let store = Arc::new(MemoryConfig::with_persona(original.clone()));
    let propagator = LiveConfigPropagator::with_reconnect_delay(store.clone(), Duration::from_secs(60));

    propagator.current(tenant).await.unwrap();
    wait_for_status(&propagator, tenant, SyncStatus::Live).await;

    store.drop_subscriptions();
    wait_for_status(&propagator, tenant, SyncStatus::Stale).await;

    *store.fail_reads.lock().unwrap() = true;
    assert_eq!(propagator.current(tenant).await.unwrap(), Some(original));
}

#[tokio::test]
async fn reconnect_catches_up_on_missed_changes() {
    let tenant = Uuid::new_v4();
    let original = persona(tenant, "Help.", Tone::Friendly);
    let store = Arc::new(MemoryConfig::with_persona(original.clone()));
    let propagator =
        LiveConfigPropagator::with_reconnect_delay(store.clone(), Duration::from_millis(20));

    let mut listener = propagator.subscribe(tenant).await.unwrap();
    wait_for_status(&propagator, tenant, SyncStatus::Live).await;

    // The edit lands while no subscription is open, so only the resync sees it.
    store.drop_subscriptions();
    let missed = edited(&original, "Changed while offline.");
    store.store_silently(missed.clone());

    assert_eq!(
        timeout(WAIT, listener.next()).await.unwrap(),
        Some(PersonaEvent::Updated(missed.clone()))
    );
    assert_eq!(propagator.current(tenant).await.unwrap(), Some(missed));
    assert!(store.subscribe_calls() >= 2);
}

#[tokio::test]
async fn failed_first_load_is_retried_on_the_next_read() {
    let tenant = Uuid::new_v4();
    let original = persona(tenant, "Help.", Tone::Friendly);
    let store = Arc::new(MemoryConfig::with_persona(original.clone()));
    let propagator = LiveConfigPropagator::new(store.clone());

    *store.fail_reads.lock().unwrap() = true;
    assert!(propagator.current(tenant).await.is_err());
    assert_eq!(propagator.status(tenant), SyncStatus::Uninitialized);

    *store.fail_reads.lock().unwrap() = false;
    assert_eq!(propagator.current(tenant).await.unwrap(), Some(original));
}

#[tokio::test]
async fn callbacks_fire_until_shutdown() {
    let tenant = Uuid::new_v4();
    let original = persona(tenant, "Help.", Tone::Friendly);
    let store = Arc::new(MemoryConfig::with_persona(original.clone()));
    let propagator = LiveConfigPropagator::new(store.clone());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = propagator
        .on_persona_changed(tenant, move |event| {
            let _ = tx.send(event);
        })
        .await
        .unwrap();
    wait_for_status(&propagator, tenant, SyncStatus::Live).await;

    let updated = edited(&original, "Callbacks work.");
    store.save(updated.clone());
    assert_eq!(
        timeout(WAIT, rx.recv()).await.unwrap(),
        Some(PersonaEvent::Updated(updated.clone()))
    );

    propagator.shutdown();
    timeout(WAIT, handle).await.unwrap().unwrap();
    assert_eq!(propagator.current(tenant).await.unwrap(), Some(updated));
}
