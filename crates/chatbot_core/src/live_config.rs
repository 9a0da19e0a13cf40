//! crates/chatbot_core/src/live_config.rs
//!
//! Keeps one authoritative in-memory persona per tenant and pushes edits to
//! every open chat session without a reload.
//!
//! Each tenant gets a feed on first access:
//! `Uninitialized -> Syncing -> Live -> Stale (subscription lost) -> Syncing`.
//! The feed is written only by its own sync task. Writes replace the persona
//! wholesale (last write wins). Listeners are notified through a broadcast
//! channel; a listener that falls behind simply misses events.

use crate::domain::{ChangeOp, ConfigChange, Persona, PersonaEvent, SyncStatus};
use crate::ports::{ConfigStore, PortResult};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch, OnceCell};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
const EVENT_BUFFER: usize = 32;

//=========================================================================================
// Per-tenant feed
//=========================================================================================

struct TenantFeed {
    tenant_id: Uuid,
    snapshot: watch::Sender<Option<Persona>>,
    status: watch::Sender<SyncStatus>,
    events: broadcast::Sender<PersonaEvent>,
}

impl TenantFeed {
    fn new(tenant_id: Uuid, initial: Option<Persona>) -> Self {
        let (snapshot, _) = watch::channel(initial);
        let (status, _) = watch::channel(SyncStatus::Syncing);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            tenant_id,
            snapshot,
            status,
            events,
        }
    }

    fn set_status(&self, status: SyncStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            debug!(tenant_id = %self.tenant_id, ?previous, ?status, "Persona feed status changed");
        }
    }

    fn apply(&self, change: ConfigChange) {
        match (change.op, change.new_value) {
            (ChangeOp::Delete, _) => {
                self.snapshot.send_replace(None);
                self.publish(PersonaEvent::Cleared);
                info!(tenant_id = %self.tenant_id, "Persona deleted");
            }
            (_, Some(persona)) if persona.tenant_id != self.tenant_id => {
                warn!(
                    tenant_id = %self.tenant_id,
                    other = %persona.tenant_id,
                    "Ignoring persona change addressed to another tenant"
                );
            }
            (_, Some(persona)) => {
                self.replace(persona);
            }
            (op, None) => {
                warn!(tenant_id = %self.tenant_id, ?op, "Persona change carried no value, ignored");
            }
        }
    }

    fn replace(&self, persona: Persona) {
        self.snapshot.send_replace(Some(persona.clone()));
        info!(tenant_id = %self.tenant_id, persona_id = %persona.id, "Persona updated");
        self.publish(PersonaEvent::Updated(persona));
    }

    fn publish(&self, event: PersonaEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

//=========================================================================================
// Listener handle
//=========================================================================================

/// Receives persona events for one tenant.
pub struct PersonaListener {
    tenant_id: Uuid,
    receiver: broadcast::Receiver<PersonaEvent>,
}

impl PersonaListener {
    /// Waits for the next event. Returns `None` once the propagator is gone.
    pub async fn next(&mut self) -> Option<PersonaEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(tenant_id = %self.tenant_id, missed, "Persona listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

//=========================================================================================
// The propagator
//=========================================================================================

pub struct LiveConfigPropagator {
    store: Arc<dyn ConfigStore>,
    feeds: Mutex<HashMap<Uuid, Arc<OnceCell<Arc<TenantFeed>>>>>,
    reconnect_delay: Duration,
    shutdown: CancellationToken,
}

impl LiveConfigPropagator {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self::with_reconnect_delay(store, DEFAULT_RECONNECT_DELAY)
    }

    pub fn with_reconnect_delay(store: Arc<dyn ConfigStore>, reconnect_delay: Duration) -> Self {
        Self {
            store,
            feeds: Mutex::new(HashMap::new()),
            reconnect_delay,
            shutdown: CancellationToken::new(),
        }
    }

    /// The tenant's current persona. The first call loads it from the store
    /// and starts the live subscription; later calls never wait on the store.
    pub async fn current(&self, tenant_id: Uuid) -> PortResult<Option<Persona>> {
        let feed = self.feed(tenant_id).await?;
        let persona = feed.snapshot.borrow().clone();
        Ok(persona)
    }

    /// Registers a listener for the tenant's persona events.
    pub async fn subscribe(&self, tenant_id: Uuid) -> PortResult<PersonaListener> {
        let feed = self.feed(tenant_id).await?;
        Ok(PersonaListener {
            tenant_id,
            receiver: feed.events.subscribe(),
        })
    }

    /// Runs `callback` for every persona event of the tenant until the
    /// propagator shuts down.
    pub async fn on_persona_changed<F>(&self, tenant_id: Uuid, mut callback: F) -> PortResult<JoinHandle<()>>
    where
        F: FnMut(PersonaEvent) + Send + 'static,
    {
        let mut listener = self.subscribe(tenant_id).await?;
        let shutdown = self.shutdown.clone();
        Ok(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = listener.next() => event,
                };
                match event {
                    Some(event) => callback(event),
                    None => break,
                }
            }
        }))
    }

    /// Where the tenant's feed is in its lifecycle.
    pub fn status(&self, tenant_id: Uuid) -> SyncStatus {
        match self.initialized(tenant_id) {
            Some(feed) => {
                let status = *feed.status.borrow();
                status
            }
            None => SyncStatus::Uninitialized,
        }
    }

    /// A receiver that observes status transitions, once the feed exists.
    pub fn watch_status(&self, tenant_id: Uuid) -> Option<watch::Receiver<SyncStatus>> {
        self.initialized(tenant_id).map(|feed| feed.status.subscribe())
    }

    /// Stops every sync task. Cached personas remain readable.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn initialized(&self, tenant_id: Uuid) -> Option<Arc<TenantFeed>> {
        let feeds = self.feeds.lock().unwrap_or_else(PoisonError::into_inner);
        feeds.get(&tenant_id).and_then(|cell| cell.get().cloned())
    }

    async fn feed(&self, tenant_id: Uuid) -> PortResult<Arc<TenantFeed>> {
        let cell = {
            let mut feeds = self.feeds.lock().unwrap_or_else(PoisonError::into_inner);
            feeds.entry(tenant_id).or_default().clone()
        };
        cell.get_or_try_init(|| self.start_feed(tenant_id))
            .await
            .map(Arc::clone)
    }

    async fn start_feed(&self, tenant_id: Uuid) -> PortResult<Arc<TenantFeed>> {
        let initial = self.store.get_persona(tenant_id).await?;
        info!(tenant_id = %tenant_id, found = initial.is_some(), "Loaded persona, starting live sync");

        let feed = Arc::new(TenantFeed::new(tenant_id, initial));
        tokio::spawn(sync_feed(
            self.store.clone(),
            feed.clone(),
            self.reconnect_delay,
            self.shutdown.clone(),
        ));
        Ok(feed)
    }
}

impl Drop for LiveConfigPropagator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Subscribe, apply changes until the subscription is lost, wait, repeat.
async fn sync_feed(
    store: Arc<dyn ConfigStore>,
    feed: Arc<TenantFeed>,
    reconnect_delay: Duration,
    shutdown: CancellationToken,
) {
    let tenant_id = feed.tenant_id;
    loop {
        feed.set_status(SyncStatus::Syncing);
        let subscribed = tokio::select! {
            _ = shutdown.cancelled() => return,
            subscribed = store.subscribe(tenant_id) => subscribed,
        };

        match subscribed {
            Ok(mut changes) => {
                resync(store.as_ref(), &feed).await;
                feed.set_status(SyncStatus::Live);
                loop {
                    let next = tokio::select! {
                        _ = shutdown.cancelled() => return,
                        next = changes.next() => next,
                    };
                    match next {
                        Some(Ok(change)) => feed.apply(change),
                        Some(Err(e)) => {
                            warn!(tenant_id = %tenant_id, "Persona subscription failed: {}", e);
                            break;
                        }
                        None => {
                            warn!(tenant_id = %tenant_id, "Persona subscription closed");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(tenant_id = %tenant_id, "Could not subscribe to persona changes: {}", e);
            }
        }

        feed.set_status(SyncStatus::Stale);
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
}

/// Catches up on anything missed while no subscription was open.
async fn resync(store: &dyn ConfigStore, feed: &TenantFeed) {
    match store.get_persona(feed.tenant_id).await {
        Ok(fresh) => {
            let changed = *feed.snapshot.borrow() != fresh;
            if changed {
                match fresh {
                    Some(persona) => feed.replace(persona),
                    None => feed.apply(ConfigChange {
                        op: ChangeOp::Delete,
                        new_value: None,
                    }),
                }
            }
        }
        Err(e) => {
            warn!(tenant_id = %feed.tenant_id, "Persona resync failed, keeping last known value: {}", e);
        }
    }
}
