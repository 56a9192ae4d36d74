//! In-process fan-out of [`TeamEvent`]s to live client streams.
//!
//! Each subscription owns a bounded queue. Publishing never blocks: when a
//! subscriber's queue is full the event is dropped for that subscriber and
//! counted. Delivery is best-effort; the authoritative state is always the
//! team revision in the store.

use std::{
  collections::HashMap,
  sync::{
    Arc, Weak,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
  },
};

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{event::TeamEvent, team::TeamId};

/// Queue depth per subscriber.
pub const SUBSCRIBER_CAPACITY: usize = 16;

pub type SubscriptionId = u64;

type Registry = HashMap<TeamId, HashMap<SubscriptionId, mpsc::Sender<TeamEvent>>>;

#[derive(Default)]
struct HubInner {
  registry:    RwLock<Registry>,
  next_id:     AtomicU64,
  subscribers: AtomicUsize,
  dropped:     AtomicU64,
}

impl HubInner {
  fn remove(&self, team: TeamId, id: SubscriptionId) {
    let mut registry = self.registry.write();
    let Some(team_subs) = registry.get_mut(&team) else { return };
    if team_subs.remove(&id).is_none() {
      return;
    }
    self.subscribers.fetch_sub(1, Ordering::Relaxed);
    if team_subs.is_empty() {
      registry.remove(&team);
    }
  }
}

// ─── Hub ─────────────────────────────────────────────────────────────────────

/// Publish/subscribe registry keyed by team.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone, Default)]
pub struct TeamEventHub {
  inner: Arc<HubInner>,
}

impl TeamEventHub {
  pub fn new() -> Self { Self::default() }

  /// Register a new delivery queue for `team`.
  pub fn subscribe(&self, team: TeamId) -> Subscription {
    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
    let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);

    self.inner.registry.write().entry(team).or_default().insert(id, tx);
    self.inner.subscribers.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(team_id = %team, subscription = id, "event stream subscribed");

    Subscription {
      id,
      events: rx,
      cancel: CancelHandle {
        hub: Arc::downgrade(&self.inner),
        team,
        id,
        done: AtomicBool::new(false),
      },
    }
  }

  /// Offer `event` to every live subscriber of its team without blocking.
  ///
  /// Returns how many subscribers accepted the event.
  pub fn publish(&self, event: &TeamEvent) -> usize {
    // Snapshot the targets and release the lock before sending.
    let targets: Vec<mpsc::Sender<TeamEvent>> = {
      let registry = self.inner.registry.read();
      match registry.get(&event.team_id) {
        Some(subs) => subs.values().cloned().collect(),
        None => return 0,
      }
    };

    let mut delivered = 0;
    for tx in targets {
      match tx.try_send(event.clone()) {
        Ok(()) => delivered += 1,
        Err(TrySendError::Full(_)) => {
          self.inner.dropped.fetch_add(1, Ordering::Relaxed);
          tracing::warn!(
            team_id = %event.team_id,
            revision = %event.revision,
            "subscriber queue full; event dropped"
          );
        }
        // Receiver went away before its cancel ran.
        Err(TrySendError::Closed(_)) => {}
      }
    }
    delivered
  }

  pub fn team_subscriber_count(&self, team: TeamId) -> usize {
    self.inner.registry.read().get(&team).map_or(0, HashMap::len)
  }

  pub fn total_subscriber_count(&self) -> usize {
    self.inner.subscribers.load(Ordering::Relaxed)
  }

  pub fn dropped_event_total(&self) -> u64 { self.inner.dropped.load(Ordering::Relaxed) }
}

// ─── Subscription ────────────────────────────────────────────────────────────

/// One client's registration: its id, its event queue, and the handle that
/// deregisters it. Dropping the subscription cancels it.
pub struct Subscription {
  pub id:     SubscriptionId,
  pub events: mpsc::Receiver<TeamEvent>,
  pub cancel: CancelHandle,
}

impl Subscription {
  /// Wait for the next event; `None` once cancelled.
  pub async fn recv(&mut self) -> Option<TeamEvent> { self.events.recv().await }
}

/// Deregisters a subscription exactly once, on [`cancel`](Self::cancel) or
/// on drop, whichever comes first.
pub struct CancelHandle {
  hub:  Weak<HubInner>,
  team: TeamId,
  id:   SubscriptionId,
  done: AtomicBool,
}

impl CancelHandle {
  pub fn cancel(&self) {
    if self.done.swap(true, Ordering::AcqRel) {
      return;
    }
    if let Some(hub) = self.hub.upgrade() {
      hub.remove(self.team, self.id);
      tracing::debug!(team_id = %self.team, subscription = self.id, "event stream cancelled");
    }
  }
}

impl Drop for CancelHandle {
  fn drop(&mut self) { self.cancel(); }
}
