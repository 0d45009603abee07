//! The geolocation bus: a keyed publish/subscribe layer with best-known-value
//! retention.
//!
//! Exactly one writer mutates `best[key]` per [`GeolocationBus::publish`]
//! call (guarded by `state`'s write lock). Broadcast to subscribers is
//! non-blocking (`try_send`): a slow subscriber with a full buffer drops the
//! update rather than stalling the publisher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace, warn};

use crate::result::LocationResult;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<LocationResult>,
}

#[derive(Default)]
struct BusState {
    best: HashMap<String, LocationResult>,
    subscribers: HashMap<String, Vec<Subscriber>>,
}

/// A keyed pub/sub fusion layer. Cheap to clone (it's an `Arc` internally).
#[derive(Clone, Default)]
pub struct GeolocationBus {
    state: Arc<RwLock<BusState>>,
    next_subscriber_id: Arc<AtomicU64>,
}

/// Unsubscribes a receiver created by [`GeolocationBus::subscribe`] when
/// called. Calling it more than once is a no-op after the first call.
pub struct Unsubscribe {
    bus: GeolocationBus,
    key: String,
    id: u64,
}

impl Unsubscribe {
    /// Remove this subscription from the bus, closing its channel.
    pub async fn unsubscribe(self) {
        let mut state = self.bus.state.write().await;
        if let Some(subs) = state.subscribers.get_mut(&self.key) {
            subs.retain(|s| s.id != self.id);
            if subs.is_empty() {
                state.subscribers.remove(&self.key);
            }
        }
    }
}

impl GeolocationBus {
    pub fn new() -> GeolocationBus {
        GeolocationBus::default()
    }

    /// Register a bounded channel for `key`. If a non-expired best result
    /// already exists for `key`, it is delivered immediately into the new
    /// subscriber's buffer, so late subscribers are never starved.
    pub async fn subscribe(
        &self,
        key: impl Into<String>,
        buffer_size: usize,
    ) -> (mpsc::Receiver<LocationResult>, Unsubscribe) {
        let key = key.into();
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write().await;
        if let Some(best) = state.best.get(&key) {
            if !best.is_expired() {
                // Best effort: a brand new channel should never be full.
                let _ = tx.try_send(best.clone());
            }
        }
        state
            .subscribers
            .entry(key.clone())
            .or_default()
            .push(Subscriber { id, tx });

        (
            rx,
            Unsubscribe {
                bus: self.clone(),
                key,
                id,
            },
        )
    }

    /// Publish a new result. See module docs and spec §4.2 for the update
    /// rules.
    pub async fn publish(&self, mut r: LocationResult) {
        if r.accuracy_m <= 0.0 {
            debug!(key = %r.key, "rejecting result with non-positive accuracy");
            return;
        }
        if r.at_is_zero() {
            r.at = std::time::SystemTime::now();
        }

        let mut state = self.state.write().await;
        let prev = state.best.get(&r.key).cloned();

        let should_update = match &prev {
            None => true,
            Some(prev) => {
                prev.is_expired()
                    || (r.better_than(prev)
                        && r.coordinate().pos_has_significant_change(&prev.coordinate()))
            }
        };

        if should_update {
            trace!(key = %r.key, source = %r.source, "bus: updating best");
            state.best.insert(r.key.clone(), r.clone());
            self.broadcast(&mut state, &r);
        } else if let Some(prev) = prev {
            // Same-source TTL refresh: a steady source that re-confirms its
            // position keeps its entry alive even when it isn't "better".
            if prev.source == r.source {
                if let Some(best) = state.best.get_mut(&r.key) {
                    best.at = r.at;
                }
            }
        }
    }

    /// Non-blocking fan-out to every subscriber of `r.key`.
    fn broadcast(&self, state: &mut BusState, r: &LocationResult) {
        if let Some(subs) = state.subscribers.get(&r.key) {
            for sub in subs {
                if sub.tx.try_send(r.clone()).is_err() {
                    warn!(key = %r.key, "subscriber buffer full or closed, dropping update");
                }
            }
        }
    }

    /// The current best, non-expired result for `key`, if any.
    pub async fn best(&self, key: &str) -> Option<LocationResult> {
        let state = self.state.read().await;
        state.best.get(key).filter(|r| !r.is_expired()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(key: &str, source: &str, acc: f64, lat: f64, lon: f64) -> LocationResult {
        LocationResult::new(key, lat, lon, acc, source, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn subscribe_delivers_existing_best_immediately() {
        let bus = GeolocationBus::new();
        bus.publish(result("k", "a", 100.0, 1.0, 1.0)).await;

        let (mut rx, _unsub) = bus.subscribe("k", 1).await;
        let first = rx.try_recv().expect("should have buffered value");
        assert_eq!(first.source, "a");
    }

    #[tokio::test]
    async fn scenario_fusion_across_two_publishes() {
        let bus = GeolocationBus::new();
        let (mut rx, _unsub) = bus.subscribe("k", 4).await;

        bus.publish(result("k", "A", 15_000.0, 52.5, 13.4)).await;
        // ~6km east: a significant move, and strictly more accurate.
        bus.publish(result("k", "B", 3_000.0, 52.5, 13.47)).await;

        let r1 = rx.recv().await.unwrap();
        let r2 = rx.recv().await.unwrap();
        assert_eq!(r1.source, "A");
        assert_eq!(r2.source, "B");

        let best = bus.best("k").await.unwrap();
        assert_eq!(best.source, "B");
    }

    #[tokio::test]
    async fn scenario_same_position_downgrade_is_ignored() {
        let bus = GeolocationBus::new();
        bus.publish(result("k", "A", 3_000.0, 52.5, 13.4)).await;

        let (mut rx, _unsub) = bus.subscribe("k", 4).await;
        rx.try_recv().expect("initial best delivered");

        bus.publish(result("k", "B", 15_000.0, 52.5, 13.4)).await;
        assert!(rx.try_recv().is_err(), "no broadcast for a downgrade");
        assert_eq!(bus.best("k").await.unwrap().source, "A");
    }

    #[tokio::test]
    async fn scenario_ttl_expiry_allows_a_worse_result_in() {
        let bus = GeolocationBus::new();
        let mut r1 = result("k", "A", 100.0, 1.0, 1.0);
        r1.ttl = Duration::from_millis(50);
        bus.publish(r1).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(bus.best("k").await.is_none());

        let r2 = result("k", "B", 1_000_000.0, 2.0, 2.0);
        bus.publish(r2).await;
        assert_eq!(bus.best("k").await.unwrap().source, "B");
    }

    #[tokio::test]
    async fn publish_with_non_positive_accuracy_is_a_no_op() {
        let bus = GeolocationBus::new();
        let (mut rx, _unsub) = bus.subscribe("k", 4).await;
        let mut r = result("k", "A", 0.0, 1.0, 1.0);
        r.accuracy_m = 0.0;
        bus.publish(r).await;
        assert!(bus.best("k").await.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn same_source_ttl_refresh_keeps_entry_alive() {
        let bus = GeolocationBus::new();
        let mut r1 = result("k", "A", 3_000.0, 1.0, 1.0);
        r1.ttl = Duration::from_millis(100);
        bus.publish(r1).await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        // Same source, same position/accuracy: not "better", but should
        // refresh `at` so the entry doesn't expire.
        let r2 = result("k", "A", 3_000.0, 1.0, 1.0);
        bus.publish(r2).await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(bus.best("k").await.is_some(), "refreshed entry should still be alive");
    }

    #[tokio::test]
    async fn unsubscribe_closes_the_channel() {
        let bus = GeolocationBus::new();
        let (mut rx, unsub) = bus.subscribe("k", 4).await;
        unsub.unsubscribe().await;
        bus.publish(result("k", "A", 100.0, 1.0, 1.0)).await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn slow_subscriber_never_blocks_publish() {
        let bus = GeolocationBus::new();
        let (_rx, _unsub) = bus.subscribe("k", 1).await;
        // Fill the one-slot buffer, then publish again: this must return
        // promptly rather than waiting for a reader.
        bus.publish(result("k", "A", 3_000.0, 1.0, 1.0)).await;
        bus.publish(result("k", "B", 100.0, 20.0, 20.0)).await;
        assert_eq!(bus.best("k").await.unwrap().source, "B");
    }
}
