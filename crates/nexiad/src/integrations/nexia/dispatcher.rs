//! Per-device update notifications.
//!
//! Whenever something acts on a device through the vendor API, the data for
//! that device is already fresh in the coordinator. Publishing a [`Signal`]
//! tells every entity bound to that device to write its state now instead of
//! waiting for the next poll.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;

use tracing::trace;

/// Channel namespace, one per nesting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SignalKind {
    ThermostatUpdate,
    ZoneUpdate,
    RoomIqUpdate,
}

/// A channel: one kind of update for one device id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signal {
    pub kind: SignalKind,
    pub id: u64,
}

impl Signal {
    pub fn thermostat(id: u64) -> Self {
        Self {
            kind: SignalKind::ThermostatUpdate,
            id,
        }
    }

    pub fn zone(id: u64) -> Self {
        Self {
            kind: SignalKind::ZoneUpdate,
            id,
        }
    }

    pub fn room_iq(id: u64) -> Self {
        Self {
            kind: SignalKind::RoomIqUpdate,
            id,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.kind, self.id)
    }
}

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_signal: HashMap<Signal, Vec<(u64, Listener)>>,
}

/// Typed publish/subscribe bus keyed by [`Signal`].
///
/// Cloning is cheap; clones share the same listeners.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<Mutex<Listeners>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` on `signal`. The listener stays connected until
    /// the returned [`Subscription`] is dropped.
    pub fn connect(
        &self,
        signal: Signal,
        listener: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        let listener: Listener = Arc::new(listener);
        let mut id = 0;
        if let Ok(mut inner) = self.inner.lock() {
            id = inner.next_id;
            inner.next_id += 1;
            inner
                .by_signal
                .entry(signal)
                .or_default()
                .push((id, listener));
        }
        trace!("Connected listener {} to {}", id, signal);

        Subscription {
            listeners: Arc::downgrade(&self.inner),
            signal,
            id,
        }
    }

    /// Invoke every listener on exactly `signal`. Returns how many ran.
    pub fn send(&self, signal: Signal) -> usize {
        // Listeners run outside the lock so they may connect or disconnect.
        let listeners: Vec<Listener> = match self.inner.lock() {
            Ok(inner) => inner
                .by_signal
                .get(&signal)
                .map(|l| l.iter().map(|(_, f)| f.clone()).collect())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };

        trace!("Dispatching {} to {} listener(s)", signal, listeners.len());
        for listener in &listeners {
            listener();
        }
        listeners.len()
    }

    pub fn listener_count(&self, signal: Signal) -> usize {
        match self.inner.lock() {
            Ok(inner) => inner.by_signal.get(&signal).map_or(0, Vec::len),
            Err(_) => 0,
        }
    }
}

/// Handle for a connected listener; disconnects on drop.
#[must_use = "dropping a Subscription disconnects its listener"]
pub struct Subscription {
    listeners: Weak<Mutex<Listeners>>,
    signal: Signal,
    id: u64,
}

impl Subscription {
    pub fn signal(&self) -> Signal {
        self.signal
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("signal", &self.signal)
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(listeners) = self.listeners.upgrade() else {
            return;
        };
        if let Ok(mut inner) = listeners.lock() {
            if let Some(list) = inner.by_signal.get_mut(&self.signal) {
                list.retain(|(id, _)| *id != self.id);
                if list.is_empty() {
                    inner.by_signal.remove(&self.signal);
                }
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_send_reaches_only_exact_signal() {
        let dispatcher = Dispatcher::new();
        let (thermostat_hits, on_thermostat) = counter();
        let (zone_hits, on_zone) = counter();
        let (sibling_hits, on_sibling) = counter();

        let _a = dispatcher.connect(Signal::thermostat(1), on_thermostat);
        let _b = dispatcher.connect(Signal::zone(1), on_zone);
        let _c = dispatcher.connect(Signal::thermostat(2), on_sibling);

        assert_eq!(dispatcher.send(Signal::thermostat(1)), 1);
        assert_eq!(thermostat_hits.load(Ordering::SeqCst), 1);
        assert_eq!(zone_hits.load(Ordering::SeqCst), 0);
        assert_eq!(sibling_hits.load(Ordering::SeqCst), 0);

        assert_eq!(dispatcher.send(Signal::room_iq(1)), 0);
    }

    #[test]
    fn test_drop_disconnects() {
        let dispatcher = Dispatcher::new();
        let (hits, on_update) = counter();

        let subscription = dispatcher.connect(Signal::zone(7), on_update);
        let (_, other) = counter();
        let _other = dispatcher.connect(Signal::zone(7), other);
        assert_eq!(dispatcher.listener_count(Signal::zone(7)), 2);

        drop(subscription);
        assert_eq!(dispatcher.listener_count(Signal::zone(7)), 1);
        assert_eq!(dispatcher.send(Signal::zone(7)), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscription_outlives_dispatcher() {
        let dispatcher = Dispatcher::new();
        let (_, on_update) = counter();
        let subscription = dispatcher.connect(Signal::thermostat(3), on_update);
        drop(dispatcher);
        drop(subscription);
    }

    #[test]
    fn test_signal_display() {
        assert_eq!(Signal::thermostat(42).to_string(), "thermostat_update-42");
        assert_eq!(Signal::room_iq(5).to_string(), "room_iq_update-5");
    }
}
