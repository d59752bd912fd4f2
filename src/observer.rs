use std::sync::{Arc, Mutex};

/// Committed state changes of a [`crate::store::DatasetStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    FetchStarted,
    FetchSucceeded { count: usize },
    FetchFailed { message: String },
    Upserted { id: String },
    Patched { id: String },
    Removed { id: String },
    Cleared,
}

/// Receives events synchronously, after the store has released its state
/// lock, so an observer may read the store from inside `on_event`.
pub trait CacheObserver: Send + Sync {
    fn on_event(&self, event: &CacheEvent);
}

impl<F> CacheObserver for F
where
    F: Fn(&CacheEvent) + Send + Sync,
{
    fn on_event(&self, event: &CacheEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    inner: Mutex<Registered>,
}

#[derive(Default)]
struct Registered {
    next_id: u64,
    observers: Vec<(SubscriptionId, Arc<dyn CacheObserver>)>,
}

impl ObserverRegistry {
    pub(crate) fn subscribe(&self, observer: Arc<dyn CacheObserver>) -> SubscriptionId {
        let mut registered = self.lock();
        let id = SubscriptionId(registered.next_id);
        registered.next_id += 1;
        registered.observers.push((id, observer));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registered = self.lock();
        let before = registered.observers.len();
        registered.observers.retain(|(existing, _)| *existing != id);
        registered.observers.len() != before
    }

    pub(crate) fn notify(&self, event: &CacheEvent) {
        let observers: Vec<_> = self
            .lock()
            .observers
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer.on_event(event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registered> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsubscribed_observer_stops_receiving() {
        let registry = ObserverRegistry::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = registry.subscribe(Arc::new(move |event: &CacheEvent| {
            sink.lock().unwrap().push(event.clone());
        }));

        registry.notify(&CacheEvent::Cleared);
        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.notify(&CacheEvent::FetchStarted);

        assert_eq!(*seen.lock().unwrap(), vec![CacheEvent::Cleared]);
    }
}
