use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::cache::{CollectionCache, CollectionSummary, DEFAULT_TTL};
use crate::clock::{Clock, SystemClock};
use crate::domain::{DatasetPatch, DatasetRecord};
use crate::error::DatasetError;
use crate::observer::{CacheEvent, CacheObserver, ObserverRegistry, SubscriptionId};
use crate::source::DatasetSource;

pub type FetchOutcome = Result<Vec<DatasetRecord>, DatasetError>;

type InFlight = Shared<BoxFuture<'static, FetchOutcome>>;

struct StoreState {
    cache: CollectionCache,
    in_flight: Option<InFlight>,
}

struct StoreShared {
    state: Mutex<StoreState>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    observers: ObserverRegistry,
}

impl StoreShared {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Session-scoped cache of the dataset collection with single-flight fetches.
///
/// Cloning yields another handle to the same cache. The state lock is never
/// held across an `.await`, and observers run after it is released.
pub struct DatasetStore<S> {
    source: Arc<S>,
    shared: Arc<StoreShared>,
}

impl<S> Clone for DatasetStore<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            shared: Arc::clone(&self.shared),
        }
    }
}

pub struct StoreBuilder<S> {
    source: S,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl<S> StoreBuilder<S> {
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> DatasetStore<S> {
        DatasetStore {
            source: Arc::new(self.source),
            shared: Arc::new(StoreShared {
                state: Mutex::new(StoreState {
                    cache: CollectionCache::new(),
                    in_flight: None,
                }),
                clock: self.clock,
                ttl: self.ttl,
                observers: ObserverRegistry::default(),
            }),
        }
    }
}

impl<S> DatasetStore<S> {
    pub fn new(source: S) -> Self {
        Self::builder(source).build()
    }

    pub fn builder(source: S) -> StoreBuilder<S> {
        StoreBuilder {
            source,
            clock: Arc::new(SystemClock),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn ttl(&self) -> Duration {
        self.shared.ttl
    }

    fn read<T>(&self, f: impl FnOnce(&CollectionCache) -> T) -> T {
        f(&self.shared.lock().cache)
    }

    pub fn list(&self) -> Vec<DatasetRecord> {
        self.read(|cache| cache.list().to_vec())
    }

    pub fn get_by_id(&self, id: &str) -> Option<DatasetRecord> {
        self.read(|cache| cache.get(id).cloned())
    }

    pub fn len(&self) -> usize {
        self.read(CollectionCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.read(CollectionCache::is_empty)
    }

    pub fn completed_count(&self) -> usize {
        self.read(CollectionCache::completed_count)
    }

    pub fn processing_count(&self) -> usize {
        self.read(CollectionCache::processing_count)
    }

    pub fn failed_count(&self) -> usize {
        self.read(CollectionCache::failed_count)
    }

    pub fn has_processing(&self) -> bool {
        self.processing_count() > 0
    }

    pub fn summary(&self) -> CollectionSummary {
        self.read(CollectionCache::summary)
    }

    pub fn is_loading(&self) -> bool {
        self.read(CollectionCache::is_loading)
    }

    pub fn last_error(&self) -> Option<DatasetError> {
        self.read(|cache| cache.error().cloned())
    }

    pub fn last_fetched_at(&self) -> Option<DateTime<Utc>> {
        self.read(CollectionCache::fetched_at)
    }

    pub fn is_fresh(&self) -> bool {
        let now = self.shared.clock.now();
        self.read(|cache| cache.is_fresh(now, self.shared.ttl))
    }

    pub fn upsert(&self, record: DatasetRecord) {
        let id = record.id.clone();
        let outcome = self.shared.lock().cache.upsert(record);
        debug!(%id, ?outcome, "upserted dataset");
        self.shared.observers.notify(&CacheEvent::Upserted { id });
    }

    /// Merges `patch` into the record with `id`. An absent id is a no-op and
    /// returns `false`; the caller's view may simply be older than the cache.
    pub fn patch(&self, id: &str, patch: &DatasetPatch) -> bool {
        let patched = self.shared.lock().cache.patch(id, patch);
        if patched {
            self.shared.observers.notify(&CacheEvent::Patched { id: id.to_string() });
        } else {
            debug!(%id, "patch ignored, dataset not cached");
        }
        patched
    }

    pub fn remove(&self, id: &str) -> bool {
        let removed = self.shared.lock().cache.remove(id);
        if removed {
            self.shared.observers.notify(&CacheEvent::Removed { id: id.to_string() });
        }
        removed
    }

    /// Forces the next fetch to go to the source. An in-flight fetch is not
    /// cancelled and will repopulate the cache when it settles.
    pub fn clear(&self) {
        self.shared.lock().cache.clear();
        debug!("dataset cache cleared");
        self.shared.observers.notify(&CacheEvent::Cleared);
    }

    pub fn subscribe(&self, observer: impl CacheObserver + 'static) -> SubscriptionId {
        self.shared.observers.subscribe(Arc::new(observer))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.observers.unsubscribe(id)
    }
}

impl<S: DatasetSource + 'static> DatasetStore<S> {
    /// Returns the collection, going to the source only when the cache is
    /// stale, empty, or `force_refresh` is set. Concurrent callers share one
    /// retrieval and all observe its outcome after the cache was updated.
    ///
    /// The retrieval runs as its own tokio task, so it settles even when
    /// every caller stops waiting. Must be called inside a tokio runtime.
    pub async fn fetch_collection(&self, force_refresh: bool) -> FetchOutcome {
        let flight = {
            let mut state = self.shared.lock();
            let now = self.shared.clock.now();
            if !force_refresh && state.cache.is_fresh(now, self.shared.ttl) {
                debug!(count = state.cache.len(), "serving datasets from cache");
                return Ok(state.cache.list().to_vec());
            }

            if let Some(flight) = state.in_flight.clone() {
                debug!("joining in-flight dataset retrieval");
                flight
            } else {
                state.cache.begin_loading();
                let task = tokio::spawn(Self::retrieve(
                    Arc::clone(&self.source),
                    Arc::downgrade(&self.shared),
                ));
                let flight = async move {
                    match task.await {
                        Ok(outcome) => outcome,
                        Err(err) if err.is_panic() => resume_unwind(err.into_panic()),
                        Err(_) => Err(DatasetError::RetrievalCancelled),
                    }
                }
                .boxed()
                .shared();
                state.in_flight = Some(flight.clone());
                flight
            }
        };

        flight.await
    }

    pub async fn refresh(&self) -> FetchOutcome {
        self.fetch_collection(true).await
    }

    async fn retrieve(source: Arc<S>, shared: Weak<StoreShared>) -> FetchOutcome {
        if let Some(shared) = shared.upgrade() {
            shared.observers.notify(&CacheEvent::FetchStarted);
        }
        info!("retrieving dataset collection");
        let outcome = match AssertUnwindSafe(source.retrieve_collection())
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                // joiners re-raise through `Shared`; the slot must not stay occupied
                if let Some(shared) = shared.upgrade() {
                    let finished = {
                        let mut state = shared.lock();
                        state.cache.abort_loading();
                        state.in_flight.take()
                    };
                    drop(finished);
                }
                warn!("dataset retrieval panicked");
                resume_unwind(panic);
            }
        };

        let Some(shared) = shared.upgrade() else {
            return outcome;
        };
        let now = shared.clock.now();

        let (result, event, finished) = {
            let mut state = shared.lock();
            let (result, event) = match outcome {
                Ok(records) => {
                    state.cache.replace_all(records, now);
                    let count = state.cache.len();
                    info!(count, "dataset collection updated");
                    (
                        Ok(state.cache.list().to_vec()),
                        CacheEvent::FetchSucceeded { count },
                    )
                }
                Err(err) => {
                    warn!(error = %err, "dataset retrieval failed");
                    state.cache.fail_loading(err.clone());
                    let message = err.to_string();
                    (Err(err), CacheEvent::FetchFailed { message })
                }
            };
            (result, event, state.in_flight.take())
        };
        drop(finished);

        shared.observers.notify(&event);
        result
    }
}
