use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::{Rc, Weak},
    time::Duration,
};

use futures_channel::oneshot;

use crate::{
    cache_observer::{CacheEvent, QueryCacheKey},
    garbage_collector::GarbageCollector,
    query_cache::{self, CacheInner},
    query_executor,
    query_observer::{Fetcher, ObserverKey, QueryObserver},
    schedule::ScheduleBuilt,
    util::time_until_stale,
    QueryError, QueryKey, QueryState, QueryValue, Runtime,
};

/// One cache entry: the state for a single key, shared by every observer of
/// that key.
pub(crate) struct Query<K, V, E> {
    key: K,
    cache_key: QueryCacheKey,
    cache: Weak<CacheInner>,
    runtime: Rc<dyn Runtime>,

    // Cancellation and the out-of-order arrival guard. Only one execution
    // may be in flight; a serial mismatch discards a superseded result.
    current_request: Rc<Cell<Option<oneshot::Sender<()>>>>,
    serial: Rc<Cell<u64>>,

    state: Rc<Cell<QueryState<V, E>>>,
    observers: Rc<RefCell<HashMap<ObserverKey, QueryObserver<K, V, E>>>>,
    garbage_collector: Rc<GarbageCollector>,
}

impl<K: Clone, V, E> Clone for Query<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            cache_key: self.cache_key.clone(),
            cache: self.cache.clone(),
            runtime: self.runtime.clone(),
            current_request: self.current_request.clone(),
            serial: self.serial.clone(),
            state: self.state.clone(),
            observers: self.observers.clone(),
            garbage_collector: self.garbage_collector.clone(),
        }
    }
}

impl<K: PartialEq, V, E> PartialEq for Query<K, V, E> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<K: PartialEq, V, E> Eq for Query<K, V, E> {}

impl<K, V, E> Query<K, V, E>
where
    K: QueryKey + 'static,
    V: QueryValue + 'static,
    E: QueryError + 'static,
{
    pub(crate) fn new(key: K, cache: Weak<CacheInner>, runtime: Rc<dyn Runtime>) -> Self {
        let cache_key = QueryCacheKey::from(&key);
        let evict = {
            let cache = cache.clone();
            let key = key.clone();
            Rc::new(move || {
                if let Some(inner) = cache.upgrade() {
                    query_cache::evict_entry::<K, V, E>(&inner, &key);
                }
            })
        };
        Query {
            key,
            cache_key,
            cache,
            runtime: runtime.clone(),
            current_request: Rc::new(Cell::new(None)),
            serial: Rc::new(Cell::new(0)),
            state: Rc::new(Cell::new(QueryState::Created)),
            observers: Rc::new(RefCell::new(HashMap::new())),
            garbage_collector: Rc::new(GarbageCollector::new(runtime, evict)),
        }
    }

    pub(crate) fn key(&self) -> &K {
        &self.key
    }

    pub(crate) fn cache_key(&self) -> &QueryCacheKey {
        &self.cache_key
    }

    pub(crate) fn runtime(&self) -> Rc<dyn Runtime> {
        self.runtime.clone()
    }

    fn notify_cache(&self, event: CacheEvent) {
        if let Some(inner) = self.cache.upgrade() {
            inner.notify_observers(event);
        }
    }

    pub(crate) fn set_state(&self, state: QueryState<V, E>) {
        if let Some(updated_at) = state.updated_at() {
            self.garbage_collector.new_update(updated_at);
        }

        let invalid = matches!(state, QueryState::Invalid(_));

        self.state.set(state.clone());

        // Observers are notified after the new state is readable, so a
        // listener that re-reads the query sees what it was told.
        let observers = self
            .observers
            .try_borrow()
            .expect("set state borrow")
            .values()
            .cloned()
            .collect::<Vec<_>>();
        for observer in observers {
            observer.notify(&state);
        }

        self.notify_cache(CacheEvent::Updated(self.cache_key.clone()));

        if invalid {
            self.execute();
        }
    }

    /// If update returns Ok(_) the state will be updated and subscribers
    /// will be notified. If update returns Err(_) the state will not be
    /// updated and subscribers will not be notified.
    /// Err(_) should always contain the previous state.
    pub(crate) fn maybe_map_state(
        &self,
        update_fn: impl FnOnce(QueryState<V, E>) -> Result<QueryState<V, E>, QueryState<V, E>>,
    ) -> bool {
        let current_state = self.state.take();

        match update_fn(current_state) {
            Ok(new_state) => {
                self.set_state(new_state);
                true
            }
            Err(old_state) => {
                self.state.set(old_state);
                false
            }
        }
    }

    /// Marks the query as invalid, which will cause it to be refetched.
    pub(crate) fn mark_invalid(&self) -> bool {
        let mut updated = false;
        self.maybe_map_state(|state| {
            if let QueryState::Loaded(data) = state {
                updated = true;
                Ok(QueryState::Invalid(data))
            } else {
                Err(state)
            }
        });
        updated
    }

    pub(crate) fn subscribe(&self, observer: &QueryObserver<K, V, E>) {
        let observer_id = observer.get_id();
        self.observers
            .try_borrow_mut()
            .expect("subscribe borrow_mut")
            .insert(observer_id, observer.clone());
        self.garbage_collector.disable_gc();
        self.notify_cache(CacheEvent::ObserverAdded(self.cache_key.clone()));
    }

    pub(crate) fn unsubscribe(&self, observer: &QueryObserver<K, V, E>) {
        let mut observers = self
            .observers
            .try_borrow_mut()
            .expect("unsubscribe borrow_mut");
        if observers.remove(&observer.get_id()).is_some() {
            self.notify_cache(CacheEvent::ObserverRemoved(self.cache_key.clone()));
        }
        if observers.is_empty() {
            drop(observers);
            self.garbage_collector.enable_gc();
        }
    }

    pub(crate) fn update_gc_time(&self, gc_time: Option<Duration>) {
        self.garbage_collector.update_gc_time(gc_time);
    }

    pub(crate) fn get_state(&self) -> QueryState<V, E> {
        let state = self.state.take();
        let state_clone = state.clone();
        self.state.set(state);
        state_clone
    }

    // Useful to avoid clones.
    pub(crate) fn with_state<T>(&self, func: impl FnOnce(&QueryState<V, E>) -> T) -> T {
        let state = self.state.take();
        let result = func(&state);
        self.state.set(state);
        result
    }

    pub(crate) fn is_stale(&self, stale_time: Option<Duration>) -> bool {
        let last_update = self.with_state(|state| state.updated_at());

        match (last_update, stale_time) {
            (Some(updated_at), Some(stale_time)) => {
                time_until_stale(updated_at, stale_time, self.runtime.now()).is_zero()
            }
            _ => false,
        }
    }

    /*
     * Execution and cancellation.
     */

    pub(crate) fn execute(&self) {
        query_executor::execute(self.clone());
    }

    /// The fetcher and retry schedule of the first enabled observer.
    pub(crate) fn primary_fetcher(&self) -> Option<(Fetcher<K, V, E>, Option<ScheduleBuilt<E>>)> {
        self.observers
            .try_borrow()
            .expect("primary_fetcher borrow")
            .values()
            .find_map(|observer| {
                if !observer.options().enabled {
                    return None;
                }
                observer
                    .get_fetcher()
                    .map(|fetcher| (fetcher, observer.options().retry.clone()))
            })
    }

    // Only one execution can be in flight, unless the current one has been
    // cancelled. The serial identifies an execution so a superseded one
    // cannot apply its result.
    pub(crate) fn new_execution(&self) -> Option<(oneshot::Receiver<()>, u64)> {
        let current_request = self.current_request.take();
        if current_request.is_none() {
            let (sender, receiver) = oneshot::channel();
            self.current_request.set(Some(sender));
            let serial = self.serial.get() + 1;
            self.serial.set(serial);
            Some((receiver, serial))
        } else {
            self.current_request.set(current_request);
            None
        }
    }

    pub(crate) fn finalize_execution(&self, serial: u64) {
        if self.serial.get() == serial {
            self.current_request.set(None);
        }
    }

    pub(crate) fn is_current(&self, serial: u64) -> bool {
        self.serial.get() == serial
    }

    pub(crate) fn set_state_if_current(&self, serial: u64, state: QueryState<V, E>) -> bool {
        if self.is_current(serial) {
            self.set_state(state);
            true
        } else {
            false
        }
    }

    pub(crate) fn maybe_map_state_if_current(
        &self,
        serial: u64,
        update_fn: impl FnOnce(QueryState<V, E>) -> Result<QueryState<V, E>, QueryState<V, E>>,
    ) -> bool {
        if self.is_current(serial) {
            self.maybe_map_state(update_fn)
        } else {
            false
        }
    }

    pub(crate) fn cancel(&self) -> bool {
        if let Some(current_request) = self.current_request.take() {
            let cancellation = current_request.send(());
            if cancellation.is_err() {
                log::warn!("Failed to cancel request {:?}", self.key);
            }
            cancellation.is_ok()
        } else {
            false
        }
    }

    pub(crate) fn dispose(&self) {
        self.cancel();
        self.garbage_collector.disable_gc();
    }
}
