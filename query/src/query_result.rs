use std::rc::Rc;

use crate::{query_observer::ListenerKey, QueryState};

/// A live handle onto one cached query.
///
/// Exposes snapshot accessors over the query's current state, change
/// subscription, and refetching. The handle keeps its cache entry active;
/// dropping it unsubscribes, and once a query has no remaining handles its
/// garbage-collection timer starts.
pub struct QueryResult<V: 'static, E: 'static> {
    state_fn: Rc<dyn Fn() -> QueryState<V, E>>,
    refetch_fn: Rc<dyn Fn()>,
    add_listener_fn: Rc<dyn Fn(Rc<dyn Fn(&QueryState<V, E>)>) -> ListenerKey>,
    remove_listener_fn: Rc<dyn Fn(ListenerKey) -> bool>,
    cleanup_fn: Rc<dyn Fn()>,
}

impl<V, E> QueryResult<V, E>
where
    V: Clone + 'static,
    E: Clone + 'static,
{
    #[allow(clippy::type_complexity)]
    pub(crate) fn new(
        state_fn: Rc<dyn Fn() -> QueryState<V, E>>,
        refetch_fn: Rc<dyn Fn()>,
        add_listener_fn: Rc<dyn Fn(Rc<dyn Fn(&QueryState<V, E>)>) -> ListenerKey>,
        remove_listener_fn: Rc<dyn Fn(ListenerKey) -> bool>,
        cleanup_fn: Rc<dyn Fn()>,
    ) -> Self {
        Self {
            state_fn,
            refetch_fn,
            add_listener_fn,
            remove_listener_fn,
            cleanup_fn,
        }
    }

    /// A snapshot of the query's current state.
    pub fn state(&self) -> QueryState<V, E> {
        (self.state_fn)()
    }

    /// The current data, if any has ever been loaded. Previous data remains
    /// available while a refetch is in flight or after a background failure.
    pub fn data(&self) -> Option<V> {
        self.state().data().cloned()
    }

    /// The terminal error, if the last fetch failed.
    pub fn error(&self) -> Option<E> {
        self.state().error().cloned()
    }

    /// Whether the query is fetching for the first time.
    pub fn is_loading(&self) -> bool {
        matches!(self.state(), QueryState::Loading)
    }

    /// Whether any fetch is in flight, first load or background refetch.
    pub fn is_fetching(&self) -> bool {
        matches!(self.state(), QueryState::Loading | QueryState::Fetching(_))
    }

    /// Whether the cached data has been marked invalid.
    pub fn is_invalid(&self) -> bool {
        matches!(self.state(), QueryState::Invalid(_))
    }

    /// Whether the last fetch ended in a terminal error.
    pub fn is_error(&self) -> bool {
        matches!(self.state(), QueryState::Errored { .. })
    }

    /// Trigger a fetch, deduplicated against any execution already in
    /// flight.
    pub fn refetch(&self) {
        (self.refetch_fn)()
    }

    /// Register a callback invoked on every state transition.
    ///
    /// Callbacks should treat the notification as a change signal and read
    /// whatever they need from a snapshot; they must not tear down this
    /// result from within the callback.
    pub fn subscribe(&self, listener: impl Fn(&QueryState<V, E>) + 'static) -> ListenerKey {
        (self.add_listener_fn)(Rc::new(listener))
    }

    /// Remove a previously registered callback.
    pub fn unsubscribe(&self, key: ListenerKey) -> bool {
        (self.remove_listener_fn)(key)
    }
}

impl<V, E> Drop for QueryResult<V, E> {
    fn drop(&mut self) {
        (self.cleanup_fn)()
    }
}

impl<V, E> std::fmt::Debug for QueryResult<V, E>
where
    V: Clone + std::fmt::Debug + 'static,
    E: Clone + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResult")
            .field("state", &self.state())
            .finish()
    }
}
