use std::cell::RefCell;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::{pin::Pin, rc::Rc};

use slotmap::{new_key_type, SlotMap};

use crate::query::Query;
use crate::{QueryError, QueryKey, QueryOptions, QueryState, QueryValue};

/// Tracks one query on behalf of one consumer: holds the fetcher and the
/// per-consumer options, and forwards every state transition to its
/// registered listeners.
#[derive(Clone)]
pub(crate) struct QueryObserver<K, V, E> {
    id: ObserverKey,
    query: Rc<RefCell<Option<Query<K, V, E>>>>,
    fetcher: Option<Fetcher<K, V, E>>,
    options: QueryOptions<E>,
    listeners: Rc<RefCell<SlotMap<ListenerKey, Listener<V, E>>>>,
}

new_key_type! {
    /// Identifies a listener registered on a query result.
    pub struct ListenerKey;
}

pub(crate) type Fetcher<K, V, E> = Rc<dyn Fn(K) -> Pin<Box<dyn Future<Output = Result<V, E>>>>>;

pub(crate) type Listener<V, E> = Rc<dyn Fn(&QueryState<V, E>)>;

impl<K, V, E> QueryObserver<K, V, E>
where
    K: QueryKey + 'static,
    V: QueryValue + 'static,
    E: QueryError + 'static,
{
    pub fn with_fetcher(fetcher: Fetcher<K, V, E>, options: QueryOptions<E>) -> Self {
        Self {
            id: next_id(),
            query: Rc::new(RefCell::new(None)),
            fetcher: Some(fetcher),
            options,
            listeners: Rc::new(RefCell::new(SlotMap::with_key())),
        }
    }

    pub fn get_fetcher(&self) -> Option<Fetcher<K, V, E>> {
        self.fetcher.clone()
    }

    pub fn get_id(&self) -> ObserverKey {
        self.id
    }

    pub fn options(&self) -> &QueryOptions<E> {
        &self.options
    }

    pub fn notify(&self, state: &QueryState<V, E>) {
        // Clone the listeners out so callbacks may register or remove
        // listeners without hitting a borrow conflict.
        let listeners = self
            .listeners
            .try_borrow()
            .expect("notify borrow")
            .values()
            .cloned()
            .collect::<Vec<_>>();
        for listener in listeners {
            listener(state);
        }
    }

    pub fn add_listener(&self, listener: Listener<V, E>) -> ListenerKey {
        self.listeners
            .try_borrow_mut()
            .expect("add_listener borrow_mut")
            .insert(listener)
    }

    pub fn remove_listener(&self, key: ListenerKey) -> bool {
        self.listeners
            .try_borrow_mut()
            .expect("remove_listener borrow_mut")
            .remove(key)
            .is_some()
    }

    /// Point the observer at a query entry, subscribing to it and kicking
    /// off a fetch when the entry is missing data, invalidated, or stale.
    pub fn update_query(&self, query: Query<K, V, E>) {
        if let Some(current) = self
            .query
            .try_borrow_mut()
            .expect("update_query borrow_mut")
            .take()
        {
            current.unsubscribe(self);
        }

        query.subscribe(self);
        query.update_gc_time(self.options.gc_time);
        *self
            .query
            .try_borrow_mut()
            .expect("update_query borrow_mut") = Some(query.clone());

        if self.options.enabled {
            let needs_fetch = query.with_state(|state| {
                matches!(state, QueryState::Created | QueryState::Invalid(_))
            }) || query.is_stale(self.options.stale_time);

            if needs_fetch {
                query.execute();
            }
        }
    }

    pub fn cleanup(&self) {
        if let Some(query) = self
            .query
            .try_borrow_mut()
            .expect("cleanup borrow_mut")
            .take()
        {
            query.unsubscribe(self);
        } else {
            log::debug!("QueryObserver::cleanup: observer had no query");
        }
        if !self
            .listeners
            .try_borrow()
            .expect("cleanup borrow")
            .is_empty()
        {
            log::debug!("QueryObserver::cleanup: listeners still registered");
        }
    }
}

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ObserverKey(u32);

fn next_id() -> ObserverKey {
    ObserverKey(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}
