use std::{
    any::{Any, TypeId},
    cell::{Cell, RefCell},
    collections::{hash_map::Entry, HashMap},
    rc::Rc,
};

use slotmap::SlotMap;

use crate::{
    cache_observer::{CacheEvent, CacheObserver},
    query::Query,
    QueryError, QueryKey, QueryValue, Runtime,
};

/// Holds every query entry, grouped per key/value/error type.
#[derive(Clone)]
pub(crate) struct QueryCache {
    inner: Rc<CacheInner>,
}

pub(crate) struct CacheInner {
    runtime: Rc<dyn Runtime>,
    entries: RefCell<HashMap<(TypeId, TypeId), Box<dyn CacheEntryTrait>>>,
    observers: RefCell<SlotMap<CacheObserverKey, Rc<dyn CacheObserver>>>,
    size: Cell<usize>,
}

slotmap::new_key_type! {
    struct CacheObserverKey;
}

impl CacheInner {
    pub(crate) fn notify_observers(&self, event: CacheEvent) {
        let observers = self
            .observers
            .try_borrow()
            .expect("notify_observers borrow")
            .values()
            .cloned()
            .collect::<Vec<_>>();
        for observer in observers {
            observer.process_cache_event(event.clone());
        }
    }
}

/// Evict a typed entry through a weak handle. Used by per-query garbage
/// collection timers.
pub(crate) fn evict_entry<K, V, E>(inner: &Rc<CacheInner>, key: &K) -> bool
where
    K: QueryKey + 'static,
    V: QueryValue + 'static,
    E: QueryError + 'static,
{
    QueryCache {
        inner: inner.clone(),
    }
    .evict_query::<K, V, E>(key)
}

pub(crate) struct CacheEntry<K, V, E>(HashMap<K, Query<K, V, E>>);

// Trait to enable cache introspection among distinct cache entry maps.
pub(crate) trait CacheEntryTrait: CacheSize + CacheInvalidate {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<K, V, E> CacheEntryTrait for CacheEntry<K, V, E>
where
    K: QueryKey + 'static,
    V: QueryValue + 'static,
    E: QueryError + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) trait CacheSize {
    fn size(&self) -> usize;
}

impl<K, V, E> CacheSize for CacheEntry<K, V, E> {
    fn size(&self) -> usize {
        self.0.len()
    }
}

pub(crate) trait CacheInvalidate {
    fn invalidate(&self);
}

impl<K, V, E> CacheInvalidate for CacheEntry<K, V, E>
where
    K: QueryKey + 'static,
    V: QueryValue + 'static,
    E: QueryError + 'static,
{
    fn invalidate(&self) {
        for (_, query) in self.0.iter() {
            query.mark_invalid();
        }
    }
}

impl QueryCache {
    pub(crate) fn new(runtime: Rc<dyn Runtime>) -> Self {
        Self {
            inner: Rc::new(CacheInner {
                runtime,
                entries: RefCell::new(HashMap::new()),
                observers: RefCell::new(SlotMap::with_key()),
                size: Cell::new(0),
            }),
        }
    }

    pub(crate) fn runtime(&self) -> Rc<dyn Runtime> {
        self.inner.runtime.clone()
    }

    pub(crate) fn get_or_create_query<K, V, E>(&self, key: K) -> Query<K, V, E>
    where
        K: QueryKey + 'static,
        V: QueryValue + 'static,
        E: QueryError + 'static,
    {
        let inner = Rc::downgrade(&self.inner);
        let runtime = self.runtime();
        let (query, created) = self.use_cache(move |cache| {
            let entry = cache.entry(key.clone());

            let (query, new) = match entry {
                Entry::Occupied(entry) => {
                    let entry = entry.into_mut();
                    (entry, false)
                }
                Entry::Vacant(entry) => {
                    let query = Query::new(key, inner, runtime);
                    (entry.insert(query), true)
                }
            };
            (query.clone(), new)
        });

        // Notify on insert.
        if created {
            self.inner.size.set(self.inner.size.get() + 1);
            self.inner
                .notify_observers(CacheEvent::Created(query.cache_key().clone()));
        }

        query
    }

    pub(crate) fn get_query<K, V, E>(&self, key: &K) -> Option<Query<K, V, E>>
    where
        K: QueryKey + 'static,
        V: QueryValue + 'static,
        E: QueryError + 'static,
    {
        self.use_cache_option(move |cache| cache.get(key).cloned())
    }

    pub(crate) fn size(&self) -> usize {
        let size = self.inner.size.get();
        #[cfg(debug_assertions)]
        {
            let entries = self.inner.entries.try_borrow().expect("size borrow");
            let real_size: usize = entries.values().map(|b| b.size()).sum();
            debug_assert!(size == real_size, "Cache size mismatch");
        }
        size
    }

    pub(crate) fn evict_query<K, V, E>(&self, key: &K) -> bool
    where
        K: QueryKey + 'static,
        V: QueryValue + 'static,
        E: QueryError + 'static,
    {
        let result = self.use_cache_option_mut::<K, V, E, _, _>(move |cache| cache.remove(key));

        if let Some(query) = result {
            self.inner.size.set(self.inner.size.get() - 1);
            query.dispose();
            self.inner
                .notify_observers(CacheEvent::Removed(query.cache_key().clone()));
            true
        } else {
            false
        }
    }

    pub(crate) fn invalidate_all_queries(&self) {
        for cache in self
            .inner
            .entries
            .try_borrow()
            .expect("invalidate_all_queries borrow")
            .values()
        {
            cache.invalidate();
        }
    }

    pub(crate) fn register_cache_observer(&self, observer: impl CacheObserver + 'static) {
        self.inner
            .observers
            .try_borrow_mut()
            .expect("register_cache_observer borrow_mut")
            .insert(Rc::new(observer));
    }

    pub(crate) fn use_cache_option<K, V, E, F, R>(&self, func: F) -> Option<R>
    where
        K: QueryKey + 'static,
        V: QueryValue + 'static,
        E: QueryError + 'static,
        F: FnOnce(&HashMap<K, Query<K, V, E>>) -> Option<R>,
        R: 'static,
    {
        let entries = self
            .inner
            .entries
            .try_borrow()
            .expect("use_cache_option borrow");
        let type_key = (TypeId::of::<K>(), TypeId::of::<(V, E)>());
        let cache = entries.get(&type_key)?;
        let cache = cache
            .as_any()
            .downcast_ref::<CacheEntry<K, V, E>>()
            .expect(EXPECT_CACHE_ERROR);
        func(&cache.0)
    }

    pub(crate) fn use_cache_option_mut<K, V, E, F, R>(&self, func: F) -> Option<R>
    where
        K: QueryKey + 'static,
        V: QueryValue + 'static,
        E: QueryError + 'static,
        F: FnOnce(&mut HashMap<K, Query<K, V, E>>) -> Option<R>,
        R: 'static,
    {
        let mut entries = self
            .inner
            .entries
            .try_borrow_mut()
            .expect("use_cache_option_mut borrow");
        let type_key = (TypeId::of::<K>(), TypeId::of::<(V, E)>());
        let cache = entries.get_mut(&type_key)?;
        let cache = cache
            .as_any_mut()
            .downcast_mut::<CacheEntry<K, V, E>>()
            .expect(EXPECT_CACHE_ERROR);
        func(&mut cache.0)
    }

    pub(crate) fn use_cache<K, V, E, R>(
        &self,
        func: impl FnOnce(&mut HashMap<K, Query<K, V, E>>) -> R,
    ) -> R
    where
        K: QueryKey + 'static,
        V: QueryValue + 'static,
        E: QueryError + 'static,
    {
        let mut entries = self.inner.entries.try_borrow_mut().expect("use_cache borrow");

        let type_key = (TypeId::of::<K>(), TypeId::of::<(V, E)>());

        let cache: &mut Box<dyn CacheEntryTrait> = match entries.entry(type_key) {
            Entry::Occupied(o) => o.into_mut(),
            Entry::Vacant(v) => {
                let wrapped: CacheEntry<K, V, E> = CacheEntry(HashMap::new());
                v.insert(Box::new(wrapped))
            }
        };

        let cache: &mut CacheEntry<K, V, E> = cache
            .as_any_mut()
            .downcast_mut::<CacheEntry<K, V, E>>()
            .expect(EXPECT_CACHE_ERROR);

        func(&mut cache.0)
    }
}

const EXPECT_CACHE_ERROR: &str =
    "Error: Query Cache Type Mismatch. This should not happen. Please file a bug report.";
