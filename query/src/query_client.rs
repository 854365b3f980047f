use std::{future::Future, rc::Rc};

use crate::{
    cache_observer::CacheObserver,
    query_cache::QueryCache,
    query_executor,
    use_query::into_fetcher,
    DefaultQueryOptions, QueryError, QueryKey, QueryOptions, QueryState, QueryValue, Runtime,
};

/// The cache client that stores query data.
///
/// There is no ambient or global client: construct one at application
/// startup with the runtime of your environment and pass it (or clone it,
/// cheaply) wherever queries are made. Tests construct their own isolated
/// instances.
///
/// Queries can be:
/// - Read and subscribed to with [`use_query`](crate::use_query())
/// - Fetched imperatively ([`fetch_query`](Self::fetch_query)) or warmed
///   ahead of use ([`prefetch_query`](Self::prefetch_query))
/// - Invalidated ([`invalidate_query`](Self::invalidate_query)), causing
///   active queries to refetch in the background
/// - Introspected ([`peek_query_state`](Self::peek_query_state))
/// - Manually updated ([`set_query_data`](Self::set_query_data))
#[derive(Clone)]
pub struct QueryClient {
    pub(crate) cache: QueryCache,
    default_options: DefaultQueryOptions,
}

impl QueryClient {
    /// Creates a new Query Client on the given runtime.
    pub fn new(runtime: Rc<dyn Runtime>, default_options: DefaultQueryOptions) -> Self {
        Self {
            cache: QueryCache::new(runtime),
            default_options,
        }
    }

    /// The runtime this client schedules timers and executions on.
    pub fn runtime(&self) -> Rc<dyn Runtime> {
        self.cache.runtime()
    }

    /// Query options seeded from this client's defaults.
    pub fn default_query_options<E>(&self) -> QueryOptions<E> {
        QueryOptions::from(self.default_options)
    }

    /// Fetch a query, store it in cache, and return the resulting state.
    ///
    /// If an execution for the key is already in flight, the current state
    /// is returned without issuing a duplicate request.
    ///
    /// If you don't need the result opt for
    /// [`prefetch_query()`](Self::prefetch_query).
    pub async fn fetch_query<K, V, E, Fu>(
        &self,
        key: K,
        fetcher: impl Fn(K) -> Fu + 'static,
        options: QueryOptions<E>,
    ) -> QueryState<V, E>
    where
        K: QueryKey + 'static,
        V: QueryValue + 'static,
        E: QueryError + 'static,
        Fu: Future<Output = Result<V, E>> + 'static,
    {
        let query = self.cache.get_or_create_query::<K, V, E>(key);
        query_executor::run(query.clone(), into_fetcher(fetcher), options.retry).await;
        query.get_state()
    }

    /// Prefetch a query and store it in cache.
    /// If the entry already exists it will still be refetched.
    ///
    /// If you need the result opt for [`fetch_query()`](Self::fetch_query).
    pub async fn prefetch_query<K, V, E, Fu>(
        &self,
        key: K,
        fetcher: impl Fn(K) -> Fu + 'static,
        options: QueryOptions<E>,
    ) where
        K: QueryKey + 'static,
        V: QueryValue + 'static,
        E: QueryError + 'static,
        Fu: Future<Output = Result<V, E>> + 'static,
    {
        let query = self.cache.get_or_create_query::<K, V, E>(key);
        query_executor::run(query, into_fetcher(fetcher), options.retry).await;
    }

    /// Retrieve the current state for an existing query.
    /// If the query does not exist, [`None`](Option::None) will be returned.
    pub fn peek_query_state<K, V, E>(&self, key: &K) -> Option<QueryState<V, E>>
    where
        K: QueryKey + 'static,
        V: QueryValue + 'static,
        E: QueryError + 'static,
    {
        self.cache.get_query::<K, V, E>(key).map(|q| q.get_state())
    }

    /// Set the data for a query, creating the cache entry if it does not
    /// exist. Useful after a mutation, instead of waiting for a refetch.
    pub fn set_query_data<K, V, E>(&self, key: K, data: V)
    where
        K: QueryKey + 'static,
        V: QueryValue + 'static,
        E: QueryError + 'static,
    {
        let query = self.cache.get_or_create_query::<K, V, E>(key);
        let now = self.runtime().now();
        query.set_state(QueryState::Loaded(crate::QueryData::at(data, now)));
    }

    /// Mutate the data of an existing query in place.
    ///
    /// Returns `false` when the entry is missing or holds no data yet.
    pub fn update_query_data_mut<K, V, E>(&self, key: &K, func: impl FnOnce(&mut V)) -> bool
    where
        K: QueryKey + 'static,
        V: QueryValue + 'static,
        E: QueryError + 'static,
    {
        let Some(query) = self.cache.get_query::<K, V, E>(key) else {
            return false;
        };
        query.maybe_map_state(|mut state| {
            if let Some(data) = state.data_mut() {
                func(data);
                Ok(state)
            } else {
                Err(state)
            }
        })
    }

    /// Attempts to invalidate an entry in the Query Cache.
    /// The matching query is marked as invalid and refetched in the
    /// background if it has active observers.
    ///
    /// Returns true if the entry was successfully invalidated.
    pub fn invalidate_query<K, V, E>(&self, key: &K) -> bool
    where
        K: QueryKey + 'static,
        V: QueryValue + 'static,
        E: QueryError + 'static,
    {
        self.cache
            .get_query::<K, V, E>(key)
            .map(|query| query.mark_invalid())
            .unwrap_or(false)
    }

    /// Invalidate every query in the cache, across all types.
    pub fn invalidate_all_queries(&self) {
        self.cache.invalidate_all_queries();
    }

    /// Cancel the in-flight execution for a key, if any. The cache keeps
    /// whatever state the query exposed before the execution started.
    pub fn cancel_query<K, V, E>(&self, key: &K) -> bool
    where
        K: QueryKey + 'static,
        V: QueryValue + 'static,
        E: QueryError + 'static,
    {
        self.cache
            .get_query::<K, V, E>(key)
            .map(|query| query.cancel())
            .unwrap_or(false)
    }

    /// Evict an entry from the cache regardless of observers or timers.
    ///
    /// Returns true if an entry was removed.
    pub fn evict_query<K, V, E>(&self, key: &K) -> bool
    where
        K: QueryKey + 'static,
        V: QueryValue + 'static,
        E: QueryError + 'static,
    {
        self.cache.evict_query::<K, V, E>(key)
    }

    /// Subscribe to cache-wide events: entry creation, updates, observer
    /// churn, and eviction.
    pub fn register_cache_observer(&self, observer: impl CacheObserver + 'static) {
        self.cache.register_cache_observer(observer);
    }

    /// The number of entries currently in the cache.
    pub fn size(&self) -> usize {
        self.cache.size()
    }
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("size", &self.size())
            .finish()
    }
}
