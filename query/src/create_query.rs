use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use crate::query_observer::Fetcher;
use crate::use_query::use_query_boxed;
use crate::{
    query_executor, QueryClient, QueryError, QueryKey, QueryOptions, QueryResult, QueryState,
    QueryValue,
};

/// Creates a new [`QueryScope`] for managing queries with specific key and
/// value types. This reduces the need to use the
/// [`QueryClient`](crate::QueryClient) directly.
///
/// Useful for typed invalidation, setting, and updating of queries: the
/// fetcher and options are fixed once, and every call site just supplies a
/// key.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use holocron_query::*;
///
/// // Make a key type.
/// #[derive(Debug, Clone, Hash, Eq, PartialEq)]
/// struct TrackId(i32);
///
/// // The result of the query fetcher.
/// #[derive(Debug, Clone)]
/// struct TrackData {
///     name: String,
/// }
///
/// // Query fetcher.
/// async fn get_track(id: TrackId) -> Result<TrackData, String> {
///     Ok(TrackData {
///         name: format!("track {}", id.0),
///     })
/// }
///
/// // Query for a track.
/// fn track_query() -> QueryScope<TrackId, TrackData, String> {
///     create_query(get_track, QueryOptions::default())
/// }
///
/// let runtime = Rc::new(TestRuntime::new());
/// let client = QueryClient::new(runtime.clone(), DefaultQueryOptions::default());
///
/// let result = track_query().use_query(&client, TrackId(1));
/// runtime.tick();
/// assert_eq!(result.data().unwrap().name, "track 1");
/// ```
pub fn create_query<K, V, E, Fu>(
    fetcher: impl Fn(K) -> Fu + 'static,
    options: QueryOptions<E>,
) -> QueryScope<K, V, E>
where
    K: QueryKey + 'static,
    V: QueryValue + 'static,
    E: QueryError + 'static,
    Fu: Future<Output = Result<V, E>> + 'static,
{
    let fetcher =
        Rc::new(move |s| Box::pin(fetcher(s)) as Pin<Box<dyn Future<Output = Result<V, E>>>>);
    QueryScope { fetcher, options }
}

/// A scope for managing queries with specific key and value types within a
/// type-safe environment.
///
/// Encapsulates operations such as fetching, prefetching, updating, and
/// invalidating queries.
pub struct QueryScope<K, V, E> {
    fetcher: Fetcher<K, V, E>,
    options: QueryOptions<E>,
}

impl<K, V, E> Clone for QueryScope<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            options: self.options.clone(),
        }
    }
}

impl<K, V, E> QueryScope<K, V, E>
where
    K: QueryKey + 'static,
    V: QueryValue + 'static,
    E: QueryError + 'static,
{
    /// Executes a query using the provided key and the fetcher function
    /// specified at creation, returning a live [`QueryResult`] handle.
    pub fn use_query(&self, client: &QueryClient, key: K) -> QueryResult<V, E> {
        use_query_boxed(client, key, self.fetcher.clone(), self.options.clone())
    }

    /// Executes a query with options that override the options provided at
    /// the scope's creation.
    pub fn use_query_with_options(
        &self,
        client: &QueryClient,
        key: K,
        options: QueryOptions<E>,
    ) -> QueryResult<V, E> {
        use_query_boxed(client, key, self.fetcher.clone(), options)
    }

    /// Fetch the query and await its terminal state. No duplicate request
    /// is made when an execution for the key is already in flight.
    pub async fn fetch_query(&self, client: &QueryClient, key: K) -> QueryState<V, E> {
        let query = client.cache.get_or_create_query::<K, V, E>(key);
        query_executor::run(
            query.clone(),
            self.fetcher.clone(),
            self.options.retry.clone(),
        )
        .await;
        query.get_state()
    }

    /// Fetch the query and store it in cache without returning the result.
    pub async fn prefetch_query(&self, client: &QueryClient, key: K) {
        let query = client.cache.get_or_create_query::<K, V, E>(key);
        query_executor::run(query, self.fetcher.clone(), self.options.retry.clone()).await;
    }

    /// See [`QueryClient::peek_query_state`].
    pub fn peek_query_state(&self, client: &QueryClient, key: &K) -> Option<QueryState<V, E>> {
        client.peek_query_state::<K, V, E>(key)
    }

    /// See [`QueryClient::set_query_data`].
    pub fn set_query_data(&self, client: &QueryClient, key: K, data: V) {
        client.set_query_data::<K, V, E>(key, data);
    }

    /// See [`QueryClient::update_query_data_mut`].
    pub fn update_query_data_mut(
        &self,
        client: &QueryClient,
        key: &K,
        func: impl FnOnce(&mut V),
    ) -> bool {
        client.update_query_data_mut::<K, V, E>(key, func)
    }

    /// See [`QueryClient::invalidate_query`].
    pub fn invalidate_query(&self, client: &QueryClient, key: &K) -> bool {
        client.invalidate_query::<K, V, E>(key)
    }

    /// See [`QueryClient::cancel_query`].
    pub fn cancel_query(&self, client: &QueryClient, key: &K) -> bool {
        client.cancel_query::<K, V, E>(key)
    }
}
