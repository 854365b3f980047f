use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use crate::query_observer::{Fetcher, ListenerKey, QueryObserver};
use crate::query_result::QueryResult;
use crate::{QueryClient, QueryError, QueryKey, QueryOptions, QueryState, QueryValue};

/// Creates a query. Useful for data fetching, caching, and synchronization
/// with server state.
///
/// A Query provides:
/// - Caching
/// - De-duplication
/// - Invalidation
/// - Background refetching
/// - Retry schedules
/// - Memory management with cache lifetimes
///
/// Looking up a key with a fresh cached value returns it without fetching;
/// a stale or invalidated value is returned immediately while a refetch
/// runs in the background; a missing value starts a first load. The fetch
/// itself runs on the client's [`Runtime`](crate::Runtime).
///
/// Example
/// ```
/// use std::rc::Rc;
/// use holocron_query::*;
///
/// // Query key.
/// #[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
/// struct UserId(i32);
///
/// // Data type.
/// #[derive(Debug, Clone)]
/// struct UserData {
///     name: String,
/// }
///
/// // Fetcher.
/// async fn get_user(id: UserId) -> Result<UserData, String> {
///     Ok(UserData {
///         name: format!("user {}", id.0),
///     })
/// }
///
/// let runtime = Rc::new(TestRuntime::new());
/// let client = QueryClient::new(runtime.clone(), DefaultQueryOptions::default());
///
/// let result = use_query(&client, UserId(1), get_user, QueryOptions::default());
/// runtime.tick();
/// assert_eq!(result.data().unwrap().name, "user 1");
/// ```
pub fn use_query<K, V, E, Fu>(
    client: &QueryClient,
    key: K,
    fetcher: impl Fn(K) -> Fu + 'static,
    options: QueryOptions<E>,
) -> QueryResult<V, E>
where
    K: QueryKey + 'static,
    V: QueryValue + 'static,
    E: QueryError + 'static,
    Fu: Future<Output = Result<V, E>> + 'static,
{
    use_query_boxed(client, key, into_fetcher(fetcher), options)
}

pub(crate) fn use_query_boxed<K, V, E>(
    client: &QueryClient,
    key: K,
    fetcher: Fetcher<K, V, E>,
    options: QueryOptions<E>,
) -> QueryResult<V, E>
where
    K: QueryKey + 'static,
    V: QueryValue + 'static,
    E: QueryError + 'static,
{
    let options = options.validate();
    let query = client.cache.get_or_create_query::<K, V, E>(key);

    let observer = Rc::new(QueryObserver::with_fetcher(fetcher, options));
    observer.update_query(query.clone());

    let state_fn: Rc<dyn Fn() -> QueryState<V, E>> = {
        let query = query.clone();
        Rc::new(move || query.get_state())
    };
    let refetch_fn: Rc<dyn Fn()> = {
        let query = query.clone();
        Rc::new(move || query.execute())
    };
    let add_listener_fn: Rc<dyn Fn(Rc<dyn Fn(&QueryState<V, E>)>) -> ListenerKey> = {
        let observer = observer.clone();
        Rc::new(move |listener| observer.add_listener(listener))
    };
    let remove_listener_fn: Rc<dyn Fn(ListenerKey) -> bool> = {
        let observer = observer.clone();
        Rc::new(move |key| observer.remove_listener(key))
    };
    let cleanup_fn: Rc<dyn Fn()> = Rc::new(move || observer.cleanup());

    QueryResult::new(
        state_fn,
        refetch_fn,
        add_listener_fn,
        remove_listener_fn,
        cleanup_fn,
    )
}

pub(crate) fn into_fetcher<K, V, E, Fu>(fetcher: impl Fn(K) -> Fu + 'static) -> Fetcher<K, V, E>
where
    Fu: Future<Output = Result<V, E>> + 'static,
{
    Rc::new(move |key| Box::pin(fetcher(key)) as Pin<Box<dyn Future<Output = Result<V, E>>>>)
}
