use std::{rc::Rc, time::Duration};

use futures::future::Either;
use futures_channel::oneshot;

use crate::{
    query::Query,
    query_observer::Fetcher,
    runtime,
    schedule::ScheduleBuilt,
    QueryData, QueryError, QueryKey, QueryState, QueryValue, Runtime,
};

/// Spawn an execution for the query, using the fetcher and retry schedule of
/// its first enabled observer. A no-op when nothing can fetch or another
/// execution is already in flight.
pub(crate) fn execute<K, V, E>(query: Query<K, V, E>)
where
    K: QueryKey + 'static,
    V: QueryValue + 'static,
    E: QueryError + 'static,
{
    let Some((fetcher, retry)) = query.primary_fetcher() else {
        return;
    };
    let runtime = query.runtime();
    runtime.spawn(Box::pin(async move {
        run(query, fetcher, retry).await;
    }));
}

/// Run one guarded execution to completion.
pub(crate) async fn run<K, V, E>(
    query: Query<K, V, E>,
    fetcher: Fetcher<K, V, E>,
    retry: Option<ScheduleBuilt<E>>,
) where
    K: QueryKey + 'static,
    V: QueryValue + 'static,
    E: QueryError + 'static,
{
    let Some((mut cancellation, serial)) = query.new_execution() else {
        return;
    };

    match query.get_state() {
        // First load.
        QueryState::Created
        | QueryState::Loading
        | QueryState::Errored { previous: None, .. } => {
            query.set_state_if_current(serial, QueryState::Loading);
        }
        // Subsequent loads keep the previous data readable.
        QueryState::Fetching(data)
        | QueryState::Loaded(data)
        | QueryState::Invalid(data)
        | QueryState::Errored {
            previous: Some(data),
            ..
        } => {
            query.set_state_if_current(serial, QueryState::Fetching(data));
        }
    }

    match fetch_with_retry(&query, &fetcher, retry, &mut cancellation).await {
        Outcome::Success(data) => {
            let data = QueryData::at(data, query.runtime().now());
            query.set_state_if_current(serial, QueryState::Loaded(data));
        }
        Outcome::Failure(error) => {
            let previous = query.with_state(|state| state.query_data().cloned());
            query.set_state_if_current(serial, QueryState::Errored { error, previous });
        }
        Outcome::Cancelled => {
            // Roll the transient state back to what it exposed before.
            query.maybe_map_state_if_current(serial, |state| match state {
                QueryState::Loading => Ok(QueryState::Created),
                QueryState::Fetching(data) => Ok(QueryState::Loaded(data)),
                other => Err(other),
            });
        }
    }

    query.finalize_execution(serial);
}

enum Outcome<V, E> {
    Success(V),
    Failure(E),
    Cancelled,
}

async fn fetch_with_retry<K, V, E>(
    query: &Query<K, V, E>,
    fetcher: &Fetcher<K, V, E>,
    mut retry: Option<ScheduleBuilt<E>>,
    cancellation: &mut oneshot::Receiver<()>,
) -> Outcome<V, E>
where
    K: QueryKey + 'static,
    V: QueryValue + 'static,
    E: QueryError + 'static,
{
    loop {
        let fetch = fetcher(query.key().clone());
        match with_cancellation(fetch, cancellation).await {
            None => return Outcome::Cancelled,
            Some(Ok(data)) => return Outcome::Success(data),
            Some(Err(error)) => {
                let delay = retry.as_mut().and_then(|schedule| schedule.next(&error));
                match delay {
                    Some(delay) => {
                        log::debug!("query fetch failed, retrying in {delay:?}: {error:?}");
                        if !sleep_unless_cancelled(&query.runtime(), delay, cancellation).await {
                            return Outcome::Cancelled;
                        }
                    }
                    None => return Outcome::Failure(error),
                }
            }
        }
    }
}

async fn with_cancellation<T>(
    fut: impl std::future::Future<Output = T>,
    cancellation: &mut oneshot::Receiver<()>,
) -> Option<T> {
    let fut = std::pin::pin!(fut);
    match futures::future::select(fut, cancellation).await {
        Either::Left((value, _)) => Some(value),
        Either::Right((cancelled, _)) => {
            if cancelled.is_err() {
                log::debug!("Query cancellation was incorrectly dropped.");
            }
            None
        }
    }
}

async fn sleep_unless_cancelled(
    rt: &Rc<dyn Runtime>,
    delay: Duration,
    cancellation: &mut oneshot::Receiver<()>,
) -> bool {
    let sleep = std::pin::pin!(runtime::sleep(rt, delay));
    matches!(
        futures::future::select(sleep, cancellation).await,
        Either::Left(..)
    )
}
