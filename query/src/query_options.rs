use std::time::Duration;

use crate::schedule::ScheduleBuilt;

/// Default options for all queries under a client.
/// Only differs from [`QueryOptions`] in that every query policy field has a
/// value and there is no per-query configuration.
#[derive(Debug, Clone, Copy)]
pub struct DefaultQueryOptions {
    /// Time before a query is considered stale.
    pub stale_time: Option<Duration>,
    /// Time before an inactive query is removed from cache.
    pub gc_time: Option<Duration>,
}

impl Default for DefaultQueryOptions {
    fn default() -> Self {
        Self {
            stale_time: Some(DEFAULT_STALE_TIME),
            gc_time: Some(DEFAULT_GC_TIME),
        }
    }
}

const DEFAULT_STALE_TIME: Duration = Duration::from_secs(10);
const DEFAULT_GC_TIME: Duration = Duration::from_secs(60 * 5);

/// Options for a query [`use_query()`](crate::use_query()).
pub struct QueryOptions<E> {
    /// The duration that should pass before a query is considered stale.
    /// If the query is stale, it will be refetched on its next use.
    /// If no stale_time, the query will never be considered stale.
    /// Stale_time can never be greater than gc_time.
    /// Default is 10 seconds.
    pub stale_time: Option<Duration>,
    /// The amount of time a query will be cached once there are no more
    /// active observers for it.
    /// If no gc time, the query will never be revoked from cache.
    /// gc_time can never be less than stale_time.
    /// Default is 5 minutes.
    /// NOTE: If different gc times are used for the same key, the MAXIMUM
    /// time will be used.
    pub gc_time: Option<Duration>,
    /// Retry policy consulted after each failed fetch attempt.
    /// If no schedule, a failed fetch surfaces its error immediately.
    pub retry: Option<ScheduleBuilt<E>>,
    /// Disabled queries never fetch. They stay in the created state,
    /// reporting no data and not loading.
    pub enabled: bool,
}

impl<E> Clone for QueryOptions<E> {
    fn clone(&self) -> Self {
        Self {
            stale_time: self.stale_time,
            gc_time: self.gc_time,
            retry: self.retry.clone(),
            enabled: self.enabled,
        }
    }
}

impl<E> QueryOptions<E> {
    /// Set the stale_time.
    pub fn set_stale_time(self, stale_time: Option<Duration>) -> Self {
        QueryOptions { stale_time, ..self }
    }

    /// Set the gc time.
    pub fn set_gc_time(self, gc_time: Option<Duration>) -> Self {
        QueryOptions { gc_time, ..self }
    }

    /// Set the retry schedule.
    pub fn set_retry(self, retry: Option<ScheduleBuilt<E>>) -> Self {
        QueryOptions { retry, ..self }
    }

    /// Enable or disable the query.
    pub fn set_enabled(self, enabled: bool) -> Self {
        QueryOptions { enabled, ..self }
    }

    /// Ensures that gc_time is >= than stale_time.
    pub fn validate(self) -> Self {
        let stale_time = ensure_valid_stale_time(&self.stale_time, &self.gc_time);

        QueryOptions { stale_time, ..self }
    }
}

impl<E> Default for QueryOptions<E> {
    fn default() -> Self {
        let defaults = DefaultQueryOptions::default();
        Self {
            stale_time: defaults.stale_time,
            gc_time: defaults.gc_time,
            retry: None,
            enabled: true,
        }
    }
}

impl<E> From<DefaultQueryOptions> for QueryOptions<E> {
    fn from(defaults: DefaultQueryOptions) -> Self {
        Self {
            stale_time: defaults.stale_time,
            gc_time: defaults.gc_time,
            retry: None,
            enabled: true,
        }
        .validate()
    }
}

impl<E> std::fmt::Debug for QueryOptions<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOptions")
            .field("stale_time", &self.stale_time)
            .field("gc_time", &self.gc_time)
            .field("retry", &self.retry.as_ref().map(|_| ".."))
            .field("enabled", &self.enabled)
            .finish()
    }
}

fn ensure_valid_stale_time(
    stale_time: &Option<Duration>,
    gc_time: &Option<Duration>,
) -> Option<Duration> {
    match (stale_time, gc_time) {
        (Some(ref stale_time), Some(ref gc_time)) => {
            if stale_time > gc_time {
                log::warn!(
                    "stale_time is greater than gc_time. Using gc time instead. stale_time: {}, gc_time: {}",
                    stale_time.as_millis(),
                    gc_time.as_millis()
                );
                Some(*gc_time)
            } else {
                Some(*stale_time)
            }
        }
        (None, Some(ref gc_duration)) => {
            log::warn!(
                "stale_time (infinity) is greater than gc_time. Using gc_time instead. gc_time: {}",
                gc_duration.as_millis()
            );
            *gc_time
        }
        (stale_time, _) => *stale_time,
    }
}
