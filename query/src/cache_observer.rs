//! Subscriptions to cache-wide query events.

use crate::QueryKey;

/// Subscribing to cache events.
pub trait CacheObserver {
    /// Receive a cache event.
    fn process_cache_event(&self, event: CacheEvent);
}

/// The events that can be observed from the query cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A new query entry was inserted into the cache.
    Created(QueryCacheKey),
    /// A query entry's state changed.
    Updated(QueryCacheKey),
    /// An observer subscribed to a query entry.
    ObserverAdded(QueryCacheKey),
    /// An observer unsubscribed from a query entry.
    ObserverRemoved(QueryCacheKey),
    /// A query entry was evicted from the cache.
    Removed(QueryCacheKey),
}

/// A serialized key for a query in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryCacheKey(pub String);

impl<K> From<&K> for QueryCacheKey
where
    K: QueryKey,
{
    fn from(key: &K) -> Self {
        QueryCacheKey(format!("{key:?}"))
    }
}

/// A [`CacheObserver`] that forwards every event to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogCacheObserver;

impl CacheObserver for LogCacheObserver {
    fn process_cache_event(&self, event: CacheEvent) {
        match event {
            CacheEvent::Created(key) => log::debug!("query created: {}", key.0),
            CacheEvent::Updated(key) => log::trace!("query updated: {}", key.0),
            CacheEvent::ObserverAdded(key) => log::trace!("query observer added: {}", key.0),
            CacheEvent::ObserverRemoved(key) => log::trace!("query observer removed: {}", key.0),
            CacheEvent::Removed(key) => log::debug!("query evicted: {}", key.0),
        }
    }
}
