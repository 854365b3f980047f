#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! # About Holocron Query
//!
//! Holocron Query is a framework-agnostic asynchronous state management
//! library for single-threaded (browser-style) environments.
//!
//! Heavily inspired by [Tanstack Query](https://tanstack.com/query/latest/).
//!
//! Queries are useful for data fetching, caching, and synchronization with
//! server state.
//!
//! A Query provides:
//! - caching
//! - de-duplication
//! - invalidation
//! - background refetching (stale-while-revalidate)
//! - retry schedules with backoff
//! - memory management with cache lifetimes
//! - cancellation
//! - cache event observation
//!
//! There is no ambient global state and no reactive-framework coupling:
//! a [`QueryClient`] is constructed explicitly on a [`Runtime`] (timers,
//! clock, task spawning) and handed to plain functions. A UI layer binds to
//! query state through [`QueryResult`] snapshots and subscriptions; tests
//! drive everything deterministically through [`TestRuntime`].
//!
//! ## The main entry points to using Queries are:
//! - [`create_query`](crate::create_query()) - **Recommended**: Creates a
//!   [`QueryScope`] which encapsulates `use_query` and other methods for
//!   managing queries.
//! - [`use_query`](crate::use_query()) - A query primitive for reading,
//!   caching, and refetching data.
//!
//! # A Simple Example
//!
//! ```
//! use std::rc::Rc;
//! use holocron_query::*;
//!
//! // Make a key type.
//! #[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
//! struct TrackId(i32);
//!
//! // The result of the query fetcher.
//! #[derive(Debug, Clone)]
//! struct TrackData {
//!     name: String,
//! }
//!
//! // Query fetcher.
//! async fn get_track(id: TrackId) -> Result<TrackData, String> {
//!     Ok(TrackData {
//!         name: format!("track {}", id.0),
//!     })
//! }
//!
//! // Query for a track.
//! fn track_query() -> QueryScope<TrackId, TrackData, String> {
//!     create_query(get_track, QueryOptions::default())
//! }
//!
//! // One client for the whole application.
//! let runtime = Rc::new(TestRuntime::new());
//! let client = QueryClient::new(runtime.clone(), DefaultQueryOptions::default());
//!
//! // Any number of consumers may hold results for the same key; they share
//! // one cache entry and one in-flight request.
//! let result = track_query().use_query(&client, TrackId(1));
//! runtime.tick();
//!
//! assert_eq!(result.data().unwrap().name, "track 1");
//! ```

/// Subscriptions to cache-wide query events.
pub mod cache_observer;
mod create_query;
mod garbage_collector;
mod instant;
mod query;
mod query_cache;
mod query_client;
mod query_executor;
mod query_observer;
mod query_options;
mod query_result;
mod query_state;
mod runtime;
/// Retry policies as composable schedules.
pub mod schedule;
mod use_query;
mod util;

pub use create_query::*;
pub use instant::*;
pub use query_client::*;
pub use query_observer::ListenerKey;
pub use query_options::*;
pub use query_result::*;
pub use query_state::*;
pub use runtime::*;
pub use use_query::use_query;

/// Convenience trait for query key requirements.
pub trait QueryKey: std::fmt::Debug + Clone + std::hash::Hash + Eq {}
impl<K> QueryKey for K where K: std::fmt::Debug + Clone + std::hash::Hash + Eq {}

/// Convenience trait for query value requirements.
pub trait QueryValue: std::fmt::Debug + Clone {}
impl<V> QueryValue for V where V: std::fmt::Debug + Clone {}

/// Convenience trait for query error requirements.
pub trait QueryError: std::fmt::Debug + Clone {}
impl<E> QueryError for E where E: std::fmt::Debug + Clone {}
