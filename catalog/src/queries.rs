//! Typed query scopes for each catalog resource.
//!
//! Every resource class carries its own staleness, garbage-collection and
//! retry policy, because each changes at a different real-world rate:
//!
//! | Resource        | stale  | gc     | retries |
//! |-----------------|--------|--------|---------|
//! | planets list    | 60 s   | 5 min  | 1       |
//! | planet detail   | 5 min  | 10 min | 2       |
//! | films batch     | 30 min | 60 min | 2       |
//! | residents batch | 10 min | 30 min | 2       |
//!
//! Batch queries resolve their URL set concurrently and assemble results in
//! input order; a failure of any member fails the whole batch. An empty URL
//! set never touches the network and reports no data, not loading.

use std::{rc::Rc, time::Duration};

use futures::future::{try_join, try_join_all};
use holocron_query::cache_observer::LogCacheObserver;
use holocron_query::schedule::{Schedule, ScheduleBuilt, Schedules};
use holocron_query::{
    create_query, DefaultQueryOptions, QueryClient, QueryOptions, QueryResult, QueryScope, Runtime,
};
use serde::de::DeserializeOwned;

use crate::client::{CatalogApi, SwapiClient};
use crate::config::CatalogConfig;
use crate::error::ApiError;
use crate::keys::{PlanetKey, PlanetsFilter, RelatedKey};
use crate::model::{Film, Person, Planet, ResidentView, ResourcePage, Species, Vehicle};

const LIST_STALE: Duration = Duration::from_secs(60);
const LIST_GC: Duration = Duration::from_secs(5 * 60);
const DETAIL_STALE: Duration = Duration::from_secs(5 * 60);
const DETAIL_GC: Duration = Duration::from_secs(10 * 60);
const FILMS_STALE: Duration = Duration::from_secs(30 * 60);
const FILMS_GC: Duration = Duration::from_secs(60 * 60);
const RESIDENTS_STALE: Duration = Duration::from_secs(10 * 60);
const RESIDENTS_GC: Duration = Duration::from_secs(30 * 60);

const RETRY_BASE: Duration = Duration::from_millis(500);
const RETRY_FACTOR: f32 = 2.0;

/// The catalog's data layer: an API client plus a query cache, exposing one
/// typed [`QueryScope`] per resource.
#[derive(Clone)]
pub struct Catalog {
    api: Rc<dyn CatalogApi>,
    client: QueryClient,
    config: CatalogConfig,
}

impl Catalog {
    /// A catalog over the given API implementation.
    pub fn new(runtime: Rc<dyn Runtime>, api: Rc<dyn CatalogApi>, config: CatalogConfig) -> Self {
        let client = QueryClient::new(runtime, DefaultQueryOptions::default());
        client.register_cache_observer(LogCacheObserver);
        Self {
            api,
            client,
            config,
        }
    }

    /// A catalog against the HTTP API configured via the environment.
    pub fn from_env(runtime: Rc<dyn Runtime>) -> Self {
        let config = CatalogConfig::from_env();
        let api = Rc::new(SwapiClient::new(config.clone()));
        Self::new(runtime, api, config)
    }

    /// The underlying query client.
    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    /// The catalog configuration.
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Bounded exponential backoff that gives up immediately on errors a
    /// retry cannot fix.
    fn retry(attempts: u32) -> ScheduleBuilt<ApiError> {
        Schedules::exponential(RETRY_BASE, RETRY_FACTOR)
            .take(attempts)
            .take_while(|(error, _): (&ApiError, _)| error.is_retryable())
            .build()
    }

    fn list_options() -> QueryOptions<ApiError> {
        QueryOptions::default()
            .set_stale_time(Some(LIST_STALE))
            .set_gc_time(Some(LIST_GC))
            .set_retry(Some(Self::retry(1)))
    }

    fn detail_options() -> QueryOptions<ApiError> {
        QueryOptions::default()
            .set_stale_time(Some(DETAIL_STALE))
            .set_gc_time(Some(DETAIL_GC))
            .set_retry(Some(Self::retry(2)))
    }

    fn films_options() -> QueryOptions<ApiError> {
        QueryOptions::default()
            .set_stale_time(Some(FILMS_STALE))
            .set_gc_time(Some(FILMS_GC))
            .set_retry(Some(Self::retry(2)))
    }

    fn residents_options() -> QueryOptions<ApiError> {
        QueryOptions::default()
            .set_stale_time(Some(RESIDENTS_STALE))
            .set_gc_time(Some(RESIDENTS_GC))
            .set_retry(Some(Self::retry(2)))
    }

    /// Scope for the paginated, searchable planets collection.
    pub fn planets(&self) -> QueryScope<PlanetsFilter, ResourcePage<Planet>, ApiError> {
        let api = self.api.clone();
        create_query(
            move |filter: PlanetsFilter| {
                let api = api.clone();
                async move { api.planets(&filter).await }
            },
            Self::list_options(),
        )
    }

    /// Scope for a single planet detail.
    pub fn planet(&self) -> QueryScope<PlanetKey, Planet, ApiError> {
        let api = self.api.clone();
        create_query(
            move |key: PlanetKey| {
                let api = api.clone();
                async move { api.planet(key.0).await }
            },
            Self::detail_options(),
        )
    }

    /// Scope resolving a set of film URLs into film records, in input
    /// order.
    pub fn films(&self) -> QueryScope<RelatedKey, Vec<Film>, ApiError> {
        let api = self.api.clone();
        create_query(
            move |key: RelatedKey| {
                let api = api.clone();
                async move {
                    try_join_all(
                        key.urls()
                            .iter()
                            .map(|url| fetch_related::<Film>(api.as_ref(), url)),
                    )
                    .await
                }
            },
            Self::films_options(),
        )
    }

    /// Scope resolving a set of resident URLs into fully expanded
    /// [`ResidentView`]s: each person's species and vehicles are fetched
    /// concurrently and inlined, and all residents resolve concurrently
    /// with each other.
    pub fn residents(&self) -> QueryScope<RelatedKey, Vec<ResidentView>, ApiError> {
        let api = self.api.clone();
        create_query(
            move |key: RelatedKey| {
                let api = api.clone();
                async move {
                    try_join_all(
                        key.urls()
                            .iter()
                            .map(|url| expand_resident(api.as_ref(), url)),
                    )
                    .await
                }
            },
            Self::residents_options(),
        )
    }

    /// List hook: a live result for one page/search filter.
    pub fn use_planets(&self, filter: PlanetsFilter) -> QueryResult<ResourcePage<Planet>, ApiError> {
        self.planets().use_query(&self.client, filter)
    }

    /// Detail hook: a live result for one planet id.
    pub fn use_planet(&self, id: u64) -> QueryResult<Planet, ApiError> {
        self.planet().use_query(&self.client, PlanetKey(id))
    }

    /// Films batch hook. An empty URL list short-circuits: the query is
    /// disabled, reports no data and not loading, and never calls the API.
    pub fn use_films(&self, urls: &[String]) -> QueryResult<Vec<Film>, ApiError> {
        let key = RelatedKey::new(urls);
        let scope = self.films();
        if key.is_empty() {
            scope.use_query_with_options(&self.client, key, Self::films_options().set_enabled(false))
        } else {
            scope.use_query(&self.client, key)
        }
    }

    /// Residents batch hook, with the same empty-set short-circuit as
    /// [`use_films`](Self::use_films).
    pub fn use_residents(&self, urls: &[String]) -> QueryResult<Vec<ResidentView>, ApiError> {
        let key = RelatedKey::new(urls);
        let scope = self.residents();
        if key.is_empty() {
            scope.use_query_with_options(
                &self.client,
                key,
                Self::residents_options().set_enabled(false),
            )
        } else {
            scope.use_query(&self.client, key)
        }
    }

    /// Warm the cache for a filter ahead of navigation.
    pub async fn prefetch_planets(&self, filter: PlanetsFilter) {
        self.planets().prefetch_query(&self.client, filter).await;
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("config", &self.config)
            .field("cached_queries", &self.client.size())
            .finish()
    }
}

async fn fetch_related<T: DeserializeOwned>(
    api: &dyn CatalogApi,
    url: &str,
) -> Result<T, ApiError> {
    let value = api.related(url).await?;
    serde_json::from_value(value).map_err(|error| ApiError::Decode(error.to_string()))
}

async fn expand_resident(api: &dyn CatalogApi, url: &str) -> Result<ResidentView, ApiError> {
    let person: Person = fetch_related(api, url).await?;
    let (species, vehicles) = try_join(
        try_join_all(
            person
                .species
                .iter()
                .map(|url| fetch_related::<Species>(api, url)),
        ),
        try_join_all(
            person
                .vehicles
                .iter()
                .map(|url| fetch_related::<Vehicle>(api, url)),
        ),
    )
    .await?;
    Ok(ResidentView {
        person,
        species,
        vehicles,
    })
}
