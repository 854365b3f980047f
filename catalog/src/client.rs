//! The HTTP resource client.
//!
//! A thin wrapper over GET requests against the catalog API. It performs no
//! caching and no retries; both are policies of the query layer. Errors are
//! never swallowed: network failures, non-2xx statuses (with 404 kept
//! distinct) and malformed JSON all surface as [`ApiError`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::CatalogConfig;
use crate::error::ApiError;
use crate::keys::PlanetsFilter;
use crate::model::{Planet, ResourcePage};

/// The operations the catalog needs from the upstream API.
///
/// The trait seam exists so the query layer and the view models can be
/// exercised against an in-memory implementation; the production
/// implementation is [`SwapiClient`].
#[async_trait(?Send)]
pub trait CatalogApi {
    /// Fetch one page of the planets collection. Filter fields that are
    /// absent are omitted from the request entirely.
    async fn planets(&self, filter: &PlanetsFilter) -> Result<ResourcePage<Planet>, ApiError>;

    /// Fetch a single planet by id. A missing id yields
    /// [`ApiError::NotFound`], distinct from other failures.
    async fn planet(&self, id: u64) -> Result<Planet, ApiError>;

    /// Follow a resource URL found on another record and return its raw
    /// JSON. Deliberately untyped: the caller knows what shape the URL
    /// points at and deserializes accordingly.
    async fn related(&self, url: &str) -> Result<serde_json::Value, ApiError>;
}

/// [`CatalogApi`] over HTTP, against the configured base URL.
#[derive(Debug, Clone)]
pub struct SwapiClient {
    http: reqwest::Client,
    config: CatalogConfig,
}

impl SwapiClient {
    /// A client for the given configuration.
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.config
            .base_url
            .join(path)
            .map_err(|error| ApiError::Network(error.to_string()))
    }

    fn planets_url(&self, filter: &PlanetsFilter) -> Result<Url, ApiError> {
        let mut url = self.endpoint("planets/")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(page) = filter.page() {
                pairs.append_pair("page", &page.to_string());
            }
            if let Some(search) = filter.search() {
                pairs.append_pair("search", search);
            }
        }
        // An empty filter must produce no query string at all.
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|error| ApiError::Network(error.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|error| ApiError::Decode(error.to_string()))
    }
}

#[async_trait(?Send)]
impl CatalogApi for SwapiClient {
    async fn planets(&self, filter: &PlanetsFilter) -> Result<ResourcePage<Planet>, ApiError> {
        let url = self.planets_url(filter)?;
        self.get_json(url).await
    }

    async fn planet(&self, id: u64) -> Result<Planet, ApiError> {
        let url = self.endpoint(&format!("planets/{id}/"))?;
        self.get_json(url).await
    }

    async fn related(&self, url: &str) -> Result<serde_json::Value, ApiError> {
        let url = Url::parse(url).map_err(|error| ApiError::Network(error.to_string()))?;
        self.get_json(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SwapiClient {
        SwapiClient::new(CatalogConfig::default())
    }

    #[test]
    fn collection_url_omits_absent_parameters() {
        let swapi = client();

        let url = swapi.planets_url(&PlanetsFilter::new(1, "   ")).unwrap();
        assert_eq!(url.as_str(), "https://swapi.dev/api/planets/");

        let url = swapi.planets_url(&PlanetsFilter::new(2, "")).unwrap();
        assert_eq!(url.as_str(), "https://swapi.dev/api/planets/?page=2");

        let url = swapi.planets_url(&PlanetsFilter::new(1, "tat")).unwrap();
        assert_eq!(url.as_str(), "https://swapi.dev/api/planets/?search=tat");

        let url = swapi.planets_url(&PlanetsFilter::new(3, "ho th")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://swapi.dev/api/planets/?page=3&search=ho+th"
        );
    }

    #[test]
    fn detail_endpoint_uses_the_id_path() {
        let swapi = client();
        let url = swapi.endpoint(&format!("planets/{}/", 42)).unwrap();
        assert_eq!(url.as_str(), "https://swapi.dev/api/planets/42/");
    }
}
