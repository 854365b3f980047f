use url::Url;

/// The public SWAPI host, used when no override is configured.
pub const DEFAULT_BASE_URL: &str = "https://swapi.dev/api/";

/// Page size of the upstream collection endpoints. SWAPI pages are fixed;
/// the value is only used for client-side pagination arithmetic.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

const BASE_URL_VAR: &str = "SWAPI_BASE_URL";

/// Where and how to reach the catalog API.
///
/// The rest of the crate never hardcodes the upstream host; everything
/// flows through this config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Base URL all relative endpoints are joined against. Must end with a
    /// trailing slash for joins to behave.
    pub base_url: Url,
    /// Items per collection page, as served by the upstream API.
    pub page_size: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url is valid"),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl CatalogConfig {
    /// Load configuration from the environment, falling back to the public
    /// SWAPI host. Reads `.env` files via dotenvy first, the same way the
    /// process would in development.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Ok(raw) = std::env::var(BASE_URL_VAR) {
            match Url::parse(&raw) {
                Ok(url) => config.base_url = url,
                Err(error) => {
                    log::warn!("ignoring invalid {BASE_URL_VAR}={raw}: {error}");
                }
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_swapi() {
        let config = CatalogConfig::default();
        assert_eq!(config.base_url.as_str(), DEFAULT_BASE_URL);
        assert_eq!(config.page_size, 10);
    }

    #[test]
    fn base_url_joins_cleanly() {
        let config = CatalogConfig::default();
        let joined = config.base_url.join("planets/").unwrap();
        assert_eq!(joined.as_str(), "https://swapi.dev/api/planets/");
    }
}
