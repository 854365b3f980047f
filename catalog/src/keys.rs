//! Query keys for the catalog cache.
//!
//! Keys are plain data with derived `Hash`/`Eq`, so structurally equal
//! filters always land on the same cache entry and different filters never
//! collide. Constructors canonicalize their input (default page dropped,
//! search trimmed, URL sets sorted and de-duplicated) so that equivalent
//! requests are equal by construction.

/// Filter for the planets collection: page plus free-text search.
///
/// Canonical form: page 1 (the default) is represented as `None`, and the
/// search term is trimmed with the empty string represented as `None`. The
/// fields double as the query parameters sent upstream, which are omitted
/// entirely when absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PlanetsFilter {
    page: Option<u32>,
    search: Option<String>,
}

impl PlanetsFilter {
    /// Canonicalize a page number and raw search input into a filter.
    pub fn new(page: u32, search: &str) -> Self {
        let search = search.trim();
        Self {
            page: if page > 1 { Some(page) } else { None },
            search: if search.is_empty() {
                None
            } else {
                Some(search.to_owned())
            },
        }
    }

    /// The page parameter, absent on the first page.
    pub fn page(&self) -> Option<u32> {
        self.page
    }

    /// The search parameter, absent when blank.
    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    /// The effective 1-based page number.
    pub fn page_number(&self) -> u32 {
        self.page.unwrap_or(1)
    }
}

/// Key for a single planet detail, by its numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanetKey(pub u64);

/// Key for a batch of related resources, identified by the set of URLs to
/// resolve.
///
/// The URL list is sorted and de-duplicated so that two consumers asking
/// for the same set, in any order, share a single cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelatedKey {
    urls: Vec<String>,
}

impl RelatedKey {
    /// Build the canonical key for a set of resource URLs.
    pub fn new(urls: &[String]) -> Self {
        let mut urls = urls.to_vec();
        urls.sort();
        urls.dedup();
        Self { urls }
    }

    /// The canonical (sorted, de-duplicated) URL set.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Whether there is anything to fetch.
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(value: &impl Hash) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn equal_filters_make_equal_keys() {
        let a = PlanetsFilter::new(2, "tatooine");
        let b = PlanetsFilter::new(2, "tatooine");
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn different_filters_make_different_keys() {
        let base = PlanetsFilter::new(2, "tatooine");
        assert_ne!(base, PlanetsFilter::new(3, "tatooine"));
        assert_ne!(base, PlanetsFilter::new(2, "hoth"));
        assert_ne!(base, PlanetsFilter::new(2, ""));
    }

    #[test]
    fn default_page_and_blank_search_are_canonical() {
        assert_eq!(PlanetsFilter::new(1, ""), PlanetsFilter::default());
        assert_eq!(PlanetsFilter::new(1, "   "), PlanetsFilter::default());
        assert_eq!(PlanetsFilter::new(1, "  hoth "), PlanetsFilter::new(1, "hoth"));
        assert_eq!(PlanetsFilter::new(1, "x").page(), None);
        assert_eq!(PlanetsFilter::new(0, "").page_number(), 1);
    }

    #[test]
    fn related_keys_ignore_order_and_duplicates() {
        let a = RelatedKey::new(&[
            "https://swapi.dev/api/films/2/".to_string(),
            "https://swapi.dev/api/films/1/".to_string(),
        ]);
        let b = RelatedKey::new(&[
            "https://swapi.dev/api/films/1/".to_string(),
            "https://swapi.dev/api/films/2/".to_string(),
            "https://swapi.dev/api/films/1/".to_string(),
        ]);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(a.urls().len(), 2);
    }

    #[test]
    fn distinct_url_sets_stay_distinct() {
        let a = RelatedKey::new(&["https://swapi.dev/api/films/1/".to_string()]);
        let b = RelatedKey::new(&["https://swapi.dev/api/films/2/".to_string()]);
        assert_ne!(a, b);

        let empty = RelatedKey::new(&[]);
        assert!(empty.is_empty());
        assert_ne!(a, empty);
    }
}
