//! Composite view models over the query layer.
//!
//! [`PlanetBrowser`] drives the paginated, searchable list view:
//! it owns the page and search state (search debounced, page immediate),
//! re-points its query when the filter changes, mirrors the canonical state
//! into the address bar, and derives the display flags a list view renders
//! from. [`PlanetDetail`] drives the detail view: the planet itself plus
//! its films and residents batches, gated on the planet's URL arrays.
//!
//! No DOM or rendering concern crosses this boundary: a UI adapter calls
//! the setters from input events, subscribes for change notification, and
//! renders from [`PlanetBrowser::snapshot`] / [`PlanetDetail::snapshot`].

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use holocron_query::{ListenerKey, QueryResult, QueryState};
use slotmap::SlotMap;

use crate::error::ApiError;
use crate::keys::PlanetsFilter;
use crate::model::{Film, Planet, ResidentView, ResourcePage};
use crate::queries::Catalog;
use crate::url_state::{sync_query_string, Debouncer, HistorySink, QueryParams, DEFAULT_PAGE, SEARCH_DEBOUNCE};

slotmap::new_key_type! {
    /// Identifies a change-notification subscription on a view model.
    pub struct SubscriptionKey;
}

/// The mutually exclusive display states of a resource view.
///
/// At most one of `show_skeleton` / `show_error` / `show_empty` is true at
/// any time, and `is_syncing` is never true while the skeleton shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayFlags {
    /// First load of this filter: no cached data yet.
    pub show_skeleton: bool,
    /// Terminal failure with no usable cached data to fall back to.
    pub show_error: bool,
    /// The fetch succeeded with zero results.
    pub show_empty: bool,
    /// A background refetch is in flight while stale data is shown.
    pub is_syncing: bool,
}

pub(crate) fn display_flags<V, E>(
    state: &QueryState<V, E>,
    is_empty: impl Fn(&V) -> bool,
) -> DisplayFlags {
    let mut flags = DisplayFlags::default();
    match state {
        QueryState::Created | QueryState::Loading => flags.show_skeleton = true,
        QueryState::Fetching(_) | QueryState::Invalid(_) => flags.is_syncing = true,
        QueryState::Loaded(data) => flags.show_empty = is_empty(&data.data),
        QueryState::Errored { previous: None, .. } => flags.show_error = true,
        // A background failure with usable data keeps the data view.
        QueryState::Errored {
            previous: Some(_), ..
        } => {}
    }
    flags
}

/// Everything a planets list view renders from.
#[derive(Debug, Clone)]
pub struct PlanetListVm {
    /// The current page of planets, sorted by name.
    pub items: Vec<Planet>,
    /// Total matches across all pages, as reported by the server.
    pub total_count: u64,
    /// Current 1-based page.
    pub page: u32,
    /// Total number of pages for the current filter.
    pub total_pages: u32,
    /// Whether the server reports a next page.
    pub has_next: bool,
    /// Whether the server reports a previous page.
    pub has_previous: bool,
    /// The raw (undebounced) search input, for echoing into the input box.
    pub search: String,
    /// Display state.
    pub flags: DisplayFlags,
    /// The terminal error, when the last fetch failed.
    pub error: Option<ApiError>,
}

struct ListResult {
    result: QueryResult<ResourcePage<Planet>, ApiError>,
    listener: ListenerKey,
}

struct BrowserInner {
    catalog: Catalog,
    page: Cell<u32>,
    raw_search: RefCell<String>,
    debounced_search: RefCell<String>,
    debouncer: Debouncer,
    result: RefCell<Option<ListResult>>,
    sink: RefCell<Option<Rc<dyn HistorySink>>>,
    listeners: RefCell<SlotMap<SubscriptionKey, Rc<dyn Fn()>>>,
}

/// View model for the paginated, searchable planets list.
pub struct PlanetBrowser {
    inner: Rc<BrowserInner>,
}

impl PlanetBrowser {
    /// A browser starting from URL-derived state.
    pub fn new(catalog: Catalog, params: QueryParams) -> Self {
        let debouncer = Debouncer::new(catalog.client().runtime(), SEARCH_DEBOUNCE);
        let inner = Rc::new(BrowserInner {
            catalog,
            page: Cell::new(params.page.max(DEFAULT_PAGE)),
            raw_search: RefCell::new(params.search.clone()),
            debounced_search: RefCell::new(params.search.trim().to_string()),
            debouncer,
            result: RefCell::new(None),
            sink: RefCell::new(None),
            listeners: RefCell::new(SlotMap::with_key()),
        });
        BrowserInner::requery(&inner);
        Self { inner }
    }

    /// Mirror state into an address bar. Applies the current state
    /// immediately and after every later change.
    pub fn attach_history(&self, sink: Rc<dyn HistorySink>) {
        *self.inner.sink.borrow_mut() = Some(sink);
        BrowserInner::sync_url(&self.inner);
    }

    /// Register a change-notification callback. Callbacks fire on every
    /// query transition and every page/search change; read the new state
    /// with [`snapshot`](Self::snapshot).
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> SubscriptionKey {
        self.inner.listeners.borrow_mut().insert(Rc::new(callback))
    }

    /// Remove a change-notification callback.
    pub fn unsubscribe(&self, key: SubscriptionKey) -> bool {
        self.inner.listeners.borrow_mut().remove(key).is_some()
    }

    /// Change the page, clamped into the valid range. Out-of-range
    /// requests behave exactly like the nearest valid page.
    pub fn set_page(&self, page: u32) {
        let clamped = BrowserInner::clamp_page(&self.inner, page);
        if clamped == self.inner.page.get() {
            return;
        }
        self.inner.page.set(clamped);
        BrowserInner::requery(&self.inner);
        BrowserInner::sync_url(&self.inner);
        BrowserInner::notify(&self.inner);
    }

    /// Change the search text. The raw value is visible immediately; the
    /// query and the address bar only see it after the debounce interval,
    /// and a new search lands on page 1.
    pub fn set_search(&self, text: &str) {
        *self.inner.raw_search.borrow_mut() = text.to_string();
        let value = text.trim().to_string();
        let weak = Rc::downgrade(&self.inner);
        self.inner.debouncer.debounce(move || {
            if let Some(inner) = weak.upgrade() {
                BrowserInner::apply_search(&inner, value);
            }
        });
        BrowserInner::notify(&self.inner);
    }

    /// Clear the search immediately, cancelling any pending debounce.
    pub fn clear_search(&self) {
        self.inner.debouncer.cancel();
        self.inner.raw_search.borrow_mut().clear();
        BrowserInner::apply_search(&self.inner, String::new());
        BrowserInner::notify(&self.inner);
    }

    /// Hint that the view regained focus. Revalidates the current filter
    /// in the background when its cached data has gone stale; a no-op on
    /// fresh data. Adapters that don't want focus refetching simply never
    /// wire this up.
    pub fn on_focus(&self) {
        BrowserInner::requery(&self.inner);
    }

    /// Re-trigger the current filter's fetch, e.g. from a "try again"
    /// affordance after a terminal error.
    pub fn retry(&self) {
        if let Some(current) = self.inner.result.borrow().as_ref() {
            current.result.refetch();
        }
    }

    /// Warm the cache for the next page, if there is one. The returned
    /// future is detached from the browser and can be spawned.
    pub fn prefetch_next_page(&self) -> impl std::future::Future<Output = ()> + 'static {
        let snapshot = self.snapshot();
        let filter = BrowserInner::filter_for_page(&self.inner, snapshot.page + 1);
        let catalog = self.inner.catalog.clone();
        async move {
            if snapshot.has_next {
                catalog.prefetch_planets(filter).await;
            }
        }
    }

    /// The current render state.
    pub fn snapshot(&self) -> PlanetListVm {
        let result = self.inner.result.borrow();
        let result = &result.as_ref().expect("browser always holds a result").result;
        let state = result.state();

        let flags = display_flags(&state, |page: &ResourcePage<Planet>| page.results.is_empty());

        let (items, total_count, has_next, has_previous) = match state.query_data() {
            Some(data) => {
                let page = &data.data;
                let mut items = page.results.clone();
                items.sort_by(|a, b| a.name.cmp(&b.name));
                (items, page.count, page.next.is_some(), page.previous.is_some())
            }
            None => (Vec::new(), 0, false, false),
        };

        PlanetListVm {
            items,
            total_count,
            page: self.inner.page.get(),
            total_pages: total_pages(total_count, self.inner.catalog.config().page_size),
            has_next,
            has_previous,
            search: self.inner.raw_search.borrow().clone(),
            flags,
            error: state.error().cloned(),
        }
    }

}

impl Drop for PlanetBrowser {
    fn drop(&mut self) {
        // Tear the query subscription down with the browser; the cache
        // entry itself lives on until its gc window elapses.
        if let Some(old) = self.inner.result.borrow_mut().take() {
            old.result.unsubscribe(old.listener);
        }
        self.inner.debouncer.cancel();
    }
}

impl BrowserInner {
    fn notify(inner: &Rc<Self>) {
        let listeners = inner
            .listeners
            .borrow()
            .values()
            .cloned()
            .collect::<Vec<_>>();
        for listener in listeners {
            listener();
        }
    }

    fn filter_for_page(inner: &Rc<Self>, page: u32) -> PlanetsFilter {
        PlanetsFilter::new(page, &inner.debounced_search.borrow())
    }

    fn clamp_page(inner: &Rc<Self>, page: u32) -> u32 {
        let page = page.max(DEFAULT_PAGE);
        let result = inner.result.borrow();
        let total = result
            .as_ref()
            .and_then(|r| r.result.state().query_data().map(|d| d.data.count))
            .map(|count| total_pages(count, inner.catalog.config().page_size));
        match total {
            Some(total) if total > 0 => page.min(total),
            _ => page,
        }
    }

    fn apply_search(inner: &Rc<Self>, value: String) {
        if *inner.debounced_search.borrow() == value {
            return;
        }
        *inner.debounced_search.borrow_mut() = value;
        inner.page.set(DEFAULT_PAGE);
        Self::requery(inner);
        Self::sync_url(inner);
        Self::notify(inner);
    }

    fn requery(inner: &Rc<Self>) {
        let filter = Self::filter_for_page(inner, inner.page.get());
        let result = inner.catalog.use_planets(filter);

        let weak = Rc::downgrade(inner);
        let listener = result.subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                BrowserInner::notify(&inner);
            }
        });

        if let Some(old) = inner.result.borrow_mut().take() {
            old.result.unsubscribe(old.listener);
        }
        *inner.result.borrow_mut() = Some(ListResult { result, listener });
    }

    fn sync_url(inner: &Rc<Self>) {
        if let Some(sink) = inner.sink.borrow().as_ref() {
            sync_query_string(
                sink.as_ref(),
                inner.page.get(),
                DEFAULT_PAGE,
                &inner.debounced_search.borrow(),
            );
        }
    }
}

fn total_pages(count: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    ((count + u64::from(page_size) - 1) / u64::from(page_size)) as u32
}

/// A batch of related resources as a view renders it.
#[derive(Debug, Clone)]
pub struct RelatedVm<T> {
    /// The resolved records, in the source array's order. `None` until the
    /// batch has loaded, and for batches with nothing to fetch.
    pub items: Option<Vec<T>>,
    /// Whether the batch is currently fetching.
    pub is_loading: bool,
    /// The terminal error, when the batch failed.
    pub error: Option<ApiError>,
}

impl<T> Default for RelatedVm<T> {
    fn default() -> Self {
        Self {
            items: None,
            is_loading: false,
            error: None,
        }
    }
}

/// Everything a planet detail view renders from.
#[derive(Debug, Clone)]
pub struct PlanetDetailVm {
    /// The planet, once loaded.
    pub planet: Option<Planet>,
    /// Display state of the planet record itself.
    pub flags: DisplayFlags,
    /// Whether the id does not exist upstream, distinct from other
    /// failures so the view can render a not-found page.
    pub not_found: bool,
    /// The terminal error, when the detail fetch failed.
    pub error: Option<ApiError>,
    /// The planet's films.
    pub films: RelatedVm<Film>,
    /// The planet's residents, with species and vehicles inlined.
    pub residents: RelatedVm<ResidentView>,
}

struct RelatedSlot<T: 'static> {
    result: QueryResult<Vec<T>, ApiError>,
    listener: ListenerKey,
    disabled: bool,
}

struct DetailInner {
    catalog: Catalog,
    planet: RefCell<Option<ListenerBearing<Planet>>>,
    films: RefCell<Option<RelatedSlot<Film>>>,
    residents: RefCell<Option<RelatedSlot<ResidentView>>>,
    listeners: RefCell<SlotMap<SubscriptionKey, Rc<dyn Fn()>>>,
}

struct ListenerBearing<V: 'static> {
    result: QueryResult<V, ApiError>,
    listener: ListenerKey,
}

/// View model for one planet's detail view, including its related films
/// and residents.
pub struct PlanetDetail {
    inner: Rc<DetailInner>,
}

impl PlanetDetail {
    /// A detail view model for the given planet id.
    pub fn new(catalog: Catalog, id: u64) -> Self {
        let inner = Rc::new(DetailInner {
            catalog,
            planet: RefCell::new(None),
            films: RefCell::new(None),
            residents: RefCell::new(None),
            listeners: RefCell::new(SlotMap::with_key()),
        });

        let result = inner.catalog.use_planet(id);
        let weak = Rc::downgrade(&inner);
        let listener = result.subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                DetailInner::ensure_related(&inner);
                DetailInner::notify(&inner);
            }
        });
        *inner.planet.borrow_mut() = Some(ListenerBearing { result, listener });

        // A cache hit may already hold the planet, in which case no state
        // transition will ever fire for it.
        DetailInner::ensure_related(&inner);

        Self { inner }
    }

    /// Register a change-notification callback.
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> SubscriptionKey {
        self.inner.listeners.borrow_mut().insert(Rc::new(callback))
    }

    /// Remove a change-notification callback.
    pub fn unsubscribe(&self, key: SubscriptionKey) -> bool {
        self.inner.listeners.borrow_mut().remove(key).is_some()
    }

    /// Re-trigger the planet fetch, e.g. from a retry affordance.
    pub fn retry(&self) {
        if let Some(planet) = self.inner.planet.borrow().as_ref() {
            planet.result.refetch();
        }
    }

    /// The current render state.
    pub fn snapshot(&self) -> PlanetDetailVm {
        let planet_slot = self.inner.planet.borrow();
        let planet_result = &planet_slot.as_ref().expect("detail always holds a result").result;
        let state = planet_result.state();

        let flags = display_flags(&state, |_: &Planet| false);
        let error = state.error().cloned();
        let not_found = matches!(error, Some(ApiError::NotFound));

        PlanetDetailVm {
            planet: state.data().cloned(),
            flags,
            not_found,
            error,
            films: related_vm(&self.inner.films.borrow()),
            residents: related_vm(&self.inner.residents.borrow()),
        }
    }
}

impl Drop for PlanetDetail {
    fn drop(&mut self) {
        if let Some(planet) = self.inner.planet.borrow_mut().take() {
            planet.result.unsubscribe(planet.listener);
        }
        if let Some(films) = self.inner.films.borrow_mut().take() {
            films.result.unsubscribe(films.listener);
        }
        if let Some(residents) = self.inner.residents.borrow_mut().take() {
            residents.result.unsubscribe(residents.listener);
        }
    }
}

impl DetailInner {
    fn notify(inner: &Rc<Self>) {
        let listeners = inner
            .listeners
            .borrow()
            .values()
            .cloned()
            .collect::<Vec<_>>();
        for listener in listeners {
            listener();
        }
    }

    /// Create the films/residents batch queries once the planet's URL
    /// arrays are known.
    fn ensure_related(inner: &Rc<Self>) {
        let planet = {
            let slot = inner.planet.borrow();
            slot.as_ref().and_then(|p| p.result.data())
        };
        let Some(planet) = planet else {
            return;
        };

        if inner.films.borrow().is_none() {
            let result = inner.catalog.use_films(&planet.films);
            let weak = Rc::downgrade(inner);
            let listener = result.subscribe(move |_| {
                if let Some(inner) = weak.upgrade() {
                    DetailInner::notify(&inner);
                }
            });
            *inner.films.borrow_mut() = Some(RelatedSlot {
                result,
                listener,
                disabled: planet.films.is_empty(),
            });
        }

        if inner.residents.borrow().is_none() {
            let result = inner.catalog.use_residents(&planet.residents);
            let weak = Rc::downgrade(inner);
            let listener = result.subscribe(move |_| {
                if let Some(inner) = weak.upgrade() {
                    DetailInner::notify(&inner);
                }
            });
            *inner.residents.borrow_mut() = Some(RelatedSlot {
                result,
                listener,
                disabled: planet.residents.is_empty(),
            });
        }
    }
}

fn related_vm<T: Clone + std::fmt::Debug + 'static>(
    slot: &Option<RelatedSlot<T>>,
) -> RelatedVm<T> {
    let Some(slot) = slot.as_ref() else {
        return RelatedVm::default();
    };
    let state = slot.result.state();
    let is_loading =
        !slot.disabled && matches!(state, QueryState::Created | QueryState::Loading);
    RelatedVm {
        items: state.data().cloned(),
        is_loading,
        error: state.error().cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holocron_query::{Instant, QueryData};
    use std::time::Duration;

    fn planet(name: &str) -> Planet {
        Planet {
            name: name.into(),
            rotation_period: "24".into(),
            orbital_period: "365".into(),
            diameter: "10000".into(),
            climate: "temperate".into(),
            gravity: "1 standard".into(),
            terrain: "plains".into(),
            surface_water: "unknown".into(),
            population: "unknown".into(),
            residents: Vec::new(),
            films: Vec::new(),
            created: "2014-12-09T13:50:49.641000Z".into(),
            edited: "2014-12-20T20:58:18.411000Z".into(),
            url: "https://swapi.dev/api/planets/1/".into(),
        }
    }

    fn page(names: &[&str]) -> ResourcePage<Planet> {
        ResourcePage {
            count: names.len() as u64,
            next: None,
            previous: None,
            results: names.iter().map(|name| planet(name)).collect(),
        }
    }

    fn data(value: ResourcePage<Planet>) -> QueryData<ResourcePage<Planet>> {
        QueryData::at(value, Instant(Duration::from_secs(0)))
    }

    type ListState = QueryState<ResourcePage<Planet>, ApiError>;

    fn all_states() -> Vec<ListState> {
        vec![
            QueryState::Created,
            QueryState::Loading,
            QueryState::Fetching(data(page(&["Hoth"]))),
            QueryState::Fetching(data(page(&[]))),
            QueryState::Loaded(data(page(&["Hoth"]))),
            QueryState::Loaded(data(page(&[]))),
            QueryState::Invalid(data(page(&["Hoth"]))),
            QueryState::Errored {
                error: ApiError::Status(500),
                previous: None,
            },
            QueryState::Errored {
                error: ApiError::Status(500),
                previous: Some(data(page(&["Hoth"]))),
            },
        ]
    }

    #[test]
    fn display_states_are_mutually_exclusive() {
        for state in all_states() {
            let flags = display_flags(&state, |page| page.results.is_empty());
            let active = [flags.show_skeleton, flags.show_error, flags.show_empty]
                .iter()
                .filter(|flag| **flag)
                .count();
            assert!(
                active <= 1,
                "more than one display state active for {state:?}: {flags:?}"
            );
            assert!(
                !(flags.is_syncing && flags.show_skeleton),
                "syncing during skeleton for {state:?}"
            );
            assert!(
                !(flags.is_syncing && flags.show_error),
                "syncing during error for {state:?}"
            );
        }
    }

    #[test]
    fn skeleton_only_before_first_data() {
        let loading: ListState = QueryState::Loading;
        assert!(display_flags(&loading, |p| p.results.is_empty()).show_skeleton);

        let revalidating: ListState = QueryState::Fetching(data(page(&["Hoth"])));
        let flags = display_flags(&revalidating, |p| p.results.is_empty());
        assert!(!flags.show_skeleton);
        assert!(flags.is_syncing);
    }

    #[test]
    fn empty_only_on_successful_empty_result() {
        let loaded_empty: ListState = QueryState::Loaded(data(page(&[])));
        assert!(display_flags(&loaded_empty, |p| p.results.is_empty()).show_empty);

        let loaded: ListState = QueryState::Loaded(data(page(&["Hoth"])));
        let flags = display_flags(&loaded, |p| p.results.is_empty());
        assert_eq!(flags, DisplayFlags::default());
    }

    #[test]
    fn background_failure_with_data_shows_neither_error_nor_skeleton() {
        let state: ListState = QueryState::Errored {
            error: ApiError::Network("reset".into()),
            previous: Some(data(page(&["Hoth"]))),
        };
        let flags = display_flags(&state, |p| p.results.is_empty());
        assert_eq!(flags, DisplayFlags::default());
    }

    #[test]
    fn total_pages_arithmetic() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(25, 10), 3);
        assert_eq!(total_pages(60, 10), 6);
    }
}
