//! Address-bar query-string state.
//!
//! One-way read, one-way write: the reader derives `{page, search}` from
//! the current query string, the writer produces the canonical query string
//! and replaces the address-bar entry only when it actually changed. The
//! split avoids feedback loops between the two directions.

use std::{cell::RefCell, rc::Rc, time::Duration};

use holocron_query::{Runtime, TimeoutHandle};
use url::form_urlencoded;

/// The page number used when the URL carries none (or an invalid one).
pub const DEFAULT_PAGE: u32 = 1;

/// How long search input must rest before it propagates to the query layer
/// and the address bar.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Logical state mirrored into the address bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParams {
    /// 1-based page number.
    pub page: u32,
    /// Raw search text.
    pub search: String,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            search: String::new(),
        }
    }
}

impl QueryParams {
    /// Derive state from a query string, with or without the leading `?`.
    ///
    /// For repeated parameters the first occurrence wins; a first
    /// occurrence that fails validation (non-numeric or non-positive page)
    /// falls back to the default rather than trying later occurrences.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);

        let mut page: Option<String> = None;
        let mut search: Option<String> = None;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "page" if page.is_none() => page = Some(value.into_owned()),
                "search" if search.is_none() => search = Some(value.into_owned()),
                _ => {}
            }
        }

        Self {
            page: page
                .as_deref()
                .and_then(parse_page)
                .unwrap_or(DEFAULT_PAGE),
            search: search.unwrap_or_default(),
        }
    }
}

fn parse_page(raw: &str) -> Option<u32> {
    raw.parse::<u32>().ok().filter(|page| *page >= 1)
}

/// The canonical query string for a logical state: search is trimmed, the
/// page is omitted when it equals the default, the search is omitted when
/// blank. `page=2&search=hoth`, `search=hoth`, `page=2` or the empty
/// string.
pub fn canonical_query(page: u32, default_page: u32, search: &str) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    if page != default_page {
        query.append_pair("page", &page.to_string());
    }
    let search = search.trim();
    if !search.is_empty() {
        query.append_pair("search", search);
    }
    query.finish()
}

/// Where the canonical query string gets written: in a browser adapter,
/// `history.replaceState` over the address bar; in tests, an in-memory
/// fake.
pub trait HistorySink {
    /// The current query string, with or without the leading `?`.
    fn query(&self) -> String;
    /// Replace the current history entry's query string, without pushing a
    /// new entry and without scrolling.
    fn replace_query(&self, query: &str);
}

/// Write the canonical query string for the given state into the sink,
/// unless it already matches. Returns whether a replacement was made;
/// applying the same state twice never mutates the sink twice.
pub fn sync_query_string(
    sink: &dyn HistorySink,
    page: u32,
    default_page: u32,
    search: &str,
) -> bool {
    let canonical = canonical_query(page, default_page, search);
    let current = sink.query();
    let current = current.strip_prefix('?').unwrap_or(&current);
    if current == canonical {
        return false;
    }
    sink.replace_query(&canonical);
    true
}

/// Delays a callback until its input has rested for a fixed interval.
/// Re-arming cancels the previously scheduled callback, so no more than one
/// fires per quiet period.
pub struct Debouncer {
    runtime: Rc<dyn Runtime>,
    delay: Duration,
    pending: RefCell<Option<TimeoutHandle>>,
}

impl Debouncer {
    /// A debouncer scheduling on the given runtime.
    pub fn new(runtime: Rc<dyn Runtime>, delay: Duration) -> Self {
        Self {
            runtime,
            delay,
            pending: RefCell::new(None),
        }
    }

    /// Schedule `callback`, cancelling any callback still pending.
    pub fn debounce(&self, callback: impl FnOnce() + 'static) {
        self.cancel();
        let handle = self.runtime.set_timeout(self.delay, Box::new(callback));
        *self.pending.borrow_mut() = Some(handle);
    }

    /// Drop the pending callback, if any.
    pub fn cancel(&self) {
        if let Some(handle) = self.pending.borrow_mut().take() {
            handle.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn parse_defaults_when_params_are_absent() {
        assert_eq!(QueryParams::parse(""), QueryParams::default());
        assert_eq!(QueryParams::parse("?"), QueryParams::default());
        assert_eq!(
            QueryParams::parse("utm_source=x"),
            QueryParams::default(),
            "unknown params are ignored"
        );
    }

    #[test]
    fn parse_reads_page_and_search() {
        let params = QueryParams::parse("?page=3&search=hoth");
        assert_eq!(params.page, 3);
        assert_eq!(params.search, "hoth");
    }

    #[test]
    fn invalid_pages_fall_back_to_the_default() {
        assert_eq!(QueryParams::parse("page=abc").page, DEFAULT_PAGE);
        assert_eq!(QueryParams::parse("page=0").page, DEFAULT_PAGE);
        assert_eq!(QueryParams::parse("page=-2").page, DEFAULT_PAGE);
        assert_eq!(QueryParams::parse("page=").page, DEFAULT_PAGE);
    }

    #[test]
    fn first_occurrence_wins_even_when_invalid() {
        assert_eq!(QueryParams::parse("page=2&page=9").page, 2);
        // The first occurrence fails validation; the second is not
        // consulted.
        assert_eq!(QueryParams::parse("page=abc&page=9").page, DEFAULT_PAGE);
        assert_eq!(QueryParams::parse("search=a&search=b").search, "a");
    }

    #[test]
    fn canonical_query_omits_defaults() {
        assert_eq!(canonical_query(1, 1, ""), "");
        assert_eq!(canonical_query(1, 1, "   "), "");
        assert_eq!(canonical_query(2, 1, ""), "page=2");
        assert_eq!(canonical_query(1, 1, " hoth "), "search=hoth");
        assert_eq!(canonical_query(2, 1, "hoth"), "page=2&search=hoth");
    }

    struct FakeSink {
        query: RefCell<String>,
        replacements: Cell<u32>,
    }

    impl FakeSink {
        fn new(initial: &str) -> Self {
            Self {
                query: RefCell::new(initial.to_string()),
                replacements: Cell::new(0),
            }
        }
    }

    impl HistorySink for FakeSink {
        fn query(&self) -> String {
            self.query.borrow().clone()
        }

        fn replace_query(&self, query: &str) {
            *self.query.borrow_mut() = query.to_string();
            self.replacements.set(self.replacements.get() + 1);
        }
    }

    #[test]
    fn sync_replaces_only_on_change() {
        let sink = FakeSink::new("");

        assert!(sync_query_string(&sink, 2, DEFAULT_PAGE, "hoth"));
        assert_eq!(sink.query.borrow().as_str(), "page=2&search=hoth");
        assert_eq!(sink.replacements.get(), 1);

        // Idempotent: same logical state, no second mutation.
        assert!(!sync_query_string(&sink, 2, DEFAULT_PAGE, "hoth"));
        assert_eq!(sink.replacements.get(), 1);

        assert!(sync_query_string(&sink, 1, DEFAULT_PAGE, ""));
        assert_eq!(sink.query.borrow().as_str(), "");
        assert_eq!(sink.replacements.get(), 2);
    }

    #[test]
    fn sync_tolerates_a_leading_question_mark() {
        let sink = FakeSink::new("?page=2&search=hoth");
        assert!(!sync_query_string(&sink, 2, DEFAULT_PAGE, " hoth "));
        assert_eq!(sink.replacements.get(), 0);
    }

    #[test]
    fn debounce_collapses_rapid_calls() {
        let runtime = Rc::new(holocron_query::TestRuntime::new());
        let debouncer = Debouncer::new(runtime.clone(), SEARCH_DEBOUNCE);
        let fired: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        for value in ["t", "ta", "tat"] {
            let fired = fired.clone();
            debouncer.debounce(move || fired.borrow_mut().push(value));
        }

        runtime.advance(SEARCH_DEBOUNCE);
        assert_eq!(*fired.borrow(), vec!["tat"], "only the last value fires");

        runtime.advance(SEARCH_DEBOUNCE * 4);
        assert_eq!(fired.borrow().len(), 1, "nothing re-fires");
    }

    #[test]
    fn cancel_drops_the_pending_callback() {
        let runtime = Rc::new(holocron_query::TestRuntime::new());
        let debouncer = Debouncer::new(runtime.clone(), SEARCH_DEBOUNCE);
        let fired = Rc::new(Cell::new(false));

        let flag = fired.clone();
        debouncer.debounce(move || flag.set(true));
        debouncer.cancel();

        runtime.advance(SEARCH_DEBOUNCE * 2);
        assert!(!fired.get());
    }
}
