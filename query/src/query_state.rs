use crate::Instant;

/// The lifecycle of a query.
///
/// Each variant corresponds to a particular state of a query in its
/// lifecycle, starting from creation and covering all possible transitions
/// up to invalidation and terminal failure.
#[derive(Clone, PartialEq, Eq)]
pub enum QueryState<V, E> {
    /// The initial state of a Query upon its creation.
    ///
    /// No fetching operation has been initiated yet. Disabled queries stay
    /// in this state indefinitely: no data, and not loading.
    Created,

    /// Query is fetching for the first time, with no previous data to show.
    Loading,

    /// A Query is in the process of fetching, not being its first fetch.
    ///
    /// The associated `QueryData<V>` holds the previously fetched data,
    /// which remains servable while the refetch is in flight.
    Fetching(QueryData<V>),

    /// The query has successfully completed a fetch operation.
    Loaded(QueryData<V>),

    /// The query has completed a fetch, but the fetched data is marked as
    /// invalid and will be refetched on next use.
    Invalid(QueryData<V>),

    /// The fetch failed and the retry schedule is exhausted.
    ///
    /// `previous` holds the last good data, if any was ever loaded. A
    /// background refetch that fails never discards still-usable data.
    Errored {
        /// The terminal error.
        error: E,
        /// The last successfully loaded data, if any.
        previous: Option<QueryData<V>>,
    },
}

impl<V, E> Default for QueryState<V, E> {
    fn default() -> Self {
        QueryState::Created
    }
}

impl<V, E> QueryState<V, E> {
    /// Returns the QueryData for the current QueryState, if present.
    pub fn query_data(&self) -> Option<&QueryData<V>> {
        match self {
            QueryState::Loading | QueryState::Created => None,
            QueryState::Fetching(data) | QueryState::Loaded(data) | QueryState::Invalid(data) => {
                Some(data)
            }
            QueryState::Errored { previous, .. } => previous.as_ref(),
        }
    }

    /// Returns the data contained within the QueryState, if present.
    pub fn data(&self) -> Option<&V> {
        self.query_data().map(|s| &s.data)
    }

    /// Returns the last updated timestamp for the QueryState, if present.
    pub fn updated_at(&self) -> Option<Instant> {
        self.query_data().map(|s| s.updated_at)
    }

    /// Returns the terminal error, if the query is in the errored state.
    pub fn error(&self) -> Option<&E> {
        match self {
            QueryState::Errored { error, .. } => Some(error),
            _ => None,
        }
    }

    pub(crate) fn data_mut(&mut self) -> Option<&mut V> {
        match self {
            QueryState::Loading | QueryState::Created => None,
            QueryState::Fetching(data) | QueryState::Loaded(data) | QueryState::Invalid(data) => {
                Some(&mut data.data)
            }
            QueryState::Errored { previous, .. } => previous.as_mut().map(|data| &mut data.data),
        }
    }
}

impl<V, E> std::fmt::Debug for QueryState<V, E>
where
    V: std::fmt::Debug,
    E: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Loading => write!(f, "Loading"),
            Self::Fetching(arg0) => f.debug_tuple("Fetching").field(arg0).finish(),
            Self::Loaded(arg0) => f.debug_tuple("Loaded").field(arg0).finish(),
            Self::Invalid(arg0) => f.debug_tuple("Invalid").field(arg0).finish(),
            Self::Errored { error, previous } => f
                .debug_struct("Errored")
                .field("error", error)
                .field("previous", previous)
                .finish(),
        }
    }
}

/// The latest data for a Query.
#[derive(Clone, PartialEq, Eq)]
pub struct QueryData<V> {
    /// The Data.
    pub data: V,
    /// The instant this data was retrieved.
    pub updated_at: Instant,
}

impl<V> QueryData<V> {
    /// Creates a new QueryData retrieved at the given instant.
    pub fn at(data: V, updated_at: Instant) -> Self {
        Self { data, updated_at }
    }
}

impl<V> std::fmt::Debug for QueryData<V>
where
    V: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryData")
            .field("data", &self.data)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}
