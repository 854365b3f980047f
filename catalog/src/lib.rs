#![forbid(unsafe_code)]

//! # Holocron Catalog
//!
//! The data layer of a Star Wars catalog browser over the public SWAPI:
//! a typed resource client, per-resource query scopes with
//! stale-while-revalidate caching (via [`holocron_query`]), URL-synchronized
//! list state with debounced search, and the composite view models a UI
//! adapter renders from.
//!
//! There is no rendering here and no framework coupling: a UI layer
//! constructs a [`Catalog`] on its runtime, builds a [`PlanetBrowser`] or
//! [`PlanetDetail`] per view, subscribes for change notification, and reads
//! snapshots.
//!
//! ```no_run
//! use std::rc::Rc;
//! use holocron_catalog::{Catalog, PlanetBrowser};
//! use holocron_catalog::url_state::QueryParams;
//! use holocron_query::TestRuntime;
//!
//! // Any Runtime implementation works: TokioRuntime inside a LocalSet,
//! // WasmRuntime in the browser, TestRuntime in tests.
//! let runtime = Rc::new(TestRuntime::new());
//! let catalog = Catalog::from_env(runtime.clone());
//! let browser = PlanetBrowser::new(catalog, QueryParams::parse("?page=2"));
//! browser.subscribe(|| { /* schedule a re-render */ });
//! let vm = browser.snapshot();
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod keys;
pub mod model;
pub mod queries;
pub mod url_state;
pub mod view_model;

pub use client::{CatalogApi, SwapiClient};
pub use config::CatalogConfig;
pub use error::ApiError;
pub use keys::{PlanetKey, PlanetsFilter, RelatedKey};
pub use model::{Film, Person, Planet, ResidentView, ResourcePage, Species, Vehicle};
pub use queries::Catalog;
pub use view_model::{
    DisplayFlags, PlanetBrowser, PlanetDetail, PlanetDetailVm, PlanetListVm, RelatedVm,
};
