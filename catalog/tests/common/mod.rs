//! In-memory catalog API for driving the query layer and the view models
//! without a network.
#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

use async_trait::async_trait;
use futures_channel::oneshot;
use serde_json::Value;

use holocron_catalog::model::{resource_id, Film, Person, Planet, ResourcePage, Species, Vehicle};
use holocron_catalog::{ApiError, CatalogApi, PlanetsFilter};

pub const PAGE_SIZE: usize = 10;

/// Route cache events and retry warnings to stderr when a test fails.
pub fn init_test_logging() {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .init();
}

#[derive(Default)]
pub struct Calls {
    pub planets: Cell<u32>,
    pub planet: Cell<u32>,
    pub related: Cell<u32>,
}

/// Scriptable [`CatalogApi`]: a fixed planet dataset, a URL-indexed map of
/// related resources, optional failure injection, and per-URL gates for
/// controlling response order.
pub struct FakeApi {
    planets: RefCell<Vec<Planet>>,
    related: RefCell<HashMap<String, Result<Value, ApiError>>>,
    gates: RefCell<HashMap<String, oneshot::Receiver<()>>>,
    list_gate: RefCell<Option<oneshot::Receiver<()>>>,
    fail_planets: Cell<u32>,
    pub calls: Calls,
}

impl FakeApi {
    pub fn new(planets: Vec<Planet>) -> Rc<Self> {
        Rc::new(Self {
            planets: RefCell::new(planets),
            related: RefCell::new(HashMap::new()),
            gates: RefCell::new(HashMap::new()),
            list_gate: RefCell::new(None),
            fail_planets: Cell::new(0),
            calls: Calls::default(),
        })
    }

    /// Replace a planet record, as if the dataset changed server-side.
    pub fn rename_planet(&self, url: &str, new_name: &str) {
        let mut planets = self.planets.borrow_mut();
        if let Some(planet) = planets.iter_mut().find(|p| p.url == url) {
            planet.name = new_name.to_string();
        }
    }

    /// Serve `value` for `url` on related-resource fetches.
    pub fn stage_related(&self, url: &str, value: Value) {
        self.related.borrow_mut().insert(url.to_string(), Ok(value));
    }

    /// Serve an error for `url` on related-resource fetches.
    pub fn stage_related_error(&self, url: &str, error: ApiError) {
        self.related.borrow_mut().insert(url.to_string(), Err(error));
    }

    /// Hold the response for `url` until the returned sender fires.
    pub fn gate(&self, url: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.borrow_mut().insert(url.to_string(), rx);
        tx
    }

    /// Hold the next collection fetch until the returned sender fires.
    pub fn gate_next_planet_list(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.list_gate.borrow_mut() = Some(rx);
        tx
    }

    /// Fail the next `n` collection fetches with a 500.
    pub fn fail_next_planet_lists(&self, n: u32) {
        self.fail_planets.set(n);
    }
}

#[async_trait(?Send)]
impl CatalogApi for FakeApi {
    async fn planets(&self, filter: &PlanetsFilter) -> Result<ResourcePage<Planet>, ApiError> {
        self.calls.planets.set(self.calls.planets.get() + 1);

        let remaining = self.fail_planets.get();
        if remaining > 0 {
            self.fail_planets.set(remaining - 1);
            return Err(ApiError::Status(500));
        }

        let gate = self.list_gate.borrow_mut().take();
        if let Some(gate) = gate {
            gate.await.ok();
        }

        let matches: Vec<Planet> = {
            let planets = self.planets.borrow();
            match filter.search() {
                Some(term) => {
                    let term = term.to_lowercase();
                    planets
                        .iter()
                        .filter(|p| p.name.to_lowercase().contains(&term))
                        .cloned()
                        .collect()
                }
                None => planets.clone(),
            }
        };

        let count = matches.len();
        let page = filter.page_number() as usize;
        let start = (page - 1) * PAGE_SIZE;
        let results: Vec<Planet> = matches.into_iter().skip(start).take(PAGE_SIZE).collect();

        Ok(ResourcePage {
            count: count as u64,
            next: (page * PAGE_SIZE < count)
                .then(|| format!("http://fake/planets/?page={}", page + 1)),
            previous: (page > 1).then(|| format!("http://fake/planets/?page={}", page - 1)),
            results,
        })
    }

    async fn planet(&self, id: u64) -> Result<Planet, ApiError> {
        self.calls.planet.set(self.calls.planet.get() + 1);
        self.planets
            .borrow()
            .iter()
            .find(|p| resource_id(&p.url) == Some(id))
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn related(&self, url: &str) -> Result<Value, ApiError> {
        self.calls.related.set(self.calls.related.get() + 1);

        let gate = self.gates.borrow_mut().remove(url);
        if let Some(gate) = gate {
            gate.await.ok();
        }

        self.related
            .borrow()
            .get(url)
            .cloned()
            .unwrap_or(Err(ApiError::NotFound))
    }
}

/// In-memory address bar.
#[derive(Default)]
pub struct RecordingSink {
    query: RefCell<String>,
    pub replacements: Cell<u32>,
}

impl holocron_catalog::url_state::HistorySink for RecordingSink {
    fn query(&self) -> String {
        self.query.borrow().clone()
    }

    fn replace_query(&self, query: &str) {
        *self.query.borrow_mut() = query.to_string();
        self.replacements.set(self.replacements.get() + 1);
    }
}

impl RecordingSink {
    pub fn current(&self) -> String {
        self.query.borrow().clone()
    }
}

pub fn planet(id: u64, name: &str) -> Planet {
    Planet {
        name: name.to_string(),
        rotation_period: "24".into(),
        orbital_period: "365".into(),
        diameter: "10465".into(),
        climate: "arid".into(),
        gravity: "1 standard".into(),
        terrain: "desert".into(),
        surface_water: "1".into(),
        population: "unknown".into(),
        residents: Vec::new(),
        films: Vec::new(),
        created: "2014-12-09T13:50:49.641000Z".into(),
        edited: "2014-12-20T20:58:18.411000Z".into(),
        url: format!("http://fake/planets/{id}/"),
    }
}

pub fn film(id: u64, title: &str) -> Film {
    Film {
        title: title.to_string(),
        episode_id: id as u32,
        opening_crawl: "It is a period of civil war.".into(),
        director: "George Lucas".into(),
        producer: "Gary Kurtz, Rick McCallum".into(),
        release_date: "1977-05-25".into(),
        characters: Vec::new(),
        planets: Vec::new(),
        starships: Vec::new(),
        vehicles: Vec::new(),
        species: Vec::new(),
        created: "2014-12-10T14:23:31.880000Z".into(),
        edited: "2014-12-20T19:49:45.256000Z".into(),
        url: film_url(id),
    }
}

pub fn film_url(id: u64) -> String {
    format!("http://fake/films/{id}/")
}

pub fn person(id: u64, name: &str, species: Vec<String>, vehicles: Vec<String>) -> Person {
    Person {
        name: name.to_string(),
        height: "172".into(),
        mass: "77".into(),
        hair_color: "blond".into(),
        skin_color: "fair".into(),
        eye_color: "blue".into(),
        birth_year: "19BBY".into(),
        gender: "male".into(),
        homeworld: "http://fake/planets/1/".into(),
        films: Vec::new(),
        species,
        vehicles,
        starships: Vec::new(),
        created: "2014-12-09T13:50:51.644000Z".into(),
        edited: "2014-12-20T21:17:56.891000Z".into(),
        url: person_url(id),
    }
}

pub fn person_url(id: u64) -> String {
    format!("http://fake/people/{id}/")
}

pub fn species(id: u64, name: &str) -> Species {
    Species {
        name: name.to_string(),
        classification: "mammal".into(),
        designation: "sentient".into(),
        average_height: "180".into(),
        skin_colors: "caucasian, black".into(),
        hair_colors: "blonde, brown".into(),
        eye_colors: "brown, blue".into(),
        average_lifespan: "120".into(),
        homeworld: None,
        language: "Galactic Basic".into(),
        people: Vec::new(),
        films: Vec::new(),
        created: "2014-12-10T13:52:11.567000Z".into(),
        edited: "2014-12-20T21:36:42.136000Z".into(),
        url: species_url(id),
    }
}

pub fn species_url(id: u64) -> String {
    format!("http://fake/species/{id}/")
}

pub fn vehicle(id: u64, name: &str) -> Vehicle {
    Vehicle {
        name: name.to_string(),
        model: "T-16 skyhopper".into(),
        manufacturer: "Incom Corporation".into(),
        cost_in_credits: "14500".into(),
        length: "10.4".into(),
        max_atmosphering_speed: "1200".into(),
        crew: "1".into(),
        passengers: "1".into(),
        cargo_capacity: "50".into(),
        consumables: "0".into(),
        vehicle_class: "repulsorcraft".into(),
        pilots: Vec::new(),
        films: Vec::new(),
        created: "2014-12-10T16:01:52.434000Z".into(),
        edited: "2014-12-20T21:30:21.661000Z".into(),
        url: vehicle_url(id),
    }
}

pub fn vehicle_url(id: u64) -> String {
    format!("http://fake/vehicles/{id}/")
}
