//! Detail-view scenarios: the not-found discriminator, related-resource
//! batches (ordering, expansion, fail-fast), and the empty-batch
//! short-circuit.

mod common;

use std::rc::Rc;
use std::time::Duration;

use common::*;
use holocron_catalog::{ApiError, Catalog, CatalogConfig, Planet, PlanetDetail};
use holocron_query::TestRuntime;

fn setup(planets: Vec<Planet>) -> (Rc<TestRuntime>, Rc<FakeApi>, Catalog) {
    init_test_logging();
    let runtime = Rc::new(TestRuntime::new());
    let api = FakeApi::new(planets);
    let catalog = Catalog::new(runtime.clone(), api.clone(), CatalogConfig::default());
    (runtime, api, catalog)
}

fn tatooine() -> Planet {
    let mut tatooine = planet(1, "Tatooine");
    tatooine.films = vec![film_url(1), film_url(2), film_url(3)];
    tatooine.residents = vec![person_url(1), person_url(2)];
    tatooine
}

fn stage_related(api: &FakeApi) {
    api.stage_related(&film_url(1), serde_json::to_value(film(1, "A New Hope")).unwrap());
    api.stage_related(
        &film_url(2),
        serde_json::to_value(film(2, "The Empire Strikes Back")).unwrap(),
    );
    api.stage_related(
        &film_url(3),
        serde_json::to_value(film(3, "Return of the Jedi")).unwrap(),
    );

    api.stage_related(
        &person_url(1),
        serde_json::to_value(person(
            1,
            "Luke Skywalker",
            vec![species_url(1)],
            vec![vehicle_url(1), vehicle_url(2)],
        ))
        .unwrap(),
    );
    api.stage_related(
        &person_url(2),
        serde_json::to_value(person(2, "C-3PO", Vec::new(), Vec::new())).unwrap(),
    );
    api.stage_related(&species_url(1), serde_json::to_value(species(1, "Human")).unwrap());
    api.stage_related(
        &vehicle_url(1),
        serde_json::to_value(vehicle(1, "Snowspeeder")).unwrap(),
    );
    api.stage_related(
        &vehicle_url(2),
        serde_json::to_value(vehicle(2, "Imperial Speeder Bike")).unwrap(),
    );
}

#[test]
fn missing_ids_surface_as_not_found() {
    let (runtime, api, catalog) = setup(vec![planet(1, "Tatooine")]);
    let detail = PlanetDetail::new(catalog, 999);
    runtime.tick();

    let vm = detail.snapshot();
    assert!(vm.not_found, "404 must be distinguishable");
    assert!(vm.flags.show_error);
    assert_eq!(vm.error, Some(ApiError::NotFound));
    assert!(vm.planet.is_none());
    // Not-found is deterministic; the retry schedule must not have
    // re-requested it.
    assert_eq!(api.calls.planet.get(), 1);
}

#[test]
fn detail_loads_planet_then_related_batches() {
    let (runtime, api, catalog) = setup(vec![tatooine()]);
    stage_related(&api);

    let detail = PlanetDetail::new(catalog, 1);
    let vm = detail.snapshot();
    assert!(vm.flags.show_skeleton);

    runtime.tick();
    let vm = detail.snapshot();
    assert_eq!(vm.planet.as_ref().map(|p| p.name.as_str()), Some("Tatooine"));
    assert!(!vm.not_found);

    let films = vm.films.items.expect("films resolved");
    assert_eq!(
        films.iter().map(|f| f.title.as_str()).collect::<Vec<_>>(),
        vec!["A New Hope", "The Empire Strikes Back", "Return of the Jedi"]
    );

    let residents = vm.residents.items.expect("residents resolved");
    assert_eq!(residents.len(), 2);
    assert_eq!(residents[0].person.name, "Luke Skywalker");
    assert_eq!(residents[0].species[0].name, "Human");
    assert_eq!(
        residents[0]
            .vehicles
            .iter()
            .map(|v| v.name.as_str())
            .collect::<Vec<_>>(),
        vec!["Snowspeeder", "Imperial Speeder Bike"]
    );
    assert_eq!(residents[1].person.name, "C-3PO");
    assert!(residents[1].species.is_empty());
    assert!(residents[1].vehicles.is_empty());
}

#[test]
fn batch_results_keep_input_order_under_out_of_order_arrival() {
    let (runtime, api, catalog) = setup(vec![tatooine()]);
    stage_related(&api);

    // The first film resolves last.
    let gate = api.gate(&film_url(1));

    let detail = PlanetDetail::new(catalog, 1);
    runtime.tick();

    let vm = detail.snapshot();
    assert!(vm.films.items.is_none(), "batch is all-or-nothing");
    assert!(vm.films.is_loading);

    let _ = gate.send(());
    runtime.tick();

    let films = detail.snapshot().films.items.expect("films resolved");
    assert_eq!(
        films.iter().map(|f| f.title.as_str()).collect::<Vec<_>>(),
        vec!["A New Hope", "The Empire Strikes Back", "Return of the Jedi"],
        "assembly order is the input order, not arrival order"
    );
}

#[test]
fn one_failed_member_fails_the_whole_batch() {
    let (runtime, api, catalog) = setup(vec![tatooine()]);
    stage_related(&api);
    // Decode failures are not retryable, so the batch settles immediately.
    api.stage_related_error(&vehicle_url(2), ApiError::Decode("mangled".into()));

    let detail = PlanetDetail::new(catalog, 1);
    runtime.tick();

    let vm = detail.snapshot();
    assert!(
        vm.residents.items.is_none(),
        "no partial-success merging for the residents batch"
    );
    assert_eq!(vm.residents.error, Some(ApiError::Decode("mangled".into())));
    // The films batch is an independent cache entry and still resolves.
    assert!(vm.films.items.is_some());
}

#[test]
fn transient_batch_failures_are_retried() {
    let (runtime, api, catalog) = setup(vec![tatooine()]);
    stage_related(&api);
    api.stage_related_error(&film_url(2), ApiError::Status(503));

    let detail = PlanetDetail::new(catalog, 1);
    runtime.tick();

    // Heal the upstream before the first retry fires.
    api.stage_related(
        &film_url(2),
        serde_json::to_value(film(2, "The Empire Strikes Back")).unwrap(),
    );
    runtime.advance(Duration::from_millis(500));

    let vm = detail.snapshot();
    let films = vm.films.items.expect("films resolved after retry");
    assert_eq!(films.len(), 3);
    assert!(vm.films.error.is_none());
}

#[test]
fn empty_url_sets_never_touch_the_network() {
    let (runtime, api, catalog) = setup(vec![planet(1, "Dagobah")]);

    let detail = PlanetDetail::new(catalog, 1);
    runtime.tick();

    let vm = detail.snapshot();
    assert!(vm.planet.is_some());
    assert!(vm.films.items.is_none());
    assert!(!vm.films.is_loading, "empty batches are not pending");
    assert!(vm.films.error.is_none());
    assert!(vm.residents.items.is_none());
    assert!(!vm.residents.is_loading);
    assert_eq!(api.calls.related.get(), 0, "no request for empty URL sets");
}

#[test]
fn two_detail_views_share_one_planet_request() {
    let (runtime, api, catalog) = setup(vec![tatooine()]);
    stage_related(&api);

    let first = PlanetDetail::new(catalog.clone(), 1);
    let second = PlanetDetail::new(catalog, 1);
    runtime.tick();

    assert_eq!(api.calls.planet.get(), 1);
    assert_eq!(
        first.snapshot().planet.map(|p| p.name),
        second.snapshot().planet.map(|p| p.name)
    );
}

#[test]
fn detail_retry_refetches_after_failure() {
    let (runtime, api, catalog) = setup(vec![tatooine()]);
    stage_related(&api);

    // Id 7 does not exist in the dataset.
    let detail = PlanetDetail::new(catalog, 7);
    runtime.tick();
    let vm = detail.snapshot();
    assert!(vm.not_found);

    detail.retry();
    runtime.tick();
    assert!(detail.snapshot().not_found, "still missing upstream");
    assert_eq!(api.calls.planet.get(), 2);
}
