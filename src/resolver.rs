// ═══════════════════════════════════════════════════════════
// Chain resolver — coordinates → place → country → neighbour
// ═══════════════════════════════════════════════════════════
//
//  where_am_i            position → reverse geocode → country by name
//                        → render primary → "You are in {city}, {country}"
//  country_and_neighbour country by name → render primary
//                        → neighbor_codes[0] → country by code → render neighbour
//
// Stages run strictly one after another. The first failing stage skips
// everything after it and its error reaches the chain's only catch point,
// which renders it. A stage timeout, when set, guards every fetch.
// ═══════════════════════════════════════════════════════════

use std::time::Duration;

use crate::error::LookupError;
use crate::fetch::Fetcher;
use crate::model::{CountrySummary, GeoResult, LocationQuery};
use crate::render::{RenderContext, Renderer, Variant};
use crate::scheduler::Scheduler;
use crate::task::Task;
use crate::timer::with_timeout;

pub const GEOCODE_LABEL: &str = "Problem with geocoding";
pub const COUNTRY_LABEL: &str = "Country not found";

/// Base URLs of the two services.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub geocode_base: String,
    pub country_base: String,
    pub geocode_auth: Option<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            geocode_base: "https://geocode.xyz".into(),
            country_base: "https://restcountries.com".into(),
            geocode_auth: None,
        }
    }
}

impl Endpoints {
    pub fn geocode_url(&self, query: LocationQuery) -> String {
        let base = self.geocode_base.trim_end_matches('/');
        let mut url = format!("{}/{},{}?geoit=json", base, query.latitude, query.longitude);
        if let Some(key) = &self.geocode_auth {
            url.push_str("&auth=");
            url.push_str(&urlencoding::encode(key));
        }
        url
    }

    pub fn country_by_name_url(&self, name: &str) -> String {
        format!("{}/v2/name/{}", self.country_base.trim_end_matches('/'), urlencoding::encode(name))
    }

    pub fn country_by_code_url(&self, code: &str) -> String {
        format!("{}/v2/alpha/{}", self.country_base.trim_end_matches('/'), urlencoding::encode(code))
    }
}

#[derive(Clone)]
pub struct Resolver {
    fetcher: Fetcher,
    endpoints: Endpoints,
    stage_timeout: Option<Duration>,
}

impl Resolver {
    pub fn new(fetcher: Fetcher, endpoints: Endpoints) -> Self {
        Resolver { fetcher, endpoints, stage_timeout: None }
    }

    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.fetcher.scheduler()
    }

    fn guard<T: Clone + 'static>(&self, task: Task<T>) -> Task<T> {
        match self.stage_timeout {
            Some(limit) => with_timeout(&task, limit),
            None => task,
        }
    }

    // ── Stages ────────────────────────────────────────────────────────────────

    /// Stage 1: coordinates → place. A 2xx payload carrying the "006" code
    /// still fails, with `DomainRateLimited`.
    pub fn reverse_geocode(&self, query: LocationQuery) -> Task<GeoResult> {
        let url = self.endpoints.geocode_url(query);
        self.guard(self.fetcher.fetch_json(&url, GEOCODE_LABEL))
            .try_map(|json| GeoResult::from_json(json)?.validate())
            .inspect(|geo| tracing::info!(city = %geo.city, country = %geo.country, "reverse geocoded"))
    }

    /// Stage 2: country name → the first matching country.
    pub fn country_by_name(&self, name: &str) -> Task<CountrySummary> {
        let url = self.endpoints.country_by_name_url(name);
        self.guard(self.fetcher.fetch_json(&url, COUNTRY_LABEL))
            .try_map(CountrySummary::from_first_element)
            .inspect(|country| tracing::info!(country = %country.name, "country resolved"))
    }

    pub fn country_by_code(&self, code: &str) -> Task<CountrySummary> {
        let url = self.endpoints.country_by_code_url(code);
        self.guard(self.fetcher.fetch_json(&url, COUNTRY_LABEL))
            .try_map(CountrySummary::from_json)
            .inspect(|country| tracing::info!(country = %country.name, "neighbour resolved"))
    }

    /// Stages 1 then 2. The place itself is dropped once stage 2 starts.
    pub fn country_at(&self, query: LocationQuery) -> Task<CountrySummary> {
        let resolver = self.clone();
        self.reverse_geocode(query)
            .and_then(move |geo| resolver.country_by_name(&geo.country))
    }

    // ── Chains ────────────────────────────────────────────────────────────────

    /// Resolves and renders the country at `position`, fulfilling with a
    /// greeting naming the place.
    pub fn where_am_i<R: Renderer + 'static>(&self, position: Task<LocationQuery>, ctx: &RenderContext<R>) -> Task<String> {
        let resolver = self.clone();
        let render = ctx.clone();
        let catch = ctx.clone();

        position
            .and_then(move |query| {
                let next = resolver.clone();
                resolver.reverse_geocode(query).and_then(move |geo| {
                    next.country_by_name(&geo.country).map(move |country| (geo, country))
                })
            })
            .map(move |(geo, country)| {
                render.success(&country, Variant::Primary);
                format!("You are in {}, {}", geo.city, geo.country)
            })
            .inspect_err(move |error| {
                tracing::warn!(%error, "location lookup failed");
                catch.error(error);
            })
    }

    /// Renders a country and then its first neighbour.
    ///
    /// A country without neighbours fails the chain with `NoNeighbor` after the
    /// primary card has been rendered.
    pub fn country_and_neighbour<R: Renderer + 'static>(&self, name: &str, ctx: &RenderContext<R>) -> Task<CountrySummary> {
        let resolver = self.clone();
        let primary = ctx.clone();
        let neighbour = ctx.clone();
        let catch = ctx.clone();

        self.country_by_name(name)
            .inspect(move |country| primary.success(country, Variant::Primary))
            .try_map(|country| country.first_neighbour().map(str::to_string).ok_or(LookupError::NoNeighbor))
            .and_then(move |code| resolver.country_by_code(&code))
            .inspect(move |country| neighbour.success(country, Variant::Neighbour))
            .inspect_err(move |error| {
                tracing::warn!(%error, "country lookup failed");
                catch.error(error);
            })
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fetch::{HttpResponse, Transport};
    use crate::location::{FixedPosition, Geolocation};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Canned responses keyed by URL; anything else is a connection failure.
    #[derive(Default)]
    pub(crate) struct StubTransport {
        routes: HashMap<String, (u16, String)>,
        hits: Mutex<Vec<String>>,
    }

    impl StubTransport {
        pub(crate) fn route(mut self, url: &str, status: u16, body: Value) -> Self {
            self.routes.insert(url.to_string(), (status, body.to_string()));
            self
        }

        pub(crate) fn hits(&self) -> Vec<String> {
            self.hits.lock().expect("hits lock").clone()
        }
    }

    impl Transport for StubTransport {
        fn get(&self, url: &str) -> Result<HttpResponse, LookupError> {
            self.hits.lock().expect("hits lock").push(url.to_string());
            match self.routes.get(url) {
                Some((status, body)) => Ok(HttpResponse { status: *status, body: body.clone() }),
                None => Err(LookupError::Network(format!("connection refused: {}", url))),
            }
        }
    }

    #[derive(Default)]
    pub(crate) struct Recorder {
        pub(crate) successes: Vec<(String, Variant)>,
        pub(crate) errors: Vec<String>,
    }

    impl Renderer for Recorder {
        fn render_success(&mut self, country: &CountrySummary, variant: Variant) {
            self.successes.push((country.name.clone(), variant));
        }

        fn render_error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }
    }

    pub(crate) fn country(name: &str, borders: &[&str]) -> Value {
        json!({
            "name": name,
            "region": "Europe",
            "population": 83000000,
            "flag": format!("https://flagcdn.com/{}.svg", name.to_lowercase()),
            "languages": [{"name": "German"}],
            "currencies": [{"name": "Euro"}],
            "borders": borders,
        })
    }

    pub(crate) fn endpoints() -> Endpoints {
        Endpoints {
            geocode_base: "http://geo.test".into(),
            country_base: "http://countries.test".into(),
            geocode_auth: None,
        }
    }

    fn resolver(sched: &Scheduler, stub: StubTransport) -> (Resolver, Arc<StubTransport>) {
        let stub = Arc::new(stub);
        let fetcher = Fetcher::new(sched, stub.clone());
        (Resolver::new(fetcher, endpoints()), stub)
    }

    fn berlin() -> LocationQuery {
        LocationQuery { latitude: 52.508, longitude: 13.381 }
    }

    #[test]
    fn test_urls() {
        let mut ep = endpoints();
        assert_eq!(ep.geocode_url(berlin()), "http://geo.test/52.508,13.381?geoit=json");
        ep.geocode_auth = Some("k3y".into());
        assert_eq!(ep.geocode_url(berlin()), "http://geo.test/52.508,13.381?geoit=json&auth=k3y");
        assert_eq!(ep.country_by_name_url("united states"), "http://countries.test/v2/name/united%20states");
        assert_eq!(ep.country_by_code_url("AUT"), "http://countries.test/v2/alpha/AUT");
    }

    #[test]
    fn test_where_am_i_renders_country_and_greets() {
        let sched = Scheduler::new();
        let stub = StubTransport::default()
            .route("http://geo.test/52.508,13.381?geoit=json", 200, json!({"city": "Berlin", "country": "Germany"}))
            .route("http://countries.test/v2/name/Germany", 200, json!([country("Germany", &["AUT"])]));
        let (resolver, _) = resolver(&sched, stub);
        let ctx = RenderContext::new(Recorder::default());

        let position = FixedPosition(berlin()).current_position(&sched);
        let greeting = resolver.where_am_i(position, &ctx);
        sched.run();

        assert_eq!(greeting.outcome(), Some(Ok("You are in Berlin, Germany".to_string())));
        assert_eq!(ctx.renderer().successes, vec![("Germany".to_string(), Variant::Primary)]);
        assert!(ctx.renderer().errors.is_empty());
    }

    #[test]
    fn test_country_at_population_in_millions() {
        let sched = Scheduler::new();
        let stub = StubTransport::default()
            .route("http://geo.test/52.508,13.381?geoit=json", 200, json!({"city": "Berlin", "country": "Germany"}))
            .route("http://countries.test/v2/name/Germany", 200, json!([country("Germany", &[])]));
        let (resolver, _) = resolver(&sched, stub);

        let found = resolver.country_at(berlin());
        sched.run();

        let summary = found.outcome().expect("settled").expect("resolved");
        assert!((summary.population_millions - 83.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_limit_skips_country_stage() {
        let sched = Scheduler::new();
        let stub = StubTransport::default()
            .route("http://geo.test/52.508,13.381?geoit=json", 200, json!({"error": {"code": "006"}}));
        let (resolver, stub) = resolver(&sched, stub);
        let ctx = RenderContext::new(Recorder::default());

        let greeting = resolver.where_am_i(Task::succeeded(&sched, berlin()), &ctx);
        sched.run();

        assert_eq!(greeting.outcome(), Some(Err(LookupError::DomainRateLimited)));
        assert_eq!(stub.hits().len(), 1);
        assert_eq!(
            ctx.renderer().errors,
            vec!["Something went wrong 💥 rate limit exceeded, try again in a moment".to_string()]
        );
        assert!(ctx.renderer().successes.is_empty());
    }

    #[test]
    fn test_geocode_status_failure_skips_country_stage() {
        let sched = Scheduler::new();
        let stub = StubTransport::default().route("http://geo.test/52.508,13.381?geoit=json", 403, json!({}));
        let (resolver, stub) = resolver(&sched, stub);

        let found = resolver.country_at(berlin());
        sched.run();

        assert_eq!(found.outcome(), Some(Err(LookupError::http_status(403, GEOCODE_LABEL))));
        assert_eq!(stub.hits(), vec!["http://geo.test/52.508,13.381?geoit=json".to_string()]);
    }

    #[test]
    fn test_position_failure_is_rendered() {
        let sched = Scheduler::new();
        let (resolver, stub) = resolver(&sched, StubTransport::default());
        let ctx = RenderContext::new(Recorder::default());

        let position = Task::failed(&sched, LookupError::Location("permission denied".into()));
        let greeting = resolver.where_am_i(position, &ctx);
        sched.run();

        assert_eq!(greeting.outcome(), Some(Err(LookupError::Location("permission denied".into()))));
        assert!(stub.hits().is_empty());
        assert_eq!(ctx.renderer().errors.len(), 1);
    }

    #[test]
    fn test_country_and_neighbour_renders_both() {
        let sched = Scheduler::new();
        let stub = StubTransport::default()
            .route("http://countries.test/v2/name/Germany", 200, json!([country("Germany", &["AUT", "FRA"])]))
            .route("http://countries.test/v2/alpha/AUT", 200, country("Austria", &["DEU"]));
        let (resolver, _) = resolver(&sched, stub);
        let ctx = RenderContext::new(Recorder::default());

        let neighbour = resolver.country_and_neighbour("Germany", &ctx);
        sched.run();

        assert_eq!(neighbour.outcome().expect("settled").map(|c| c.name), Ok("Austria".to_string()));
        assert_eq!(
            ctx.renderer().successes,
            vec![("Germany".to_string(), Variant::Primary), ("Austria".to_string(), Variant::Neighbour)]
        );
    }

    #[test]
    fn test_no_neighbour_fails_after_primary() {
        let sched = Scheduler::new();
        let stub = StubTransport::default()
            .route("http://countries.test/v2/name/Australia", 200, json!([country("Australia", &[])]));
        let (resolver, stub) = resolver(&sched, stub);
        let ctx = RenderContext::new(Recorder::default());

        let neighbour = resolver.country_and_neighbour("Australia", &ctx);
        sched.run();

        assert_eq!(neighbour.outcome().map(|o| o.map(|c| c.name)), Some(Err(LookupError::NoNeighbor)));
        assert_eq!(ctx.renderer().successes, vec![("Australia".to_string(), Variant::Primary)]);
        assert_eq!(ctx.renderer().errors, vec!["Something went wrong 💥 no neighbour found".to_string()]);
        assert_eq!(stub.hits().len(), 1);
    }

    #[test]
    fn test_unknown_country_renders_status_error() {
        let sched = Scheduler::new();
        let stub = StubTransport::default()
            .route("http://countries.test/v2/name/adfkljasdf", 404, json!({"status": 404, "message": "Not Found"}));
        let (resolver, _) = resolver(&sched, stub);
        let ctx = RenderContext::new(Recorder::default());

        resolver.country_and_neighbour("adfkljasdf", &ctx);
        sched.run();

        assert_eq!(ctx.renderer().errors, vec!["Something went wrong 💥 Country not found (404)".to_string()]);
        assert!(ctx.renderer().successes.is_empty());
    }

    #[test]
    fn test_huge_stage_timeout_behaves_like_none() {
        let sched = Scheduler::new();
        let stub = StubTransport::default()
            .route("http://countries.test/v2/name/Germany", 200, json!([country("Germany", &["AUT"])]))
            .route("http://countries.test/v2/alpha/AUT", 200, country("Austria", &["DEU"]));
        let (resolver, _) = resolver(&sched, stub);
        let resolver = resolver.with_stage_timeout(Some(Duration::from_secs_f64(1e18)));
        let ctx = RenderContext::new(Recorder::default());

        let neighbour = resolver.country_and_neighbour("Germany", &ctx);
        sched.run();

        assert_eq!(neighbour.outcome().map(|o| o.map(|c| c.name)), Some(Ok("Austria".to_string())));
        assert!(!sched.has_work());
    }

    #[test]
    fn test_zero_stage_timeout_fails_the_chain() {
        let sched = Scheduler::new();
        let stub = StubTransport::default()
            .route("http://countries.test/v2/name/Germany", 200, json!([country("Germany", &["AUT"])]));
        let (resolver, _) = resolver(&sched, stub);
        let resolver = resolver.with_stage_timeout(Some(Duration::ZERO));
        let ctx = RenderContext::new(Recorder::default());

        let neighbour = resolver.country_and_neighbour("Germany", &ctx);
        sched.run();

        assert_eq!(neighbour.outcome().map(|o| o.map(|c| c.name)), Some(Err(LookupError::Timeout(Duration::ZERO))));
        assert!(ctx.renderer().successes.is_empty());
        assert_eq!(ctx.renderer().errors, vec!["Something went wrong 💥 timed out after 0.0s".to_string()]);
    }
}
