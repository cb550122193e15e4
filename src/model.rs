// ═══════════════════════════════════════════════════════════
// Domain values and their parse-and-validate step from JSON
// ═══════════════════════════════════════════════════════════
//
// Raw payloads are deserialised into private serde structs first and
// then checked field by field, so nothing untyped leaves this module.
// A required field that is missing becomes `LookupError::Payload`.
// ═══════════════════════════════════════════════════════════

use serde::Deserialize;
use serde_json::Value;

use crate::error::{LookupError, Outcome};

/// Code geocode.xyz puts in `error.code` when the caller is throttled.
pub const RATE_LIMIT_CODE: &str = "006";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationQuery {
    pub latitude: f64,
    pub longitude: f64,
}

/// Parsed reverse-geocode payload.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoResult {
    pub city: String,
    pub country: String,
    /// In-payload rejection code; set even when the HTTP status was 200.
    pub raw_error_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountrySummary {
    pub name: String,
    pub region: String,
    pub population_millions: f64,
    pub primary_language: String,
    pub primary_currency: String,
    pub flag_url: String,
    pub neighbor_codes: Vec<String>,
}

// ── Raw payloads ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct GeocodePayload {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    error: Option<GeocodeErrorPayload>,
}

#[derive(Deserialize)]
struct GeocodeErrorPayload {
    #[serde(default)]
    code: Option<Value>,
}

#[derive(Deserialize)]
struct CountryPayload {
    name: Option<String>,
    region: Option<String>,
    population: Option<f64>,
    flag: Option<String>,
    #[serde(default)]
    languages: Vec<NamedPayload>,
    #[serde(default)]
    currencies: Vec<NamedPayload>,
    #[serde(default)]
    borders: Vec<String>,
}

#[derive(Deserialize)]
struct NamedPayload {
    name: Option<String>,
}

fn required<T>(field: Option<T>, name: &str) -> Outcome<T> {
    field.ok_or_else(|| LookupError::Payload(format!("missing field `{}`", name)))
}

fn decode<T: for<'de> Deserialize<'de>>(value: Value, what: &str) -> Outcome<T> {
    serde_json::from_value(value).map_err(|e| LookupError::Payload(format!("{}: {}", what, e)))
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl GeoResult {
    pub fn from_json(value: Value) -> Outcome<Self> {
        let payload: GeocodePayload = decode(value, "reverse geocode")?;
        let raw_error_code = payload.error.and_then(|e| e.code).map(|code| match code {
            Value::String(s) => s,
            other => other.to_string(),
        });
        Ok(GeoResult {
            city: payload.city.unwrap_or_default(),
            country: payload.country.unwrap_or_default(),
            raw_error_code,
        })
    }

    pub fn is_rate_limited(&self) -> bool {
        self.raw_error_code.as_deref() == Some(RATE_LIMIT_CODE)
    }

    /// Checks that the payload can feed the country stage.
    pub fn validate(self) -> Outcome<Self> {
        if self.is_rate_limited() {
            return Err(LookupError::DomainRateLimited);
        }
        if self.country.trim().is_empty() {
            let detail = match &self.raw_error_code {
                Some(code) => format!("reverse geocode returned error code {}", code),
                None => "reverse geocode returned no country".to_string(),
            };
            return Err(LookupError::Payload(detail));
        }
        Ok(self)
    }
}

impl CountrySummary {
    /// Parses a single country object (the `/v2/alpha/{code}` shape).
    pub fn from_json(value: Value) -> Outcome<Self> {
        let payload: CountryPayload = decode(value, "country")?;
        let language = payload.languages.into_iter().next().and_then(|l| l.name);
        let currency = payload.currencies.into_iter().next().and_then(|c| c.name);

        Ok(CountrySummary {
            name: required(payload.name, "name")?,
            region: required(payload.region, "region")?,
            population_millions: required(payload.population, "population")? / 1_000_000.0,
            primary_language: required(language, "languages[0].name")?,
            primary_currency: required(currency, "currencies[0].name")?,
            flag_url: required(payload.flag, "flag")?,
            neighbor_codes: payload.borders,
        })
    }

    /// Parses the first element of a country array (the `/v2/name/{name}` shape).
    pub fn from_first_element(value: Value) -> Outcome<Self> {
        match value {
            Value::Array(items) => match items.into_iter().next() {
                Some(first) => Self::from_json(first),
                None => Err(LookupError::Payload("country list is empty".into())),
            },
            _ => Err(LookupError::Payload("expected a list of countries".into())),
        }
    }

    pub fn first_neighbour(&self) -> Option<&str> {
        self.neighbor_codes.first().map(String::as_str)
    }
}
