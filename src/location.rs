// ═══════════════════════════════════════════════════════════
// Location input — coordinates, the geolocation seam, triggers
// ═══════════════════════════════════════════════════════════

use std::str::FromStr;

use crate::error::LookupError;
use crate::model::LocationQuery;
use crate::scheduler::Scheduler;
use crate::task::Task;

impl LocationQuery {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, LookupError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(LookupError::Location(format!("latitude {} is out of range", latitude)));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(LookupError::Location(format!("longitude {} is out of range", longitude)));
        }
        Ok(LocationQuery { latitude, longitude })
    }
}

/// Parses `"lat,lng"`, tolerating spaces around either number.
impl FromStr for LocationQuery {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| LookupError::Location(format!("expected `lat,lng`, got `{}`", s)))?;
        let parse = |part: &str, what: &str| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| LookupError::Location(format!("{} `{}` is not a number", what, part.trim())))
        };
        LocationQuery::new(parse(lat, "latitude")?, parse(lng, "longitude")?)
    }
}

/// Where the device thinks it is.
pub trait Geolocation {
    fn current_position(&self, scheduler: &Scheduler) -> Task<LocationQuery>;
}

/// A locator that always reports the same coordinates.
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub LocationQuery);

impl Geolocation for FixedPosition {
    fn current_position(&self, scheduler: &Scheduler) -> Task<LocationQuery> {
        Task::succeeded(scheduler, self.0)
    }
}

/// One "user requested lookup" event.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    Country(String),
    Position(LocationQuery),
}

impl Trigger {
    /// Coordinates become a position lookup, any other text a country name.
    /// Blank input yields nothing.
    pub fn parse(line: &str) -> Option<Trigger> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match line.parse::<LocationQuery>() {
            Ok(query) => Some(Trigger::Position(query)),
            Err(_) => Some(Trigger::Country(line.to_string())),
        }
    }
}
