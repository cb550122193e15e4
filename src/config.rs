// ═══════════════════════════════════════════════════════════
// Configuration — TOML file, environment and CLI overrides
// ═══════════════════════════════════════════════════════════
//
//  [endpoints]  geocode_base, country_base, geocode_auth
//  [timeouts]   lookup_secs (optional), connect_secs, read_secs
//
// Read from --config PATH or <config dir>/whereami/config.toml.
// ═══════════════════════════════════════════════════════════

use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::resolver::Endpoints;

/// Overrides `[endpoints] geocode_auth`.
pub const AUTH_ENV: &str = "WHEREAMI_GEOCODE_AUTH";

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub endpoints: EndpointsConfig,
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Deserialize, PartialEq)]
#[serde(default)]
pub struct EndpointsConfig {
    pub geocode_base: String,
    pub country_base: String,
    pub geocode_auth: Option<String>,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        let defaults = Endpoints::default();
        EndpointsConfig {
            geocode_base: defaults.geocode_base,
            country_base: defaults.country_base,
            geocode_auth: defaults.geocode_auth,
        }
    }
}

// Manual Debug impl so the geocode key never ends up in logs.
impl std::fmt::Debug for EndpointsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointsConfig")
            .field("geocode_base", &self.geocode_base)
            .field("country_base", &self.country_base)
            .field("geocode_auth", &self.geocode_auth.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Per-stage lookup timeout; unset means stages may take as long as
    /// the transport allows.
    pub lookup_secs: Option<f64>,
    pub connect_secs: u64,
    pub read_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        TimeoutsConfig { lookup_secs: None, connect_secs: 10, read_secs: 30 }
    }
}

impl Config {
    /// Loads `explicit` if given, otherwise the default location.
    ///
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Config::default()),
            },
        };

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "could not read config");
                return Err(ConfigError::Read { path, source: err });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "config loaded");
                Ok(config)
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "could not parse config");
                Err(ConfigError::Parse { path, source: err })
            }
        }
    }

    /// Applies the environment and command-line overrides on top of the file.
    pub fn apply_overrides(&mut self, auth: Option<String>, lookup_secs: Option<f64>) {
        if let Some(auth) = auth.filter(|key| !key.trim().is_empty()) {
            self.endpoints.geocode_auth = Some(auth);
        }
        if lookup_secs.is_some() {
            self.timeouts.lookup_secs = lookup_secs;
        }
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            geocode_base: self.endpoints.geocode_base.clone(),
            country_base: self.endpoints.country_base.clone(),
            geocode_auth: self.endpoints.geocode_auth.clone(),
        }
    }

    /// `None` when unset or not a usable number of seconds.
    pub fn stage_timeout(&self) -> Option<Duration> {
        let secs = self.timeouts.lookup_secs?;
        match Duration::try_from_secs_f64(secs) {
            Ok(limit) => Some(limit),
            Err(_) => {
                tracing::warn!(lookup_secs = secs, "ignoring invalid lookup timeout");
                None
            }
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.connect_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.read_secs)
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("whereami").join("config.toml"))
}
