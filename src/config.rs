// Runtime configuration read from the environment.

use std::{path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;

use crate::{api::DEFAULT_API_BASE_URL, cache::CachePolicy, search::SearchConfig};

pub const API_URL_VAR: &str = "DISCOVERY_API_URL";
pub const TIMEOUT_VAR: &str = "DISCOVERY_TIMEOUT_MS";
pub const SESSION_FILE_VAR: &str = "DISCOVERY_SESSION_FILE";
pub const CACHE_TTL_VAR: &str = "SEARCH_CACHE_TTL_SECS";
pub const CACHE_CAPACITY_VAR: &str = "SEARCH_CACHE_CAPACITY";
pub const QUERY_DEBOUNCE_VAR: &str = "SEARCH_QUERY_DEBOUNCE_MS";
pub const FILTER_DEBOUNCE_VAR: &str = "SEARCH_FILTER_DEBOUNCE_MS";

// Checked in order, first non-empty wins
pub const MAPS_KEY_VARS: [&str; 4] = [
    "MAPS_PLATFORM_API_KEY",
    "GOOGLE_MAPS_API_KEY",
    "GOOGLE_PLACES_API_KEY",
    "MAPS_API_KEY",
];

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },

    #[error("{name} must be greater than zero")]
    Zero { name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryConfig {
    pub api_base_url: String,
    pub maps_api_key: Option<String>,
    pub timeout_ms: u64,
    // In-memory session when unset
    pub session_file: Option<PathBuf>,
    pub search: SearchConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            maps_api_key: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            session_file: None,
            search: SearchConfig::default(),
        }
    }
}

impl DiscoveryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    ///
    /// Unset or blank variables take their defaults; a value that is set
    /// but does not parse is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let defaults = Self::default();

        let timeout_ms = parse_or(&get, TIMEOUT_VAR, defaults.timeout_ms)?;
        if timeout_ms == 0 {
            return Err(ConfigError::Zero {
                name: TIMEOUT_VAR.to_string(),
            });
        }

        let capacity = parse_or(&get, CACHE_CAPACITY_VAR, defaults.search.cache.capacity)?;
        if capacity == 0 {
            return Err(ConfigError::Zero {
                name: CACHE_CAPACITY_VAR.to_string(),
            });
        }

        let search = SearchConfig {
            query_debounce: Duration::from_millis(parse_or(
                &get,
                QUERY_DEBOUNCE_VAR,
                defaults.search.query_debounce.as_millis() as u64,
            )?),
            filter_debounce: Duration::from_millis(parse_or(
                &get,
                FILTER_DEBOUNCE_VAR,
                defaults.search.filter_debounce.as_millis() as u64,
            )?),
            cache: CachePolicy {
                ttl: Duration::from_secs(parse_or(
                    &get,
                    CACHE_TTL_VAR,
                    defaults.search.cache.ttl.as_secs(),
                )?),
                capacity,
            },
        };

        Ok(Self {
            api_base_url: get(API_URL_VAR).unwrap_or(defaults.api_base_url),
            maps_api_key: MAPS_KEY_VARS.iter().find_map(|&name| get(name)),
            timeout_ms,
            session_file: get(SESSION_FILE_VAR).map(PathBuf::from),
            search,
        })
    }
}

fn parse_or<T, G>(get: &G, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<DiscoveryConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DiscoveryConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();

        assert_eq!(config, DiscoveryConfig::default());
        assert_eq!(config.api_base_url, "http://localhost:8000/api");
        assert_eq!(config.search.query_debounce, Duration::from_millis(400));
        assert_eq!(config.search.filter_debounce, Duration::from_millis(150));
        assert_eq!(config.search.cache.ttl, Duration::from_secs(60));
        assert_eq!(config.search.cache.capacity, 50);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            (API_URL_VAR, "https://api.example.com/api"),
            (TIMEOUT_VAR, "5000"),
            (SESSION_FILE_VAR, "/tmp/session.json"),
            (CACHE_TTL_VAR, "5"),
            (CACHE_CAPACITY_VAR, "10"),
            (QUERY_DEBOUNCE_VAR, "250"),
        ])
        .unwrap();

        assert_eq!(config.api_base_url, "https://api.example.com/api");
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.session_file, Some(PathBuf::from("/tmp/session.json")));
        assert_eq!(config.search.cache.ttl, Duration::from_secs(5));
        assert_eq!(config.search.cache.capacity, 10);
        assert_eq!(config.search.query_debounce, Duration::from_millis(250));
    }

    #[test]
    fn test_maps_key_fallback_order() {
        let config = config(&[
            ("GOOGLE_MAPS_API_KEY", " "),
            ("GOOGLE_PLACES_API_KEY", "places-key"),
            ("MAPS_API_KEY", "generic-key"),
        ])
        .unwrap();

        assert_eq!(config.maps_api_key.as_deref(), Some("places-key"));
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        assert_eq!(
            config(&[(CACHE_TTL_VAR, "soon")]),
            Err(ConfigError::InvalidValue {
                name: CACHE_TTL_VAR.to_string(),
                value: "soon".to_string()
            })
        );
        assert!(matches!(
            config(&[(CACHE_CAPACITY_VAR, "0")]),
            Err(ConfigError::Zero { .. })
        ));
    }
}
