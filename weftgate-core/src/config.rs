//! Client configuration.

use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Base address used when none is configured: the local development API.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3001/api";

/// Environment variable holding the API base address.
pub const BASE_URL_ENV: &str = "WEFTGATE_API_URL";

/// Environment variable holding the request timeout in seconds.
pub const TIMEOUT_ENV: &str = "WEFTGATE_TIMEOUT_SECS";

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default keyring service name of the legacy credential entries.
pub const DEFAULT_LEGACY_KEYRING_SERVICE: &str = "weftgate";

/// Settings for [`ApiClient`](crate::ApiClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base address every request path is appended to.
    pub base_url: Url,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Keyring service the prior native build stored credentials under.
    pub legacy_keyring_service: String,
}

impl ClientConfig {
    /// Create a configuration for the given base address.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            legacy_keyring_service: DEFAULT_LEGACY_KEYRING_SERVICE.to_string(),
        })
    }

    /// Read [`BASE_URL_ENV`] and [`TIMEOUT_ENV`], falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup(BASE_URL_ENV)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut config = Self::new(&base_url)?;

        if let Some(raw) = lookup(TIMEOUT_ENV).filter(|v| !v.trim().is_empty()) {
            config.timeout = parse_timeout(&raw)?;
        }

        Ok(config)
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Join a request path onto the base address.
    ///
    /// `"/orders"` and `"orders"` both resolve below the base path.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}/{}", base, path.trim_start_matches('/')))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            legacy_keyring_service: DEFAULT_LEGACY_KEYRING_SERVICE.to_string(),
        }
    }
}

fn parse_base_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim()).map_err(|e| ConfigError::InvalidBaseUrl {
        value: value.to_string(),
        message: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl {
            value: value.to_string(),
            message: format!("unsupported scheme {}", url.scheme()),
        });
    }

    Ok(url)
}

/// Parse a timeout given in whole seconds.
pub fn parse_timeout(value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) => timeout_from_secs(secs),
        Err(_) => Err(ConfigError::InvalidTimeout {
            value: value.to_string(),
        }),
    }
}

/// Validate a timeout given as a number of seconds; zero is rejected.
pub fn timeout_from_secs(secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::InvalidTimeout {
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.base_url.as_str(), DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            (BASE_URL_ENV, "https://portal.example.com/v1"),
            (TIMEOUT_ENV, "5"),
        ]))
        .unwrap();
        assert_eq!(config.base_url.as_str(), "https://portal.example.com/v1");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values() {
        let bad_url = ClientConfig::from_lookup(lookup(&[(BASE_URL_ENV, "not a url")]));
        assert!(matches!(bad_url, Err(ConfigError::InvalidBaseUrl { .. })));

        let bad_scheme = ClientConfig::new("ftp://portal.example.com");
        assert!(matches!(bad_scheme, Err(ConfigError::InvalidBaseUrl { .. })));

        let bad_timeout = ClientConfig::from_lookup(lookup(&[(TIMEOUT_ENV, "0")]));
        assert!(matches!(bad_timeout, Err(ConfigError::InvalidTimeout { .. })));

        assert!(matches!(timeout_from_secs(0), Err(ConfigError::InvalidTimeout { .. })));
        assert_eq!(timeout_from_secs(7).unwrap(), Duration::from_secs(7));
    }

    #[test]
    fn test_endpoint_join() {
        let config = ClientConfig::new("http://localhost:3001/api/").unwrap();
        assert_eq!(
            config.endpoint("/orders").unwrap().as_str(),
            "http://localhost:3001/api/orders"
        );
        assert_eq!(
            config.endpoint("auth/refresh").unwrap().as_str(),
            "http://localhost:3001/api/auth/refresh"
        );
    }
}
