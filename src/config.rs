//! Configuration
//!
//! TigerStyle: Explicit configuration, loaded once at startup.
//!
//! Values come from the environment (optionally via a `.env` file) and can
//! be overridden by CLI flags through the `with_*` builders.

use crate::source::{DigitString, InvalidDigit};
use crate::{DIGITS_COUNT_MAX, DIGITS_RESOURCE_DEFAULT, PRELOAD_DELAY_MS_DEFAULT};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Digit resource location (URL or path)
pub const ENV_RESOURCE: &str = "EDIGITS_RESOURCE";

/// Maximum position callers may ask for
pub const ENV_DIGITS_MAX: &str = "EDIGITS_DIGITS_MAX";

/// File holding the embedded fallback digits
pub const ENV_EMBEDDED_FILE: &str = "EDIGITS_EMBEDDED_FILE";

/// Prefer the embedded digits over fetching
pub const ENV_PREFER_LOCAL: &str = "EDIGITS_PREFER_LOCAL";

/// Fetch timeout in milliseconds
pub const ENV_FETCH_TIMEOUT_MS: &str = "EDIGITS_FETCH_TIMEOUT_MS";

/// Background preload delay in milliseconds (0 disables preload)
pub const ENV_PRELOAD_DELAY_MS: &str = "EDIGITS_PRELOAD_DELAY_MS";

// =============================================================================
// Types
// =============================================================================

/// Where the digit resource lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLocation {
    /// Fetched with an HTTP GET
    Url(String),
    /// Read from the local filesystem
    Path(PathBuf),
}

impl ResourceLocation {
    /// Classify a location string; anything that is not http(s) is a path
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::Url(raw.to_string())
        } else {
            Self::Path(PathBuf::from(shellexpand::tilde(raw).into_owned()))
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Digit resource location
    pub resource: ResourceLocation,
    /// Highest position a lookup accepts
    pub digits_count_max: usize,
    /// Embedded digits used as a fallback (and as the source, if preferred)
    pub embedded: Option<DigitString>,
    /// Resolve from the embedded digits without fetching
    pub prefer_local_source: bool,
    /// Timeout for one fetch (HTTP only)
    pub fetch_timeout: Option<Duration>,
    /// Delay before background preload; `None` disables it
    pub preload_delay: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resource: ResourceLocation::parse(DIGITS_RESOURCE_DEFAULT),
            digits_count_max: DIGITS_COUNT_MAX,
            embedded: None,
            prefer_local_source: false,
            fetch_timeout: None,
            preload_delay: Some(Duration::from_millis(PRELOAD_DELAY_MS_DEFAULT)),
        }
    }
}

impl Config {
    /// Load from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(resource) = lookup(ENV_RESOURCE) {
            config = config.with_resource(&resource);
        }
        if let Some(max) = lookup(ENV_DIGITS_MAX) {
            config = config.with_digits_count_max(parse_number(ENV_DIGITS_MAX, &max)?)?;
        }
        if let Some(path) = lookup(ENV_EMBEDDED_FILE) {
            let path = shellexpand::tilde(&path).into_owned();
            config = config.with_embedded_file(Path::new(&path))?;
        }
        if let Some(flag) = lookup(ENV_PREFER_LOCAL) {
            config = config.with_prefer_local_source(parse_bool(ENV_PREFER_LOCAL, &flag)?);
        }
        if let Some(ms) = lookup(ENV_FETCH_TIMEOUT_MS) {
            let ms: u64 = parse_number(ENV_FETCH_TIMEOUT_MS, &ms)?;
            config = config.with_fetch_timeout((ms > 0).then(|| Duration::from_millis(ms)));
        }
        if let Some(ms) = lookup(ENV_PRELOAD_DELAY_MS) {
            let ms: u64 = parse_number(ENV_PRELOAD_DELAY_MS, &ms)?;
            config = config.with_preload_delay((ms > 0).then(|| Duration::from_millis(ms)));
        }

        Ok(config)
    }

    /// Set the resource location
    pub fn with_resource(mut self, raw: &str) -> Self {
        self.resource = ResourceLocation::parse(raw);
        self
    }

    /// Set the highest accepted position
    pub fn with_digits_count_max(mut self, max: usize) -> Result<Self, ConfigError> {
        if max == 0 {
            return Err(ConfigError::ZeroDigitsCountMax);
        }
        self.digits_count_max = max;
        Ok(self)
    }

    /// Set the embedded digits from a raw string
    pub fn with_embedded(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.embedded = Some(DigitString::normalize(raw)?);
        Ok(self)
    }

    /// Set the embedded digits from a file
    pub fn with_embedded_file(self, path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = self.with_embedded(&raw)?;
        tracing::debug!(
            path = %path.display(),
            digits = config.embedded.as_ref().map(DigitString::len).unwrap_or(0),
            "loaded embedded digits"
        );
        Ok(config)
    }

    /// Prefer the embedded digits over fetching
    pub fn with_prefer_local_source(mut self, prefer: bool) -> Self {
        self.prefer_local_source = prefer;
        self
    }

    /// Set the fetch timeout
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the background preload delay
    pub fn with_preload_delay(mut self, delay: Option<Duration>) -> Self {
        self.preload_delay = delay;
        self
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("maximum position must be at least 1")]
    ZeroDigitsCountMax,

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("embedded digits are not a digit string: {0}")]
    EmbeddedDigits(#[from] InvalidDigit),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(vars(&[])).unwrap();
        assert_eq!(config.digits_count_max, DIGITS_COUNT_MAX);
        assert_eq!(
            config.resource,
            ResourceLocation::Path(PathBuf::from(DIGITS_RESOURCE_DEFAULT))
        );
        assert!(config.embedded.is_none());
        assert!(!config.prefer_local_source);
        assert_eq!(
            config.preload_delay,
            Some(Duration::from_millis(PRELOAD_DELAY_MS_DEFAULT))
        );
    }

    #[test]
    fn test_resource_location_parse() {
        assert_eq!(
            ResourceLocation::parse(" https://example.org/e.txt "),
            ResourceLocation::Url("https://example.org/e.txt".to_string())
        );
        assert_eq!(
            ResourceLocation::parse("data/e.txt"),
            ResourceLocation::Path(PathBuf::from("data/e.txt"))
        );
    }

    #[test]
    fn test_from_vars_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "27182 81828").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let config = Config::from_vars(vars(&[
            (ENV_RESOURCE, "http://localhost:9000/e.txt"),
            (ENV_DIGITS_MAX, "500"),
            (ENV_EMBEDDED_FILE, &path),
            (ENV_PREFER_LOCAL, "yes"),
            (ENV_FETCH_TIMEOUT_MS, "2500"),
            (ENV_PRELOAD_DELAY_MS, "0"),
        ]))
        .unwrap();

        assert_eq!(
            config.resource,
            ResourceLocation::Url("http://localhost:9000/e.txt".to_string())
        );
        assert_eq!(config.digits_count_max, 500);
        assert_eq!(config.embedded.unwrap().as_str(), "2718281828");
        assert!(config.prefer_local_source);
        assert_eq!(config.fetch_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.preload_delay, None);
    }

    #[test]
    fn test_malformed_values_rejected() {
        let err = Config::from_vars(vars(&[(ENV_DIGITS_MAX, "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_DIGITS_MAX, .. }));

        let err = Config::from_vars(vars(&[(ENV_DIGITS_MAX, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroDigitsCountMax));

        let err = Config::from_vars(vars(&[(ENV_PREFER_LOCAL, "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_PREFER_LOCAL, .. }));
    }

    #[test]
    fn test_embedded_must_be_digits() {
        let err = Config::default().with_embedded("2.71828").unwrap_err();
        assert!(matches!(err, ConfigError::EmbeddedDigits(_)));
    }

    #[test]
    fn test_missing_embedded_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::default()
            .with_embedded_file(&dir.path().join("nope.txt"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_zero_max_error_names_no_env_key() {
        let err = Config::default().with_digits_count_max(0).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroDigitsCountMax));
        assert_eq!(err.to_string(), "maximum position must be at least 1");
        assert!(!err.to_string().contains(ENV_DIGITS_MAX));
    }
}
