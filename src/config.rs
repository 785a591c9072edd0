//! Construction-time configuration for the flush controller.
//!
//! The host supplies an `ExporterConfig` -- built in code or parsed from
//! TOML -- alongside its sink list. Everything has a default; an empty
//! config is a working config.

use metric::TagMap;
use std::error;
use std::fmt;
use toml;

/// The hard cap on `max_buffer_duration`, in seconds. Values above this are
/// clamped at construction, so worst-case data latency is bounded no matter
/// what the host asks for.
pub const MAX_BUFFER_DURATION_CAP_S: u64 = 30;

/// Configuration for `exporter::Exporter`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Flush as soon as the store holds this many distinct metric
    /// identities. Counted by identity, not by raw event.
    pub max_buffer_size: usize,
    /// The debounce delay and worst-case data latency, in seconds. Clamped
    /// to `MAX_BUFFER_DURATION_CAP_S`.
    pub max_buffer_duration: u64,
    /// Fixed contextual tags merged beneath every ingested event's tags.
    /// Event- and record-derived tags take precedence on collision.
    pub global_tags: TagMap,
    /// Inject an `invocation.wall_time` histogram per ingested record.
    pub invocation_duration: bool,
    /// Inject an `invocation.cpu_time` histogram per ingested record.
    pub invocation_cost: bool,
    /// Inject an `invocation.count` count per ingested record.
    pub invocation_count: bool,
}

impl Default for ExporterConfig {
    fn default() -> ExporterConfig {
        ExporterConfig {
            max_buffer_size: 100,
            max_buffer_duration: 5,
            global_tags: TagMap::default(),
            invocation_duration: true,
            invocation_cost: true,
            invocation_count: true,
        }
    }
}

impl ExporterConfig {
    /// Parse a config from TOML text. Absent keys take their defaults.
    pub fn from_toml(body: &str) -> Result<ExporterConfig, Error> {
        toml::from_str(body).map_err(Error::Toml)
    }
}

/// Why a config failed to parse.
#[derive(Debug)]
pub enum Error {
    /// The TOML body was malformed or mistyped.
    Toml(toml::de::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Toml(ref e) => write!(f, "invalid exporter config: {}", e),
        }
    }
}

impl error::Error for Error {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = ExporterConfig::default();
        assert_eq!(100, config.max_buffer_size);
        assert_eq!(5, config.max_buffer_duration);
        assert!(config.global_tags.is_empty());
        assert!(config.invocation_duration);
        assert!(config.invocation_cost);
        assert!(config.invocation_count);
    }

    #[test]
    fn from_toml_partial() {
        let config = ExporterConfig::from_toml(
            r#"
max_buffer_size = 250
invocation_cost = false

[global_tags]
env = "staging"
"#,
        ).unwrap();

        assert_eq!(250, config.max_buffer_size);
        assert_eq!(5, config.max_buffer_duration);
        assert!(!config.invocation_cost);
        assert!(config.invocation_count);
        assert_eq!(Some("staging"), config.global_tags.get("env"));
    }

    #[test]
    fn from_toml_empty_is_default() {
        let config = ExporterConfig::from_toml("").unwrap();
        assert_eq!(ExporterConfig::default(), config);
    }

    #[test]
    fn from_toml_rejects_mistyped() {
        assert!(ExporterConfig::from_toml("max_buffer_size = \"lots\"").is_err());
    }
}
