//! Parley configuration system.
//!
//! TOML-based configuration with validation. Every section uses serde
//! defaults so a partial file (or no file at all) yields a working client.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use parley_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! let json = config_to_json(&config);
//! println!("{json}");
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{ParleyConfig, CONFIG_SCHEMA_VERSION};

use parley_common::ConfigError;

/// Environment variable that overrides `connection.endpoint`.
pub const ENDPOINT_ENV: &str = "PARLEY_ENDPOINT";

/// Load config from the platform default path.
///
/// Creates a default `config.toml` if none exists, applies environment
/// overrides, and validates the result.
pub fn load_config() -> Result<ParleyConfig, ConfigError> {
    let mut config = toml_loader::load_default()?;
    apply_env_overrides(&mut config);
    validation::validate(&config)?;
    Ok(config)
}

/// Apply environment variable overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut ParleyConfig) {
    if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
        let endpoint = endpoint.trim();
        if !endpoint.is_empty() {
            tracing::info!("endpoint overridden by {ENDPOINT_ENV}");
            config.connection.endpoint = endpoint.to_string();
        }
    }
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &ParleyConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_to_json_contains_all_sections() {
        let config = ParleyConfig::default();
        let json = config_to_json(&config);
        assert!(json.contains("\"connection\""));
        assert!(json.contains("\"context\""));
        assert!(json.contains("\"followups\""));
        assert!(json.contains("\"logging\""));
    }

    #[test]
    fn config_schema_version_is_1() {
        assert_eq!(CONFIG_SCHEMA_VERSION, 1);
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let config = ParleyConfig::default();
        let json = config_to_json(&config);
        let parsed: ParleyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.connection.connect_timeout_secs, 10);
        assert_eq!(parsed.connection.request_timeout_secs, 120);
        assert_eq!(parsed.context.budget, config.context.budget);
    }
}
