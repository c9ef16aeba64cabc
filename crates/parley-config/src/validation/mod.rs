//! Full configuration validation.
//!
//! Each check pushes onto a shared error list; all problems are reported
//! together in a single `ConfigError`.

mod helpers;


use std::sync::LazyLock;

use regex::Regex;

use crate::schema::ParleyConfig;
use helpers::validate_range;
use parley_common::ConfigError;

static ENDPOINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(wss?|https?)://[^\s/?#]+(/[^\s]*)?$")
        .expect("validation: static endpoint pattern must compile")
});

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &ParleyConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_connection(&mut errors, config);
    validate_context(&mut errors, config);
    validate_followups(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_connection(errors: &mut Vec<String>, config: &ParleyConfig) {
    let conn = &config.connection;

    if !ENDPOINT_RE.is_match(&conn.endpoint) {
        errors.push(format!(
            "connection.endpoint = {:?} must be a ws, wss, http or https URL",
            conn.endpoint
        ));
    }
    if !conn.socket_path.starts_with('/') {
        errors.push(format!(
            "connection.socket_path = {:?} must start with '/'",
            conn.socket_path
        ));
    }

    validate_range(errors, "connection.connect_timeout_secs", conn.connect_timeout_secs, 1, 300);
    validate_range(errors, "connection.request_timeout_secs", conn.request_timeout_secs, 1, 3600);
    validate_range(errors, "connection.poll_interval_ms", conn.poll_interval_ms, 10, 100);
    validate_range(errors, "connection.reconnection_attempts", conn.reconnection_attempts, 1, 10);
    validate_range(errors, "connection.reconnection_delay_ms", conn.reconnection_delay_ms, 0, 60_000);
}

fn validate_context(errors: &mut Vec<String>, config: &ParleyConfig) {
    validate_range(errors, "context.budget", config.context.budget, 1, 10_000_000);
}

fn validate_followups(errors: &mut Vec<String>, config: &ParleyConfig) {
    let followups = &config.followups;
    validate_range(errors, "followups.probe_timeout_secs", followups.probe_timeout_secs, 1, 300);

    for (field, names) in [
        ("followups.code_languages", &followups.code_languages),
        ("followups.companion_apps", &followups.companion_apps),
    ] {
        if names.iter().any(|n| n.trim().is_empty()) {
            errors.push(format!("{field} must not contain empty names"));
        }
    }
}
