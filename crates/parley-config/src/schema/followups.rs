use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Best-effort classification probes issued after a successful answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowUpConfig {
    pub enabled: bool,
    /// Languages that get a "validate code" follow-up when the answer contains them.
    pub code_languages: Vec<String>,
    /// Companion applications that get an "open" follow-up when the prompt mentions them.
    pub companion_apps: Vec<String>,
    pub probe_timeout_secs: u64,
}

impl Default for FollowUpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            code_languages: Vec::new(),
            companion_apps: Vec::new(),
            probe_timeout_secs: 15,
        }
    }
}

impl FollowUpConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}
