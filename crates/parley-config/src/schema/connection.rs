use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the persistent channel to the inference backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Base URL of the backend (`ws`, `wss`, `http` or `https`).
    pub endpoint: String,
    /// Socket.IO mount path on the backend.
    pub socket_path: String,
    /// How long an ask waits for the channel to become ready.
    pub connect_timeout_secs: u64,
    /// How long an ask waits for the terminal response payload.
    pub request_timeout_secs: u64,
    /// Poll tick for cooperative waits (valid range: 10-100).
    pub poll_interval_ms: u64,
    /// Automatic reconnection attempts before the channel is treated as failed.
    pub reconnection_attempts: u32,
    /// Base delay between reconnection attempts; doubles per attempt.
    pub reconnection_delay_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://assistant.example.dev".into(),
            socket_path: "/socket.io/".into(),
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
            poll_interval_ms: 50,
            reconnection_attempts: 3,
            reconnection_delay_ms: 500,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnection_delay(&self) -> Duration {
        Duration::from_millis(self.reconnection_delay_ms)
    }
}
