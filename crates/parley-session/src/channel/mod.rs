//! Channel abstraction over the persistent bidirectional transport.
//!
//! A channel delivers named events to registered handlers in socket order
//! and accepts named outbound events. Lifecycle (`connect`, `disconnect`,
//! `connect_error`) arrives through the same handler mechanism.

mod listeners;

use std::sync::Arc;
use std::time::Duration;

use parley_common::ChannelError;
use parley_config::schema::ConnectionConfig;

use crate::credential::Credential;

pub use listeners::Listeners;

/// Event names exchanged over the channel.
pub mod events {
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const CONNECT_ERROR: &str = "connect_error";
    /// Inbound streamed answer fragments.
    pub const RESPONSE: &str = "response";
    /// Outbound question.
    pub const REQUEST: &str = "request";
}

/// Synchronous event callback.
pub type Handler = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Handle returned by [`Channel::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// A persistent, event-driven connection to the backend.
pub trait Channel: Send + Sync {
    /// Start connecting. Lifecycle events report the result.
    fn connect(&self);

    /// Send a named event with a JSON payload.
    fn emit(&self, event: &str, payload: serde_json::Value) -> Result<(), ChannelError>;

    /// Register a handler for a named event.
    fn on(&self, event: &str, handler: Handler) -> ListenerId;

    /// Remove a handler. Returns `false` if it was already gone.
    fn off(&self, id: ListenerId) -> bool;

    /// Number of handlers currently registered for `event`.
    fn listener_count(&self, event: &str) -> usize;

    /// Close the connection and stop any automatic reconnection.
    fn disconnect(&self);
}

/// Opens channels. The returned channel stays idle until `connect()` so
/// callers can register lifecycle handlers first.
pub trait Connector: Send + Sync {
    fn open(&self, options: &ChannelOptions, credential: &Credential) -> Arc<dyn Channel>;
}

/// Transport options shared by every channel a connector opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOptions {
    pub endpoint: String,
    pub path: String,
    /// Connection attempts before the transport gives up.
    pub reconnection_attempts: u32,
    pub reconnection_delay: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::from_config(&ConnectionConfig::default())
    }
}

impl ChannelOptions {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            path: config.socket_path.clone(),
            reconnection_attempts: config.reconnection_attempts,
            reconnection_delay: config.reconnection_delay(),
        }
    }

    /// Engine.IO WebSocket URL for this endpoint.
    pub fn socket_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };

        let path = self.path.trim_matches('/');
        if path.is_empty() {
            format!("{base}/?EIO=4&transport=websocket")
        } else {
            format!("{base}/{path}/?EIO=4&transport=websocket")
        }
    }
}
