//! Owns the single shared channel and its lifecycle.
//!
//! State moves only on channel events: `connect` makes the channel `Ready`,
//! `disconnect` discards it, and `reconnection_attempts` consecutive
//! `connect_error`s mark it `Failed`. Every channel gets a generation number;
//! events from a discarded generation are ignored.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_config::schema::ConnectionConfig;

use crate::channel::{events, Channel, ChannelOptions, Connector};
use crate::credential::Credential;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("connection cancelled")]
    Cancelled,

    #[error("channel not ready after {0:?}")]
    TimedOut(Duration),

    #[error("connection failed: {0}")]
    Failed(String),
}

/// A channel handed out by [`ConnectionManager::ensure_ready`].
///
/// The generation identifies this channel instance; once the manager
/// discards it, [`ConnectionManager::is_current`] turns false.
#[derive(Clone)]
pub struct ReadyChannel {
    pub channel: Arc<dyn Channel>,
    pub generation: u64,
}

struct Inner {
    state: ConnectionState,
    generation: u64,
    channel: Option<Arc<dyn Channel>>,
    credential: Option<Credential>,
    connect_errors: u32,
    last_error: Option<String>,
}

impl Inner {
    /// Drop the current channel and invalidate its event handlers.
    /// The caller disconnects the returned channel after releasing the lock.
    fn discard(&mut self, state: ConnectionState) -> Option<Arc<dyn Channel>> {
        self.generation += 1;
        self.state = state;
        self.channel.take()
    }
}

enum Prepared {
    Ready(ReadyChannel),
    Wait {
        generation: u64,
        open: Option<Arc<dyn Channel>>,
        stale: Option<Arc<dyn Channel>>,
    },
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    options: ChannelOptions,
    poll_interval: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, options: ChannelOptions, poll_interval: Duration) -> Self {
        Self {
            connector,
            options,
            poll_interval,
            inner: Arc::new(Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                generation: 0,
                channel: None,
                credential: None,
                connect_errors: 0,
                last_error: None,
            })),
        }
    }

    pub fn from_config(connector: Arc<dyn Connector>, config: &ConnectionConfig) -> Self {
        Self::new(
            connector,
            ChannelOptions::from_config(config),
            config.poll_interval(),
        )
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock_inner(&self.inner)
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// `connect_error`s seen since the current channel was opened.
    pub fn failed_attempts(&self) -> u32 {
        self.lock().connect_errors
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    /// Whether `generation` is still the live, ready channel.
    pub fn is_current(&self, generation: u64) -> bool {
        let inner = self.lock();
        inner.generation == generation && inner.state == ConnectionState::Ready
    }

    /// Return a ready channel, opening one if needed, and wait until it is
    /// `Ready`, the timeout elapses, or `cancel` fires.
    ///
    /// A changed credential discards the current channel first. Timing out
    /// tears down the pending channel; cancelling leaves it connecting.
    pub async fn ensure_ready(
        &self,
        credential: &Credential,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ReadyChannel, ConnectError> {
        let deadline = Instant::now() + timeout;

        let generation = match self.prepare(credential) {
            Prepared::Ready(ready) => return Ok(ready),
            Prepared::Wait {
                generation,
                open,
                stale,
            } => {
                if let Some(stale) = stale {
                    stale.disconnect();
                }
                if let Some(channel) = open {
                    info!(
                        endpoint = %self.options.endpoint,
                        generation,
                        "Opening channel"
                    );
                    channel.connect();
                }
                generation
            }
        };

        loop {
            {
                let inner = self.lock();
                if inner.generation != generation {
                    return Err(ConnectError::Failed(
                        inner
                            .last_error
                            .clone()
                            .unwrap_or_else(|| "channel was discarded".to_string()),
                    ));
                }
                match (inner.state, inner.channel.as_ref()) {
                    (ConnectionState::Ready, Some(channel)) => {
                        return Ok(ReadyChannel {
                            channel: Arc::clone(channel),
                            generation,
                        });
                    }
                    (ConnectionState::Failed, _) => {
                        return Err(ConnectError::Failed(
                            inner.last_error.clone().unwrap_or_default(),
                        ));
                    }
                    _ => {}
                }
            }

            if cancel.is_cancelled() {
                debug!(generation, "Connect wait cancelled");
                return Err(ConnectError::Cancelled);
            }

            if Instant::now() >= deadline {
                warn!(?timeout, generation, "Channel not ready before deadline");
                self.teardown_generation(generation, ConnectionState::Disconnected);
                return Err(ConnectError::TimedOut(timeout));
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }

    fn prepare(&self, credential: &Credential) -> Prepared {
        let mut inner = self.lock();
        let mut stale = None;

        let credential_changed = inner
            .credential
            .as_ref()
            .is_some_and(|current| current.token() != credential.token());
        if credential_changed && inner.channel.is_some() {
            info!("Credential changed, discarding channel");
            stale = inner.discard(ConnectionState::Disconnected);
        }

        match (inner.state, inner.channel.as_ref()) {
            (ConnectionState::Ready, Some(channel)) => {
                return Prepared::Ready(ReadyChannel {
                    channel: Arc::clone(channel),
                    generation: inner.generation,
                });
            }
            (ConnectionState::Connecting, Some(_)) => {
                return Prepared::Wait {
                    generation: inner.generation,
                    open: None,
                    stale,
                };
            }
            _ => {}
        }

        // Disconnected, Failed, or no channel: start over.
        if let Some(previous) = inner.discard(ConnectionState::Connecting) {
            stale = Some(previous);
        }
        inner.connect_errors = 0;
        inner.last_error = None;
        inner.credential = Some(credential.clone());

        let generation = inner.generation;
        let channel = self.connector.open(&self.options, credential);
        self.register_handlers(&channel, generation);
        inner.channel = Some(Arc::clone(&channel));

        Prepared::Wait {
            generation,
            open: Some(channel),
            stale,
        }
    }

    fn register_handlers(&self, channel: &Arc<dyn Channel>, generation: u64) {
        let weak = Arc::downgrade(&self.inner);
        channel.on(
            events::CONNECT,
            Arc::new(move |_| {
                with_current(&weak, generation, |inner| {
                    inner.state = ConnectionState::Ready;
                    inner.connect_errors = 0;
                    inner.last_error = None;
                    info!(generation, "Channel ready");
                    None
                });
            }),
        );

        let weak = Arc::downgrade(&self.inner);
        channel.on(
            events::DISCONNECT,
            Arc::new(move |payload| {
                with_current(&weak, generation, |inner| {
                    info!(generation, reason = %describe(payload), "Channel disconnected");
                    inner.discard(ConnectionState::Disconnected)
                });
            }),
        );

        let weak = Arc::downgrade(&self.inner);
        let cap = self.options.reconnection_attempts.max(1);
        channel.on(
            events::CONNECT_ERROR,
            Arc::new(move |payload| {
                with_current(&weak, generation, |inner| {
                    inner.connect_errors += 1;
                    inner.last_error = Some(describe(payload));
                    warn!(
                        generation,
                        attempt = inner.connect_errors,
                        cap,
                        error = %describe(payload),
                        "Channel connect error"
                    );
                    if inner.connect_errors >= cap {
                        warn!(generation, "Reconnect attempts exhausted");
                        inner.discard(ConnectionState::Failed)
                    } else {
                        None
                    }
                });
            }),
        );
    }

    /// Disconnect and discard the channel. The next `ensure_ready` opens a
    /// fresh one.
    pub fn disconnect(&self) {
        let stale = {
            let mut inner = self.lock();
            let had_channel = inner.channel.is_some();
            let stale = inner.discard(ConnectionState::Disconnected);
            if had_channel {
                info!(generation = inner.generation, "Channel torn down");
            }
            stale
        };
        if let Some(channel) = stale {
            channel.disconnect();
        }
    }

    /// Forget the stored credential and drop the channel authenticated with it.
    pub fn invalidate_credential(&self) {
        self.lock().credential = None;
        self.disconnect();
    }

    /// Tear the channel down as soon as `changes` yields a token other than
    /// the one it was opened with, instead of waiting for the next ask.
    ///
    /// Needs a Tokio runtime; without one, rotations are still caught by
    /// the token comparison in `ensure_ready`.
    pub fn follow_credential(&self, mut changes: watch::Receiver<Credential>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, credential rotation checked on next ask only");
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        handle.spawn(async move {
            while changes.changed().await.is_ok() {
                let token = changes.borrow_and_update().token().to_string();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let stale = {
                    let mut guard = lock_inner(&inner);
                    let rotated = guard
                        .credential
                        .as_ref()
                        .is_some_and(|current| current.token() != token);
                    if rotated && guard.channel.is_some() {
                        info!(generation = guard.generation, "Credential rotated, discarding channel");
                        guard.credential = None;
                        guard.discard(ConnectionState::Disconnected)
                    } else {
                        None
                    }
                };
                if let Some(channel) = stale {
                    channel.disconnect();
                }
            }
            debug!("Credential feed closed");
        });
    }

    fn teardown_generation(&self, generation: u64, state: ConnectionState) {
        let stale = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return;
            }
            inner.discard(state)
        };
        if let Some(channel) = stale {
            channel.disconnect();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let channel = self.lock().discard(ConnectionState::Disconnected);
        if let Some(channel) = channel {
            channel.disconnect();
        }
    }
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `update` if `generation` is still current. A channel returned by
/// `update` is disconnected after the lock is released.
fn with_current<F>(weak: &Weak<Mutex<Inner>>, generation: u64, update: F)
where
    F: FnOnce(&mut Inner) -> Option<Arc<dyn Channel>>,
{
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let stale = {
        let mut guard = lock_inner(&inner);
        if guard.generation != generation {
            debug!(generation, current = guard.generation, "Ignoring stale channel event");
            return;
        }
        update(&mut guard)
    };
    if let Some(channel) = stale {
        channel.disconnect();
    }
}

fn describe(payload: &serde_json::Value) -> String {
    match payload {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other
            .get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| other.to_string()),
    }
}

#[cfg(test)]
mod tests;
