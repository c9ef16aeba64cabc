//! `Channel` implementation backed by a background connection task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parley_common::ChannelError;

use super::codec::SocketPacket;
use super::connection::{connection_loop, LoopContext};
use crate::channel::{events, Channel, ChannelOptions, Connector, Handler, ListenerId, Listeners};
use crate::credential::Credential;

/// Outbound frames buffered while the writer is busy.
const OUTBOUND_QUEUE: usize = 64;

/// Frames queued for the connection task.
#[derive(Debug)]
pub(crate) enum Command {
    Send(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SocketIoConnector;

impl SocketIoConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for SocketIoConnector {
    fn open(&self, options: &ChannelOptions, credential: &Credential) -> Arc<dyn Channel> {
        Arc::new(SocketIoChannel::new(options.clone(), credential.clone()))
    }
}

pub struct SocketIoChannel {
    options: ChannelOptions,
    credential: Credential,
    listeners: Arc<Listeners>,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
    command_tx: mpsc::Sender<Command>,
    command_rx: Mutex<Option<mpsc::Receiver<Command>>>,
}

impl SocketIoChannel {
    pub fn new(options: ChannelOptions, credential: Credential) -> Self {
        let (command_tx, command_rx) = mpsc::channel(OUTBOUND_QUEUE);
        Self {
            options,
            credential,
            listeners: Arc::new(Listeners::new()),
            connected: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn fail_connect(&self, message: &str) {
        warn!(error = message, "Cannot start channel");
        self.listeners.dispatch(
            events::CONNECT_ERROR,
            &serde_json::json!({ "message": message }),
        );
    }
}

impl Channel for SocketIoChannel {
    fn connect(&self) {
        if self.shutdown.is_cancelled() {
            self.fail_connect("channel closed");
            return;
        }

        let Some(command_rx) = self
            .command_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            debug!("Channel already started");
            return;
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                self.fail_connect(&format!("no async runtime: {e}"));
                return;
            }
        };

        let context = LoopContext {
            url: self.options.socket_url(),
            token: self.credential.token().to_string(),
            reconnection_attempts: self.options.reconnection_attempts.max(1),
            reconnection_delay: self.options.reconnection_delay,
            listeners: Arc::clone(&self.listeners),
            connected: Arc::clone(&self.connected),
            shutdown: self.shutdown.clone(),
        };
        runtime.spawn(connection_loop(context, command_rx));
    }

    fn emit(&self, event: &str, payload: serde_json::Value) -> Result<(), ChannelError> {
        if self.shutdown.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }

        let frame = SocketPacket::Event {
            name: event.to_string(),
            payload,
        }
        .to_frame();

        self.command_tx
            .try_send(Command::Send(frame))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    ChannelError::SendFailed("outbound queue full".into())
                }
                mpsc::error::TrySendError::Closed(_) => ChannelError::Closed,
            })
    }

    fn on(&self, event: &str, handler: Handler) -> ListenerId {
        self.listeners.add(event, handler)
    }

    fn off(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn listener_count(&self, event: &str) -> usize {
        self.listeners.count(event)
    }

    fn disconnect(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        if self.connected.swap(false, Ordering::AcqRel) {
            self.listeners.dispatch(
                events::DISCONNECT,
                &serde_json::json!("io client disconnect"),
            );
        }
    }
}

impl Drop for SocketIoChannel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn channel() -> SocketIoChannel {
        SocketIoChannel::new(
            ChannelOptions {
                endpoint: "ws://127.0.0.1:9".into(),
                reconnection_attempts: 1,
                reconnection_delay: Duration::from_millis(1),
                ..ChannelOptions::default()
            },
            Credential::new("t"),
        )
    }

    #[test]
    fn emit_before_connect_is_rejected() {
        assert_eq!(
            channel().emit(events::REQUEST, json!({})),
            Err(ChannelError::NotConnected)
        );
    }

    #[test]
    fn emit_after_disconnect_is_closed() {
        let channel = channel();
        channel.disconnect();
        assert_eq!(
            channel.emit(events::REQUEST, json!({})),
            Err(ChannelError::Closed)
        );
    }

    #[test]
    fn connect_without_runtime_reports_connect_error() {
        let channel = channel();
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        channel.on(
            events::CONNECT_ERROR,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        channel.connect();
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_endpoint_gives_up_after_cap() {
        let channel = channel();
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        channel.on(
            events::CONNECT_ERROR,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        channel.connect();
        for _ in 0..200 {
            if errors.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(!channel.is_connected());
    }
}
