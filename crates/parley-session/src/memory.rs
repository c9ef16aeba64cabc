//! In-process channel for tests and offline use.
//!
//! `MemoryChannel` records everything emitted and lets the caller play the
//! server by firing events. A `MemoryConnector` can auto-connect its
//! channels and answer each emitted request through a responder closure.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use parley_common::ChannelError;

use crate::channel::{events, Channel, ChannelOptions, Connector, Handler, ListenerId, Listeners};
use crate::credential::Credential;

/// Produces the `response` payloads for one emitted event.
pub type Responder = Arc<dyn Fn(&str, &serde_json::Value) -> Vec<serde_json::Value> + Send + Sync>;

pub struct MemoryChannel {
    credential: Credential,
    auto_connect: bool,
    responder: Option<Responder>,
    listeners: Listeners,
    emitted: Mutex<Vec<(String, serde_json::Value)>>,
    connected: AtomicBool,
    disconnected: AtomicBool,
    connect_calls: AtomicUsize,
}

impl MemoryChannel {
    fn new(credential: Credential, auto_connect: bool, responder: Option<Responder>) -> Self {
        Self {
            credential,
            auto_connect,
            responder,
            listeners: Listeners::new(),
            emitted: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
        }
    }

    /// Deliver an event as if it came from the server.
    pub fn fire(&self, event: &str, payload: serde_json::Value) -> usize {
        match event {
            events::CONNECT => self.connected.store(true, Ordering::SeqCst),
            events::DISCONNECT | events::CONNECT_ERROR => {
                self.connected.store(false, Ordering::SeqCst)
            }
            _ => {}
        }
        self.listeners.dispatch(event, &payload)
    }

    pub fn emitted(&self) -> Vec<(String, serde_json::Value)> {
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Whether `disconnect()` was called on this channel.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }
}

impl Channel for MemoryChannel {
    fn connect(&self) {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.auto_connect && !self.is_disconnected() {
            self.fire(events::CONNECT, serde_json::Value::Null);
        }
    }

    fn emit(&self, event: &str, payload: serde_json::Value) -> Result<(), ChannelError> {
        if self.is_disconnected() {
            return Err(ChannelError::Closed);
        }
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }

        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event.to_string(), payload.clone()));

        if let Some(responder) = &self.responder {
            for reply in responder(event, &payload) {
                self.listeners.dispatch(events::RESPONSE, &reply);
            }
        }
        Ok(())
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
        if !self.disconnected.swap(true, Ordering::SeqCst) {
            self.connected.store(false, Ordering::SeqCst);
            self.listeners
                .dispatch(events::DISCONNECT, &serde_json::json!("io client disconnect"));
        }
    }
}

/// Opens [`MemoryChannel`]s and keeps every one it opened for inspection.
pub struct MemoryConnector {
    auto_connect: bool,
    responder: Option<Responder>,
    opened: Mutex<Vec<Arc<MemoryChannel>>>,
}

impl MemoryConnector {
    /// Channels connect as soon as `connect()` is called.
    pub fn new() -> Self {
        Self {
            auto_connect: true,
            responder: None,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Channels stay connecting until the caller fires `connect`.
    pub fn manual() -> Self {
        Self {
            auto_connect: false,
            ..Self::new()
        }
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str, &serde_json::Value) -> Vec<serde_json::Value> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    pub fn channels(&self) -> Vec<Arc<MemoryChannel>> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_channel(&self) -> Option<Arc<MemoryChannel>> {
        self.channels().last().cloned()
    }

    pub fn open_count(&self) -> usize {
        self.channels().len()
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for MemoryConnector {
    fn open(&self, _options: &ChannelOptions, credential: &Credential) -> Arc<dyn Channel> {
        let channel = Arc::new(MemoryChannel::new(
            credential.clone(),
            self.auto_connect,
            self.responder.clone(),
        ));
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&channel));
        channel
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn auto_connect_fires_connect_on_connect() {
        let connector = MemoryConnector::new();
        let channel = connector.open(&ChannelOptions::default(), &Credential::new("t"));
        let memory = connector.last_channel().unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        channel.on(
            events::CONNECT,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(!memory.is_connected());
        channel.connect();
        assert!(memory.is_connected());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn emit_requires_connection() {
        let connector = MemoryConnector::manual();
        let channel = connector.open(&ChannelOptions::default(), &Credential::new("t"));
        assert_eq!(
            channel.emit("request", json!({})),
            Err(ChannelError::NotConnected)
        );

        connector.last_channel().unwrap().fire(events::CONNECT, json!(null));
        assert!(channel.emit("request", json!({})).is_ok());

        channel.disconnect();
        assert_eq!(channel.emit("request", json!({})), Err(ChannelError::Closed));
    }

    #[test]
    fn responder_replies_through_response_event() {
        let connector = MemoryConnector::new()
            .with_responder(|_, payload| vec![json!({ "token": payload["question"] })]);
        let channel = connector.open(&ChannelOptions::default(), &Credential::new("t"));
        channel.connect();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        channel.on(
            events::RESPONSE,
            Arc::new(move |v| sink.lock().unwrap().push(v.clone())),
        );

        channel
            .emit(events::REQUEST, json!({ "id": "1", "question": "echo" }))
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![json!({ "token": "echo" })]);
    }

    #[test]
    fn disconnect_fires_once() {
        let connector = MemoryConnector::new();
        let channel = connector.open(&ChannelOptions::default(), &Credential::new("t"));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        channel.on(
            events::DISCONNECT,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        channel.disconnect();
        channel.disconnect();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(connector.last_channel().unwrap().is_disconnected());
    }
}
