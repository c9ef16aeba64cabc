//! Request correlation: one outbound question, its streamed fragments, and
//! exactly one terminal signal.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use parley_common::{ChannelError, RequestId};

use crate::channel::{events, Channel, ListenerId};
use crate::protocol::{InboundPayload, OutboundRequest};

/// Receives each fragment as soon as it arrives, in delivery order.
pub type FragmentSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Why a request ended without an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFailure {
    Server(String),
    Parse(String),
}

/// Mutable record for one in-flight request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    id: RequestId,
    accumulated: String,
    terminal: bool,
    failure: Option<ResponseFailure>,
}

impl PendingRequest {
    pub fn new(id: RequestId) -> Self {
        Self {
            id,
            accumulated: String::new(),
            terminal: false,
            failure: None,
        }
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn is_errored(&self) -> bool {
        self.failure.is_some()
    }

    pub fn failure(&self) -> Option<&ResponseFailure> {
        self.failure.as_ref()
    }

    /// Fold one classified payload into the record. Returns the fragment to
    /// forward to the UI, if any. Once terminal, every payload is ignored.
    pub fn apply(&mut self, payload: InboundPayload) -> Option<String> {
        if self.terminal {
            debug!(request_id = %self.id, "Ignoring payload after terminal");
            return None;
        }

        match payload {
            InboundPayload::Fragment(token) => {
                self.accumulated.push_str(&token);
                Some(token)
            }
            InboundPayload::Terminal { trailing } => {
                self.terminal = true;
                if let Some(ref token) = trailing {
                    self.accumulated.push_str(token);
                }
                trailing
            }
            InboundPayload::ServerError(detail) => {
                self.terminal = true;
                self.failure = Some(ResponseFailure::Server(detail));
                None
            }
            InboundPayload::Malformed(detail) => {
                self.terminal = true;
                self.failure = Some(ResponseFailure::Parse(detail));
                None
            }
        }
    }
}

/// Live registration of a request's response handler.
///
/// Dropping the subscription removes the handler from the channel, so a
/// later request on the same channel never sees this request's callbacks.
pub struct Subscription {
    channel: Arc<dyn Channel>,
    listener: Option<ListenerId>,
    pending: Arc<Mutex<PendingRequest>>,
}

impl Subscription {
    fn pending(&self) -> MutexGuard<'_, PendingRequest> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_terminal(&self) -> bool {
        self.pending().is_terminal()
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> PendingRequest {
        self.pending().clone()
    }

    pub fn unsubscribe(&mut self) {
        if let Some(id) = self.listener.take() {
            self.channel.off(id);
            debug!(request_id = %self.pending().id, "Response listener removed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Register the response handler for `id`, then emit the question.
///
/// The handler is in place before the emit so no early fragment is lost.
pub fn send(
    channel: &Arc<dyn Channel>,
    id: &RequestId,
    question: &str,
    on_fragment: FragmentSink,
) -> Result<Subscription, ChannelError> {
    let pending = Arc::new(Mutex::new(PendingRequest::new(id.clone())));

    let record = Arc::clone(&pending);
    let listener = channel.on(
        events::RESPONSE,
        Arc::new(move |payload| {
            let classified = InboundPayload::classify(payload);
            let forward = {
                let mut pending = record.lock().unwrap_or_else(PoisonError::into_inner);
                let forward = pending.apply(classified);
                if pending.is_terminal() {
                    match pending.failure() {
                        Some(failure) => {
                            warn!(request_id = %pending.id, ?failure, "Request failed")
                        }
                        None => debug!(
                            request_id = %pending.id,
                            bytes = pending.accumulated.len(),
                            "Request complete"
                        ),
                    }
                }
                forward
            };
            if let Some(fragment) = forward {
                on_fragment(&fragment);
            }
        }),
    );

    let mut subscription = Subscription {
        channel: Arc::clone(channel),
        listener: Some(listener),
        pending,
    };

    let request = OutboundRequest { id, question };
    if let Err(e) = channel.emit(events::REQUEST, request.to_value()) {
        warn!(request_id = %id, error = %e, "Failed to emit request");
        subscription.unsubscribe();
        return Err(e);
    }

    debug!(request_id = %id, bytes = question.len(), "Request emitted");
    Ok(subscription)
}
