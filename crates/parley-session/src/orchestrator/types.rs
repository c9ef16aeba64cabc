//! Orchestrator inputs, outcomes, and the in-flight guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parley_common::{CredentialError, Notification, RequestId};
use parley_config::ParleyConfig;

use crate::followup::FollowUpProbe;
use crate::history::ConversationTurn;

/// One question together with the context it should carry.
#[derive(Debug, Clone, Default)]
pub struct AskRequest {
    pub question: String,
    pub history: Vec<ConversationTurn>,
    pub preamble: String,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }
}

/// How an ask ended. Every variant is a normal, structured result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskOutcome {
    Answer(String),
    TimedOut,
    Cancelled,
    ConnectionFailed,
    ServerError(String),
    ParseError(String),
}

impl AskOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Answer(_) => "answer",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
            Self::ConnectionFailed => "connection_failed",
            Self::ServerError(_) => "server_error",
            Self::ParseError(_) => "parse_error",
        }
    }

    pub fn is_answer(&self) -> bool {
        matches!(self, Self::Answer(_))
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Answer(text) => Some(text),
            _ => None,
        }
    }

    /// The single user-facing message for a failed ask. `None` for answers
    /// and cancellations.
    pub fn notification(&self) -> Option<Notification> {
        match self {
            Self::Answer(_) | Self::Cancelled => None,
            Self::TimedOut => Some(Notification::warning(
                "The assistant did not finish answering in time",
                "",
            )),
            Self::ConnectionFailed => Some(Notification::error(
                "Could not connect to the assistant",
                "",
            )),
            Self::ServerError(detail) => {
                Some(Notification::error("The assistant reported an error", detail))
            }
            Self::ParseError(detail) => Some(Notification::error(
                "Received an unreadable response from the assistant",
                detail,
            )),
        }
    }
}

/// Result of one `ask()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskReport {
    pub request_id: RequestId,
    pub outcome: AskOutcome,
}

/// Reasons an ask could not start.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("another question is still in flight")]
    Busy,

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    BuildingContext,
    AwaitingConnection,
    AwaitingResponse,
    Resolved,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Byte budget for the history window.
    pub budget: usize,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub probes: Vec<FollowUpProbe>,
    pub probe_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&ParleyConfig::default())
    }
}

impl SessionSettings {
    pub fn from_config(config: &ParleyConfig) -> Self {
        Self {
            budget: config.context.budget,
            connect_timeout: config.connection.connect_timeout(),
            request_timeout: config.connection.request_timeout(),
            poll_interval: config.connection.poll_interval(),
            probes: FollowUpProbe::from_config(&config.followups),
            probe_timeout: config.followups.probe_timeout(),
        }
    }
}

/// Clears the `busy` flag on drop, so an early return or a dropped future
/// never leaves the session stuck.
pub(crate) struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Result<Self, SessionError> {
        if flag
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(SessionError::Busy);
        }
        Ok(Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
