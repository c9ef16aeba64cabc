//! The `ask()` facade.
//!
//! A `SessionOrchestrator` owns the connection manager and drives one
//! question at a time through context building, connection, and the
//! streamed response. Failures come back as [`AskOutcome`] variants.

mod ask;
mod types;

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use parley_config::ParleyConfig;

use crate::channel::{ChannelOptions, Connector};
use crate::connection::ConnectionManager;
use crate::credential::CredentialProvider;

pub use types::{AskOutcome, AskReport, AskRequest, SessionError, SessionPhase, SessionSettings};

#[derive(Default)]
struct LastExchange {
    prompt: Option<String>,
    response: Option<String>,
}

pub struct SessionOrchestrator {
    connection: ConnectionManager,
    credentials: Arc<dyn CredentialProvider>,
    settings: SessionSettings,
    busy: AtomicBool,
    phase: Mutex<SessionPhase>,
    last: Mutex<LastExchange>,
}

impl SessionOrchestrator {
    pub fn new(
        connector: Arc<dyn Connector>,
        options: ChannelOptions,
        credentials: Arc<dyn CredentialProvider>,
        settings: SessionSettings,
    ) -> Self {
        let connection = ConnectionManager::new(connector, options, settings.poll_interval);
        if let Some(changes) = credentials.changes() {
            connection.follow_credential(changes);
        }
        Self {
            connection,
            credentials,
            settings,
            busy: AtomicBool::new(false),
            phase: Mutex::new(SessionPhase::Idle),
            last: Mutex::new(LastExchange::default()),
        }
    }

    pub fn from_config(
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
        config: &ParleyConfig,
    ) -> Self {
        Self::new(
            connector,
            ChannelOptions::from_config(&config.connection),
            credentials,
            SessionSettings::from_config(config),
        )
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Question text of the most recent answered ask.
    pub fn last_prompt(&self) -> Option<String> {
        self.last().prompt.clone()
    }

    /// Answer text of the most recent answered ask.
    pub fn last_response(&self) -> Option<String> {
        self.last().response.clone()
    }

    fn last(&self) -> MutexGuard<'_, LastExchange> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: SessionPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }
}
