//! Conversational session protocol for Parley.
//!
//! Relays a developer question to the inference backend over one persistent
//! channel and streams the answer back:
//! - `history`: size-bounded history window with whole-pair truncation
//! - `connection`: lazy connect, bounded reconnects, credential rotation
//! - `correlator`: per-request fragment accumulation and terminal detection
//! - `orchestrator`: the `ask()` facade with timeouts and cancellation
//! - `socketio`: Socket.IO over WebSocket channel; `memory`: in-process channel

pub mod channel;
pub mod connection;
pub mod context;
pub mod correlator;
pub mod credential;
pub mod followup;
pub mod history;
pub mod memory;
pub mod orchestrator;
pub mod protocol;
pub mod socketio;

pub use channel::{Channel, ChannelOptions, Connector, Handler, ListenerId};
pub use connection::{ConnectError, ConnectionManager, ConnectionState, ReadyChannel};
pub use context::{build_preamble, PromptReference};
pub use correlator::{FragmentSink, PendingRequest, ResponseFailure, Subscription};
pub use credential::{Credential, CredentialProvider, EnvCredentialProvider, StaticCredentialProvider};
pub use followup::{FollowUp, FollowUpProbe};
pub use history::{ConversationTurn, HistoryWindowBuilder};
pub use memory::{MemoryChannel, MemoryConnector};
pub use orchestrator::{
    AskOutcome, AskReport, AskRequest, SessionError, SessionOrchestrator, SessionPhase,
    SessionSettings,
};
pub use protocol::InboundPayload;
pub use socketio::SocketIoConnector;
