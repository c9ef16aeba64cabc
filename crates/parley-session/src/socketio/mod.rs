//! Socket.IO channel over `tokio-tungstenite`.
//!
//! Speaks Engine.IO v4 / Socket.IO v5 on a single WebSocket, in the default
//! namespace. The client authenticates in the CONNECT packet with the
//! session's access token.

mod client;
pub mod codec;
mod connection;

pub use client::{SocketIoChannel, SocketIoConnector};
