//! Background WebSocket connection loop with capped reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::Command;
use super::codec::{EnginePacket, SocketPacket};
use crate::channel::{events, Listeners};

/// Budget for TCP/TLS/WebSocket setup plus the Engine.IO and Socket.IO
/// handshakes.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound for the doubled reconnect delay.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

pub(crate) struct LoopContext {
    pub(crate) url: String,
    pub(crate) token: String,
    pub(crate) reconnection_attempts: u32,
    pub(crate) reconnection_delay: Duration,
    pub(crate) listeners: Arc<Listeners>,
    pub(crate) connected: Arc<AtomicBool>,
    pub(crate) shutdown: CancellationToken,
}

/// How one socket session ended.
enum SessionEnd {
    /// `disconnect()` was called, or the channel was dropped.
    Shutdown,
    /// Never reached the CONNECT ack.
    ConnectFailed(String),
    /// Lost after the CONNECT ack.
    Dropped(String),
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Connect, run the session, and reconnect until `disconnect()` or until
/// `reconnection_attempts` consecutive attempts fail.
///
/// A session lost after its CONNECT ack is retried here only while nobody
/// shuts the channel down from the `disconnect` event. `ConnectionManager`
/// does exactly that: it discards the channel and opens a fresh one on the
/// next ask, so under the manager this loop ends after a drop.
pub(crate) async fn connection_loop(ctx: LoopContext, mut commands: mpsc::Receiver<Command>) {
    let mut failures = 0u32;
    let mut delay = ctx.reconnection_delay;

    loop {
        if ctx.shutdown.is_cancelled() {
            break;
        }

        info!(
            url = %ctx.url.split('?').next().unwrap_or(""),
            attempt = failures + 1,
            "Connecting to assistant"
        );

        match run_session(&ctx, &mut commands).await {
            SessionEnd::Shutdown => break,
            SessionEnd::ConnectFailed(reason) => {
                failures += 1;
                warn!(attempt = failures, error = %reason, "Connect attempt failed");
                ctx.listeners.dispatch(
                    events::CONNECT_ERROR,
                    &serde_json::json!({ "message": reason }),
                );
                if failures >= ctx.reconnection_attempts {
                    warn!(attempts = failures, "Giving up on reconnection");
                    break;
                }
            }
            SessionEnd::Dropped(reason) => {
                // Listeners may call `disconnect()` here; the select below
                // then exits instead of reconnecting.
                failures = 0;
                delay = ctx.reconnection_delay;
                if ctx.connected.swap(false, Ordering::AcqRel) {
                    ctx.listeners
                        .dispatch(events::DISCONNECT, &serde_json::json!(reason));
                }
            }
        }

        debug!(?delay, "Reconnecting after delay");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = ctx.shutdown.cancelled() => break,
        }
        delay = (delay * 2).min(MAX_RECONNECT_DELAY);
    }

    ctx.connected.store(false, Ordering::Release);
    debug!("Connection loop stopped");
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

async fn run_session(ctx: &LoopContext, commands: &mut mpsc::Receiver<Command>) -> SessionEnd {
    let connect = tokio::time::timeout(
        HANDSHAKE_TIMEOUT,
        tokio_tungstenite::connect_async(ctx.url.as_str()),
    );
    let ws_stream = tokio::select! {
        result = connect => match result {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => return SessionEnd::ConnectFailed(format!("websocket error: {e}")),
            Err(_) => return SessionEnd::ConnectFailed("websocket connect timed out".into()),
        },
        _ = ctx.shutdown.cancelled() => return SessionEnd::Shutdown,
    };

    let (mut write, mut read) = ws_stream.split();
    let mut acked = false;
    let mut ping_window = HANDSHAKE_TIMEOUT;
    let mut liveness = Instant::now() + ping_window;

    let end = |acked: bool, reason: String| {
        if acked {
            SessionEnd::Dropped(reason)
        } else {
            SessionEnd::ConnectFailed(reason)
        }
    };

    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => {
                if acked {
                    let _ = write.send(WsMessage::Text(SocketPacket::Disconnect.to_frame().into())).await;
                }
                let _ = write.send(WsMessage::Close(None)).await;
                return SessionEnd::Shutdown;
            }

            command = commands.recv(), if acked => match command {
                Some(Command::Send(frame)) => {
                    if let Err(e) = write.send(WsMessage::Text(frame.into())).await {
                        return end(acked, format!("send failed: {e}"));
                    }
                }
                None => return SessionEnd::Shutdown,
            },

            message = read.next() => match message {
                Some(Ok(WsMessage::Text(text))) => {
                    let packet = match EnginePacket::decode(text.as_str()) {
                        Ok(packet) => packet,
                        Err(e) => {
                            debug!(error = %e, "Ignoring undecodable frame");
                            continue;
                        }
                    };
                    match packet {
                        EnginePacket::Open(handshake) => {
                            debug!(sid = %handshake.sid, ping_interval = handshake.ping_interval, "Engine handshake");
                            ping_window = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
                            liveness = Instant::now() + ping_window;
                            let auth = serde_json::json!({ "token": ctx.token });
                            let frame = SocketPacket::Connect(Some(auth)).to_frame();
                            if let Err(e) = write.send(WsMessage::Text(frame.into())).await {
                                return end(acked, format!("send failed: {e}"));
                            }
                        }
                        EnginePacket::Ping(data) => {
                            liveness = Instant::now() + ping_window;
                            let pong = EnginePacket::Pong(data).encode();
                            if let Err(e) = write.send(WsMessage::Text(pong.into())).await {
                                return end(acked, format!("send failed: {e}"));
                            }
                        }
                        EnginePacket::Message(data) => match SocketPacket::decode(&data) {
                            Ok(SocketPacket::Connect(_)) => {
                                acked = true;
                                ctx.connected.store(true, Ordering::Release);
                                info!("Connected to assistant");
                                ctx.listeners.dispatch(events::CONNECT, &serde_json::Value::Null);
                            }
                            Ok(SocketPacket::ConnectError(value)) => {
                                return SessionEnd::ConnectFailed(SocketPacket::error_message(&value));
                            }
                            Ok(SocketPacket::Disconnect) => {
                                return end(acked, "io server disconnect".into());
                            }
                            Ok(SocketPacket::Event { name, payload }) => {
                                if acked {
                                    ctx.listeners.dispatch(&name, &payload);
                                }
                            }
                            Err(e) => debug!(error = %e, "Ignoring undecodable packet"),
                        },
                        EnginePacket::Close => return end(acked, "transport close".into()),
                        EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    return end(acked, "transport close".into());
                }
                Some(Err(e)) => return end(acked, format!("transport error: {e}")),
                Some(Ok(_)) => {}
            },

            _ = tokio::time::sleep_until(liveness) => {
                return end(acked, "ping timeout".into());
            }
        }
    }
}
