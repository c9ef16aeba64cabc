//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! An Engine.IO frame is a one-digit packet type followed by data. Socket.IO
//! packets travel inside Engine.IO `message` frames, again as a one-digit
//! type, an optional `/namespace,` and an optional ack id, then JSON.

use serde::Deserialize;

use parley_common::ChannelError;

/// Engine.IO `open` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self, ChannelError> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ChannelError::Codec("empty engine frame".into()))?;
        let data = chars.as_str();

        match kind {
            '0' => serde_json::from_str(data)
                .map(Self::Open)
                .map_err(|e| ChannelError::Codec(format!("bad handshake: {e}"))),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(data.to_string())),
            '3' => Ok(Self::Pong(data.to_string())),
            '4' => Ok(Self::Message(data.to_string())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(ChannelError::Codec(format!(
                "unknown engine packet type {other:?}"
            ))),
        }
    }

    /// Client-originated frames only; `Open` is never sent by a client.
    pub fn encode(&self) -> String {
        match self {
            Self::Open(_) => "0".to_string(),
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<serde_json::Value>),
    Disconnect,
    Event {
        name: String,
        payload: serde_json::Value,
    },
    ConnectError(serde_json::Value),
}

impl SocketPacket {
    pub fn decode(data: &str) -> Result<Self, ChannelError> {
        let mut chars = data.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ChannelError::Codec("empty socket packet".into()))?;
        let rest = skip_ack_id(skip_namespace(chars.as_str()));

        match kind {
            '0' => Ok(Self::Connect(parse_optional(rest)?)),
            '1' => Ok(Self::Disconnect),
            '2' => {
                let args: Vec<serde_json::Value> = serde_json::from_str(rest)
                    .map_err(|e| ChannelError::Codec(format!("bad event: {e}")))?;
                let mut args = args.into_iter();
                let name = match args.next() {
                    Some(serde_json::Value::String(name)) => name,
                    _ => return Err(ChannelError::Codec("event without a name".into())),
                };
                Ok(Self::Event {
                    name,
                    payload: args.next().unwrap_or(serde_json::Value::Null),
                })
            }
            '4' => Ok(Self::ConnectError(
                parse_optional(rest)?.unwrap_or(serde_json::Value::Null),
            )),
            other => Err(ChannelError::Codec(format!(
                "unsupported socket packet type {other:?}"
            ))),
        }
    }

    /// The full Engine.IO text frame carrying this packet.
    pub fn to_frame(&self) -> String {
        let data = match self {
            Self::Connect(None) => "0".to_string(),
            Self::Connect(Some(auth)) => format!("0{auth}"),
            Self::Disconnect => "1".to_string(),
            Self::Event { name, payload } => {
                format!("2{}", serde_json::json!([name, payload]))
            }
            Self::ConnectError(value) => format!("4{value}"),
        };
        EnginePacket::Message(data).encode()
    }

    /// Human-readable reason from a `ConnectError` payload.
    pub fn error_message(value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other
                .get("message")
                .and_then(|m| m.as_str())
                .map(String::from)
                .unwrap_or_else(|| other.to_string()),
        }
    }
}

fn skip_namespace(data: &str) -> &str {
    if data.starts_with('/') {
        match data.find(',') {
            Some(idx) => &data[idx + 1..],
            None => "",
        }
    } else {
        data
    }
}

fn skip_ack_id(data: &str) -> &str {
    data.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn parse_optional(data: &str) -> Result<Option<serde_json::Value>, ChannelError> {
    if data.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(data)
        .map(Some)
        .map_err(|e| ChannelError::Codec(format!("bad packet data: {e}")))
}
