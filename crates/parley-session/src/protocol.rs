//! Wire payloads for the question/answer exchange.
//!
//! Outbound: `{ "id": "...", "question": "..." }`.
//! Inbound, one per streamed fragment until terminal:
//! `{ "token": "..." }`, `{ "last_token": true }`, or
//! `{ "error": true, "error_description": "..." }`.

use serde::{Deserialize, Serialize};

use parley_common::RequestId;

/// One outbound question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundRequest<'a> {
    pub id: &'a RequestId,
    pub question: &'a str,
}

impl OutboundRequest<'_> {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id.as_str(),
            "question": self.question,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    last_token: Option<bool>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Classified inbound payload. Every payload maps to exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPayload {
    /// A non-terminal answer fragment.
    Fragment(String),
    /// Normal completion, optionally carrying a final fragment.
    Terminal { trailing: Option<String> },
    /// The backend reported an error; terminal.
    ServerError(String),
    /// The payload could not be understood; terminal.
    Malformed(String),
}

impl InboundPayload {
    /// Parse and classify a payload as delivered by the channel.
    ///
    /// Channels may deliver the JSON object directly or as a JSON-encoded
    /// string; both are accepted.
    pub fn classify(payload: &serde_json::Value) -> Self {
        let parsed;
        let value = match payload {
            serde_json::Value::String(text) => match serde_json::from_str(text) {
                Ok(v) => {
                    parsed = v;
                    &parsed
                }
                Err(e) => return Self::Malformed(format!("invalid JSON: {e}")),
            },
            other => other,
        };

        let raw: RawResponse = match serde_json::from_value(value.clone()) {
            Ok(raw) => raw,
            Err(e) => return Self::Malformed(format!("unexpected payload shape: {e}")),
        };

        if let Some(error) = raw.error.as_ref().filter(|e| is_truthy(e)) {
            let detail = raw
                .error_description
                .filter(|d| !d.is_empty())
                .or_else(|| error.as_str().map(String::from))
                .unwrap_or_else(|| "unknown server error".to_string());
            return Self::ServerError(detail);
        }

        if raw.last_token == Some(true) {
            return Self::Terminal {
                trailing: raw.token.filter(|t| !t.is_empty()),
            };
        }

        match raw.token {
            Some(token) => Self::Fragment(token),
            None => Self::Malformed("payload carries neither a token nor a terminal flag".into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Fragment(_))
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => !s.is_empty(),
        _ => true,
    }
}
