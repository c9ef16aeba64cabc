//! Size-bounded history window.
//!
//! Prior turns are re-sent with every question so the backend has context.
//! The window is cut from the oldest end in whole request/response pairs and
//! never exceeds the byte budget left after the new question and preamble.

use serde::{Deserialize, Serialize};
use tracing::debug;

use parley_common::RequestId;

pub const HUMAN_BEGIN: &str = "[[BEGIN Human message]]\n";
pub const HUMAN_END: &str = "\n[[END Human message]]\n";
pub const AI_BEGIN: &str = "[[BEGIN AI message]]\n";
pub const AI_END: &str = "\n[[END AI message]]\n";

/// Hint appended by the UI under answers that contain code.
pub const VALIDATE_CODE_HINT: &str =
    "\n\n> Use **Validate code** to check this snippet against your installation.";

/// Warning appended by the UI once a snippet has been validated.
pub const CODE_VALIDATED_WARNING: &str =
    "\n\n> This code was validated automatically; review it before running.";

/// Presentation-only strings removed before a response is re-sent as context.
pub const DISPOSABLE_MARKERS: &[&str] = &[VALIDATE_CODE_HINT, CODE_VALIDATED_WARNING];

/// One recorded turn of a conversation. Turns are immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ConversationTurn {
    Request { text: String, id: RequestId },
    Response { fragments: Vec<String> },
}

impl ConversationTurn {
    pub fn request(text: impl Into<String>, id: RequestId) -> Self {
        Self::Request {
            text: text.into(),
            id,
        }
    }

    pub fn response<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Response {
            fragments: fragments.into_iter().map(Into::into).collect(),
        }
    }

    /// Role-delimited form used inside the context window.
    pub fn to_context(&self) -> String {
        match self {
            Self::Request { text, .. } => wrap_human(text),
            Self::Response { fragments } => wrap_ai(&strip_disposable(&fragments.concat())),
        }
    }
}

pub fn wrap_human(text: &str) -> String {
    format!("{HUMAN_BEGIN}{text}{HUMAN_END}")
}

pub fn wrap_ai(text: &str) -> String {
    format!("{AI_BEGIN}{text}{AI_END}")
}

/// Remove UI-only hint and warning strings from response text.
pub fn strip_disposable(text: &str) -> String {
    DISPOSABLE_MARKERS
        .iter()
        .fold(text.to_string(), |acc, marker| acc.replace(marker, ""))
}

/// Builds the bounded context string sent as `question`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindowBuilder {
    budget: usize,
}

impl HistoryWindowBuilder {
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Bytes available to history once the wrapped question and preamble
    /// are paid for.
    pub fn history_limit(&self, question: &str, preamble: &str) -> usize {
        self.budget
            .saturating_sub(HUMAN_BEGIN.len() + HUMAN_END.len())
            .saturating_sub(question.len())
            .saturating_sub(preamble.len())
    }

    /// Serialize as many of the newest complete pairs as fit, oldest first,
    /// followed by the new question (prefixed by `preamble`).
    pub fn build(&self, history: &[ConversationTurn], question: &str, preamble: &str) -> String {
        let limit = self.history_limit(question, preamble);
        let pairs = complete_pairs(history);

        let mut accepted: Vec<String> = Vec::new();
        let mut used = 0usize;
        for (request, response) in pairs.iter().rev() {
            let serialized = format!("{}{}", request.to_context(), response.to_context());
            if used + serialized.len() > limit {
                break;
            }
            used += serialized.len();
            accepted.push(serialized);
        }

        debug!(
            pairs_total = pairs.len(),
            pairs_included = accepted.len(),
            history_bytes = used,
            limit,
            "Built history window"
        );

        let mut out = String::with_capacity(used + question.len() + preamble.len() + 64);
        for pair in accepted.iter().rev() {
            out.push_str(pair);
        }
        out.push_str(&wrap_human(&format!("{preamble}{question}")));
        out
    }
}

/// Request/response pairs in chronological order. A request not followed by
/// a response, or a response not preceded by a request, is dropped.
fn complete_pairs(history: &[ConversationTurn]) -> Vec<(&ConversationTurn, &ConversationTurn)> {
    let mut pairs = Vec::new();
    let mut i = 0;
    while i < history.len() {
        match (&history[i], history.get(i + 1)) {
            (ConversationTurn::Request { .. }, Some(next @ ConversationTurn::Response { .. })) => {
                pairs.push((&history[i], next));
                i += 2;
            }
            _ => i += 1,
        }
    }
    pairs
}
