use serde::{Deserialize, Serialize};

/// Settings for the bounded conversational context sent with each question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Byte budget for the serialized history window.
    pub budget: usize,
    /// Include every open editor file in the preamble, not only explicit references.
    pub include_open_files: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            budget: 12_000,
            include_open_files: false,
        }
    }
}
