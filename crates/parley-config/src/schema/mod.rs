//! Configuration schema types for Parley.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod connection;
mod context;
mod followups;
mod system;

pub use connection::*;
pub use context::*;
pub use followups::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for Parley.
///
/// Only override what you want to change.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ParleyConfig {
    pub connection: ConnectionConfig,
    pub context: ContextConfig,
    pub followups: FollowUpConfig,
    pub logging: LoggingConfig,
}
