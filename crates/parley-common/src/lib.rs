pub mod errors;
pub mod id;
pub mod notifications;

pub use errors::{ChannelError, ConfigError, CredentialError, ParleyError};
pub use id::{new_id, RequestId};
pub use notifications::{Notification, NotificationLevel};

pub type Result<T> = std::result::Result<T, ParleyError>;
