use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failures raised by a channel transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("channel is not connected")]
    NotConnected,

    #[error("channel closed")]
    Closed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("codec error: {0}")]
    Codec(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("no credential available: {0}")]
    Missing(String),

    #[error("credential expired")]
    Expired,

    #[error("credential provider error: {0}")]
    Provider(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("session error: {0}")]
    Session(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("context.budget must be positive".into());
        assert_eq!(
            err.to_string(),
            "config validation error: context.budget must be positive"
        );
    }

    #[test]
    fn channel_error_display() {
        assert_eq!(
            ChannelError::NotConnected.to_string(),
            "channel is not connected"
        );
        assert_eq!(ChannelError::Closed.to_string(), "channel closed");
        assert_eq!(
            ChannelError::SendFailed("queue full".into()).to_string(),
            "send failed: queue full"
        );
        assert_eq!(
            ChannelError::Codec("unknown packet type 'x'".into()).to_string(),
            "codec error: unknown packet type 'x'"
        );
    }

    #[test]
    fn credential_error_display() {
        assert_eq!(CredentialError::Expired.to_string(), "credential expired");
        assert_eq!(
            CredentialError::Missing("PARLEY_TOKEN not set".into()).to_string(),
            "no credential available: PARLEY_TOKEN not set"
        );
    }

    #[test]
    fn parley_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: ParleyError = config_err.into();
        assert!(matches!(err, ParleyError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn parley_error_from_channel() {
        let err: ParleyError = ChannelError::Closed.into();
        assert!(matches!(err, ParleyError::Channel(ChannelError::Closed)));
        assert_eq!(err.to_string(), "channel closed");
    }

    #[test]
    fn parley_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: ParleyError = io_err.into();
        assert!(matches!(err, ParleyError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn parley_error_other_variants() {
        let err = ParleyError::Session("busy".into());
        assert_eq!(err.to_string(), "session error: busy");

        let err = ParleyError::Other("something went wrong".into());
        assert_eq!(err.to_string(), "something went wrong");
    }
}
