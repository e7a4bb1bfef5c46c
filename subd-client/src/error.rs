//! Client error types.

use subd_protocol::ProtocolError;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not connected to server")]
    NotConnected,

    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection lost: {0}")]
    ConnectionLost(#[from] std::io::Error),

    #[error("request timeout")]
    Timeout,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("state file error: {0}")]
    State(String),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl ClientError {
    /// Returns whether the connection can no longer be used after this error.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ClientError::NotConnected
                | ClientError::ConnectFailed { .. }
                | ClientError::ConnectionLost(_)
                | ClientError::Timeout
                | ClientError::Protocol(ProtocolError::FrameTooLarge { .. })
        )
    }

    /// Short name of the error class, for logs and status lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::NotConnected => "NotConnected",
            ClientError::ConnectFailed { .. } => "ConnectFailed",
            ClientError::ConnectionLost(_) => "ConnectionLost",
            ClientError::Timeout => "Timeout",
            ClientError::Protocol(ProtocolError::MalformedReply) => "MalformedReply",
            ClientError::Protocol(ProtocolError::NoChangesSpecified) => "NoChangesSpecified",
            ClientError::Protocol(ProtocolError::FrameTooLarge { .. }) => "FrameTooLarge",
            ClientError::Protocol(ProtocolError::InvalidArgument(_)) => "InvalidArgument",
            ClientError::State(_) => "State",
            ClientError::Config(_) => "Config",
        }
    }

    pub(crate) fn eof(context: &str) -> Self {
        ClientError::ConnectionLost(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            context.to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors() {
        assert!(ClientError::NotConnected.is_connection_error());
        assert!(ClientError::Timeout.is_connection_error());
        assert!(ClientError::eof("short read").is_connection_error());
        assert!(ClientError::Protocol(ProtocolError::FrameTooLarge { size: 9, max: 1 })
            .is_connection_error());

        assert!(!ClientError::Protocol(ProtocolError::MalformedReply).is_connection_error());
        assert!(!ClientError::Protocol(ProtocolError::NoChangesSpecified).is_connection_error());
    }

    #[test]
    fn test_kind() {
        assert_eq!(ClientError::NotConnected.kind(), "NotConnected");
        assert_eq!(ClientError::eof("x").kind(), "ConnectionLost");
        assert_eq!(
            ClientError::Protocol(ProtocolError::NoChangesSpecified).kind(),
            "NoChangesSpecified"
        );
    }

    #[test]
    fn test_display() {
        let err = ClientError::eof("reply body");
        assert!(err.to_string().contains("connection lost"));
        assert!(err.to_string().contains("reply body"));

        let err = ClientError::Protocol(ProtocolError::NoChangesSpecified);
        assert_eq!(err.to_string(), "no changes specified");
    }
}
