//! Protocol error types.

use thiserror::Error;

/// Errors raised while framing, building commands or parsing replies.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u64, max: u32 },

    #[error("malformed reply: payload is not valid UTF-8")]
    MalformedReply,

    #[error("no changes specified")]
    NoChangesSpecified,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ProtocolError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ProtocolError::InvalidArgument(msg.into())
    }
}
