use std::time::Duration;

use thiserror::Error;

/// Failure of a single request/response exchange. Nothing in the link layer retries;
/// the error goes straight back to the caller of the exchange.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("invalid framing: {0}")]
    InvalidFraming(&'static str),
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("bad payload for {opcode}: {reason}")]
    BadPayload { opcode: &'static str, reason: String },
}

impl LinkError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::Timeout(_))
    }
}

pub type LinkResult<T> = Result<T, LinkError>;

/// Why a test case did not pass.
#[derive(Debug, Error)]
pub enum TestError {
    /// A measured value broke one of the case's limits.
    #[error("assertion failed: {0}")]
    Assertion(String),
    #[error("device error: {0}")]
    Device(#[from] LinkError),
}

impl TestError {
    pub fn assertion(msg: impl Into<String>) -> Self {
        TestError::Assertion(msg.into())
    }
}
