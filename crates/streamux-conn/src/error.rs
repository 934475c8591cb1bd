use std::time::Duration;

use streamux_frame::FrameError;
use streamux_transport::TransportError;

/// Errors that can occur while driving a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// No SYN-ACK arrived before the handshake deadline.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The datagram channel failed to send or receive.
    #[error("channel error: {0}")]
    Channel(TransportError),

    /// A packet could not be encoded or decoded.
    #[error("frame error: {0}")]
    Frame(FrameError),

    /// Chunk size, frame fraction or stream count cannot make progress.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// An operation was attempted in the wrong connection state.
    #[error("invalid state: expected {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// FIN was requested while streams still had data to send.
    #[error("{active} stream(s) still have data to send")]
    StreamsPending { active: usize },
}

impl From<TransportError> for ConnError {
    fn from(err: TransportError) -> Self {
        ConnError::Channel(err)
    }
}

impl From<FrameError> for ConnError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Transport(err) => ConnError::Channel(err),
            other => ConnError::Frame(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnError>;
