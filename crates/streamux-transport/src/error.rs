use std::net::SocketAddr;

/// Errors that can occur on a datagram channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// An I/O error occurred while sending or receiving a datagram.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel (or its peer) has been closed.
    #[error("channel closed")]
    Closed,
}

impl TransportError {
    /// True when the error is a read timeout rather than a channel failure.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TransportError::Io(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
