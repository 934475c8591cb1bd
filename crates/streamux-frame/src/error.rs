/// Errors that can occur during packet encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Not enough bytes for the packet header or a frame header.
    #[error("truncated packet (needed {needed} bytes, {available} available)")]
    TruncatedPacket { needed: usize, available: usize },

    /// A frame declares more payload than the packet carries.
    #[error("malformed frame (declared {declared} payload bytes, {available} available)")]
    MalformedFrame { declared: u64, available: usize },

    /// The header flags carry none of SYN, DATA or FIN.
    #[error("invalid packet flags {0:#04x}")]
    InvalidFlags(u8),

    /// The encoded packet exceeds the configured maximum datagram size.
    #[error("packet too large ({size} bytes, max {max})")]
    PacketTooLarge { size: usize, max: usize },

    /// The underlying datagram channel failed.
    #[error("channel error: {0}")]
    Transport(#[from] streamux_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
