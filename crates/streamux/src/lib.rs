//! Multiplex many byte streams over a single datagram connection.
//!
//! streamux slices any number of byte streams into fixed-budget packets,
//! sends them over UDP (or an in-process channel) behind a SYN / SYN-ACK
//! handshake, and rebuilds every stream on the receiving side.
//!
//! # Crate Structure
//!
//! - [`transport`]: datagram channel abstraction (UDP, in-memory pairs)
//! - [`frame`]: packet and frame wire codec
//! - [`conn`]: multiplexer, reassembler, sender and receiver (behind `conn` feature)
//!
//! The protocol assumes a lossless, ordered channel; see [`conn`] for details.

/// Re-export transport types.
pub mod transport {
    pub use streamux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use streamux_frame::*;
}

/// Re-export connection types (requires `conn` feature).
#[cfg(feature = "conn")]
pub mod conn {
    pub use streamux_conn::*;
}
