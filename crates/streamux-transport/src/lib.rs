//! Datagram channel abstraction for streamux.
//!
//! The protocol engine treats the network as an opaque, unreliable datagram
//! channel: `send(bytes, dest)` and `receive() -> (bytes, src)`. This crate
//! provides that interface ([`DatagramChannel`]) and two implementations:
//! - [`UdpChannel`] over a standard UDP socket
//! - [`MemoryChannel`], an in-process lossless pair for tests
//!
//! This is the lowest layer of streamux. Everything else builds on top of it.

pub mod error;
pub mod memory;
pub mod traits;
pub mod udp;

pub use error::{Result, TransportError};
pub use memory::MemoryChannel;
pub use traits::DatagramChannel;
pub use udp::{resolve, UdpChannel};
