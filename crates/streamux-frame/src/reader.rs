use std::net::SocketAddr;

use bytes::Bytes;
use streamux_transport::DatagramChannel;
use tracing::trace;

use crate::codec::{decode_packet, Packet, PacketConfig};
use crate::error::Result;

/// Receives datagrams and decodes each one as a complete packet.
///
/// The receive buffer is sized to `max_datagram_size` once; datagrams are
/// never split or merged, so every successful read yields exactly one packet.
pub struct PacketReader<C> {
    inner: C,
    buf: Vec<u8>,
    config: PacketConfig,
}

impl<C: DatagramChannel> PacketReader<C> {
    /// Create a new packet reader with default configuration.
    pub fn new(inner: C) -> Self {
        Self {
            buf: vec![0u8; PacketConfig::default().max_datagram_size],
            inner,
            config: PacketConfig::default(),
        }
    }

    /// Create a packet reader and apply the read timeout from `config`.
    pub fn with_config(inner: C, config: PacketConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self {
            buf: vec![0u8; config.max_datagram_size],
            inner,
            config,
        })
    }

    /// Read the next datagram and decode it (blocking).
    ///
    /// Channel failures (including read timeouts) surface as
    /// `FrameError::Transport`; a datagram that fails to decode surfaces as
    /// the matching codec error and is consumed.
    pub fn read_packet(&mut self) -> Result<(Packet, SocketAddr)> {
        let (len, src) = self.inner.recv_from(&mut self.buf)?;
        let packet = decode_packet(Bytes::copy_from_slice(&self.buf[..len]))?;

        trace!(
            %src,
            packet_number = packet.header.packet_number,
            flags = %packet.header.flags,
            frames = packet.frames.len(),
            size = len,
            "read packet"
        );
        Ok((packet, src))
    }

    /// Change the read timeout for subsequent reads.
    pub fn set_read_timeout(&mut self, timeout: Option<std::time::Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout)?;
        self.config.read_timeout = timeout;
        Ok(())
    }

    /// Borrow the underlying channel.
    pub fn get_ref(&self) -> &C {
        &self.inner
    }

    /// Consume the reader and return the inner channel.
    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Current packet reader configuration.
    pub fn config(&self) -> &PacketConfig {
        &self.config
    }
}
