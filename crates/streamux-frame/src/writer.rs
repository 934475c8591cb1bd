use std::net::SocketAddr;

use bytes::BytesMut;
use streamux_transport::DatagramChannel;
use tracing::trace;

use crate::codec::{encode_packet, Packet, PacketConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Encodes packets and sends each one as a single datagram.
pub struct PacketWriter<C> {
    inner: C,
    buf: BytesMut,
    config: PacketConfig,
}

impl<C: DatagramChannel> PacketWriter<C> {
    /// Create a new packet writer with default configuration.
    pub fn new(inner: C) -> Self {
        Self::with_config(inner, PacketConfig::default())
    }

    /// Create a new packet writer with explicit configuration.
    pub fn with_config(inner: C, config: PacketConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode `packet` and send it to `dest`.
    ///
    /// Packets larger than `max_datagram_size` are rejected before anything
    /// touches the channel.
    pub fn write_packet(&mut self, packet: &Packet, dest: SocketAddr) -> Result<()> {
        let size = packet.wire_size();
        if size > self.config.max_datagram_size {
            return Err(FrameError::PacketTooLarge {
                size,
                max: self.config.max_datagram_size,
            });
        }

        self.buf.clear();
        encode_packet(packet, &mut self.buf);
        self.inner.send_to(&self.buf, dest)?;

        trace!(
            %dest,
            packet_number = packet.header.packet_number,
            flags = %packet.header.flags,
            frames = packet.frames.len(),
            size,
            "wrote packet"
        );
        Ok(())
    }

    /// Borrow the underlying channel.
    pub fn get_ref(&self) -> &C {
        &self.inner
    }

    /// Consume the writer and return the inner channel.
    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Current packet writer configuration.
    pub fn config(&self) -> &PacketConfig {
        &self.config
    }
}
