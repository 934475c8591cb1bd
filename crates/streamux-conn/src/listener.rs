use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use streamux_frame::{FrameError, Packet, PacketConfig, PacketReader, PacketWriter};
use streamux_transport::{DatagramChannel, UdpChannel};
use tracing::{debug, info, warn};

use crate::control::{control_packet, ControlKind};
use crate::error::Result;
use crate::handshake::ReceiverState;
use crate::reassembler::{span, Reassembler, Throughput};

/// Configuration for the receiving side of a connection.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub packet: PacketConfig,
    /// Drop DATA and FIN that arrive before any SYN.
    pub require_handshake: bool,
    /// Read timeout used to poll the shutdown flag.
    pub poll_interval: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            packet: PacketConfig::default(),
            require_handshake: true,
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// Datagram counters for one served connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceiverStats {
    pub datagrams: u64,
    pub syn_received: u64,
    pub data_packets: u64,
    pub echoed: u64,
    pub dropped: u64,
    pub malformed: u64,
}

/// Receiving side of one connection.
///
/// Answers SYN with SYN-ACK, feeds DATA into a [`Reassembler`] and echoes
/// each DATA packet back unchanged, and stops after answering FIN with
/// FIN-ACK.
pub struct Receiver<C> {
    reader: PacketReader<C>,
    writer: PacketWriter<C>,
    config: ReceiverConfig,
    state: ReceiverState,
    connection_id: Option<u32>,
    peer: Option<SocketAddr>,
    reassembler: Reassembler,
    stats: ReceiverStats,
    first_data: Option<Instant>,
    last_data: Option<Instant>,
    shutdown: Option<Arc<AtomicBool>>,
}

impl<C: DatagramChannel + Clone> Receiver<C> {
    /// Create a receiver that reads and writes through one shared channel handle.
    pub fn new(channel: C, config: ReceiverConfig) -> Result<Self> {
        Self::from_parts(channel.clone(), channel, config)
    }
}

impl Receiver<UdpChannel> {
    /// Bind a UDP socket and listen on it.
    pub fn bind(addr: impl ToSocketAddrs, config: ReceiverConfig) -> Result<Self> {
        let socket = UdpChannel::bind(addr)?;
        let reader_socket = socket.try_clone()?;
        Self::from_parts(reader_socket, socket, config)
    }
}

impl<C: DatagramChannel> Receiver<C> {
    /// Create a receiver from separate reading and writing channel handles.
    pub fn from_parts(reader_channel: C, writer_channel: C, config: ReceiverConfig) -> Result<Self> {
        let reader = PacketReader::with_config(reader_channel, config.packet.clone())?;
        let writer = PacketWriter::with_config(writer_channel, config.packet.clone());

        Ok(Self {
            reader,
            writer,
            config,
            state: ReceiverState::Listening,
            connection_id: None,
            peer: None,
            reassembler: Reassembler::new(),
            stats: ReceiverStats::default(),
            first_data: None,
            last_data: None,
            shutdown: None,
        })
    }

    /// Stop serving once `flag` is set. Checked whenever a read times out.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn with_require_handshake(mut self, require: bool) -> Self {
        self.config.require_handshake = require;
        self
    }

    /// Serve one connection until FIN or shutdown.
    ///
    /// Undecodable datagrams are counted and skipped. Returns the channel
    /// error if the channel closes before FIN, or if a configured
    /// `read_timeout` expires while no shutdown flag is installed.
    pub fn serve(&mut self) -> Result<()> {
        if self.shutdown.is_some() {
            let poll = match self.config.packet.read_timeout {
                Some(t) if t < self.config.poll_interval => t,
                _ => self.config.poll_interval,
            };
            self.reader.set_read_timeout(Some(poll))?;
        }

        let local = self.reader.get_ref().local_addr()?;
        info!(%local, "listening");

        while self.state != ReceiverState::Closed {
            match self.reader.read_packet() {
                Ok((packet, src)) => {
                    self.handle_packet(packet, src)?;
                }
                Err(FrameError::Transport(err)) if err.is_timeout() => {
                    if self.shutdown.is_none() {
                        return Err(err.into());
                    }
                    if self.shutdown_requested() {
                        info!(state = %self.state, "shutdown requested, stop listening");
                        return Ok(());
                    }
                }
                Err(FrameError::Transport(err)) => return Err(err.into()),
                Err(err) => {
                    self.stats.datagrams += 1;
                    self.stats.malformed += 1;
                    warn!(error = %err, "dropping malformed datagram");
                }
            }
        }
        Ok(())
    }

    /// Dispatch one decoded packet. Returns `true` once the connection closed.
    ///
    /// SYN is handled first, then DATA, then FIN, so a packet carrying several
    /// flags is processed in lifecycle order.
    pub fn handle_packet(&mut self, packet: Packet, src: SocketAddr) -> Result<bool> {
        self.stats.datagrams += 1;
        let flags = packet.flags();
        let id = packet.header.connection_id;

        if let Some(current) = self.connection_id {
            if current != id {
                self.stats.dropped += 1;
                warn!(
                    connection_id = id,
                    established = current,
                    %src,
                    "dropping packet for another connection"
                );
                return Ok(false);
            }
        }

        if flags.is_syn() {
            self.stats.syn_received += 1;
            let ack = control_packet(ControlKind::SynAck, id, packet.header.packet_number);
            self.writer.write_packet(&ack, src)?;
            if self.state == ReceiverState::Listening {
                self.establish(id, src);
            } else {
                debug!(connection_id = id, "duplicate SYN acknowledged");
            }
        }

        if flags.is_data() {
            if !self.accepts_unsolicited(id, src, "DATA") {
                return Ok(false);
            }
            let now = Instant::now();
            self.reassembler.ingest_packet_at(&packet, now);
            self.first_data.get_or_insert(now);
            self.last_data = Some(now);
            self.stats.data_packets += 1;
            self.writer.write_packet(&packet, src)?;
            self.stats.echoed += 1;
        }

        if flags.is_fin() {
            if !self.accepts_unsolicited(id, src, "FIN") {
                return Ok(false);
            }
            let ack = control_packet(ControlKind::FinAck, id, packet.header.packet_number);
            self.writer.write_packet(&ack, src)?;
            self.state = ReceiverState::Closed;
            info!(
                connection_id = id,
                streams = self.reassembler.len(),
                bytes = self.reassembler.total_bytes(),
                data_packets = self.stats.data_packets,
                "connection closed"
            );
        }

        Ok(self.state == ReceiverState::Closed)
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn connection_id(&self) -> Option<u32> {
        self.connection_id
    }

    /// Address the connection was established from.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn reassembler(&self) -> &Reassembler {
        &self.reassembler
    }

    pub fn into_reassembler(self) -> Reassembler {
        self.reassembler
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    /// Payload bytes and DATA packets per second, first to last DATA packet.
    pub fn throughput(&self) -> Throughput {
        Throughput::measure(
            self.reassembler.total_bytes(),
            self.stats.data_packets,
            span(self.first_data, self.last_data),
        )
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.reader.get_ref().local_addr()?)
    }

    fn establish(&mut self, id: u32, src: SocketAddr) {
        self.state = ReceiverState::Established;
        self.connection_id = Some(id);
        self.peer = Some(src);
        info!(connection_id = id, peer = %src, "connection established");
    }

    /// Before any SYN, either drop the packet or adopt its connection.
    fn accepts_unsolicited(&mut self, id: u32, src: SocketAddr, kind: &str) -> bool {
        if self.state != ReceiverState::Listening {
            return true;
        }
        if self.config.require_handshake {
            self.stats.dropped += 1;
            warn!(connection_id = id, %src, kind, "dropping packet received before handshake");
            return false;
        }
        self.establish(id, src);
        true
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}
