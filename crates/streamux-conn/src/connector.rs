use std::net::{SocketAddr, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use streamux_frame::{PacketConfig, PacketReader, PacketWriter};
use streamux_transport::{resolve, DatagramChannel, UdpChannel};
use tracing::{debug, info};

use crate::error::{ConnError, Result};
use crate::handshake::{close_sender, handshake_sender, Connection, HandshakeConfig, SenderState};
use crate::multiplexer::{MultiplexConfig, Multiplexer, StreamId};

/// Delay between consecutive DATA packets.
pub const DEFAULT_PACING: Duration = Duration::from_micros(500);

/// Configuration for the sending side of a connection.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub packet: PacketConfig,
    pub handshake: HandshakeConfig,
    pub multiplex: MultiplexConfig,
    /// Sleep between DATA packets. Zero disables pacing.
    pub pacing: Duration,
    /// Fixed connection id. `None` picks a random one.
    pub connection_id: Option<u32>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            packet: PacketConfig::default(),
            handshake: HandshakeConfig::default(),
            multiplex: MultiplexConfig::default(),
            pacing: DEFAULT_PACING,
            connection_id: None,
        }
    }
}

/// Outcome of a completed send.
#[derive(Debug, Clone, Serialize)]
pub struct SendSummary {
    pub connection_id: u32,
    pub peer: SocketAddr,
    pub streams: usize,
    pub bytes_sent: u64,
    pub data_packets: u64,
    pub chunk_size: usize,
    pub fin_acked: bool,
    pub elapsed_ms: u64,
}

/// Sending side of one connection.
///
/// Streams are registered while idle; [`Sender::run`] then performs the
/// handshake, sends every stream and closes with FIN.
pub struct Sender<C> {
    reader: PacketReader<C>,
    writer: PacketWriter<C>,
    peer: SocketAddr,
    connection: Connection,
    mux: Multiplexer,
    state: SenderState,
    handshake: HandshakeConfig,
    pacing: Duration,
    data_packets: u64,
    fin_acked: bool,
    started: Option<Instant>,
    finished: Option<Instant>,
}

impl<C: DatagramChannel + Clone> Sender<C> {
    /// Create a sender that reads and writes through one shared channel handle.
    pub fn new(channel: C, peer: SocketAddr, config: SenderConfig) -> Result<Self> {
        Self::from_parts(channel.clone(), channel, peer, config)
    }
}

impl Sender<UdpChannel> {
    /// Bind an ephemeral UDP socket for talking to `peer`.
    pub fn bind(peer: impl ToSocketAddrs, config: SenderConfig) -> Result<Self> {
        let peer = resolve(peer)?;
        let socket = UdpChannel::bind_ephemeral_for(peer)?;
        let reader_socket = socket.try_clone()?;
        Self::from_parts(reader_socket, socket, peer, config)
    }
}

impl<C: DatagramChannel> Sender<C> {
    /// Create a sender from separate reading and writing channel handles.
    pub fn from_parts(
        reader_channel: C,
        writer_channel: C,
        peer: SocketAddr,
        config: SenderConfig,
    ) -> Result<Self> {
        let reader = PacketReader::with_config(reader_channel, config.packet.clone())?;
        let writer = PacketWriter::with_config(writer_channel, config.packet);
        let connection = match config.connection_id {
            Some(id) => Connection::new(id),
            None => Connection::random(),
        };

        Ok(Self {
            reader,
            writer,
            peer,
            connection,
            mux: Multiplexer::new(&config.multiplex),
            state: SenderState::Idle,
            handshake: config.handshake,
            pacing: config.pacing,
            data_packets: 0,
            fin_acked: false,
            started: None,
            finished: None,
        })
    }

    pub fn with_handshake_config(mut self, config: HandshakeConfig) -> Self {
        self.handshake = config;
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Queue a stream for sending. Only allowed before [`Sender::connect`].
    pub fn register(&mut self, data: impl Into<Bytes>) -> Result<StreamId> {
        self.expect_state(SenderState::Idle)?;
        self.mux.register(data.into())
    }

    /// Validate the configuration and perform the SYN / SYN-ACK handshake.
    ///
    /// Configuration problems are reported before anything is sent. A
    /// failed handshake leaves the sender closed.
    pub fn connect(&mut self) -> Result<()> {
        self.expect_state(SenderState::Idle)?;

        self.mux.validate()?;
        let max_packet = self.mux.max_packet_size();
        let max_datagram = self.writer.config().max_datagram_size;
        if max_packet > max_datagram {
            return Err(ConnError::Configuration(format!(
                "largest data packet would be {max_packet} bytes, exceeding datagram limit {max_datagram}"
            )));
        }

        self.started = Some(Instant::now());
        self.state = SenderState::SynSent;
        let outcome = handshake_sender(
            &mut self.reader,
            &mut self.writer,
            self.peer,
            &mut self.connection,
            &self.handshake,
        );
        if let Err(err) = outcome {
            self.state = SenderState::Closed;
            return Err(err);
        }

        self.state = SenderState::Established;
        info!(
            connection_id = self.connection.id(),
            peer = %self.peer,
            streams = self.mux.registered_count(),
            chunk_size = self.mux.chunk_size(),
            "connection established"
        );
        Ok(())
    }

    /// Send the next DATA packet. Returns `false` once every stream is sent.
    pub fn send_next(&mut self) -> Result<bool> {
        self.expect_state(SenderState::Established)?;

        let id = self.connection.id();
        if self.mux.is_empty() {
            return Ok(false);
        }
        let packet_number = self.connection.next_packet_number();
        let Some(packet) = self.mux.build_next_packet(id, packet_number) else {
            return Ok(false);
        };

        self.writer.write_packet(&packet, self.peer)?;
        self.data_packets += 1;
        debug!(
            packet_number,
            frames = packet.frames.len(),
            payload = packet.payload_len(),
            "data packet sent"
        );
        Ok(true)
    }

    /// Send DATA packets until every stream has retired, pacing between them.
    ///
    /// Echoed DATA packets are not read back; they stay in the channel's
    /// receive queue (see [`streamux_transport::MemoryChannel`]).
    pub fn transfer(&mut self) -> Result<u64> {
        let before = self.data_packets;
        while self.send_next()? {
            if !self.pacing.is_zero() && !self.mux.is_empty() {
                thread::sleep(self.pacing);
            }
        }
        Ok(self.data_packets - before)
    }

    /// Send FIN (and optionally linger for FIN-ACK), then close.
    ///
    /// Fails without sending anything while any stream is still active.
    pub fn finish(&mut self) -> Result<SendSummary> {
        self.expect_state(SenderState::Established)?;
        if !self.mux.is_empty() {
            return Err(ConnError::StreamsPending {
                active: self.mux.active_len(),
            });
        }

        self.state = SenderState::FinSent;
        let outcome = close_sender(
            &mut self.reader,
            &mut self.writer,
            self.peer,
            &mut self.connection,
            &self.handshake,
        );
        self.state = SenderState::Closed;
        self.finished = Some(Instant::now());
        self.fin_acked = outcome?;

        info!(
            connection_id = self.connection.id(),
            data_packets = self.data_packets,
            bytes = self.mux.bytes_sent(),
            fin_acked = self.fin_acked,
            "connection closed"
        );
        Ok(self.summary())
    }

    /// Handshake, send every registered stream, close.
    pub fn run(&mut self) -> Result<SendSummary> {
        self.connect()?;
        self.transfer()?;
        self.finish()
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn connection_id(&self) -> u32 {
        self.connection.id()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn multiplexer(&self) -> &Multiplexer {
        &self.mux
    }

    /// Counters for the connection so far.
    pub fn summary(&self) -> SendSummary {
        let elapsed = match (self.started, self.finished) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        };
        SendSummary {
            connection_id: self.connection.id(),
            peer: self.peer,
            streams: self.mux.registered_count(),
            bytes_sent: self.mux.bytes_sent(),
            data_packets: self.data_packets,
            chunk_size: self.mux.chunk_size(),
            fin_acked: self.fin_acked,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    fn expect_state(&self, expected: SenderState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ConnError::InvalidState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            })
        }
    }
}

/// Send `streams` to a receiver at `addr` over UDP with default configuration.
pub fn send_streams<I>(addr: impl ToSocketAddrs, streams: I) -> Result<SendSummary>
where
    I: IntoIterator,
    I::Item: Into<Bytes>,
{
    send_streams_with_config(addr, streams, SenderConfig::default())
}

/// Send `streams` to a receiver at `addr` over UDP.
pub fn send_streams_with_config<I>(
    addr: impl ToSocketAddrs,
    streams: I,
    config: SenderConfig,
) -> Result<SendSummary>
where
    I: IntoIterator,
    I::Item: Into<Bytes>,
{
    let mut sender = Sender::bind(addr, config)?;
    for stream in streams {
        sender.register(stream)?;
    }
    sender.run()
}

#[cfg(test)]
mod tests {
    use streamux_frame::Flags;
    use streamux_transport::MemoryChannel;

    use super::*;
    use crate::control::{control_packet, ControlKind};

    fn config() -> SenderConfig {
        SenderConfig {
            handshake: HandshakeConfig {
                timeout: Duration::from_millis(200),
                fin_ack_linger: None,
            },
            multiplex: MultiplexConfig {
                chunk_size: Some(1000),
                ..MultiplexConfig::default()
            },
            pacing: Duration::ZERO,
            connection_id: Some(11),
            ..SenderConfig::default()
        }
    }

    #[test]
    fn register_after_connect_rejected() {
        let (left, right) = MemoryChannel::pair();
        let peer = left.peer_addr();

        let acker = thread::spawn(move || {
            let mut reader = PacketReader::new(&right);
            let mut writer = PacketWriter::new(&right);
            let (syn, src) = reader.read_packet().expect("syn should arrive");
            writer
                .write_packet(
                    &control_packet(ControlKind::SynAck, syn.header.connection_id, 1),
                    src,
                )
                .expect("syn-ack should send");
        });

        let mut sender = Sender::new(&left, peer, config()).expect("sender should build");
        sender.connect().expect("handshake should complete");
        acker.join().expect("acker thread should complete");

        assert_eq!(sender.state(), SenderState::Established);
        let err = sender.register(Bytes::from_static(b"late")).unwrap_err();
        assert!(matches!(
            err,
            ConnError::InvalidState {
                expected: "idle",
                actual: "established"
            }
        ));
    }

    #[test]
    fn finish_refused_while_streams_remain() {
        let (left, right) = MemoryChannel::pair();
        let peer = left.peer_addr();

        let acker = thread::spawn(move || {
            let mut reader = PacketReader::new(&right);
            let mut writer = PacketWriter::new(&right);
            let (syn, src) = reader.read_packet().expect("syn should arrive");
            writer
                .write_packet(
                    &control_packet(ControlKind::SynAck, syn.header.connection_id, 1),
                    src,
                )
                .expect("syn-ack should send");
            let mut seen = Vec::new();
            loop {
                let (packet, _) = reader.read_packet().expect("packet should arrive");
                seen.push(packet.flags());
                if packet.flags().is_fin() {
                    return seen;
                }
            }
        });

        let mut sender = Sender::new(&left, peer, config()).expect("sender should build");
        sender.register(vec![3u8; 5000]).expect("register should succeed");
        sender.connect().expect("handshake should complete");
        assert!(sender.send_next().expect("first packet should send"));

        let err = sender.finish().unwrap_err();
        assert!(matches!(err, ConnError::StreamsPending { active: 1 }));
        assert_eq!(sender.state(), SenderState::Established);

        sender.transfer().expect("remaining packets should send");
        let summary = sender.finish().expect("finish should succeed once drained");
        assert_eq!(summary.bytes_sent, 5000);
        assert_eq!(sender.state(), SenderState::Closed);

        let seen = acker.join().expect("acker thread should complete");
        assert_eq!(seen.iter().filter(|f| f.is_fin()).count(), 1);
        assert_eq!(seen.last(), Some(&Flags::FIN));
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn zero_slice_configuration_fails_before_handshake() {
        let (left, right) = MemoryChannel::pair();
        let mut cfg = config();
        cfg.multiplex.chunk_size = Some(2);

        let mut sender = Sender::new(&left, left.peer_addr(), cfg).expect("sender should build");
        for _ in 0..10 {
            sender.register(vec![1u8; 10]).expect("register should succeed");
        }

        let err = sender.connect().unwrap_err();
        assert!(matches!(err, ConnError::Configuration(_)));
        assert_eq!(sender.state(), SenderState::Idle);

        right
            .set_read_timeout(Some(Duration::from_millis(10)))
            .expect("timeout should apply");
        let mut buf = [0u8; 64];
        assert!(right.recv_from(&mut buf).unwrap_err().is_timeout());
    }

    #[test]
    fn oversized_packets_fail_before_handshake() {
        let (left, _right) = MemoryChannel::pair();
        let mut cfg = config();
        cfg.packet.max_datagram_size = 512;

        let mut sender = Sender::new(&left, left.peer_addr(), cfg).expect("sender should build");
        sender.register(vec![0u8; 5000]).expect("register should succeed");

        assert!(matches!(
            sender.connect().unwrap_err(),
            ConnError::Configuration(_)
        ));
    }

    #[test]
    fn silent_peer_times_out_and_closes() {
        let (left, _right) = MemoryChannel::pair();
        let mut sender =
            Sender::new(&left, left.peer_addr(), config()).expect("sender should build");
        sender.register(vec![1u8; 10]).expect("register should succeed");

        let err = sender.run().unwrap_err();
        assert!(matches!(err, ConnError::HandshakeTimeout(_)));
        assert_eq!(sender.state(), SenderState::Closed);
        assert!(matches!(
            sender.send_next().unwrap_err(),
            ConnError::InvalidState { .. }
        ));
    }

    #[test]
    fn packet_numbers_increase_across_lifecycle() {
        let (left, right) = MemoryChannel::pair();
        let peer = left.peer_addr();

        let observer = thread::spawn(move || {
            let mut reader = PacketReader::new(&right);
            let mut writer = PacketWriter::new(&right);
            let mut seen = Vec::new();
            loop {
                let (packet, src) = reader.read_packet().expect("packet should arrive");
                seen.push((packet.header.packet_number, packet.flags()));
                if packet.flags() == Flags::SYN {
                    let ack = control_packet(
                        ControlKind::SynAck,
                        packet.header.connection_id,
                        packet.header.packet_number,
                    );
                    writer.write_packet(&ack, src).expect("syn-ack should send");
                }
                if packet.flags() == Flags::FIN {
                    return seen;
                }
            }
        });

        let mut sender = Sender::new(&left, peer, config()).expect("sender should build");
        sender.register(vec![7u8; 2500]).expect("register should succeed");
        let summary = sender.run().expect("send should complete");
        let seen = observer.join().expect("observer thread should complete");

        assert_eq!(
            seen,
            vec![
                (1, Flags::SYN),
                (2, Flags::DATA),
                (3, Flags::DATA),
                (4, Flags::DATA),
                (5, Flags::FIN),
            ]
        );
        assert_eq!(summary.data_packets, 3);
        assert_eq!(summary.bytes_sent, 2500);
        assert_eq!(summary.connection_id, 11);
        assert!(!summary.fin_acked);
        assert_eq!(sender.state(), SenderState::Closed);
    }
}
