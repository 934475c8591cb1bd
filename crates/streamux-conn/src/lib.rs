//! Stream multiplexing and connection lifecycle over datagrams.
//!
//! A [`Sender`] opens a connection with SYN / SYN-ACK, slices any number of
//! byte streams into DATA packets through a [`Multiplexer`], and closes with
//! FIN. A [`Receiver`] answers the handshake, rebuilds each stream in a
//! [`Reassembler`], echoes every DATA packet, and stops after FIN-ACK.
//!
//! # Delivery assumption
//!
//! The protocol has no retransmission, acknowledgement of data, or reordering
//! buffer. Frames are appended to their stream in arrival order, so streams
//! are only reproduced exactly when the channel is lossless and ordered
//! (loopback UDP, a quiet LAN, or [`MemoryChannel`]). Over a lossy network
//! a lost or reordered datagram corrupts the affected streams silently.
//!
//! [`MemoryChannel`]: streamux_transport::MemoryChannel

pub mod connector;
pub mod control;
pub mod error;
pub mod handshake;
pub mod listener;
pub mod multiplexer;
pub mod reassembler;

pub use connector::{
    send_streams, send_streams_with_config, SendSummary, Sender, SenderConfig, DEFAULT_PACING,
};
pub use control::{
    control_packet, is_marker, marker_of, ControlKind, MARKER_FIN, MARKER_FIN_ACK, MARKER_SYN,
    MARKER_SYN_ACK,
};
pub use error::{ConnError, Result};
pub use handshake::{Connection, HandshakeConfig, ReceiverState, SenderState};
pub use listener::{Receiver, ReceiverConfig, ReceiverStats};
pub use multiplexer::{
    MultiplexConfig, Multiplexer, SendStreamState, StreamId, CHUNK_SIZE_POLICY,
    DEFAULT_FRAME_FRACTION, MAX_STREAMS,
};
pub use reassembler::{Reassembler, RecvStreamState, StreamSummary, Throughput};

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use bytes::Bytes;
    use streamux_frame::{Flags, PacketReader, PacketWriter};
    use streamux_transport::{DatagramChannel, MemoryChannel, UdpChannel};

    use super::*;

    fn pattern(len: usize, seed: u8) -> Bytes {
        (0..len)
            .map(|i| ((i * 7 + i / 251) as u8).wrapping_add(seed))
            .collect::<Vec<u8>>()
            .into()
    }

    fn sender_config() -> SenderConfig {
        SenderConfig {
            handshake: HandshakeConfig {
                timeout: Duration::from_secs(5),
                fin_ack_linger: None,
            },
            pacing: Duration::ZERO,
            ..SenderConfig::default()
        }
    }

    struct Received {
        streams: BTreeMap<StreamId, Bytes>,
        stats: ReceiverStats,
        state: ReceiverState,
    }

    /// Run one sender and one receiver over an in-memory pair.
    fn transfer(sources: &[Bytes], config: SenderConfig) -> (SendSummary, Received) {
        let (left, right) = MemoryChannel::pair();
        let peer = left.peer_addr();

        let server = thread::spawn(move || {
            let mut rx = Receiver::new(Arc::new(right), ReceiverConfig::default())
                .expect("receiver should build");
            rx.serve().expect("receiver should serve until FIN");
            let stats = rx.stats().clone();
            let state = rx.state();
            Received {
                streams: rx.into_reassembler().into_streams(),
                stats,
                state,
            }
        });

        let mut sender = Sender::new(&left, peer, config).expect("sender should build");
        for source in sources {
            sender
                .register(source.clone())
                .expect("register should succeed");
        }
        let summary = sender.run().expect("send should complete");
        let received = server.join().expect("receiver thread should complete");
        (summary, received)
    }

    #[test]
    fn streams_of_every_size_reassemble_exactly() {
        let sources = vec![
            Bytes::new(),
            pattern(1, 1),
            pattern(1024, 2),
            pattern(2 * 1024 * 1024, 3),
        ];
        let (summary, received) = transfer(&sources, sender_config());

        assert_eq!(received.state, ReceiverState::Closed);
        assert_eq!(summary.streams, 4);
        assert_eq!(summary.bytes_sent, 1 + 1024 + 2 * 1024 * 1024);

        // The empty stream never produces a frame, so the receiver never sees it.
        assert!(!received.streams.contains_key(&0));
        for (id, source) in sources.iter().enumerate().skip(1) {
            let got = &received.streams[&(id as StreamId)];
            assert_eq!(got.len(), source.len(), "stream {id} length");
            assert!(got == source, "stream {id} content");
        }
        assert_eq!(received.stats.data_packets, summary.data_packets);
        assert_eq!(received.stats.echoed, summary.data_packets);
    }

    #[test]
    fn many_streams_with_explicit_chunk_size() {
        let sources: Vec<Bytes> = (0..50).map(|i| pattern(i * 97 + 3, i as u8)).collect();
        let config = SenderConfig {
            multiplex: MultiplexConfig {
                chunk_size: Some(1500),
                frame_fraction: 0.3,
            },
            ..sender_config()
        };
        let (summary, received) = transfer(&sources, config);

        assert_eq!(summary.chunk_size, 1500);
        for (id, source) in sources.iter().enumerate() {
            assert_eq!(&received.streams[&(id as StreamId)], source);
        }
    }

    #[test]
    fn zero_streams_still_handshake_and_close() {
        let (summary, received) = transfer(&[], sender_config());

        assert_eq!(summary.data_packets, 0);
        assert_eq!(summary.bytes_sent, 0);
        assert!(received.streams.is_empty());
        assert_eq!(received.stats.syn_received, 1);
        assert_eq!(received.stats.data_packets, 0);
        assert_eq!(received.state, ReceiverState::Closed);
    }

    #[test]
    fn fin_ack_observed_with_linger() {
        let config = SenderConfig {
            handshake: HandshakeConfig {
                timeout: Duration::from_secs(5),
                fin_ack_linger: Some(Duration::from_secs(5)),
            },
            ..sender_config()
        };
        let (summary, _) = transfer(&[pattern(3000, 4)], config);
        assert!(summary.fin_acked);
    }

    #[test]
    fn handshake_precedes_data_and_one_ack_per_control_packet() {
        let (left, right) = MemoryChannel::pair();
        let peer = left.peer_addr();

        let server = thread::spawn(move || {
            let mut rx =
                Receiver::new(&right, ReceiverConfig::default()).expect("receiver should build");
            rx.serve().expect("receiver should serve");
            rx.stats().clone()
        });

        // Drive the sender side by hand to observe every reply.
        let mut reader = PacketReader::new(&left);
        let mut writer = PacketWriter::new(&left);
        writer
            .write_packet(&control_packet(ControlKind::Syn, 21, 1), peer)
            .unwrap();
        let (syn_ack, _) = reader.read_packet().unwrap();
        assert_eq!(syn_ack.flags().bits(), 0x03);

        let mut mux = Multiplexer::new(&MultiplexConfig {
            chunk_size: Some(1000),
            ..MultiplexConfig::default()
        });
        mux.register(pattern(2500, 0)).unwrap();
        let mut number = 2;
        while let Some(packet) = mux.build_next_packet(21, number) {
            writer.write_packet(&packet, peer).unwrap();
            let (echo, _) = reader.read_packet().unwrap();
            assert_eq!(echo, packet);
            number += 1;
        }

        writer
            .write_packet(&control_packet(ControlKind::Fin, 21, number), peer)
            .unwrap();
        let (fin_ack, _) = reader.read_packet().unwrap();
        assert_eq!(fin_ack.flags(), Flags::FIN_ACK);
        assert_eq!(fin_ack.header.packet_number, number);
        assert_eq!(marker_of(&fin_ack), Some(ControlKind::FinAck));

        let stats = server.join().expect("receiver thread should complete");
        assert_eq!(stats.syn_received, 1);
        assert_eq!(stats.data_packets, 3);
        assert_eq!(stats.dropped, 0);
    }

    #[test]
    fn unread_echoes_stay_queued_on_memory_channel() {
        let (left, right) = MemoryChannel::pair();
        let peer = left.peer_addr();

        let server = thread::spawn(move || {
            let mut rx =
                Receiver::new(&right, ReceiverConfig::default()).expect("receiver should build");
            rx.serve().expect("receiver should serve until FIN");
        });

        let mut sender = Sender::new(&left, peer, sender_config()).expect("sender should build");
        sender.register(pattern(4000, 1)).expect("register should succeed");
        sender.register(pattern(2500, 2)).expect("register should succeed");
        let summary = sender.run().expect("send should complete");
        server.join().expect("receiver thread should complete");

        left.set_read_timeout(Some(Duration::from_millis(20)))
            .expect("timeout should apply");
        let mut reader = PacketReader::new(&left);
        let mut echoes = 0;
        let mut fin_acks = 0;
        while let Ok((packet, _)) = reader.read_packet() {
            match marker_of(&packet) {
                Some(ControlKind::FinAck) => fin_acks += 1,
                None if packet.flags().is_data() => echoes += 1,
                _ => {}
            }
        }
        assert_eq!(echoes, summary.data_packets);
        assert_eq!(fin_acks, 1);
    }

    #[test]
    fn udp_loopback_small_payloads() {
        let mut rx =
            Receiver::bind("127.0.0.1:0", ReceiverConfig::default()).expect("receiver should bind");
        let addr = rx.local_addr().expect("receiver should have an address");

        let server = thread::spawn(move || {
            rx.serve().expect("receiver should serve until FIN");
            rx.into_reassembler().into_streams()
        });

        let sources = vec![Bytes::from_static(b"hello over udp"), pattern(4096, 9)];
        let summary = send_streams_with_config(
            addr,
            sources.clone(),
            SenderConfig {
                pacing: Duration::from_micros(200),
                ..sender_config()
            },
        )
        .expect("send should complete");

        let streams = server.join().expect("receiver thread should complete");
        assert_eq!(summary.streams, 2);
        assert_eq!(streams[&0], sources[0]);
        assert_eq!(streams[&1], sources[1]);
    }

    #[test]
    fn udp_sender_times_out_against_silent_socket() {
        let silent = UdpChannel::bind("127.0.0.1:0").expect("silent socket should bind");
        let addr = silent.local_addr().expect("silent socket should have an address");

        let config = SenderConfig {
            handshake: HandshakeConfig {
                timeout: Duration::from_millis(150),
                fin_ack_linger: None,
            },
            ..sender_config()
        };
        let err = send_streams_with_config(addr, [Bytes::from_static(b"x")], config).unwrap_err();
        assert!(matches!(err, ConnError::HandshakeTimeout(_)));
    }
}
