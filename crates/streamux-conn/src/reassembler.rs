//! Receiver-side stream reassembly.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use streamux_frame::{Frame, Packet};
use tracing::{debug, trace};

use crate::multiplexer::StreamId;

/// Accumulated state of one received stream.
#[derive(Debug, Default)]
pub struct RecvStreamState {
    accumulated: BytesMut,
    bytes_received: u64,
    packets_received: u64,
    first_frame: Option<Instant>,
    last_frame: Option<Instant>,
}

impl RecvStreamState {
    /// Everything received so far, in arrival order.
    pub fn data(&self) -> &[u8] {
        &self.accumulated
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Number of frames delivered for this stream.
    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }

    /// Time between the first and the latest frame of this stream.
    pub fn elapsed(&self) -> Duration {
        span(self.first_frame, self.last_frame)
    }

    pub fn throughput(&self) -> Throughput {
        Throughput::measure(self.bytes_received, self.packets_received, self.elapsed())
    }
}

/// Time between two optional instants; zero unless both are known.
pub(crate) fn span(first: Option<Instant>, last: Option<Instant>) -> Duration {
    match (first, last) {
        (Some(first), Some(last)) => last.saturating_duration_since(first),
        _ => Duration::ZERO,
    }
}

/// Elapsed time and average rates over a span of received traffic.
///
/// Rates are zero when the span is empty, e.g. a stream that arrived in a
/// single frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Throughput {
    pub elapsed_us: u64,
    pub bytes_per_sec: f64,
    pub packets_per_sec: f64,
}

impl Throughput {
    pub fn measure(bytes: u64, packets: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let rate = |n: u64| if secs > 0.0 { n as f64 / secs } else { 0.0 };
        Self {
            elapsed_us: elapsed.as_micros().try_into().unwrap_or(u64::MAX),
            bytes_per_sec: rate(bytes),
            packets_per_sec: rate(packets),
        }
    }
}

/// Per-stream totals, suitable for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamSummary {
    pub stream_id: StreamId,
    pub bytes_received: u64,
    pub packets_received: u64,
    #[serde(flatten)]
    pub throughput: Throughput,
}

/// Rebuilds streams from DATA frames.
///
/// Frames are appended in arrival order. The channel is assumed lossless
/// and ordered, so offsets are only checked for diagnostics; a mismatch is
/// logged and the payload is still appended.
#[derive(Debug, Default)]
pub struct Reassembler {
    streams: BTreeMap<StreamId, RecvStreamState>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one frame to its stream, creating the stream on first sight.
    pub fn ingest(&mut self, frame: &Frame) {
        self.ingest_at(frame, Instant::now());
    }

    /// Like [`Reassembler::ingest`], stamping the frame with `at`.
    pub fn ingest_at(&mut self, frame: &Frame, at: Instant) {
        let stream = self.streams.entry(frame.stream_id).or_default();
        stream.first_frame.get_or_insert(at);
        stream.last_frame = Some(at);

        if frame.offset != stream.bytes_received {
            debug!(
                stream_id = frame.stream_id,
                expected = stream.bytes_received,
                offset = frame.offset,
                "frame offset does not match stream length"
            );
        }

        stream.accumulated.extend_from_slice(&frame.payload);
        stream.bytes_received += frame.payload.len() as u64;
        stream.packets_received += 1;

        trace!(
            stream_id = frame.stream_id,
            len = frame.payload.len(),
            total = stream.bytes_received,
            "frame ingested"
        );
    }

    /// Append every frame of a packet in order.
    pub fn ingest_packet(&mut self, packet: &Packet) {
        self.ingest_packet_at(packet, Instant::now());
    }

    /// Append every frame of a packet, all stamped with `at`.
    pub fn ingest_packet_at(&mut self, packet: &Packet, at: Instant) {
        for frame in &packet.frames {
            self.ingest_at(frame, at);
        }
    }

    /// Copy of the bytes received so far; empty for an unknown stream.
    pub fn snapshot(&self, stream_id: StreamId) -> Bytes {
        self.streams
            .get(&stream_id)
            .map(|s| Bytes::copy_from_slice(&s.accumulated))
            .unwrap_or_default()
    }

    pub fn stream(&self, stream_id: StreamId) -> Option<&RecvStreamState> {
        self.streams.get(&stream_id)
    }

    /// Ids of every stream seen, ascending.
    pub fn stream_ids(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.streams.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Total payload bytes across all streams.
    pub fn total_bytes(&self) -> u64 {
        self.streams.values().map(|s| s.bytes_received).sum()
    }

    pub fn summaries(&self) -> Vec<StreamSummary> {
        self.streams
            .iter()
            .map(|(&stream_id, s)| StreamSummary {
                stream_id,
                bytes_received: s.bytes_received,
                packets_received: s.packets_received,
                throughput: s.throughput(),
            })
            .collect()
    }

    /// Consume the reassembler and hand out each stream's bytes.
    pub fn into_streams(self) -> BTreeMap<StreamId, Bytes> {
        self.streams
            .into_iter()
            .map(|(id, s)| (id, s.accumulated.freeze()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use streamux_frame::{Flags, Header};

    use super::*;

    #[test]
    fn frames_append_in_arrival_order() {
        let mut r = Reassembler::new();
        r.ingest(&Frame::new(3, 0, Bytes::from_static(b"hello ")));
        r.ingest(&Frame::new(3, 6, Bytes::from_static(b"world")));

        assert_eq!(r.snapshot(3).as_ref(), b"hello world");
        let s = r.stream(3).unwrap();
        assert_eq!(s.bytes_received(), 11);
        assert_eq!(s.packets_received(), 2);
    }

    #[test]
    fn unknown_stream_snapshot_is_empty() {
        let r = Reassembler::new();
        assert!(r.snapshot(42).is_empty());
        assert!(r.stream(42).is_none());
        assert!(r.is_empty());
    }

    #[test]
    fn mismatched_offset_still_appends() {
        let mut r = Reassembler::new();
        r.ingest(&Frame::new(0, 100, Bytes::from_static(b"late")));
        assert_eq!(r.snapshot(0).as_ref(), b"late");
    }

    #[test]
    fn packet_frames_route_by_stream_id() {
        let mut r = Reassembler::new();
        let packet = Packet::new(
            Header::new(1, 1, Flags::DATA),
            vec![
                Frame::new(0, 0, Bytes::from_static(b"a")),
                Frame::new(2, 0, Bytes::from_static(b"cc")),
                Frame::new(1, 0, Bytes::from_static(b"bbb")),
            ],
        );
        r.ingest_packet(&packet);

        assert_eq!(r.stream_ids().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(r.len(), 3);
        assert_eq!(r.total_bytes(), 6);
        assert_eq!(
            r.summaries()[1],
            StreamSummary {
                stream_id: 1,
                bytes_received: 3,
                packets_received: 1,
                throughput: Throughput::default(),
            }
        );
    }

    #[test]
    fn stream_rates_span_first_to_last_frame() {
        let start = Instant::now();
        let mut r = Reassembler::new();
        r.ingest_at(&Frame::new(0, 0, Bytes::from(vec![0u8; 1000])), start);
        r.ingest_at(&Frame::new(1, 0, Bytes::from_static(b"x")), start);
        r.ingest_at(
            &Frame::new(0, 1000, Bytes::from(vec![0u8; 1000])),
            start + Duration::from_millis(250),
        );
        r.ingest_at(
            &Frame::new(0, 2000, Bytes::from(vec![0u8; 500])),
            start + Duration::from_millis(500),
        );

        let stream = r.stream(0).unwrap();
        assert_eq!(stream.elapsed(), Duration::from_millis(500));
        let t = stream.throughput();
        assert_eq!(t.elapsed_us, 500_000);
        assert!((t.bytes_per_sec - 5000.0).abs() < 1e-6);
        assert!((t.packets_per_sec - 6.0).abs() < 1e-6);

        // A single frame spans no time, so no rate can be given.
        let single = r.summaries()[1].throughput;
        assert_eq!(single, Throughput::default());
    }

    #[test]
    fn throughput_of_empty_span_is_zero() {
        let t = Throughput::measure(1024, 3, Duration::ZERO);
        assert_eq!(t.bytes_per_sec, 0.0);
        assert_eq!(t.packets_per_sec, 0.0);

        let t = Throughput::measure(1024, 4, Duration::from_secs(2));
        assert_eq!(t.elapsed_us, 2_000_000);
        assert_eq!(t.bytes_per_sec, 512.0);
        assert_eq!(t.packets_per_sec, 2.0);
    }

    #[test]
    fn empty_frame_creates_stream() {
        let mut r = Reassembler::new();
        r.ingest(&Frame::new(9, 0, Bytes::new()));
        assert_eq!(r.len(), 1);
        assert!(r.snapshot(9).is_empty());
        assert_eq!(r.stream(9).unwrap().packets_received(), 1);
    }

    #[test]
    fn into_streams_hands_out_buffers() {
        let mut r = Reassembler::new();
        r.ingest(&Frame::new(1, 0, Bytes::from_static(b"xyz")));
        let streams = r.into_streams();
        assert_eq!(streams[&1].as_ref(), b"xyz");
    }
}
