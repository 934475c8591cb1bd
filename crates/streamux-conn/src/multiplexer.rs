//! Sender-side stream multiplexing.
//!
//! Streams are kept in a map keyed by a stable, monotonically assigned
//! [`StreamId`]. The key is the wire `stream_id`; retiring a stream removes
//! its entry and never renumbers the others.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use bytes::Bytes;
use rand::Rng;
use streamux_frame::{Flags, Frame, Header, Packet, FRAME_HEADER_SIZE, HEADER_SIZE};
use tracing::{debug, trace};

use crate::error::{ConnError, Result};

/// Wire identifier of a stream.
pub type StreamId = u16;

/// Number of distinct stream ids a connection can assign.
pub const MAX_STREAMS: usize = StreamId::MAX as usize + 1;

/// Share of active streams that contribute a frame to each packet.
pub const DEFAULT_FRAME_FRACTION: f64 = 0.60;

/// Range the per-connection chunk size is drawn from when not configured.
pub const CHUNK_SIZE_POLICY: RangeInclusive<usize> = 1000..=2000;

/// Multiplexer configuration.
#[derive(Debug, Clone)]
pub struct MultiplexConfig {
    /// Payload budget per packet. `None` draws from [`CHUNK_SIZE_POLICY`].
    pub chunk_size: Option<usize>,
    /// Share of active streams given a frame per packet, in `(0, 1]`.
    pub frame_fraction: f64,
}

impl Default for MultiplexConfig {
    fn default() -> Self {
        Self {
            chunk_size: None,
            frame_fraction: DEFAULT_FRAME_FRACTION,
        }
    }
}

/// Send-side state of one stream.
#[derive(Debug, Clone)]
pub struct SendStreamState {
    remaining: Bytes,
    write_cursor: u64,
    total_len: u64,
}

impl SendStreamState {
    fn new(data: Bytes) -> Self {
        Self {
            total_len: data.len() as u64,
            remaining: data,
            write_cursor: 0,
        }
    }

    /// Bytes already sent.
    pub fn write_cursor(&self) -> u64 {
        self.write_cursor
    }

    /// Total stream length.
    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// Bytes not yet sent.
    pub fn remaining(&self) -> &Bytes {
        &self.remaining
    }

    pub fn is_finished(&self) -> bool {
        self.write_cursor == self.total_len
    }

    /// Slice off up to `max` bytes at the cursor and advance it.
    fn take(&mut self, max: usize) -> (u64, Bytes) {
        let offset = self.write_cursor;
        let len = max.min(self.remaining.len());
        let chunk = self.remaining.split_to(len);
        self.write_cursor += len as u64;
        (offset, chunk)
    }
}

/// Interleaves chunks of registered streams into fixed-budget DATA packets.
#[derive(Debug)]
pub struct Multiplexer {
    active: BTreeMap<StreamId, SendStreamState>,
    chunk_size: usize,
    frame_fraction: f64,
    next_id: usize,
    retired_count: usize,
    bytes_sent: u64,
}

impl Multiplexer {
    /// Create a multiplexer, drawing the chunk size if none is configured.
    pub fn new(config: &MultiplexConfig) -> Self {
        let chunk_size = config
            .chunk_size
            .unwrap_or_else(|| rand::rng().random_range(CHUNK_SIZE_POLICY));
        debug!(chunk_size, fraction = config.frame_fraction, "multiplexer created");

        Self {
            active: BTreeMap::new(),
            chunk_size,
            frame_fraction: config.frame_fraction,
            next_id: 0,
            retired_count: 0,
            bytes_sent: 0,
        }
    }

    /// Register a stream for sending and assign it the next id.
    ///
    /// An empty stream is complete on arrival: it is retired immediately and
    /// never produces a frame.
    pub fn register(&mut self, data: Bytes) -> Result<StreamId> {
        if self.next_id >= MAX_STREAMS {
            return Err(ConnError::Configuration(format!(
                "too many streams (max {MAX_STREAMS})"
            )));
        }

        let id = self.next_id as StreamId;
        self.next_id += 1;

        if data.is_empty() {
            self.retired_count += 1;
            debug!(stream_id = id, "empty stream retired on registration");
        } else {
            trace!(stream_id = id, len = data.len(), "stream registered");
            self.active.insert(id, SendStreamState::new(data));
        }
        Ok(id)
    }

    /// Reject configurations that could emit zero-length frame slices.
    ///
    /// The frame count only shrinks as streams retire, so checking against
    /// the current active set covers the whole transfer.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ConnError::Configuration(
                "chunk size must be at least 1 byte".to_string(),
            ));
        }

        if !(self.frame_fraction > 0.0 && self.frame_fraction <= 1.0) {
            return Err(ConnError::Configuration(format!(
                "frame fraction must be in (0, 1], got {}",
                self.frame_fraction
            )));
        }

        let total = self.active.len();
        if total > 0 {
            let frames_num = self.frames_per_packet(total);
            if self.frame_size(frames_num) == 0 {
                return Err(ConnError::Configuration(format!(
                    "chunk size {} over {} frames per packet ({} active streams) yields empty frames",
                    self.chunk_size, frames_num, total
                )));
            }
        }
        Ok(())
    }

    /// Number of frames a packet carries when `total` streams are active.
    pub fn frames_per_packet(&self, total: usize) -> usize {
        if total == 0 {
            return 0;
        }
        let wanted = (total as f64 * self.frame_fraction).round_ties_even() as usize;
        wanted.clamp(1, total)
    }

    /// Per-frame byte budget when a packet carries `frames_num` frames.
    pub fn frame_size(&self, frames_num: usize) -> usize {
        if frames_num == 0 {
            return self.chunk_size;
        }
        (self.chunk_size as f64 / frames_num as f64).round_ties_even() as usize
    }

    /// Upper bound on the wire size of any packet this multiplexer will build.
    pub fn max_packet_size(&self) -> usize {
        (1..=self.active.len())
            .map(|total| {
                let frames_num = self.frames_per_packet(total);
                HEADER_SIZE + frames_num * (FRAME_HEADER_SIZE + self.frame_size(frames_num))
            })
            .max()
            .unwrap_or(HEADER_SIZE)
    }

    /// Build the next DATA packet, or `None` once every stream has retired.
    ///
    /// Streams are visited in ascending id order; each of the first
    /// `frames_num` contributes up to `frame_size` bytes from its cursor.
    /// Streams whose cursor reaches their length are retired afterwards.
    pub fn build_next_packet(&mut self, connection_id: u32, packet_number: u32) -> Option<Packet> {
        let total = self.active.len();
        if total == 0 {
            return None;
        }

        let frames_num = self.frames_per_packet(total);
        let frame_size = self.frame_size(frames_num);

        let mut frames = Vec::with_capacity(frames_num);
        let mut finished = Vec::new();

        for (&id, stream) in self.active.iter_mut().take(frames_num) {
            let (offset, chunk) = stream.take(frame_size);
            self.bytes_sent += chunk.len() as u64;
            frames.push(Frame::new(id, offset, chunk));

            if stream.is_finished() {
                finished.push(id);
            }
        }

        for id in finished {
            if let Some(stream) = self.active.remove(&id) {
                self.retired_count += 1;
                debug!(
                    stream_id = id,
                    len = stream.total_len(),
                    retired = self.retired_count,
                    "stream fully sent"
                );
            }
        }

        trace!(
            packet_number,
            frames = frames.len(),
            frame_size,
            active = self.active.len(),
            "built data packet"
        );

        Some(Packet::new(
            Header::new(connection_id, packet_number, Flags::DATA),
            frames,
        ))
    }

    /// True once every registered stream has retired.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Streams still being sent.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Send state of an active stream.
    pub fn stream(&self, id: StreamId) -> Option<&SendStreamState> {
        self.active.get(&id)
    }

    /// Streams fully sent (including empty streams retired on registration).
    pub fn retired_count(&self) -> usize {
        self.retired_count
    }

    /// Streams registered so far.
    pub fn registered_count(&self) -> usize {
        self.next_id
    }

    /// Payload bytes emitted so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn frame_fraction(&self) -> f64 {
        self.frame_fraction
    }
}
