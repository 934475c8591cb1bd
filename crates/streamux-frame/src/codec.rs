use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::flags::Flags;

/// Packet header: connection id (4) + packet number (4) + flags (1) = 9 bytes.
pub const HEADER_SIZE: usize = 9;

/// Frame header: stream id (2) + offset (8) + length (8) = 18 bytes.
pub const FRAME_HEADER_SIZE: usize = 18;

/// Default maximum datagram size: the largest IPv4 UDP payload.
pub const DEFAULT_MAX_DATAGRAM: usize = 65_507;

/// Fixed-size packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Correlation token for the connection. Not a security token.
    pub connection_id: u32,
    /// Sender-assigned, monotonically increasing per connection.
    pub packet_number: u32,
    pub flags: Flags,
}

impl Header {
    pub fn new(connection_id: u32, packet_number: u32, flags: Flags) -> Self {
        Self {
            connection_id,
            packet_number,
            flags,
        }
    }

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32(self.connection_id);
        dst.put_u32(self.packet_number);
        dst.put_u8(self.flags.bits());
    }

    fn decode(src: &mut Bytes) -> Result<Self> {
        if src.len() < HEADER_SIZE {
            return Err(FrameError::TruncatedPacket {
                needed: HEADER_SIZE,
                available: src.len(),
            });
        }

        let connection_id = src.get_u32();
        let packet_number = src.get_u32();
        let flags = Flags::from_bits_retain(src.get_u8());
        if !flags.is_valid() {
            return Err(FrameError::InvalidFlags(flags.bits()));
        }

        Ok(Self {
            connection_id,
            packet_number,
            flags,
        })
    }
}

/// A slice of one stream's bytes, addressed by offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The stream this chunk belongs to.
    pub stream_id: u16,
    /// Byte offset of this chunk within the stream.
    pub offset: u64,
    /// The chunk bytes. The wire `length` field is always `payload.len()`.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(stream_id: u16, offset: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            stream_id,
            offset,
            payload: payload.into(),
        }
    }

    /// The wire `length` field.
    pub fn length(&self) -> u64 {
        self.payload.len() as u64
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }
}

/// One datagram's worth of header and frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    /// Order matters for parsing only.
    pub frames: Vec<Frame>,
}

impl Packet {
    /// Create a new packet.
    pub fn new(header: Header, frames: Vec<Frame>) -> Self {
        Self { header, frames }
    }

    pub fn flags(&self) -> Flags {
        self.header.flags
    }

    /// Total serialized size: `9 + Σ(18 + length_i)`.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.frames.iter().map(Frame::wire_size).sum::<usize>()
    }

    /// Total payload bytes across all frames.
    pub fn payload_len(&self) -> usize {
        self.frames.iter().map(|f| f.payload.len()).sum()
    }
}

/// Encode a packet into the wire format.
///
/// Wire format (network byte order):
/// ```text
/// ┌───────────────┬───────────────┬───────┐
/// │ Connection ID │ Packet number │ Flags │   header, 9 bytes
/// │ (4B BE)       │ (4B BE)       │ (1B)  │
/// ├───────────┬───┴───────┬───────┴───────┼────────────────┐
/// │ Stream ID │ Offset    │ Length        │ Payload        │   frame, repeated
/// │ (2B BE)   │ (8B BE)   │ (8B BE)       │ (Length bytes) │
/// └───────────┴───────────┴───────────────┴────────────────┘
/// ```
/// No padding, no checksum.
pub fn encode_packet(packet: &Packet, dst: &mut BytesMut) {
    dst.reserve(packet.wire_size());
    packet.header.encode(dst);
    for frame in &packet.frames {
        dst.put_u16(frame.stream_id);
        dst.put_u64(frame.offset);
        dst.put_u64(frame.length());
        dst.put_slice(&frame.payload);
    }
}

/// Decode a complete packet from one datagram.
///
/// Frames are parsed until the buffer is exhausted. Payloads are zero-copy
/// slices of `src`.
pub fn decode_packet(mut src: Bytes) -> Result<Packet> {
    let header = Header::decode(&mut src)?;

    let mut frames = Vec::new();
    while src.has_remaining() {
        if src.len() < FRAME_HEADER_SIZE {
            return Err(FrameError::TruncatedPacket {
                needed: FRAME_HEADER_SIZE,
                available: src.len(),
            });
        }

        let stream_id = src.get_u16();
        let offset = src.get_u64();
        let declared = src.get_u64();

        let available = src.len();
        let len = usize::try_from(declared)
            .ok()
            .filter(|&len| len <= available)
            .ok_or(FrameError::MalformedFrame {
                declared,
                available,
            })?;

        frames.push(Frame {
            stream_id,
            offset,
            payload: src.split_to(len),
        });
    }

    Ok(Packet { header, frames })
}

/// Serialize a packet into a fresh buffer.
pub fn serialize(packet: &Packet) -> Bytes {
    let mut dst = BytesMut::with_capacity(packet.wire_size());
    encode_packet(packet, &mut dst);
    dst.freeze()
}

/// Deserialize a packet from a byte slice (copies the input once).
pub fn deserialize(src: &[u8]) -> Result<Packet> {
    decode_packet(Bytes::copy_from_slice(src))
}

/// Configuration for packet I/O over a datagram channel.
#[derive(Debug, Clone)]
pub struct PacketConfig {
    /// Largest datagram that will be sent or accepted. Sizes the receive buffer.
    pub max_datagram_size: usize,
    /// Read timeout for blocking receives.
    pub read_timeout: Option<std::time::Duration>,
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            max_datagram_size: DEFAULT_MAX_DATAGRAM,
            read_timeout: None,
        }
    }
}
