//! Packet and frame codec for the streamux datagram protocol.
//!
//! Every datagram is one packet:
//! - a fixed 9-byte header (connection id, packet number, flags)
//! - zero or more frames, each an 18-byte header (stream id, offset, length)
//!   followed by `length` payload bytes
//!
//! All integers are big-endian. The codec is a pure transform; the reader and
//! writer add exactly one datagram read or write per packet on top of it.

pub mod codec;
pub mod error;
pub mod flags;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_packet, deserialize, encode_packet, serialize, Frame, Header, Packet, PacketConfig,
    DEFAULT_MAX_DATAGRAM, FRAME_HEADER_SIZE, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use flags::{flag_name, Flags};
pub use reader::PacketReader;
pub use writer::PacketWriter;
