use bytes::Bytes;
use streamux_frame::{Flags, Frame, Header, Packet};

/// Marker payload of a connection open request.
pub const MARKER_SYN: &[u8] = b"SYN";
/// Marker payload of a handshake acknowledgement.
pub const MARKER_SYN_ACK: &[u8] = b"SYN_ACK";
/// Marker payload of a close request.
pub const MARKER_FIN: &[u8] = b"FIN";
/// Marker payload of a close acknowledgement.
pub const MARKER_FIN_ACK: &[u8] = b"FIN_ACK";

/// Stream id carried by the single marker frame of a control packet.
pub const MARKER_STREAM_ID: u16 = 1;

/// Lifecycle packets exchanged outside the data phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Syn,
    SynAck,
    Fin,
    FinAck,
}

impl ControlKind {
    /// Header flags for this control packet.
    pub fn flags(self) -> Flags {
        match self {
            ControlKind::Syn => Flags::SYN,
            ControlKind::SynAck => Flags::SYN_ACK,
            ControlKind::Fin => Flags::FIN,
            ControlKind::FinAck => Flags::FIN_ACK,
        }
    }

    /// Application-level marker carried in frame 0.
    pub fn marker(self) -> &'static [u8] {
        match self {
            ControlKind::Syn => MARKER_SYN,
            ControlKind::SynAck => MARKER_SYN_ACK,
            ControlKind::Fin => MARKER_FIN,
            ControlKind::FinAck => MARKER_FIN_ACK,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ControlKind::Syn => "SYN",
            ControlKind::SynAck => "SYN-ACK",
            ControlKind::Fin => "FIN",
            ControlKind::FinAck => "FIN-ACK",
        }
    }
}

/// Build a single-frame control packet.
pub fn control_packet(kind: ControlKind, connection_id: u32, packet_number: u32) -> Packet {
    Packet::new(
        Header::new(connection_id, packet_number, kind.flags()),
        vec![Frame::new(
            MARKER_STREAM_ID,
            0,
            Bytes::from_static(kind.marker()),
        )],
    )
}

/// True if `payload` is exactly the marker of `kind`.
pub fn is_marker(payload: &[u8], kind: ControlKind) -> bool {
    payload == kind.marker()
}

/// The marker carried by a single-frame control packet, if any.
pub fn marker_of(packet: &Packet) -> Option<ControlKind> {
    let [frame] = packet.frames.as_slice() else {
        return None;
    };
    match frame.payload.as_ref() {
        MARKER_SYN => Some(ControlKind::Syn),
        MARKER_SYN_ACK => Some(ControlKind::SynAck),
        MARKER_FIN => Some(ControlKind::Fin),
        MARKER_FIN_ACK => Some(ControlKind::FinAck),
        _ => None,
    }
}

/// True for a SYN-ACK answering a SYN on `connection_id`.
pub fn is_syn_ack_for(packet: &Packet, connection_id: u32) -> bool {
    packet.flags().is_syn_ack() && packet.header.connection_id == connection_id
}

/// True for a FIN-ACK answering the FIN numbered `fin_packet_number`.
///
/// FIN and FIN-ACK share a bit pattern, so the marker and the echoed packet
/// number are what tell the acknowledgement apart from a peer's own FIN.
pub fn is_fin_ack_for(packet: &Packet, connection_id: u32, fin_packet_number: u32) -> bool {
    packet.flags().is_fin()
        && !packet.flags().is_data()
        && packet.header.connection_id == connection_id
        && packet.header.packet_number == fin_packet_number
        && packet
            .frames
            .first()
            .is_some_and(|f| is_marker(&f.payload, ControlKind::FinAck))
}
