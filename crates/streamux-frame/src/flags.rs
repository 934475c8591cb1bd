//! Header flag bits.
//!
//! Bits are independent and may be combined. Acknowledgements reuse the
//! triggering bit: SYN-ACK is `SYN | DATA`, FIN-ACK is `FIN`.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// The 8-bit flags field of a packet header.
    ///
    /// Unknown bits survive [`Flags::from_bits_retain`] and are ignored.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u8 {
        /// Connection open request.
        const SYN = 0x01;
        /// Packet carries stream frames.
        const DATA = 0x02;
        /// Connection close request.
        const FIN = 0x04;
        /// Handshake acknowledgement.
        const SYN_ACK = Self::SYN.bits() | Self::DATA.bits();
        /// Teardown acknowledgement. Same bit pattern as [`Flags::FIN`].
        const FIN_ACK = Self::FIN.bits();
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self::empty()
    }
}

impl Flags {
    /// True if at least one of SYN, DATA, FIN is set.
    pub const fn is_valid(self) -> bool {
        self.intersects(Self::all())
    }

    pub fn is_syn(self) -> bool {
        self.contains(Self::SYN)
    }

    pub fn is_data(self) -> bool {
        self.contains(Self::DATA)
    }

    pub fn is_fin(self) -> bool {
        self.contains(Self::FIN)
    }

    /// True for a SYN-ACK (SYN and DATA both set).
    pub fn is_syn_ack(self) -> bool {
        self.contains(Self::SYN_ACK)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::with_capacity(3);
        if self.is_syn() {
            names.push("SYN");
        }
        if self.is_data() {
            names.push("DATA");
        }
        if self.is_fin() {
            names.push("FIN");
        }
        if names.is_empty() {
            return write!(f, "NONE({:#04x})", self.bits());
        }
        write!(f, "{}", names.join("|"))
    }
}

/// Returns a human-readable name for the packet kind a flags byte announces.
pub fn flag_name(flags: Flags) -> &'static str {
    match (flags & Flags::all()).bits() {
        0x01 => "SYN",
        0x02 => "DATA",
        0x03 => "SYN-ACK",
        0x04 => "FIN",
        0 => "INVALID",
        _ => "MIXED",
    }
}
