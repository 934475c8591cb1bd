use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use streamux_frame::{FrameError, Packet, PacketReader, PacketWriter};
use streamux_transport::DatagramChannel;
use tracing::{debug, warn};

use crate::control::{control_packet, is_fin_ack_for, is_syn_ack_for, ControlKind};
use crate::error::{ConnError, Result};

/// Identity and packet numbering of one connection.
#[derive(Debug, Clone)]
pub struct Connection {
    id: u32,
    next_packet_number: u32,
}

impl Connection {
    /// Start a connection with a fixed id. Packet numbers begin at 1.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            next_packet_number: 1,
        }
    }

    /// Start a connection with a random id.
    pub fn random() -> Self {
        Self::new(rand::random())
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Take the next packet number.
    pub fn next_packet_number(&mut self) -> u32 {
        let n = self.next_packet_number;
        self.next_packet_number = self.next_packet_number.wrapping_add(1);
        n
    }

    /// Packet numbers handed out so far.
    pub fn packets_numbered(&self) -> u32 {
        self.next_packet_number.wrapping_sub(1)
    }
}

/// Sender lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    SynSent,
    Established,
    FinSent,
    Closed,
}

impl SenderState {
    pub fn as_str(self) -> &'static str {
        match self {
            SenderState::Idle => "idle",
            SenderState::SynSent => "syn-sent",
            SenderState::Established => "established",
            SenderState::FinSent => "fin-sent",
            SenderState::Closed => "closed",
        }
    }
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Listening,
    Established,
    Closed,
}

impl ReceiverState {
    pub fn as_str(self) -> &'static str {
        match self {
            ReceiverState::Listening => "listening",
            ReceiverState::Established => "established",
            ReceiverState::Closed => "closed",
        }
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for connection open and close.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// How long to wait for a SYN-ACK.
    pub timeout: Duration,
    /// How long to wait for a FIN-ACK after sending FIN. `None` sends FIN
    /// and closes without waiting.
    pub fin_ack_linger: Option<Duration>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            fin_ack_linger: None,
        }
    }
}

/// Send SYN and wait for the matching SYN-ACK.
///
/// Packets that are not a SYN-ACK for this connection are skipped, and
/// undecodable datagrams are logged and skipped. The reader's configured
/// read timeout is restored before returning.
pub fn handshake_sender<R, W>(
    reader: &mut PacketReader<R>,
    writer: &mut PacketWriter<W>,
    peer: SocketAddr,
    connection: &mut Connection,
    config: &HandshakeConfig,
) -> Result<()>
where
    R: DatagramChannel,
    W: DatagramChannel,
{
    let id = connection.id();
    let syn = control_packet(ControlKind::Syn, id, connection.next_packet_number());
    writer.write_packet(&syn, peer)?;
    debug!(connection_id = id, %peer, "SYN sent");

    let deadline = Instant::now() + config.timeout;
    match await_packet(reader, deadline, |p| is_syn_ack_for(p, id))? {
        Some(_) => {
            debug!(connection_id = id, "SYN-ACK received");
            Ok(())
        }
        None => Err(ConnError::HandshakeTimeout(config.timeout)),
    }
}

/// Send FIN and, when configured, linger for the FIN-ACK.
///
/// A missing FIN-ACK is not an error: the data is already delivered.
/// Returns whether a FIN-ACK was seen.
pub fn close_sender<R, W>(
    reader: &mut PacketReader<R>,
    writer: &mut PacketWriter<W>,
    peer: SocketAddr,
    connection: &mut Connection,
    config: &HandshakeConfig,
) -> Result<bool>
where
    R: DatagramChannel,
    W: DatagramChannel,
{
    let id = connection.id();
    let fin_number = connection.next_packet_number();
    writer.write_packet(&control_packet(ControlKind::Fin, id, fin_number), peer)?;
    debug!(connection_id = id, packet_number = fin_number, "FIN sent");

    let Some(linger) = config.fin_ack_linger else {
        return Ok(false);
    };

    let deadline = Instant::now() + linger;
    let acked = await_packet(reader, deadline, |p| is_fin_ack_for(p, id, fin_number))?.is_some();
    if acked {
        debug!(connection_id = id, "FIN-ACK received");
    } else {
        debug!(connection_id = id, ?linger, "no FIN-ACK before linger expired");
    }
    Ok(acked)
}

/// Read until a packet satisfies `accept` or `deadline` passes.
fn await_packet<R, F>(
    reader: &mut PacketReader<R>,
    deadline: Instant,
    accept: F,
) -> Result<Option<Packet>>
where
    R: DatagramChannel,
    F: Fn(&Packet) -> bool,
{
    let saved = reader.config().read_timeout;
    let outcome = await_packet_inner(reader, deadline, accept);
    reader.set_read_timeout(saved)?;
    outcome
}

fn await_packet_inner<R, F>(
    reader: &mut PacketReader<R>,
    deadline: Instant,
    accept: F,
) -> Result<Option<Packet>>
where
    R: DatagramChannel,
    F: Fn(&Packet) -> bool,
{
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        reader.set_read_timeout(Some(remaining))?;

        match reader.read_packet() {
            Ok((packet, src)) => {
                if accept(&packet) {
                    return Ok(Some(packet));
                }
                debug!(
                    %src,
                    connection_id = packet.header.connection_id,
                    flags = %packet.header.flags,
                    "skipping packet while waiting for acknowledgement"
                );
            }
            Err(FrameError::Transport(err)) if err.is_timeout() => continue,
            Err(FrameError::Transport(err)) => return Err(err.into()),
            Err(err) => warn!(error = %err, "discarding undecodable datagram"),
        }
    }
}
