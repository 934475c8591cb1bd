use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::DatagramChannel;

/// UDP datagram channel.
///
/// Thin wrapper over a bound [`UdpSocket`]. One channel serves both directions:
/// a receiver binds a well-known address, a sender binds an ephemeral one.
#[derive(Debug)]
pub struct UdpChannel {
    socket: UdpSocket,
    local: SocketAddr,
}

impl UdpChannel {
    /// Bind a UDP socket on `addr`.
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let addr = resolve(addr)?;
        let socket = UdpSocket::bind(addr).map_err(|e| TransportError::Bind { addr, source: e })?;
        let local = socket.local_addr()?;

        info!(%local, "bound udp channel");

        Ok(Self { socket, local })
    }

    /// Bind an ephemeral port on the unspecified address matching `peer`'s family.
    pub fn bind_ephemeral_for(peer: SocketAddr) -> Result<Self> {
        let any: SocketAddr = if peer.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        Self::bind(any)
    }

    /// Try to clone this channel (creates a new socket handle).
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            socket: self.socket.try_clone()?,
            local: self.local,
        })
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "udp"
    }
}

impl DatagramChannel for UdpChannel {
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<usize> {
        let sent = self.socket.send_to(buf, dest)?;
        debug!(%dest, len = sent, "sent datagram");
        Ok(sent)
    }

    fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let (len, src) = self.socket.recv_from(buf)?;
        debug!(%src, len, "received datagram");
        Ok((len, src))
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_read_timeout(timeout).map_err(Into::into)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local)
    }
}

/// Resolve the first socket address of `addr`.
pub fn resolve(addr: impl ToSocketAddrs) -> Result<SocketAddr> {
    addr.to_socket_addrs()?.next().ok_or_else(|| {
        TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "address resolved to nothing",
        ))
    })
}
