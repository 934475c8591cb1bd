use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// An unreliable, connectionless datagram channel.
///
/// This is the only thing the protocol engine needs from the network: send a
/// datagram to an address, and receive at most one datagram per call. All
/// methods take `&self` so one channel can back both a reader and a writer.
pub trait DatagramChannel {
    /// Send one datagram to `dest`. Returns the number of bytes sent.
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<usize>;

    /// Receive one datagram into `buf` (blocking).
    ///
    /// A datagram larger than `buf` is truncated, so callers must size the
    /// buffer to the largest packet they expect.
    fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)>;

    /// Set the timeout for `recv_from`. `None` blocks forever.
    ///
    /// A timed out read surfaces as `TransportError::Io` with kind
    /// `WouldBlock` or `TimedOut` (see [`TransportError::is_timeout`]).
    ///
    /// [`TransportError::is_timeout`]: crate::TransportError::is_timeout
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()>;

    /// The local address of this channel.
    fn local_addr(&self) -> Result<SocketAddr>;
}

impl<T: DatagramChannel + ?Sized> DatagramChannel for &T {
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<usize> {
        (**self).send_to(buf, dest)
    }

    fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        (**self).recv_from(buf)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        (**self).set_read_timeout(timeout)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        (**self).local_addr()
    }
}

impl<T: DatagramChannel + ?Sized> DatagramChannel for Arc<T> {
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<usize> {
        (**self).send_to(buf, dest)
    }

    fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        (**self).recv_from(buf)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        (**self).set_read_timeout(timeout)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        (**self).local_addr()
    }
}
