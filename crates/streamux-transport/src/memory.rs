use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::DatagramChannel;

type Datagram = (Vec<u8>, SocketAddr);

/// In-process datagram channel endpoint.
///
/// Created in connected pairs by [`MemoryChannel::pair`]. Delivery is lossless
/// and ordered, which is exactly the operating envelope the protocol assumes,
/// so it is the channel of choice for deterministic tests and in-process use.
/// Datagrams addressed to anything but the peer's address are dropped, like an
/// unroutable UDP send.
///
/// The queue is unbounded. Unlike a UDP socket, whose receive buffer drops
/// overflow, every datagram sent to an endpoint stays queued until it is read
/// or the endpoint is dropped. A sender that never reads its echoes holds a
/// copy of everything it sent.
#[derive(Debug)]
pub struct MemoryChannel {
    local: SocketAddr,
    peer: SocketAddr,
    tx: Mutex<Option<Sender<Datagram>>>,
    rx: Mutex<Receiver<Datagram>>,
    read_timeout: Mutex<Option<Duration>>,
    closed: AtomicBool,
}

impl MemoryChannel {
    /// Address reported by the first endpoint of a pair.
    pub const LEFT_ADDR: SocketAddr =
        SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 40001);
    /// Address reported by the second endpoint of a pair.
    pub const RIGHT_ADDR: SocketAddr =
        SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 40002);

    /// Create two connected endpoints.
    pub fn pair() -> (Self, Self) {
        let (left_tx, right_rx) = mpsc::channel();
        let (right_tx, left_rx) = mpsc::channel();

        let left = Self {
            local: Self::LEFT_ADDR,
            peer: Self::RIGHT_ADDR,
            tx: Mutex::new(Some(left_tx)),
            rx: Mutex::new(left_rx),
            read_timeout: Mutex::new(None),
            closed: AtomicBool::new(false),
        };
        let right = Self {
            local: Self::RIGHT_ADDR,
            peer: Self::LEFT_ADDR,
            tx: Mutex::new(Some(right_tx)),
            rx: Mutex::new(right_rx),
            read_timeout: Mutex::new(None),
            closed: AtomicBool::new(false),
        };
        (left, right)
    }

    /// Address of the other endpoint.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Close this endpoint. The peer observes `TransportError::Closed` once it
    /// has drained the datagrams already in flight.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!(local = %self.local, "closed memory channel");
    }
}

impl DatagramChannel for MemoryChannel {
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<usize> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = guard.as_ref().ok_or(TransportError::Closed)?;

        if dest != self.peer {
            debug!(%dest, peer = %self.peer, "dropping datagram for unknown address");
            return Ok(buf.len());
        }

        tx.send((buf.to_vec(), self.local))
            .map_err(|_| TransportError::Closed)?;
        Ok(buf.len())
    }

    fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let timeout = *self
            .read_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);

        let (datagram, src) = match timeout {
            Some(timeout) => rx.recv_timeout(timeout).map_err(|err| match err {
                RecvTimeoutError::Timeout => {
                    TransportError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut))
                }
                RecvTimeoutError::Disconnected => TransportError::Closed,
            })?,
            None => rx.recv().map_err(|_| TransportError::Closed)?,
        };

        // Same truncation semantics as a UDP socket.
        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        Ok((len, src))
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        *self
            .read_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = timeout;
        Ok(())
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local)
    }
}
