//! UDP datagram socket.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::addr::SocketAddress;
use crate::error::{Error, Result};
use crate::socket::core::{Direction, Listener, SocketCore};
use crate::stack::{Protocol, Stack};

/// A datagram socket with blocking-with-timeout semantics.
///
/// Datagrams are sent and received whole; `sendto`/`recvfrom` carry
/// explicit peer addresses, while [`connect`](UdpSocket::connect)
/// fixes a default peer for the `send`/`recv` convenience pair.
pub struct UdpSocket {
    core: Arc<SocketCore>,
    peer: Mutex<Option<SocketAddress>>,
}

impl UdpSocket {
    /// Creates an unopened socket.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: SocketCore::new(),
            peer: Mutex::new(None),
        }
    }

    /// Opens a native datagram handle on `stack`.
    pub fn open(&self, stack: &Arc<dyn Stack>) -> Result<()> {
        self.core.open(stack, Protocol::Udp)
    }

    /// Closes the socket; idempotent, and safe while siblings block.
    pub fn close(&self) -> Result<()> {
        self.core.close()
    }

    /// Sets the wait budget; `None` blocks forever, zero never waits.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.core.set_timeout(timeout);
    }

    /// Equivalent policy switch: blocking ⇔ infinite timeout.
    pub fn set_blocking(&self, blocking: bool) {
        self.core.set_blocking(blocking);
    }

    /// Registers a readiness listener; the last attach wins and `None`
    /// detaches. The listener may run in interrupt-like context and
    /// must not block or re-enter this socket.
    pub fn attach(&self, listener: Option<Listener>) {
        self.core.attach(listener);
    }

    /// Binds to a local address for receiving.
    pub fn bind(&self, addr: &SocketAddress) -> Result<()> {
        self.core.with_stack(|stack, handle| stack.socket_bind(handle, addr))
    }

    /// Fixes the default peer used by [`send`](UdpSocket::send) and
    /// [`recv`](UdpSocket::recv).
    pub fn connect(&self, addr: &SocketAddress) -> Result<()> {
        if addr.is_unspecified() {
            return Err(Error::Parameter);
        }
        *self.peer.lock() = Some(*addr);
        Ok(())
    }

    /// Sends one datagram to `addr`.
    pub fn sendto(&self, addr: &SocketAddress, data: &[u8]) -> Result<usize> {
        self.core.retrying(Direction::Write, |stack, handle| {
            stack.socket_sendto(handle, addr, data)
        })
    }

    /// Receives one datagram and its source address.
    pub fn recvfrom(&self, buf: &mut [u8]) -> Result<(usize, SocketAddress)> {
        self.core.retrying(Direction::Read, |stack, handle| {
            stack.socket_recvfrom(handle, buf)
        })
    }

    /// Sends one datagram to the connected peer.
    pub fn send(&self, data: &[u8]) -> Result<usize> {
        let peer = (*self.peer.lock()).ok_or(Error::NoAddress)?;
        self.sendto(&peer, data)
    }

    /// Receives one datagram from the connected peer, discarding
    /// datagrams from other sources.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let peer = (*self.peer.lock()).ok_or(Error::NoAddress)?;
        self.core.retrying(Direction::Read, |stack, handle| {
            let (n, from) = stack.socket_recvfrom(handle, buf)?;
            if from.ip_bytes() == peer.ip_bytes() && from.port() == peer.port() {
                Ok(n)
            } else {
                // Not the connected peer; keep waiting.
                Err(Error::WouldBlock)
            }
        })
    }

    /// Sets a stack-specific option.
    pub fn setsockopt(&self, level: i32, name: i32, value: &[u8]) -> Result<()> {
        self.core.setsockopt(level, name, value)
    }

    /// Reads a stack-specific option into `value`.
    pub fn getsockopt(&self, level: i32, name: i32, value: &mut [u8]) -> Result<usize> {
        self.core.getsockopt(level, name, value)
    }
}

impl Default for UdpSocket {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStack;

    #[test]
    fn sendto_recvfrom_round_trip() {
        let stack = MockStack::new();
        let dynstack: Arc<dyn Stack> = stack.clone();
        let socket = UdpSocket::new();
        socket.open(&dynstack).unwrap();

        let target = SocketAddress::v4(192, 0, 2, 9, 5353);
        assert_eq!(socket.sendto(&target, b"ping").unwrap(), 4);

        let handle = stack.handle_of_last_open();
        stack.push_datagram(handle, SocketAddress::v4(192, 0, 2, 9, 5353), b"pong");
        let mut buf = [0u8; 16];
        let (n, from) = socket.recvfrom(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"pong");
        assert_eq!(from, target);
    }

    #[test]
    fn connected_recv_filters_peer() {
        let stack = MockStack::new();
        let dynstack: Arc<dyn Stack> = stack.clone();
        let socket = UdpSocket::new();
        socket.open(&dynstack).unwrap();
        socket.set_timeout(Some(Duration::from_millis(20)));

        let peer = SocketAddress::v4(10, 0, 0, 2, 9000);
        socket.connect(&peer).unwrap();

        let handle = stack.handle_of_last_open();
        stack.push_datagram(handle, SocketAddress::v4(10, 0, 0, 3, 9000), b"stray");
        let mut buf = [0u8; 16];
        // Only a stray datagram arrives; the filtered recv times out.
        assert_eq!(socket.recv(&mut buf), Err(Error::WouldBlock));

        stack.push_datagram(handle, peer, b"real");
        stack.push_datagram(handle, peer, b"real");
        let n = socket.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"real");
    }

    #[test]
    fn send_without_connect_is_no_address() {
        let stack = MockStack::new();
        let dynstack: Arc<dyn Stack> = stack;
        let socket = UdpSocket::new();
        socket.open(&dynstack).unwrap();
        assert_eq!(socket.send(b"x"), Err(Error::NoAddress));
        assert_eq!(
            socket.connect(&SocketAddress::unspecified()),
            Err(Error::Parameter)
        );
    }
}
