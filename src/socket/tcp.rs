//! TCP stream client socket.

use std::sync::Arc;
use std::time::Duration;

use crate::addr::SocketAddress;
use crate::error::Result;
use crate::socket::core::{Direction, Listener, SocketCore};
use crate::stack::{Protocol, Stack};

/// A stream socket with blocking-with-timeout semantics.
///
/// Lifecycle: `UNOPENED → OPEN → CLOSED`, with reopen via a fresh
/// [`open`](TcpSocket::open). All methods take `&self`; wrap the
/// socket in [`Arc`] to share it across threads, and call
/// [`close`](TcpSocket::close) from any thread to force blocked
/// siblings out with [`Error::NoSocket`](crate::Error::NoSocket).
pub struct TcpSocket {
    core: Arc<SocketCore>,
}

impl TcpSocket {
    /// Creates an unopened socket.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: SocketCore::new(),
        }
    }

    /// Opens a native stream handle on `stack`.
    pub fn open(&self, stack: &Arc<dyn Stack>) -> Result<()> {
        self.core.open(stack, Protocol::Tcp)
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

    /// Binds the local side before connecting.
    pub fn bind(&self, addr: &SocketAddress) -> Result<()> {
        self.core.with_stack(|stack, handle| stack.socket_bind(handle, addr))
    }

    /// Connects to `addr`, waiting out in-progress phases within the
    /// timeout budget.
    pub fn connect(&self, addr: &SocketAddress) -> Result<()> {
        self.core
            .retrying(Direction::Write, |stack, handle| {
                stack.socket_connect(handle, addr)
            })
    }

    /// Sends data, returning the number of bytes the stack queued.
    pub fn send(&self, data: &[u8]) -> Result<usize> {
        self.core
            .retrying(Direction::Write, |stack, handle| {
                stack.socket_send(handle, data)
            })
    }

    /// Receives into `buf`, returning bytes read (0 at end of stream).
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        self.core
            .retrying(Direction::Read, |stack, handle| {
                stack.socket_recv(handle, buf)
            })
    }

    /// Sets a stack-specific option; `Unsupported` when the stack does
    /// not implement it, with no state mutated on failure.
    pub fn setsockopt(&self, level: i32, name: i32, value: &[u8]) -> Result<()> {
        self.core.setsockopt(level, name, value)
    }

    /// Reads a stack-specific option into `value`.
    pub fn getsockopt(&self, level: i32, name: i32, value: &mut [u8]) -> Result<usize> {
        self.core.getsockopt(level, name, value)
    }

    pub(crate) fn core(&self) -> &Arc<SocketCore> {
        &self.core
    }
}

impl Default for TcpSocket {
    fn default() -> Self {
        Self::new()
    }
}
