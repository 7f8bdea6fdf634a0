//! The network-stack contract this crate is built on.
//!
//! A [`Stack`] is the concrete, strictly non-blocking network
//! implementation underneath the socket layer: an IP stack, a cellular
//! modem driver, or an in-memory test double. Every primitive either
//! completes immediately or reports [`Error::WouldBlock`]; nothing in
//! this trait ever suspends the caller. All wire I/O performed by this
//! crate goes through a `Stack` — the crate never touches a physical
//! medium directly.
//!
//! # Event delivery
//!
//! A handler registered with [`Stack::socket_attach`] may be invoked
//! from a restricted, interrupt-like execution context. Implementations
//! of this crate's socket layer keep their handlers non-blocking and
//! never take the owning socket's lock from inside one; stack authors
//! must uphold the same restriction for any handler they call.

use std::sync::Arc;

use crate::addr::SocketAddress;
use crate::error::{Error, Result};

/// Opaque identifier for a stack-level socket.
///
/// Issued by [`Stack::socket_open`] and meaningless outside the stack
/// that issued it. Exactly one owning socket object holds a given
/// handle at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketHandle(pub u64);

/// Transport protocol selector for [`Stack::socket_open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Stream socket (TCP).
    Tcp,
    /// Datagram socket (UDP).
    Udp,
}

/// Readiness event handler attached to a stack-level socket.
///
/// May run in interrupt context: it must not block, must not acquire
/// the owning socket's lock, and must tolerate spurious invocation.
pub type EventHandler = Arc<dyn Fn() + Send + Sync>;

/// Non-blocking network stack contract.
///
/// One implementation exists per backend; the socket layer composes a
/// `Stack` by reference (`Arc<dyn Stack>`) and adds blocking-with-
/// timeout semantics on top. Methods with default bodies are optional
/// capabilities; the defaults report [`Error::Unsupported`] without
/// mutating any caller-visible state.
pub trait Stack: Send + Sync {
    /// Creates a stack-level socket for `proto`.
    fn socket_open(&self, proto: Protocol) -> Result<SocketHandle>;

    /// Releases a stack-level socket.
    fn socket_close(&self, handle: SocketHandle) -> Result<()>;

    /// Binds a socket to a local address.
    fn socket_bind(&self, handle: SocketHandle, addr: &SocketAddress) -> Result<()>;

    /// Marks a stream socket as passive with the given backlog.
    fn socket_listen(&self, handle: SocketHandle, backlog: u32) -> Result<()>;

    /// Starts connecting a stream socket; [`Error::WouldBlock`] while
    /// the connection is still in progress.
    fn socket_connect(&self, handle: SocketHandle, addr: &SocketAddress) -> Result<()>;

    /// Accepts a pending connection, returning the new handle and the
    /// peer address; [`Error::WouldBlock`] when none is pending.
    fn socket_accept(&self, handle: SocketHandle) -> Result<(SocketHandle, SocketAddress)>;

    /// Sends on a connected stream socket; returns bytes queued.
    fn socket_send(&self, handle: SocketHandle, data: &[u8]) -> Result<usize>;

    /// Receives from a connected stream socket; returns bytes read.
    fn socket_recv(&self, handle: SocketHandle, buf: &mut [u8]) -> Result<usize>;

    /// Sends one datagram to `addr`.
    fn socket_sendto(
        &self,
        handle: SocketHandle,
        addr: &SocketAddress,
        data: &[u8],
    ) -> Result<usize>;

    /// Receives one datagram and its source address.
    fn socket_recvfrom(
        &self,
        handle: SocketHandle,
        buf: &mut [u8],
    ) -> Result<(usize, SocketAddress)>;

    /// Registers (or with `None`, clears) the readiness handler for a
    /// socket. The last registration wins.
    fn socket_attach(&self, handle: SocketHandle, handler: Option<EventHandler>);

    /// Sets a stack-specific socket option.
    fn setsockopt(
        &self,
        _handle: SocketHandle,
        _level: i32,
        _name: i32,
        _value: &[u8],
    ) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Reads a stack-specific socket option into `value`, returning the
    /// number of bytes written.
    fn getsockopt(
        &self,
        _handle: SocketHandle,
        _level: i32,
        _name: i32,
        _value: &mut [u8],
    ) -> Result<usize> {
        Err(Error::Unsupported)
    }

    /// Reports the DNS servers configured in the stack itself, in
    /// preference order. Stacks without their own DNS configuration
    /// keep the default and the resolver falls back to its internal
    /// server list.
    fn dns_servers(&self) -> Result<Vec<SocketAddress>> {
        Err(Error::Unsupported)
    }

    /// Adds a DNS server to the stack's own configuration.
    fn add_dns_server(&self, _addr: &SocketAddress) -> Result<()> {
        Err(Error::Unsupported)
    }
}
