//! Blocking-with-timeout sockets and a stub DNS resolver over a
//! strictly non-blocking network stack.
//!
//! The underlying [`Stack`] contract is non-blocking: every operation
//! either completes immediately or reports
//! [`WouldBlock`](Error::WouldBlock), and readiness arrives through an
//! attached event callback. This crate layers the familiar
//! blocking-with-timeout model on top:
//!
//! - [`TcpSocket`] and [`UdpSocket`] retry `WouldBlock` internally,
//!   parking the calling thread until a readiness event or the
//!   per-socket timeout, whichever comes first.
//! - [`TcpListener`] applies the same discipline to `accept`, handing
//!   each accepted native handle to a caller-owned socket.
//! - [`Resolver`] resolves hostnames over UDP with server rotation,
//!   a bounded attempt budget, and a TTL cache — synchronously, or
//!   asynchronously via an external [`Scheduler`].
//!
//! A socket's timeout is a policy, not a state machine: `None` waits
//! forever, zero never waits, and any bound in between is honored per
//! call. Closing a socket from another thread wakes every blocked
//! caller, which then observes [`NoSocket`](Error::NoSocket).
//!
//! The [`testing`] module ships the scripted stack and virtual-clock
//! scheduler the crate's own tests run against.

pub mod addr;
pub mod dns;
pub mod error;
pub mod scheduler;
pub mod socket;
pub mod stack;
pub mod testing;

pub use addr::{IpVersion, SocketAddress};
pub use dns::{QueryId, Resolver, ResolverConfig};
pub use error::{Error, Recoverability, Result};
pub use scheduler::Scheduler;
pub use socket::{TcpListener, TcpSocket, UdpSocket};
pub use stack::{EventHandler, Protocol, SocketHandle, Stack};
