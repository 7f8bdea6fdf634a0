//! Blocking-with-timeout sockets over a non-blocking [`Stack`].
//!
//! The stack only ever offers "try now, tell me if you'd block"; the
//! types here add conventional blocking semantics on top. Every typed
//! socket shares one concurrency core: a per-socket lock, a timeout
//! policy, a wait-and-retry loop driven by stack readiness events, and
//! a close path that wakes every blocked caller.
//!
//! All methods take `&self`; share a socket between threads with `Arc`
//! and [`close`](TcpSocket::close) it from any of them — blocked
//! siblings observe [`Error::NoSocket`](crate::Error::NoSocket) and
//! return promptly.

mod core;
mod listener;
mod tcp;
mod udp;

pub use self::core::Listener;
pub use self::listener::TcpListener;
pub use self::tcp::TcpSocket;
pub use self::udp::UdpSocket;
