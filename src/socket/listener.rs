//! TCP listening socket.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::addr::SocketAddress;
use crate::error::Result;
use crate::socket::core::{Direction, Listener, SocketCore};
use crate::socket::tcp::TcpSocket;
use crate::stack::{Protocol, Stack};

/// A passive stream socket accepting incoming connections.
pub struct TcpListener {
    core: Arc<SocketCore>,
}

impl TcpListener {
    /// Creates an unopened listener.
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

    /// Closes the listener; any thread blocked in `accept` observes
    /// [`Error::NoSocket`](crate::Error::NoSocket).
    pub fn close(&self) -> Result<()> {
        self.core.close()
    }

    /// Sets the wait budget for `accept`.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.core.set_timeout(timeout);
    }

    /// Equivalent policy switch: blocking ⇔ infinite timeout.
    pub fn set_blocking(&self, blocking: bool) {
        self.core.set_blocking(blocking);
    }

    /// Registers a readiness listener (last attach wins, `None`
    /// detaches).
    pub fn attach(&self, listener: Option<Listener>) {
        self.core.attach(listener);
    }

    /// Binds the listening address.
    pub fn bind(&self, addr: &SocketAddress) -> Result<()> {
        self.core.with_stack(|stack, handle| stack.socket_bind(handle, addr))
    }

    /// Starts listening with the given backlog.
    pub fn listen(&self, backlog: u32) -> Result<()> {
        self.core
            .with_stack(|stack, handle| stack.socket_listen(handle, backlog))
    }

    /// Accepts one connection into a caller-supplied socket.
    ///
    /// On success the newly created native handle is transferred into
    /// `dest`: whatever handle `dest` previously held is closed first,
    /// the new handle moves in, and the event registration is
    /// re-pointed at `dest` — two sockets never reference one handle.
    /// Returns the peer address.
    pub fn accept_into(&self, dest: &TcpSocket) -> Result<SocketAddress> {
        let (stack, handle, peer) = self.core.retrying(Direction::Accept, |stack, handle| {
            let (new_handle, peer) = stack.socket_accept(handle)?;
            Ok((Arc::clone(stack), new_handle, peer))
        })?;
        debug!(handle = handle.0, peer = %peer, "accepted connection");
        dest.core().adopt(&stack, handle)?;
        Ok(peer)
    }

    /// Accepts one connection into a fresh socket.
    pub fn accept(&self) -> Result<(TcpSocket, SocketAddress)> {
        let socket = TcpSocket::new();
        let peer = self.accept_into(&socket)?;
        Ok((socket, peer))
    }
}

impl Default for TcpListener {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::MockStack;

    #[test]
    fn accept_transfers_ownership() {
        let stack = MockStack::new();
        let dynstack: Arc<dyn Stack> = stack.clone();

        let listener = TcpListener::new();
        listener.open(&dynstack).unwrap();
        let listen_handle = stack.handle_of_last_open();
        listener.bind(&SocketAddress::v4(0, 0, 0, 0, 80)).unwrap();
        listener.listen(4).unwrap();

        // Destination already owns a handle; accept must close it.
        let dest = TcpSocket::new();
        dest.open(&dynstack).unwrap();
        let old_handle = stack.handle_of_last_open();

        let peer = SocketAddress::v4(198, 51, 100, 1, 50000);
        stack.push_incoming_connection(listen_handle, peer);

        let accepted_peer = listener.accept_into(&dest).unwrap();
        assert_eq!(accepted_peer, peer);
        assert!(stack.is_closed(old_handle));

        // The destination now operates on the accepted handle.
        let new_handle = stack.handle_of_last_open();
        stack.push_stream_data(new_handle, b"hi");
        let mut buf = [0u8; 4];
        assert_eq!(dest.recv(&mut buf).unwrap(), 2);
    }

    #[test]
    fn accept_times_out_like_data_paths() {
        let stack = MockStack::new();
        let dynstack: Arc<dyn Stack> = stack;
        let listener = TcpListener::new();
        listener.open(&dynstack).unwrap();
        listener.listen(1).unwrap();
        listener.set_timeout(Some(Duration::from_millis(20)));
        assert!(matches!(listener.accept(), Err(Error::WouldBlock)));
    }

    #[test]
    fn accept_convenience_allocates_socket() {
        let stack = MockStack::new();
        let dynstack: Arc<dyn Stack> = stack.clone();
        let listener = TcpListener::new();
        listener.open(&dynstack).unwrap();
        let listen_handle = stack.handle_of_last_open();
        listener.listen(1).unwrap();

        let peer = SocketAddress::v4(203, 0, 113, 5, 1234);
        stack.push_incoming_connection(listen_handle, peer);

        let (socket, got_peer) = listener.accept().unwrap();
        assert_eq!(got_peer, peer);
        socket.close().unwrap();
    }
}
