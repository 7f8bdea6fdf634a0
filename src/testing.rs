//! Test doubles for the stack and scheduler contracts.
//!
//! [`MockStack`] is a scripted, in-memory [`Stack`] backend: tests
//! inject readiness (datagrams, stream bytes, pending connections) and
//! the mock fires the attached event handlers exactly like a real
//! stack would. [`ManualScheduler`] queues [`Scheduler::call_in`]
//! requests against a virtual clock and runs them on the caller's
//! thread, so asynchronous resolver flows are deterministic — no real
//! time passes.
//!
//! These doubles are public so downstream crates can test against the
//! same contracts.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::addr::SocketAddress;
use crate::error::{Error, Result};
use crate::scheduler::Scheduler;
use crate::stack::{EventHandler, Protocol, SocketHandle, Stack};

/// Decides the reply to a sent datagram; `None` means no reply.
pub type Responder = Box<dyn Fn(&SocketAddress, &[u8]) -> Option<Vec<u8>> + Send + Sync>;

#[derive(Default)]
struct MockSocket {
    handler: Option<EventHandler>,
    stream_rx: VecDeque<u8>,
    datagrams: VecDeque<(SocketAddress, Vec<u8>)>,
    incoming: VecDeque<SocketAddress>,
    sent_datagrams: Vec<(SocketAddress, Vec<u8>)>,
}

#[derive(Default)]
struct MockState {
    next_handle: u64,
    sockets: HashMap<u64, MockSocket>,
    closed: Vec<u64>,
    sent_history: HashMap<u64, Vec<(SocketAddress, Vec<u8>)>>,
    last_open: Option<u64>,
    sendto_count: usize,
    dns_servers: Option<Vec<SocketAddress>>,
}

/// Scripted in-memory network stack.
pub struct MockStack {
    state: Mutex<MockState>,
    responder: Mutex<Option<Responder>>,
}

impl MockStack {
    /// Creates an empty mock stack.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState::default()),
            responder: Mutex::new(None),
        })
    }

    /// The handle most recently issued by `socket_open` or
    /// `socket_accept`.
    ///
    /// # Panics
    /// Panics if no socket was ever opened.
    #[must_use]
    pub fn handle_of_last_open(&self) -> SocketHandle {
        SocketHandle(self.state.lock().last_open.expect("no socket opened"))
    }

    /// True once `handle` has been closed.
    #[must_use]
    pub fn is_closed(&self, handle: SocketHandle) -> bool {
        self.state.lock().closed.contains(&handle.0)
    }

    /// Number of datagrams sent through the stack so far.
    #[must_use]
    pub fn sendto_count(&self) -> usize {
        self.state.lock().sendto_count
    }

    /// Datagrams sent on `handle`, in order. The record survives
    /// `socket_close`, so tests can inspect traffic after teardown.
    #[must_use]
    pub fn sent_datagrams(&self, handle: SocketHandle) -> Vec<(SocketAddress, Vec<u8>)> {
        let state = self.state.lock();
        state
            .sockets
            .get(&handle.0)
            .map(|s| s.sent_datagrams.clone())
            .or_else(|| state.sent_history.get(&handle.0).cloned())
            .unwrap_or_default()
    }

    /// Makes `dns_servers` report this list instead of `Unsupported`.
    pub fn set_dns_servers(&self, servers: Vec<SocketAddress>) {
        self.state.lock().dns_servers = Some(servers);
    }

    /// Installs an auto-responder: every datagram sent is offered to
    /// `responder`, and a `Some` reply is queued for reception (source
    /// = the original destination) with the event handler fired.
    pub fn set_responder(
        &self,
        responder: impl Fn(&SocketAddress, &[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    ) {
        *self.responder.lock() = Some(Box::new(responder));
    }

    /// Queues stream bytes for `handle` and fires its event handler.
    pub fn push_stream_data(&self, handle: SocketHandle, data: &[u8]) {
        let handler = {
            let mut state = self.state.lock();
            let Some(socket) = state.sockets.get_mut(&handle.0) else {
                return;
            };
            socket.stream_rx.extend(data);
            socket.handler.clone()
        };
        if let Some(handler) = handler {
            handler();
        }
    }

    /// Queues a datagram for `handle` and fires its event handler.
    pub fn push_datagram(&self, handle: SocketHandle, from: SocketAddress, data: &[u8]) {
        let handler = {
            let mut state = self.state.lock();
            let Some(socket) = state.sockets.get_mut(&handle.0) else {
                return;
            };
            socket.datagrams.push_back((from, data.to_vec()));
            socket.handler.clone()
        };
        if let Some(handler) = handler {
            handler();
        }
    }

    /// Queues a pending connection on a listening `handle` and fires
    /// its event handler.
    pub fn push_incoming_connection(&self, handle: SocketHandle, peer: SocketAddress) {
        let handler = {
            let mut state = self.state.lock();
            let Some(socket) = state.sockets.get_mut(&handle.0) else {
                return;
            };
            socket.incoming.push_back(peer);
            socket.handler.clone()
        };
        if let Some(handler) = handler {
            handler();
        }
    }
}

impl Stack for MockStack {
    fn socket_open(&self, _proto: Protocol) -> Result<SocketHandle> {
        let mut state = self.state.lock();
        state.next_handle += 1;
        let handle = state.next_handle;
        state.sockets.insert(handle, MockSocket::default());
        state.last_open = Some(handle);
        Ok(SocketHandle(handle))
    }

    fn socket_close(&self, handle: SocketHandle) -> Result<()> {
        let mut state = self.state.lock();
        let Some(socket) = state.sockets.remove(&handle.0) else {
            return Err(Error::NoSocket);
        };
        state.sent_history.insert(handle.0, socket.sent_datagrams);
        state.closed.push(handle.0);
        Ok(())
    }

    fn socket_bind(&self, handle: SocketHandle, _addr: &SocketAddress) -> Result<()> {
        self.require(handle)
    }

    fn socket_listen(&self, handle: SocketHandle, _backlog: u32) -> Result<()> {
        self.require(handle)
    }

    fn socket_connect(&self, handle: SocketHandle, _addr: &SocketAddress) -> Result<()> {
        self.require(handle)
    }

    fn socket_accept(&self, handle: SocketHandle) -> Result<(SocketHandle, SocketAddress)> {
        let mut state = self.state.lock();
        let peer = state
            .sockets
            .get_mut(&handle.0)
            .ok_or(Error::NoSocket)?
            .incoming
            .pop_front()
            .ok_or(Error::WouldBlock)?;
        state.next_handle += 1;
        let new_handle = state.next_handle;
        state.sockets.insert(new_handle, MockSocket::default());
        state.last_open = Some(new_handle);
        Ok((SocketHandle(new_handle), peer))
    }

    fn socket_send(&self, handle: SocketHandle, data: &[u8]) -> Result<usize> {
        self.require(handle)?;
        Ok(data.len())
    }

    fn socket_recv(&self, handle: SocketHandle, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock();
        let socket = state.sockets.get_mut(&handle.0).ok_or(Error::NoSocket)?;
        if socket.stream_rx.is_empty() {
            return Err(Error::WouldBlock);
        }
        let n = buf.len().min(socket.stream_rx.len());
        for slot in &mut buf[..n] {
            *slot = socket.stream_rx.pop_front().unwrap_or(0);
        }
        Ok(n)
    }

    fn socket_sendto(
        &self,
        handle: SocketHandle,
        addr: &SocketAddress,
        data: &[u8],
    ) -> Result<usize> {
        let handler = {
            let mut state = self.state.lock();
            let socket = state.sockets.get_mut(&handle.0).ok_or(Error::NoSocket)?;
            socket.sent_datagrams.push((*addr, data.to_vec()));
            state.sendto_count += 1;
            let reply = self
                .responder
                .lock()
                .as_ref()
                .and_then(|responder| responder(addr, data));
            match reply {
                Some(reply) => {
                    let socket = state.sockets.get_mut(&handle.0).ok_or(Error::NoSocket)?;
                    socket.datagrams.push_back((*addr, reply));
                    socket.handler.clone()
                }
                None => None,
            }
        };
        if let Some(handler) = handler {
            handler();
        }
        Ok(data.len())
    }

    fn socket_recvfrom(
        &self,
        handle: SocketHandle,
        buf: &mut [u8],
    ) -> Result<(usize, SocketAddress)> {
        let mut state = self.state.lock();
        let socket = state.sockets.get_mut(&handle.0).ok_or(Error::NoSocket)?;
        let (from, data) = socket.datagrams.pop_front().ok_or(Error::WouldBlock)?;
        let n = buf.len().min(data.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok((n, from))
    }

    fn socket_attach(&self, handle: SocketHandle, handler: Option<EventHandler>) {
        let mut state = self.state.lock();
        if let Some(socket) = state.sockets.get_mut(&handle.0) {
            socket.handler = handler;
        }
    }

    fn dns_servers(&self) -> Result<Vec<SocketAddress>> {
        self.state
            .lock()
            .dns_servers
            .clone()
            .ok_or(Error::Unsupported)
    }

    fn add_dns_server(&self, addr: &SocketAddress) -> Result<()> {
        let mut state = self.state.lock();
        match &mut state.dns_servers {
            Some(servers) => servers.push(*addr),
            None => state.dns_servers = Some(vec![*addr]),
        }
        Ok(())
    }
}

impl MockStack {
    fn require(&self, handle: SocketHandle) -> Result<()> {
        if self.state.lock().sockets.contains_key(&handle.0) {
            Ok(())
        } else {
            Err(Error::NoSocket)
        }
    }
}

type Job = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct SchedulerState {
    now: Duration,
    queue: Vec<(Duration, Job)>,
}

/// Virtual-clock scheduler driven explicitly by the test.
pub struct ManualScheduler {
    state: Mutex<SchedulerState>,
}

impl ManualScheduler {
    /// Creates a scheduler at virtual time zero.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SchedulerState::default()),
        })
    }

    /// Number of callbacks waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Advances virtual time by `dt`, running every callback that
    /// falls due — including ones scheduled by callbacks themselves,
    /// if they fall within the window. Runs on the caller's thread.
    pub fn advance(&self, dt: Duration) {
        let target = {
            let state = self.state.lock();
            state.now + dt
        };
        loop {
            let job = {
                let mut state = self.state.lock();
                let due = state
                    .queue
                    .iter()
                    .enumerate()
                    .filter(|(_, (at, _))| *at <= target)
                    .min_by_key(|(_, (at, _))| *at)
                    .map(|(i, _)| i);
                match due {
                    Some(i) => {
                        let (at, job) = state.queue.swap_remove(i);
                        state.now = state.now.max(at);
                        Some(job)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };
            match job {
                Some(job) => job(),
                None => break,
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn call_in(&self, delay: Duration, f: Job) -> Result<()> {
        let mut state = self.state.lock();
        let at = state.now + delay;
        state.queue.push((at, f));
        Ok(())
    }
}

/// Builds a DNS response to `query`: the question section is echoed
/// verbatim and each answer names the query via a compression pointer
/// to offset 12. Record types follow each address's IP version.
#[must_use]
pub fn build_dns_response(query: &[u8], answers: &[(SocketAddress, u32)]) -> Vec<u8> {
    use crate::dns::RecordType;

    let mut packet = Vec::new();
    packet.extend_from_slice(&query[..2]);
    packet.extend_from_slice(&0x8180u16.to_be_bytes()); // QR + RD + RA
    packet.extend_from_slice(&1u16.to_be_bytes());
    packet.extend_from_slice(&(answers.len() as u16).to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());
    packet.extend_from_slice(&query[12..]);
    for (addr, ttl) in answers {
        let rtype = RecordType::for_version(addr.version());
        packet.extend_from_slice(&0xC00Cu16.to_be_bytes());
        packet.extend_from_slice(&rtype.wire_value().to_be_bytes());
        packet.extend_from_slice(&1u16.to_be_bytes()); // IN
        packet.extend_from_slice(&ttl.to_be_bytes());
        packet.extend_from_slice(&(addr.ip_bytes().len() as u16).to_be_bytes());
        packet.extend_from_slice(addr.ip_bytes());
    }
    packet
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn manual_scheduler_runs_in_due_order() {
        let scheduler = ManualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (label, delay) in [(2u32, 20u64), (1, 10), (3, 30)] {
            let order = Arc::clone(&order);
            scheduler
                .call_in(
                    Duration::from_millis(delay),
                    Box::new(move || order.lock().push(label)),
                )
                .unwrap();
        }

        scheduler.advance(Duration::from_millis(25));
        assert_eq!(*order.lock(), vec![1, 2]);
        scheduler.advance(Duration::from_millis(10));
        assert_eq!(*order.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn manual_scheduler_runs_rescheduled_work_in_window() {
        let scheduler = ManualScheduler::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        fn tick(scheduler: &Arc<ManualScheduler>, ticks: &Arc<AtomicUsize>) {
            let s = Arc::clone(scheduler);
            let t = Arc::clone(ticks);
            scheduler
                .call_in(
                    Duration::from_millis(10),
                    Box::new(move || {
                        t.fetch_add(1, Ordering::SeqCst);
                        if t.load(Ordering::SeqCst) < 3 {
                            tick(&s, &t);
                        }
                    }),
                )
                .unwrap();
        }

        tick(&scheduler, &ticks);
        scheduler.advance(Duration::from_millis(100));
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn mock_stack_auto_responder_replies() {
        let stack = MockStack::new();
        let handle = stack.socket_open(Protocol::Udp).unwrap();
        stack.set_responder(|_dest, payload| Some(payload.to_vec()));

        let dest = SocketAddress::v4(192, 0, 2, 1, 53);
        stack.socket_sendto(handle, &dest, b"echo").unwrap();
        assert_eq!(stack.sendto_count(), 1);

        let mut buf = [0u8; 8];
        let (n, from) = stack.socket_recvfrom(handle, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"echo");
        assert_eq!(from, dest);
    }
}
