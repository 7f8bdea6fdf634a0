//! The shared socket concurrency core.
//!
//! [`SocketCore`] owns everything the typed sockets have in common:
//! the stack reference, the optional native handle, the timeout
//! policy, one wait point per direction, and the stack event handler.
//!
//! # Locking discipline
//!
//! One `parking_lot` mutex serializes a socket's operations. It is
//! held while a non-blocking stack primitive runs and is released
//! before any bounded wait, so a concurrent `close` can acquire it,
//! tear the handle down, and wake the waiter. The stack event handler
//! never touches this lock: it only bumps the wait points' capped
//! signal counters and fires the user listener.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::{Error, Result};
use crate::stack::{EventHandler, Protocol, SocketHandle, Stack};

/// Wait direction within a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    /// recv / recvfrom.
    Read,
    /// send / sendto / connect.
    Write,
    /// accept.
    Accept,
}

/// A direction-specific wait primitive.
///
/// Signals are counted and capped so that repeated stack events cannot
/// build an unbounded backlog; one stored signal is enough, since a
/// woken caller re-runs the non-blocking primitive anyway.
///
/// `post` is safe to call from a restricted execution context: it
/// touches only this wait point's own latch (held for a counter
/// update), never the socket lock, and never blocks.
#[derive(Debug, Default)]
struct WaitPoint {
    signals: Mutex<u32>,
    condvar: Condvar,
}

impl WaitPoint {
    const SIGNAL_CAP: u32 = 1;

    fn post(&self) {
        {
            let mut signals = self.signals.lock();
            if *signals < Self::SIGNAL_CAP {
                *signals += 1;
            }
        }
        self.condvar.notify_all();
    }

    /// Waits for a signal, bounded by `deadline` (`None` = forever).
    /// Returns false if the deadline passed without a signal.
    fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let mut signals = self.signals.lock();
        loop {
            if *signals > 0 {
                *signals -= 1;
                return true;
            }
            match deadline {
                None => self.condvar.wait(&mut signals),
                Some(at) => {
                    if self.condvar.wait_until(&mut signals, at).timed_out() {
                        // A signal racing the timeout still counts.
                        if *signals > 0 {
                            *signals -= 1;
                            return true;
                        }
                        return false;
                    }
                }
            }
        }
    }
}

/// Per-direction in-flight guard. At most one call of a given
/// direction may be inside a socket at a time; a second one is caller
/// misuse and fails `Parameter` before any I/O.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        if flag
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(Error::Parameter);
        }
        Ok(Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// User-facing notification listener (`sigio`-style).
pub type Listener = Arc<dyn Fn() + Send + Sync>;

struct CoreState {
    stack: Option<Arc<dyn Stack>>,
    handle: Option<SocketHandle>,
    /// `None` = block forever; `Some(0)` = non-blocking.
    timeout: Option<Duration>,
}

/// Shared state behind every typed socket.
pub(crate) struct SocketCore {
    state: Mutex<CoreState>,
    read_wait: WaitPoint,
    write_wait: WaitPoint,
    accept_wait: WaitPoint,
    listener: Mutex<Option<Listener>>,
    read_busy: AtomicBool,
    write_busy: AtomicBool,
    accept_busy: AtomicBool,
}

impl SocketCore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CoreState {
                stack: None,
                handle: None,
                timeout: None,
            }),
            read_wait: WaitPoint::default(),
            write_wait: WaitPoint::default(),
            accept_wait: WaitPoint::default(),
            listener: Mutex::new(None),
            read_busy: AtomicBool::new(false),
            write_busy: AtomicBool::new(false),
            accept_busy: AtomicBool::new(false),
        })
    }

    /// Opens a fresh native handle on `stack` and registers the event
    /// handler. Fails `NoSocket` if a handle is already held or the
    /// stack cannot create one.
    pub(crate) fn open(self: &Arc<Self>, stack: &Arc<dyn Stack>, proto: Protocol) -> Result<()> {
        let mut state = self.state.lock();
        if state.handle.is_some() {
            return Err(Error::NoSocket);
        }
        let Ok(handle) = stack.socket_open(proto) else {
            return Err(Error::NoSocket);
        };
        state.stack = Some(Arc::clone(stack));
        state.handle = Some(handle);
        drop(state);
        stack.socket_attach(handle, Some(self.event_handler()));
        trace!(handle = handle.0, "socket opened");
        Ok(())
    }

    /// Closes the native handle, if any, and wakes every blocked
    /// direction so it observes `NoSocket`. Idempotent.
    pub(crate) fn close(&self) -> Result<()> {
        let (stack, handle) = {
            let mut state = self.state.lock();
            (state.stack.take(), state.handle.take())
        };
        let result = match (stack, handle) {
            (Some(stack), Some(handle)) => {
                // Detach before closing so no event fires on a dead handle.
                stack.socket_attach(handle, None);
                let result = stack.socket_close(handle);
                trace!(handle = handle.0, "socket closed");
                result
            }
            _ => Ok(()),
        };
        self.read_wait.post();
        self.write_wait.post();
        self.accept_wait.post();
        result
    }

    /// Adopts `handle` from `stack`, closing whatever this core
    /// previously held, and re-points the event registration at this
    /// core. Used by `accept` handle transfer.
    pub(crate) fn adopt(
        self: &Arc<Self>,
        stack: &Arc<dyn Stack>,
        handle: SocketHandle,
    ) -> Result<()> {
        self.close()?;
        let mut state = self.state.lock();
        state.stack = Some(Arc::clone(stack));
        state.handle = Some(handle);
        drop(state);
        stack.socket_attach(handle, Some(self.event_handler()));
        Ok(())
    }

    /// Sets the wait budget for blocking operations.
    pub(crate) fn set_timeout(&self, timeout: Option<Duration>) {
        self.state.lock().timeout = timeout;
    }

    /// Blocking mode is an infinite timeout; non-blocking is zero.
    pub(crate) fn set_blocking(&self, blocking: bool) {
        self.set_timeout(if blocking {
            None
        } else {
            Some(Duration::ZERO)
        });
    }

    /// Replaces the user notification listener; `None` detaches.
    pub(crate) fn attach(&self, listener: Option<Listener>) {
        *self.listener.lock() = listener;
    }

    pub(crate) fn setsockopt(&self, level: i32, name: i32, value: &[u8]) -> Result<()> {
        let (stack, handle) = self.stack_and_handle()?;
        stack.setsockopt(handle, level, name, value)
    }

    pub(crate) fn getsockopt(&self, level: i32, name: i32, value: &mut [u8]) -> Result<usize> {
        let (stack, handle) = self.stack_and_handle()?;
        stack.getsockopt(handle, level, name, value)
    }

    /// Non-retrying pass-through for operations that either complete or
    /// fail immediately (bind, listen).
    pub(crate) fn with_stack<T>(
        &self,
        op: impl FnOnce(&Arc<dyn Stack>, SocketHandle) -> Result<T>,
    ) -> Result<T> {
        let state = self.state.lock();
        let (Some(stack), Some(handle)) = (&state.stack, state.handle) else {
            return Err(Error::NoSocket);
        };
        op(stack, handle)
    }

    /// The blocking-emulation loop.
    ///
    /// Runs `op` under the socket lock. On `WouldBlock` with a nonzero
    /// timeout, releases the lock, waits on the direction's wait point
    /// bounded by the remaining budget, re-acquires, and retries —
    /// until success, a non-`WouldBlock` error, or timeout expiry
    /// (reported as `WouldBlock`). A concurrent `close` wakes the wait
    /// and the retry observes `NoSocket`. Any other stack error passes
    /// through unchanged and is never retried.
    pub(crate) fn retrying<T>(
        &self,
        direction: Direction,
        mut op: impl FnMut(&Arc<dyn Stack>, SocketHandle) -> Result<T>,
    ) -> Result<T> {
        let _busy = BusyGuard::acquire(self.busy_flag(direction))?;

        let mut deadline_set = false;
        let mut deadline = None;
        loop {
            let state = self.state.lock();
            let (Some(stack), Some(handle)) = (&state.stack, state.handle) else {
                return Err(Error::NoSocket);
            };
            let timeout = state.timeout;
            match op(stack, handle) {
                Err(Error::WouldBlock) => {
                    drop(state);
                    let Some(budget) = timeout else {
                        // Infinite budget: wait for an event, then retry.
                        self.wait_point(direction).wait_until(None);
                        continue;
                    };
                    if budget.is_zero() {
                        return Err(Error::WouldBlock);
                    }
                    if !deadline_set {
                        deadline = Some(Instant::now() + budget);
                        deadline_set = true;
                    }
                    if !self.wait_point(direction).wait_until(deadline) {
                        return Err(Error::WouldBlock);
                    }
                }
                other => return other,
            }
        }
    }

    fn stack_and_handle(&self) -> Result<(Arc<dyn Stack>, SocketHandle)> {
        let state = self.state.lock();
        match (&state.stack, state.handle) {
            (Some(stack), Some(handle)) => Ok((Arc::clone(stack), handle)),
            _ => Err(Error::NoSocket),
        }
    }

    fn busy_flag(&self, direction: Direction) -> &AtomicBool {
        match direction {
            Direction::Read => &self.read_busy,
            Direction::Write => &self.write_busy,
            Direction::Accept => &self.accept_busy,
        }
    }

    fn wait_point(&self, direction: Direction) -> &WaitPoint {
        match direction {
            Direction::Read => &self.read_wait,
            Direction::Write => &self.write_wait,
            Direction::Accept => &self.accept_wait,
        }
    }

    /// Builds the handler registered with the stack.
    ///
    /// Runs in whatever restricted context the stack delivers events
    /// from: it releases the wait points and invokes the user listener
    /// at most once per delivered batch, and nothing else.
    fn event_handler(self: &Arc<Self>) -> EventHandler {
        let weak: Weak<Self> = Arc::downgrade(self);
        Arc::new(move || {
            if let Some(core) = weak.upgrade() {
                core.read_wait.post();
                core.write_wait.post();
                core.accept_wait.post();
                let listener = core.listener.lock().clone();
                if let Some(listener) = listener {
                    listener();
                }
            }
        })
    }
}

impl Drop for SocketCore {
    fn drop(&mut self) {
        // Teardown closes if still open; errors have nowhere to go.
        let _ = self.close();
    }
}
