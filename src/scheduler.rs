//! Deferred-callback contract used by the asynchronous resolver.
//!
//! The async DNS path spawns no threads of its own: every step returns
//! immediately and asks an external [`Scheduler`] to run the next step
//! after a delay. An event queue, a timer wheel, or the test
//! [`ManualScheduler`](crate::testing::ManualScheduler) all satisfy the
//! contract.

use std::time::Duration;

use crate::error::Result;

/// One-shot deferred callback execution.
pub trait Scheduler: Send + Sync {
    /// Requests that `f` run once, roughly `delay` from now.
    ///
    /// Returns an error if the callback cannot be queued (for example
    /// the queue is full); the caller treats that as a hard failure of
    /// the operation being scheduled.
    fn call_in(&self, delay: Duration, f: Box<dyn FnOnce() + Send>) -> Result<()>;
}
