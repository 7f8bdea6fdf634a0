//! Error types and error-handling strategy.
//!
//! Every fallible operation in this crate returns [`Result<T>`] with a
//! single crate-wide [`Error`] enum. Error handling follows these
//! principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Stack-reported errors pass through unchanged and are never retried
//!   by this layer
//! - `WouldBlock` is a transient status, not a failure: a blocking call
//!   only reports it after its full timeout budget has elapsed
//! - Panics never stand in for ordinary failure paths
//!
//! # Recovery Classification
//!
//! Errors classify by [`Recoverability`]:
//! - `Transient`: safe to wait and retry (`WouldBlock`)
//! - `Caller`: detected before any I/O; fix the call site (`Parameter`)
//! - `Permanent`: do not retry at this layer

use thiserror::Error;

/// Convenience alias used by every fallible operation in the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// The outcome space shared by the socket layer and the DNS resolver.
///
/// Each variant is a distinct tag; [`Error::code`] provides the numeric
/// representation for callers that need code-level compatibility with
/// existing stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[non_exhaustive]
pub enum Error {
    /// A non-blocking operation could not complete immediately, or a
    /// bounded wait exhausted its timeout.
    #[error("operation would block")]
    WouldBlock,
    /// The stack does not implement the requested operation or option.
    #[error("unsupported operation")]
    Unsupported,
    /// Invalid argument, detected before any I/O was attempted.
    #[error("invalid parameter")]
    Parameter,
    /// No connection to the peer or network.
    #[error("no connection")]
    NoConnection,
    /// No native handle is held; the socket is unopened or closed.
    #[error("no socket")]
    NoSocket,
    /// No address could be obtained or represented.
    #[error("no address")]
    NoAddress,
    /// The stack ran out of memory or socket slots.
    #[error("out of memory")]
    NoMemory,
    /// Hostname resolution exhausted its attempt budget.
    #[error("DNS resolution failed")]
    DnsFailure,
    /// DHCP configuration failed in the underlying stack.
    #[error("DHCP failure")]
    DhcpFailure,
    /// Authentication with the network failed.
    #[error("authentication failure")]
    AuthFailure,
    /// Unclassified failure reported by the device or stack.
    #[error("device error")]
    DeviceError,
}

/// Whether an error is worth retrying, and by whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recoverability {
    /// Temporary condition; waiting and retrying can succeed.
    Transient,
    /// The call itself is wrong; retrying without changes cannot succeed.
    Caller,
    /// Hard failure at this layer; do not retry here.
    Permanent,
}

impl Error {
    /// Numeric code for interoperability with callers that speak the
    /// conventional negative-code convention.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::WouldBlock => -3001,
            Self::Unsupported => -3002,
            Self::Parameter => -3003,
            Self::NoConnection => -3004,
            Self::NoSocket => -3005,
            Self::NoAddress => -3006,
            Self::NoMemory => -3007,
            Self::DnsFailure => -3009,
            Self::DhcpFailure => -3010,
            Self::AuthFailure => -3011,
            Self::DeviceError => -3012,
        }
    }

    /// Classifies this error for retry logic.
    #[must_use]
    pub const fn recoverability(self) -> Recoverability {
        match self {
            Self::WouldBlock => Recoverability::Transient,
            Self::Parameter => Recoverability::Caller,
            _ => Recoverability::Permanent,
        }
    }

    /// True for the transient "nothing ready yet" status.
    #[must_use]
    pub const fn is_would_block(self) -> bool {
        matches!(self, Self::WouldBlock)
    }
}
