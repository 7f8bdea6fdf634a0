//! IP address value type shared by the socket layer and the resolver.
//!
//! [`SocketAddress`] carries an IPv4 or IPv6 address plus a port in a
//! fixed binary form and converts losslessly to and from text. It is a
//! plain value: `Copy`, freely cloned, no ownership concerns.
//!
//! Text classification is deliberately simple: a string of digits and
//! dots is IPv4, a string of hex digits and colons is IPv6, anything
//! else is malformed. Two parsing surfaces exist:
//!
//! - [`SocketAddress::from_text`] keeps the historical silent-default
//!   policy — malformed text yields the unspecified IPv4 address with
//!   port 0, never an error.
//! - [`SocketAddress::parse`] (and the [`FromStr`] impl) reports
//!   malformed text as [`Error::Parameter`] and is the recommended
//!   surface for new code.

use core::fmt;
use core::str::FromStr;

use crate::error::{Error, Result};

/// Maximum binary length of an address (sized for IPv6).
pub const MAX_IP_BYTES: usize = 16;

/// IP protocol version of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpVersion {
    /// IPv4, 4 address bytes.
    V4,
    /// IPv6, 16 address bytes.
    V6,
}

impl IpVersion {
    /// Number of address bytes used by this version.
    #[must_use]
    pub const fn address_len(self) -> usize {
        match self {
            Self::V4 => 4,
            Self::V6 => 16,
        }
    }
}

/// An IP address and port.
///
/// The byte buffer is sized for IPv6; an IPv4 address occupies the
/// first four bytes and the remainder stays zero. The bytes actually
/// in use are determined solely by [`SocketAddress::version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketAddress {
    version: IpVersion,
    bytes: [u8; MAX_IP_BYTES],
    port: u16,
}

impl SocketAddress {
    /// The unspecified IPv4 address (`0.0.0.0`) with port 0.
    #[must_use]
    pub const fn unspecified() -> Self {
        Self {
            version: IpVersion::V4,
            bytes: [0; MAX_IP_BYTES],
            port: 0,
        }
    }

    /// Builds an IPv4 address from its four octets.
    #[must_use]
    pub const fn v4(a: u8, b: u8, c: u8, d: u8, port: u16) -> Self {
        let mut bytes = [0u8; MAX_IP_BYTES];
        bytes[0] = a;
        bytes[1] = b;
        bytes[2] = c;
        bytes[3] = d;
        Self {
            version: IpVersion::V4,
            bytes,
            port,
        }
    }

    /// Parses `text`, falling back to the unspecified address.
    ///
    /// Any string that fails classification or parsing yields the
    /// all-zero IPv4 address with port 0 — a silent default, not an
    /// error. Prefer [`SocketAddress::parse`] where errors matter.
    #[must_use]
    pub fn from_text(text: &str, port: u16) -> Self {
        Self::parse(text, port).unwrap_or_else(|_| Self::unspecified())
    }

    /// Parses `text` as an IPv4 or IPv6 address, with `port` attached.
    ///
    /// Returns [`Error::Parameter`] on malformed input.
    pub fn parse(text: &str, port: u16) -> Result<Self> {
        match classify(text) {
            Some(IpVersion::V4) => parse_v4(text, port),
            Some(IpVersion::V6) => parse_v6(text, port),
            None => Err(Error::Parameter),
        }
    }

    /// Builds an address from raw bytes.
    ///
    /// `bytes` must be exactly [`IpVersion::address_len`] long for the
    /// given version; anything else is [`Error::Parameter`].
    pub fn from_bytes(bytes: &[u8], version: IpVersion, port: u16) -> Result<Self> {
        if bytes.len() != version.address_len() {
            return Err(Error::Parameter);
        }
        let mut buf = [0u8; MAX_IP_BYTES];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            version,
            bytes: buf,
            port,
        })
    }

    /// The address bytes actually in use for the declared version.
    #[must_use]
    pub fn ip_bytes(&self) -> &[u8] {
        &self.bytes[..self.version.address_len()]
    }

    /// The IP version of this address.
    #[must_use]
    pub const fn version(&self) -> IpVersion {
        self.version
    }

    /// The port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Replaces the port, keeping the address part.
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    /// True iff every address byte for the declared version is zero.
    ///
    /// The port does not participate; `0.0.0.0:53` is still
    /// unspecified.
    #[must_use]
    pub fn is_unspecified(&self) -> bool {
        self.ip_bytes().iter().all(|&b| b == 0)
    }

    /// Renders the address text form (no port).
    ///
    /// IPv4 is dotted decimal; IPv6 is eight 4-hex-digit groups joined
    /// by `:`, with no zero-run compression.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl Default for SocketAddress {
    fn default() -> Self {
        Self::unspecified()
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            IpVersion::V4 => {
                let b = &self.bytes;
                write!(f, "{}.{}.{}.{}", b[0], b[1], b[2], b[3])
            }
            IpVersion::V6 => {
                for i in 0..8 {
                    if i > 0 {
                        f.write_str(":")?;
                    }
                    let group = u16::from_be_bytes([self.bytes[2 * i], self.bytes[2 * i + 1]]);
                    write!(f, "{group:04x}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for SocketAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, 0)
    }
}

/// Classifies address text by its character set alone.
fn classify(text: &str) -> Option<IpVersion> {
    if text.is_empty() {
        return None;
    }
    if text.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return Some(IpVersion::V4);
    }
    if text.bytes().all(|b| b.is_ascii_hexdigit() || b == b':') {
        return Some(IpVersion::V6);
    }
    None
}

fn parse_v4(text: &str, port: u16) -> Result<SocketAddress> {
    let mut bytes = [0u8; MAX_IP_BYTES];
    let mut count = 0;
    for part in text.split('.') {
        if count == 4 || part.is_empty() || part.len() > 3 {
            return Err(Error::Parameter);
        }
        bytes[count] = part.parse::<u8>().map_err(|_| Error::Parameter)?;
        count += 1;
    }
    if count != 4 {
        return Err(Error::Parameter);
    }
    Ok(SocketAddress {
        version: IpVersion::V4,
        bytes,
        port,
    })
}

/// Parses IPv6 text: up to eight colon-separated 16-bit hex groups,
/// with at most one `::` zero run.
fn parse_v6(text: &str, port: u16) -> Result<SocketAddress> {
    let (head, tail) = match text.find("::") {
        Some(pos) => {
            // A second "::" is malformed.
            if text[pos + 2..].contains("::") {
                return Err(Error::Parameter);
            }
            (&text[..pos], Some(&text[pos + 2..]))
        }
        None => (text, None),
    };

    let head_groups = parse_v6_groups(head)?;
    let tail_groups = match tail {
        Some(t) => parse_v6_groups(t)?,
        None => Vec::new(),
    };

    let total = head_groups.len() + tail_groups.len();
    if total > 8 || (tail.is_none() && head_groups.is_empty()) {
        return Err(Error::Parameter);
    }
    // Without "::", short input fills from the front and the remainder
    // stays zero ("up to eight groups").
    let mut bytes = [0u8; MAX_IP_BYTES];
    for (i, group) in head_groups.iter().enumerate() {
        bytes[2 * i..2 * i + 2].copy_from_slice(&group.to_be_bytes());
    }
    let tail_start = 8 - tail_groups.len();
    for (i, group) in tail_groups.iter().enumerate() {
        let at = tail_start + i;
        bytes[2 * at..2 * at + 2].copy_from_slice(&group.to_be_bytes());
    }
    Ok(SocketAddress {
        version: IpVersion::V6,
        bytes,
        port,
    })
}

fn parse_v6_groups(text: &str) -> Result<Vec<u16>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split(':')
        .map(|part| {
            if part.is_empty() || part.len() > 4 {
                return Err(Error::Parameter);
            }
            u16::from_str_radix(part, 16).map_err(|_| Error::Parameter)
        })
        .collect()
}
