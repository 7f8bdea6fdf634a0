//! DNS wire codec: query encoder and response decoder.
//!
//! The layout is the classic stub-resolver subset:
//!
//! - 12-byte header: id, flags, question/answer/authority/additional
//!   counts, all big-endian 16-bit.
//! - Question: length-prefixed labels ending in a zero label, then
//!   query type and class.
//! - Answers: a name (labels or a 2-byte compression pointer with the
//!   top two bits set), type, class, 32-bit TTL, 16-bit data length,
//!   then the data. Only IN-class A/AAAA records are usable answers;
//!   everything else is skipped by its declared data length.

use crate::addr::{IpVersion, SocketAddress};
use crate::error::{Error, Result};

/// Flags for an outgoing query: recursion desired.
const QUERY_FLAGS: u16 = 0x0100;
/// Class IN.
const CLASS_IN: u16 = 1;
/// Largest DNS payload this resolver sends or accepts.
pub const MAX_PACKET_LEN: usize = 512;

const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 253;
const COMPRESSION_MASK: u8 = 0xC0;

/// Record type carried in a question or answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// IPv4 host address.
    A,
    /// IPv6 host address.
    Aaaa,
}

impl RecordType {
    /// Wire value (A = 1, AAAA = 28).
    #[must_use]
    pub const fn wire_value(self) -> u16 {
        match self {
            Self::A => 1,
            Self::Aaaa => 28,
        }
    }

    /// Expected rdata length for this type.
    const fn data_len(self) -> usize {
        match self {
            Self::A => 4,
            Self::Aaaa => 16,
        }
    }

    const fn ip_version(self) -> IpVersion {
        match self {
            Self::A => IpVersion::V4,
            Self::Aaaa => IpVersion::V6,
        }
    }

    /// The record type that answers queries for `version`.
    #[must_use]
    pub const fn for_version(version: IpVersion) -> Self {
        match version {
            IpVersion::V4 => Self::A,
            IpVersion::V6 => Self::Aaaa,
        }
    }
}

/// Encodes one query for `hostname` with the given id and type.
///
/// Fails `Parameter` on an empty hostname, a label longer than 63
/// bytes, or a name longer than 253 bytes.
pub fn encode_query(id: u16, hostname: &str, qtype: RecordType) -> Result<Vec<u8>> {
    if hostname.is_empty() || hostname.len() > MAX_NAME_LEN {
        return Err(Error::Parameter);
    }

    let mut packet = Vec::with_capacity(12 + hostname.len() + 6);
    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&QUERY_FLAGS.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes()); // qdcount
    packet.extend_from_slice(&0u16.to_be_bytes()); // ancount
    packet.extend_from_slice(&0u16.to_be_bytes()); // nscount
    packet.extend_from_slice(&0u16.to_be_bytes()); // arcount

    for label in hostname.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(Error::Parameter);
        }
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0);

    packet.extend_from_slice(&qtype.wire_value().to_be_bytes());
    packet.extend_from_slice(&CLASS_IN.to_be_bytes());
    Ok(packet)
}

/// Decodes a response to the query with `id`, collecting up to `max`
/// usable answers of type `qtype`.
///
/// Any structural problem — short packet, wrong id, non-zero response
/// code, runaway compression pointer — is `DnsFailure`; the retry loop
/// treats that the same as a timed-out attempt.
pub fn decode_response(
    packet: &[u8],
    id: u16,
    qtype: RecordType,
    max: usize,
) -> Result<Vec<SocketAddress>> {
    let mut cursor = Cursor::new(packet);

    let got_id = cursor.read_u16()?;
    let flags = cursor.read_u16()?;
    let qdcount = cursor.read_u16()?;
    let ancount = cursor.read_u16()?;
    let _nscount = cursor.read_u16()?;
    let _arcount = cursor.read_u16()?;

    if got_id != id {
        return Err(Error::DnsFailure);
    }
    // QR bit must be set and RCODE zero.
    if flags & 0x8000 == 0 || flags & 0x000F != 0 {
        return Err(Error::DnsFailure);
    }

    for _ in 0..qdcount {
        cursor.skip_name()?;
        cursor.advance(4)?; // qtype + qclass
    }

    let mut answers = Vec::new();
    for _ in 0..ancount {
        if answers.len() >= max {
            break;
        }
        cursor.skip_name()?;
        let rtype = cursor.read_u16()?;
        let rclass = cursor.read_u16()?;
        let _ttl = cursor.read_u32()?;
        let rdlength = cursor.read_u16()? as usize;
        let data = cursor.take(rdlength)?;

        if rtype == qtype.wire_value() && rclass == CLASS_IN && rdlength == qtype.data_len() {
            let addr = SocketAddress::from_bytes(data, qtype.ip_version(), 0)
                .map_err(|_| Error::DnsFailure)?;
            answers.push(addr);
        }
        // Other types/classes are skipped by rdlength.
    }

    Ok(answers)
}

/// Minimum TTL among the usable answers, when the caller wants it for
/// cache expiry. Walks the same structure as [`decode_response`].
pub fn response_min_ttl(packet: &[u8], id: u16, qtype: RecordType) -> Result<Option<u32>> {
    let mut cursor = Cursor::new(packet);
    let got_id = cursor.read_u16()?;
    let flags = cursor.read_u16()?;
    let qdcount = cursor.read_u16()?;
    let ancount = cursor.read_u16()?;
    cursor.advance(4)?;
    if got_id != id || flags & 0x8000 == 0 || flags & 0x000F != 0 {
        return Err(Error::DnsFailure);
    }
    for _ in 0..qdcount {
        cursor.skip_name()?;
        cursor.advance(4)?;
    }
    let mut min_ttl: Option<u32> = None;
    for _ in 0..ancount {
        cursor.skip_name()?;
        let rtype = cursor.read_u16()?;
        let rclass = cursor.read_u16()?;
        let ttl = cursor.read_u32()?;
        let rdlength = cursor.read_u16()? as usize;
        cursor.advance(rdlength)?;
        if rtype == qtype.wire_value() && rclass == CLASS_IN && rdlength == qtype.data_len() {
            min_ttl = Some(min_ttl.map_or(ttl, |t| t.min(ttl)));
        }
    }
    Ok(min_ttl)
}

/// Bounds-checked reader over a response packet.
struct Cursor<'a> {
    packet: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(packet: &'a [u8]) -> Self {
        Self { packet, pos: 0 }
    }

    fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(Error::DnsFailure)?;
        if end > self.packet.len() {
            return Err(Error::DnsFailure);
        }
        let slice = &self.packet[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn advance(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Skips a name field: a run of labels ended by a zero label, or
    /// cut short by a 2-byte compression pointer. The pointer target is
    /// not followed — only answers' rdata matters here — but it must
    /// reference an earlier offset to be well-formed.
    fn skip_name(&mut self) -> Result<()> {
        loop {
            let len = *self.take(1)?.first().ok_or(Error::DnsFailure)?;
            if len & COMPRESSION_MASK == COMPRESSION_MASK {
                let low = *self.take(1)?.first().ok_or(Error::DnsFailure)?;
                let target = usize::from(u16::from_be_bytes([len & !COMPRESSION_MASK, low]));
                // A pointer must point backwards into the packet.
                if target >= self.pos.saturating_sub(2) {
                    return Err(Error::DnsFailure);
                }
                return Ok(());
            }
            if len == 0 {
                return Ok(());
            }
            self.advance(usize::from(len))?;
        }
    }
}
