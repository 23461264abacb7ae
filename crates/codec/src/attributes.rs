//! RADIUS attribute TLVs.
//!
//! [RFC 2865]: https://datatracker.ietf.org/doc/html/rfc2865#section-5
//!
//! Each attribute is `Type(1) Length(1) Value(Length-2)`. `Length` counts the
//! whole attribute including its own header, so the value is capped at 253
//! bytes.

use crate::{Error, header::RADIUS_PKT_MAX_SIZE};
use bytes::{BufMut, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    UserName,
    UserPassword,
    NasIpAddress,
    NasPort,
    NasIdentifier,
    MessageAuthenticator,
    Other(u8),
}

impl From<AttributeType> for u8 {
    fn from(value: AttributeType) -> Self {
        match value {
            AttributeType::UserName => 1,
            AttributeType::UserPassword => 2,
            AttributeType::NasIpAddress => 4,
            AttributeType::NasPort => 5,
            AttributeType::NasIdentifier => 32,
            AttributeType::MessageAuthenticator => 80,
            AttributeType::Other(value) => value,
        }
    }
}

impl From<u8> for AttributeType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::UserName,
            2 => Self::UserPassword,
            4 => Self::NasIpAddress,
            5 => Self::NasPort,
            32 => Self::NasIdentifier,
            80 => Self::MessageAuthenticator,
            other => Self::Other(other),
        }
    }
}

/// a decoded view into one attribute: its type and the byte range of its
/// value within the packet.
#[derive(Debug, Clone)]
pub struct AttributeView {
    pub kind: AttributeType,
    pub offset: usize,
    pub len: usize,
}

/// walk the attribute list of a packet, calling `f` with each attribute's
/// type and value slice. Used by [`crate::chk`] to sanity-check the TLV
/// chain and by callers that need to read a specific attribute back out.
pub fn walk<'a>(pkt: &'a [u8], mut f: impl FnMut(AttributeType, &'a [u8])) -> Result<(), Error> {
    let mut offset = crate::header::HEADER_SIZE;

    while offset < pkt.len() {
        if offset + 2 > pkt.len() {
            return Err(Error::AttributeOverrun);
        }

        let kind = AttributeType::from(pkt[offset]);
        let len = pkt[offset + 1] as usize;

        if len < 2 || offset + len > pkt.len() {
            return Err(Error::AttributeOverrun);
        }

        f(kind, &pkt[offset + 2..offset + len]);
        offset += len;
    }

    Ok(())
}

/// find the first attribute of `kind`, returning its value bytes.
pub fn find(pkt: &[u8], kind: AttributeType) -> Option<&[u8]> {
    let mut found = None;

    walk(pkt, |k, value| {
        if found.is_none() && k == kind {
            found = Some(value);
        }
    })
    .ok()?;

    found
}

/// find the first attribute of `kind`, returning the byte range of its value
/// within `pkt`. Used where the caller needs to mutate the value in place
/// (e.g. zeroing `Message-Authenticator` before signing).
pub fn find_offset(pkt: &[u8], kind: AttributeType) -> Option<(usize, usize)> {
    let mut offset = crate::header::HEADER_SIZE;

    while offset < pkt.len() {
        if offset + 2 > pkt.len() {
            return None;
        }

        let k = AttributeType::from(pkt[offset]);
        let len = pkt[offset + 1] as usize;

        if len < 2 || offset + len > pkt.len() {
            return None;
        }

        if k == kind {
            return Some((offset + 2, len - 2));
        }

        offset += len;
    }

    None
}

/// append one `Type-Length-Value` attribute to an in-progress packet buffer
/// and patch the header's `Length` field to match.
///
/// Fails with [`Error::BufferFull`] rather than silently truncating, mirroring
/// the fixed-capacity buffers a caller hands the wire codec in the C
/// original.
///
/// # Test
///
/// ```
/// use bytes::BytesMut;
/// use radius_client_codec::{attr_add, attributes::AttributeType};
///
/// let mut pkt = BytesMut::from(&[1u8, 1, 0, 20, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0][..]);
/// attr_add(&mut pkt, AttributeType::NasIdentifier, b"nas-01").unwrap();
///
/// assert_eq!(pkt.len(), 28);
/// assert_eq!(u16::from_be_bytes([pkt[2], pkt[3]]), 28);
/// ```
pub fn attr_add(pkt: &mut BytesMut, kind: AttributeType, data: &[u8]) -> Result<(), Error> {
    if data.len() > 253 {
        return Err(Error::AttributeOverrun);
    }

    let grown = pkt.len() + 2 + data.len();
    if grown > RADIUS_PKT_MAX_SIZE {
        return Err(Error::BufferFull);
    }

    pkt.put_u8(kind.into());
    pkt.put_u8((2 + data.len()) as u8);
    pkt.put_slice(data);

    let length = (pkt.len() as u16).to_be_bytes();
    pkt[2] = length[0];
    pkt[3] = length[1];

    Ok(())
}
