//! RADIUS packet header.
//!
//! [RFC 2865]: https://datatracker.ietf.org/doc/html/rfc2865#section-3
//!
//! A RADIUS packet opens with a fixed 20-byte header: a one-byte `Code`, a
//! one-byte `Identifier`, a two-byte `Length`, and a 16-byte `Authenticator`.
//! Everything past the header is a sequence of TLV attributes.

pub const HEADER_SIZE: usize = 20;
pub const RADIUS_PKT_MAX_SIZE: usize = 4096;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Code {
    AccessRequest,
    AccessAccept,
    AccessReject,
    AccountingRequest,
    AccountingResponse,
    AccessChallenge,
    StatusServer,
    StatusClient,
    DisconnectRequest,
    DisconnectAck,
    DisconnectNak,
    CoaRequest,
    CoaAck,
    CoaNak,
    Other(u8),
}

impl From<u8> for Code {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::AccessRequest,
            2 => Self::AccessAccept,
            3 => Self::AccessReject,
            4 => Self::AccountingRequest,
            5 => Self::AccountingResponse,
            11 => Self::AccessChallenge,
            12 => Self::StatusServer,
            13 => Self::StatusClient,
            40 => Self::DisconnectRequest,
            41 => Self::DisconnectAck,
            42 => Self::DisconnectNak,
            43 => Self::CoaRequest,
            44 => Self::CoaAck,
            45 => Self::CoaNak,
            other => Self::Other(other),
        }
    }
}

impl From<Code> for u8 {
    fn from(value: Code) -> Self {
        match value {
            Code::AccessRequest => 1,
            Code::AccessAccept => 2,
            Code::AccessReject => 3,
            Code::AccountingRequest => 4,
            Code::AccountingResponse => 5,
            Code::AccessChallenge => 11,
            Code::StatusServer => 12,
            Code::StatusClient => 13,
            Code::DisconnectRequest => 40,
            Code::DisconnectAck => 41,
            Code::DisconnectNak => 42,
            Code::CoaRequest => 43,
            Code::CoaAck => 44,
            Code::CoaNak => 45,
            Code::Other(value) => value,
        }
    }
}

impl Code {
    /// whether a reply of this code is expected for a request of `self`.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Code::AccessRequest
                | Code::AccountingRequest
                | Code::StatusServer
                | Code::DisconnectRequest
                | Code::CoaRequest
        )
    }
}

/// read the `id` byte (offset 1) of a packet.
///
/// # Test
///
/// ```
/// use radius_client_codec::header::id;
///
/// let pkt = [1u8, 42, 0, 20, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
/// assert_eq!(id(&pkt), 42);
/// ```
pub fn id(pkt: &[u8]) -> u8 {
    pkt[1]
}

/// read the `code` byte (offset 0) of a packet.
pub fn code(pkt: &[u8]) -> Code {
    Code::from(pkt[0])
}

/// read the `Length` field (offset 2..4, big endian).
pub fn length(pkt: &[u8]) -> u16 {
    u16::from_be_bytes([pkt[2], pkt[3]])
}

/// read the 16-byte `Authenticator` field (offset 4..20).
pub fn authenticator(pkt: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&pkt[4..20]);
    out
}
