use std::fmt;

#[derive(Debug, Clone)]
pub enum Error {
    /// the packet is shorter than the 20-byte RADIUS header.
    Truncated,
    /// the `Length` field in the header disagrees with the bytes on hand.
    LengthMismatch,
    /// an attribute's length byte would run past the packet boundary.
    AttributeOverrun,
    /// appending an attribute would grow the packet past `RADIUS_PKT_MAX_SIZE`.
    BufferFull,
    /// the shared secret exceeds the 128 byte limit from the configuration.
    SecretTooLong,
    /// signature/authenticator did not match on verify.
    IntegrityFailed,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
