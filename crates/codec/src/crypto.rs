//! RADIUS authenticator primitives.
//!
//! [RFC 2865]: https://datatracker.ietf.org/doc/html/rfc2865#section-3
//! [RFC 2869]: https://datatracker.ietf.org/doc/html/rfc2869#section-5.14
//!
//! Two different digests are involved: the legacy `Authenticator` header
//! field (plain MD5, RFC 2865) and the `Message-Authenticator` attribute
//! (HMAC-MD5 over the whole packet, RFC 2869) used by most modern servers
//! alongside it.

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};

/// HMAC-MD5 digest, used for the `Message-Authenticator` attribute.
///
/// # Test
///
/// ```
/// use radius_client_codec::crypto::hmac_md5;
///
/// let mac = hmac_md5(b"s3cret", &[b"hello", b" world"]);
/// assert_eq!(mac.len(), 16);
/// ```
pub fn hmac_md5(key: &[u8], source: &[&[u8]]) -> [u8; 16] {
    let mut mac =
        Hmac::<Md5>::new_from_slice(key).expect("HMAC accepts keys of any length");

    for buf in source {
        mac.update(buf);
    }

    mac.finalize().into_bytes().into()
}

/// plain MD5 digest over a sequence of buffers, used to build the RADIUS
/// `Authenticator` header field.
///
/// # Test
///
/// ```
/// use radius_client_codec::crypto::md5_digest;
///
/// let digest = md5_digest(&[b"hello"]);
/// assert_eq!(digest.len(), 16);
/// ```
pub fn md5_digest(source: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Md5::new();

    for buf in source {
        hasher.update(buf);
    }

    hasher.finalize().into()
}

/// CRC32 of an arbitrary buffer, used only as a jitter seed by the
/// retransmission engine - not part of the wire protocol.
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}
