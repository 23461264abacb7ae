//! RADIUS wire codec.
//!
//! [RFC 2865]: https://datatracker.ietf.org/doc/html/rfc2865
//! [RFC 2869]: https://datatracker.ietf.org/doc/html/rfc2869
//!
//! This crate is deliberately a thin, stateless layer over the packet
//! buffer: header field accessors, TLV attribute append/walk, and the
//! MD5/HMAC-MD5 authenticator math. The retransmission engine in
//! `radius-client-core` treats `sign`/`verify`/`chk` as opaque operations
//! over a buffer it owns - this crate has no notion of sockets, servers, or
//! retries.

pub mod attributes;
pub mod crypto;
pub mod error;
pub mod header;

pub use attributes::attr_add;
pub use error::Error;
pub use header::Code;

use attributes::AttributeType;
use bytes::BytesMut;
use header::{HEADER_SIZE, RADIUS_PKT_MAX_SIZE};
use rand::Rng;

/// validate header/TLV structure: length field matches the buffer, and every
/// attribute's length stays within bounds.
///
/// # Test
///
/// ```
/// use radius_client_codec::chk;
///
/// let pkt = [1u8, 1, 0, 20, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
/// assert!(chk(&pkt).is_ok());
///
/// let short = [1u8, 1, 0, 19];
/// assert!(chk(&short).is_err());
/// ```
pub fn chk(pkt: &[u8]) -> Result<(), Error> {
    if pkt.len() < HEADER_SIZE {
        return Err(Error::Truncated);
    }

    let declared = header::length(pkt) as usize;
    if declared != pkt.len() || declared > RADIUS_PKT_MAX_SIZE {
        return Err(Error::LengthMismatch);
    }

    attributes::walk(pkt, |_, _| {})
}

/// whether `pkt`'s `Code` byte equals `code`.
pub fn packet_type_is(pkt: &[u8], code: Code) -> bool {
    pkt.first().copied().map(Code::from) == Some(code)
}

/// (re-)sign a packet in place for transmission to a server using `secret`.
///
/// For request codes other than Accounting-Request, a fresh random Request
/// Authenticator is generated - this runs on every retransmission, not just
/// the first send, so repeated attempts never reuse an authenticator. For
/// Accounting-Request the Authenticator is the deterministic RFC 2866 digest
/// (computed over the packet with a zeroed authenticator field), which is
/// stable across retries of the same packet.
///
/// If the packet carries a `Message-Authenticator` attribute its value is
/// recomputed per [RFC 2869].
pub fn sign(pkt: &mut BytesMut, secret: &[u8]) -> Result<(), Error> {
    if secret.len() > 128 {
        return Err(Error::SecretTooLong);
    }

    let code = header::code(pkt);

    if matches!(code, Code::AccountingRequest) {
        pkt[4..20].fill(0);
        let digest = crypto::md5_digest(&[&pkt[..], secret]);
        pkt[4..20].copy_from_slice(&digest);
    } else {
        let random: [u8; 16] = rand::rng().random();
        pkt[4..20].copy_from_slice(&random);
    }

    if let Some((start, len)) = attributes::find_offset(pkt, AttributeType::MessageAuthenticator) {
        pkt[start..start + len].fill(0);
        let mac = crypto::hmac_md5(secret, &[&pkt[..]]);
        pkt[start..start + len].copy_from_slice(&mac[..len]);
    }

    Ok(())
}

/// verify a server's reply against the request that produced it.
///
/// Checks the RFC 2869 `Message-Authenticator` attribute (if present) and the
/// RFC 2865 response `Authenticator`, in that order - the former is cheaper
/// to reject on and is what most modern servers actually sign with.
pub fn verify(reply_pkt: &[u8], secret: &[u8], request_pkt: &[u8]) -> Result<(), Error> {
    chk(reply_pkt)?;

    let request_authenticator = header::authenticator(request_pkt);

    if let Some((start, len)) =
        attributes::find_offset(reply_pkt, AttributeType::MessageAuthenticator)
    {
        let mut scratch = reply_pkt.to_vec();
        scratch[4..20].copy_from_slice(&request_authenticator);
        scratch[start..start + len].fill(0);

        let expected = crypto::hmac_md5(secret, &[&scratch]);
        if expected[..len] != reply_pkt[start..start + len] {
            return Err(Error::IntegrityFailed);
        }
    }

    let mut scratch = reply_pkt.to_vec();
    scratch[4..20].copy_from_slice(&request_authenticator);

    let expected = crypto::md5_digest(&[&scratch, secret]);
    if expected != header::authenticator(reply_pkt) {
        return Err(Error::IntegrityFailed);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use attributes::AttributeType;

    fn new_access_request(id: u8) -> BytesMut {
        let mut pkt = BytesMut::with_capacity(64);
        pkt.extend_from_slice(&[1u8, id, 0, 20, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        pkt
    }

    #[test]
    fn sign_randomizes_access_request_authenticator_each_attempt() {
        let mut pkt = new_access_request(7);
        sign(&mut pkt, b"s3cret").unwrap();
        let first = header::authenticator(&pkt);

        sign(&mut pkt, b"s3cret").unwrap();
        let second = header::authenticator(&pkt);

        assert_ne!(first, second);
    }

    #[test]
    fn sign_accounting_request_is_deterministic() {
        let mut a = new_access_request(9);
        a[0] = Code::AccountingRequest.into();
        attr_add(&mut a, AttributeType::UserName, b"alice").unwrap();

        let mut b = a.clone();

        sign(&mut a, b"s3cret").unwrap();
        sign(&mut b, b"s3cret").unwrap();

        assert_eq!(header::authenticator(&a), header::authenticator(&b));
    }

    #[test]
    fn verify_roundtrip_with_message_authenticator() {
        let mut req = new_access_request(3);
        attr_add(&mut req, AttributeType::MessageAuthenticator, &[0u8; 16]).unwrap();
        sign(&mut req, b"s3cret").unwrap();

        let mut reply = BytesMut::with_capacity(64);
        reply.extend_from_slice(&[2u8, 3, 0, 20, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        attr_add(&mut reply, AttributeType::MessageAuthenticator, &[0u8; 16]).unwrap();

        let request_authenticator = header::authenticator(&req);
        reply[4..20].copy_from_slice(&request_authenticator);

        if let Some((start, len)) =
            attributes::find_offset(&reply, AttributeType::MessageAuthenticator)
        {
            let mac = crypto::hmac_md5(b"s3cret", &[&reply[..]]);
            reply[start..start + len].copy_from_slice(&mac[..len]);
        }

        let digest = crypto::md5_digest(&[&reply[..], b"s3cret"]);
        reply[4..20].copy_from_slice(&digest);

        assert!(verify(&reply, b"s3cret", &req).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_reply() {
        let mut req = new_access_request(3);
        sign(&mut req, b"s3cret").unwrap();

        let mut reply = BytesMut::with_capacity(64);
        reply.extend_from_slice(&[2u8, 3, 0, 20, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0, 1, 2, 3, 4, 5, 6]);

        assert!(verify(&reply, b"s3cret", &req).is_err());
    }
}
