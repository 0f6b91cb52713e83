//! Request signing.
//!
//! Three schemes are supported: the TC3-HMAC-SHA256 scheme used by
//! per-service APIs ([`V3Signer`]), the legacy query-parameter scheme
//! ([`V1Signer`]), and the object-storage scheme ([`CosSigner`]).

use hex::encode as hex_encode;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// RFC 3986 unreserved characters stay literal; everything else is encoded.
pub(crate) const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub mod cos;
pub mod v1;
pub mod v3;

pub use cos::CosSigner;
pub use v1::{V1Algorithm, V1Signer};
pub use v3::V3Signer;

/// How much of a request the V3 signer covers.
///
/// The three modes are mutually exclusive: they drive both which headers are
/// signed and whether signing happens at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigningMode {
    /// Sign all headers except the hop-by-hop set.
    #[default]
    Default,
    /// Sign only `content-type` and `host`.
    Minimal,
    /// Emit the fixed `SKIP` sentinel instead of a signature.
    Skip,
}

/// Body variants accepted by the V3 signer.
#[derive(Debug, Clone, Copy)]
pub enum SigningBody<'a> {
    None,
    Text(&'a str),
    Bytes(&'a [u8]),
    /// The body is deliberately left out of the signature.
    Unsigned,
}

impl SigningBody<'_> {
    pub(crate) fn hash(&self) -> String {
        match self {
            SigningBody::None => sha256_hex(b""),
            SigningBody::Text(s) => sha256_hex(s.as_bytes()),
            SigningBody::Bytes(b) => sha256_hex(b),
            SigningBody::Unsigned => "UNSIGNED-PAYLOAD".to_string(),
        }
    }
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex_encode(hasher.finalize())
}

pub(crate) fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex_encode(hasher.finalize())
}

pub(crate) fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub(crate) fn hmac_sha256_hex(key: &[u8], data: &[u8]) -> String {
    hex_encode(hmac_sha256(key, data))
}

pub(crate) fn hmac_sha1(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub(crate) fn hmac_sha1_hex(key: &[u8], data: &[u8]) -> String {
    hex_encode(hmac_sha1(key, data))
}
