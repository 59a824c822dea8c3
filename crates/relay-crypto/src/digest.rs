//! HMAC-MD5 digests for the token handshake
//!
//! The handshake keys HMAC with the shared password and authenticates the
//! token text, then exchanges the digest in base64.

use crate::b64::{decode_into, encode_into};
use crate::error::CryptoError;
use hmac::{Hmac, Mac};
use md5::Md5;

type HmacMd5 = Hmac<Md5>;

/// MD5 digest size in bytes
pub const DIGEST_SIZE: usize = 16;

/// Length of a base64 encoded digest (with padding)
pub const DIGEST_B64_LEN: usize = 24;

/// A raw HMAC-MD5 digest
pub type Digest = [u8; DIGEST_SIZE];

/// Compute HMAC-MD5 of `message` keyed with `key`.
pub fn hmac_md5(message: &[u8], key: &[u8]) -> Digest {
    let mut mac = keyed(key);
    mac.update(message);
    mac.finalize().into_bytes().into()
}

/// Compute HMAC-MD5 of `message` and return it base64 encoded.
pub fn digest_b64(message: &[u8], key: &[u8]) -> [u8; DIGEST_B64_LEN] {
    let digest = hmac_md5(message, key);
    let mut out = [0u8; DIGEST_B64_LEN];
    // 16 bytes always encode to exactly 24 characters.
    let _ = encode_into(&digest, &mut out);
    out
}

/// Verify a base64 digest supplied by the peer against `message`.
pub fn verify_b64(message: &[u8], key: &[u8], supplied: &[u8]) -> Result<(), CryptoError> {
    let mut raw = [0u8; DIGEST_B64_LEN];
    let n = decode_into(supplied, &mut raw).map_err(|_| CryptoError::DigestMismatch)?;
    if n != DIGEST_SIZE {
        return Err(CryptoError::DigestMismatch);
    }

    let mut mac = keyed(key);
    mac.update(message);
    mac.verify_slice(&raw[..n])
        .map_err(|_| CryptoError::DigestMismatch)
}

fn keyed(key: &[u8]) -> HmacMd5 {
    match HmacMd5::new_from_slice(key) {
        Ok(mac) => mac,
        // HMAC hashes or pads keys of any length
        Err(_) => unreachable!("HMAC-MD5 accepts keys of any length"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn test_rfc2202_vector() {
        let digest = hmac_md5(b"what do ya want for nothing?", b"Jefe");
        assert_eq!(hex(&digest), "750c783e6ab0b503eaa86e310a5db738");
    }

    #[test]
    fn test_verify_accepts_matching_secret() {
        let encoded = digest_b64(b"BBBBBBBBBBBBBBBBBBBBBB", b"s3cret");
        assert!(verify_b64(b"BBBBBBBBBBBBBBBBBBBBBB", b"s3cret", &encoded).is_ok());
    }

    #[test]
    fn test_single_bit_flip_in_secret_rejects() {
        let token = b"BBBBBBBBBBBBBBBBBBBBBB";
        let encoded = digest_b64(token, b"s3cret");
        let secret = b"s3cret";
        for byte in 0..secret.len() {
            for bit in 0..8 {
                let mut flipped = *secret;
                flipped[byte] ^= 1 << bit;
                assert_eq!(
                    verify_b64(token, &flipped, &encoded),
                    Err(CryptoError::DigestMismatch)
                );
            }
        }
    }

    #[test]
    fn test_verify_rejects_malformed_digest() {
        assert!(verify_b64(b"token", b"key", b"not base64!").is_err());
        assert!(verify_b64(b"token", b"key", b"AAAA").is_err());
    }
}
