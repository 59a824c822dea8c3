//! Relay Crypto Primitives
//!
//! The small set of primitives the relay protocol is built on: the RC4
//! stream cipher, HMAC-MD5 digests, base64 framing, CRC16 change detection
//! and the 22 character session tokens.

mod b64;
mod crc16;
mod digest;
mod error;
mod rc4;
mod token;

pub use b64::{decode_into, encode_into, encoded_len};
pub use crc16::crc16;
pub use digest::{digest_b64, hmac_md5, verify_b64, Digest, DIGEST_B64_LEN, DIGEST_SIZE};
pub use error::CryptoError;
pub use rc4::{Rc4, PRIME_DISCARD};
pub use token::{parse_token, Token, TokenGenerator, TOKEN_ALPHABET, TOKEN_SIZE};

