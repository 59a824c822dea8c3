//! Base64 framing over caller-provided buffers
//!
//! The relay protocol never allocates per message, so both directions work
//! on fixed slices and report how many bytes were produced.

use crate::error::CryptoError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Encoded length (with padding) for `len` input bytes.
pub fn encoded_len(len: usize) -> usize {
    len.div_ceil(3) * 4
}

/// Encode `input` into `output`, returning the number of bytes written.
pub fn encode_into(input: &[u8], output: &mut [u8]) -> Result<usize, CryptoError> {
    let needed = encoded_len(input.len());
    if output.len() < needed {
        return Err(CryptoError::BufferTooSmall {
            needed,
            available: output.len(),
        });
    }
    STANDARD
        .encode_slice(input, output)
        .map_err(|_| CryptoError::BufferTooSmall {
            needed,
            available: output.len(),
        })
}

/// Decode base64 `input` into `output`, returning the number of bytes written.
///
/// Trailing CR/LF and spaces are ignored.
pub fn decode_into(input: &[u8], output: &mut [u8]) -> Result<usize, CryptoError> {
    let trimmed = trim_line_end(input);
    STANDARD
        .decode_slice(trimmed, output)
        .map_err(|err| match err {
            base64::DecodeSliceError::OutputSliceTooSmall => CryptoError::BufferTooSmall {
                needed: trimmed.len() / 4 * 3,
                available: output.len(),
            },
            base64::DecodeSliceError::DecodeError(_) => CryptoError::InvalidBase64,
        })
}

fn trim_line_end(mut input: &[u8]) -> &[u8] {
    while let [rest @ .., last] = input {
        if matches!(last, b'\r' | b'\n' | b' ') {
            input = rest;
        } else {
            break;
        }
    }
    input
}
