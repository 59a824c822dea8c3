//! Session token generation
//!
//! Tokens are freshness nonces, not secrets: the generator is seeded from a
//! free running timer plus the most recent CAN payload bytes.

use crate::error::CryptoError;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Token length in characters
pub const TOKEN_SIZE: usize = 22;

/// Characters a token is drawn from
pub const TOKEN_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// A session token
pub type Token = heapless::String<TOKEN_SIZE>;

/// Non-cryptographic token source
pub struct TokenGenerator {
    rng: SmallRng,
}

impl TokenGenerator {
    /// Seed from a timer reading and recently seen CAN bytes.
    pub fn from_entropy_sources(timer: u16, recent_can: &[u8]) -> Self {
        let seed = recent_can
            .iter()
            .fold(u64::from(timer), |acc, &b| acc.wrapping_add(u64::from(b)));
        Self::from_seed(seed)
    }

    /// Seed explicitly.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Draw the next token.
    pub fn next_token(&mut self) -> Token {
        let mut token = Token::new();
        for _ in 0..TOKEN_SIZE {
            let c = TOKEN_ALPHABET[self.rng.gen_range(0..TOKEN_ALPHABET.len())];
            // Capacity equals TOKEN_SIZE, the push cannot overflow.
            let _ = token.push(c as char);
        }
        token
    }
}

/// Parse a token received from or fixed by a peer.
pub fn parse_token(text: &str) -> Result<Token, CryptoError> {
    let mut token = Token::new();
    token.push_str(text).map_err(|_| CryptoError::BufferTooSmall {
        needed: text.len(),
        available: TOKEN_SIZE,
    })?;
    Ok(token)
}
