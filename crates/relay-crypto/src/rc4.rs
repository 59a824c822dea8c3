//! RC4 stream cipher
//!
//! Each relay session keeps independent receive and transmit contexts; a
//! context is always primed by discarding the first keystream bytes.

use crate::error::CryptoError;

/// Keystream bytes dropped after keying
pub const PRIME_DISCARD: usize = 1024;

/// RC4 cipher context
#[derive(Clone)]
pub struct Rc4 {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    /// Key a new context (no priming).
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.is_empty() {
            return Err(CryptoError::EmptyKey);
        }

        let mut state = [0u8; 256];
        for (k, slot) in state.iter_mut().enumerate() {
            *slot = k as u8;
        }

        let mut j: u8 = 0;
        for i in 0..256 {
            j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
            state.swap(i, j as usize);
        }

        Ok(Self { state, i: 0, j: 0 })
    }

    /// Key a new context and discard the first [`PRIME_DISCARD`] keystream bytes.
    pub fn primed(key: &[u8]) -> Result<Self, CryptoError> {
        let mut rc4 = Self::new(key)?;
        rc4.discard(PRIME_DISCARD);
        Ok(rc4)
    }

    /// Advance the keystream by `count` bytes.
    pub fn discard(&mut self, count: usize) {
        for _ in 0..count {
            self.next_byte();
        }
    }

    /// Encrypt or decrypt `data` in place.
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte ^= self.next_byte();
        }
    }

    #[inline]
    fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.state[self.i as usize]);
        self.state.swap(self.i as usize, self.j as usize);
        let k = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
        self.state[k as usize]
    }
}

impl core::fmt::Debug for Rc4 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Rc4 { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn crypt(key: &[u8], plain: &[u8]) -> Vec<u8> {
        let mut data = plain.to_vec();
        Rc4::new(key).unwrap().apply_keystream(&mut data);
        data
    }

    #[test]
    fn test_known_vectors() {
        assert_eq!(
            crypt(b"Key", b"Plaintext"),
            vec![0xBB, 0xF3, 0x16, 0xE8, 0xD9, 0x40, 0xAF, 0x0A, 0xD3]
        );
        assert_eq!(crypt(b"Wiki", b"pedia"), vec![0x10, 0x21, 0xBF, 0x04, 0x20]);
        assert_eq!(
            crypt(b"Secret", b"Attack at dawn"),
            vec![
                0x45, 0xA0, 0x1F, 0x64, 0x5F, 0xC3, 0x5B, 0x38, 0x35, 0x52, 0x54, 0x4B,
                0x9B, 0xF5
            ]
        );
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(Rc4::new(&[]), Err(CryptoError::EmptyKey)));
    }

    #[test]
    fn test_primed_equals_manual_discard() {
        let key = [7u8; 16];
        let mut manual = Rc4::new(&key).unwrap();
        let mut zeros = [0u8; PRIME_DISCARD];
        manual.apply_keystream(&mut zeros);

        let mut primed = Rc4::primed(&key).unwrap();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        manual.apply_keystream(&mut a);
        primed.apply_keystream(&mut b);
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn prop_priming_is_deterministic(key in proptest::collection::vec(any::<u8>(), 1..32)) {
            let mut rx = Rc4::primed(&key).unwrap();
            let mut tx = Rc4::primed(&key).unwrap();
            let mut a = [0u8; 64];
            let mut b = [0u8; 64];
            rx.apply_keystream(&mut a);
            tx.apply_keystream(&mut b);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_encrypt_then_decrypt_restores(key in proptest::collection::vec(any::<u8>(), 1..32),
                                              data in proptest::collection::vec(any::<u8>(), 0..128)) {
            let mut buf = data.clone();
            Rc4::primed(&key).unwrap().apply_keystream(&mut buf);
            Rc4::primed(&key).unwrap().apply_keystream(&mut buf);
            prop_assert_eq!(buf, data);
        }
    }
}
