//! Symmetric keystream cipher used for both directions of a client connection.
//!
//! The client keys an RC4-style permutation with a fixed application secret
//! followed by a nonce, then throws away as many keystream bytes as the seed
//! is long. Each direction of a connection owns one instance for its whole
//! life; the keystream only ever moves forward.

use crate::error::{constants, ProtocolError, Result};

/// One direction's keystream state.
pub struct StreamCipher {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl StreamCipher {
    /// Key a new instance from `secret ‖ nonce` and discard the seed-length prefix.
    pub fn new(secret: &[u8], nonce: &[u8]) -> Result<Self> {
        let mut seed = Vec::with_capacity(secret.len() + nonce.len());
        seed.extend_from_slice(secret);
        seed.extend_from_slice(nonce);

        if seed.is_empty() {
            return Err(ProtocolError::CipherMisuse(
                constants::ERR_EMPTY_SEED.to_string(),
            ));
        }

        let mut state = [0u8; 256];
        for (index, slot) in state.iter_mut().enumerate() {
            *slot = index as u8;
        }

        let mut j: u8 = 0;
        for index in 0..256 {
            j = j
                .wrapping_add(state[index])
                .wrapping_add(seed[index % seed.len()]);
            state.swap(index, j as usize);
        }

        let mut cipher = Self { state, i: 0, j: 0 };
        cipher.process(&mut seed);
        Ok(cipher)
    }

    /// XOR `data` in place with the next `data.len()` keystream bytes.
    pub fn process(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.state[self.i as usize]);
            self.state.swap(self.i as usize, self.j as usize);

            let index = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
            *byte ^= self.state[index as usize];
        }
    }
}

impl std::fmt::Debug for StreamCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // keystream state stays out of logs
        f.debug_struct("StreamCipher").finish_non_exhaustive()
    }
}

/// The inbound and outbound ciphers of one connection.
#[derive(Debug)]
pub struct CipherPair {
    pub inbound: StreamCipher,
    pub outbound: StreamCipher,
}

impl CipherPair {
    pub fn new(secret: &[u8], nonce: &[u8]) -> Result<Self> {
        Ok(Self {
            inbound: StreamCipher::new(secret, nonce)?,
            outbound: StreamCipher::new(secret, nonce)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_rc4_vector() {
        // classic RC4 vector, keyed directly so no prefix is discarded
        let mut state = [0u8; 256];
        for (index, slot) in state.iter_mut().enumerate() {
            *slot = index as u8;
        }
        let key = b"Key";
        let mut j: u8 = 0;
        for index in 0..256 {
            j = j.wrapping_add(state[index]).wrapping_add(key[index % key.len()]);
            state.swap(index, j as usize);
        }
        let mut cipher = StreamCipher { state, i: 0, j: 0 };

        let mut data = *b"Plaintext";
        cipher.process(&mut data);
        assert_eq!(data, [0xBB, 0xF3, 0x16, 0xE8, 0xD9, 0x40, 0xAF, 0x0A, 0xD3]);
    }

    #[test]
    fn test_symmetric_across_successive_calls() {
        let mut sender = StreamCipher::new(b"secret", b"nonce").unwrap();
        let mut receiver = StreamCipher::new(b"secret", b"nonce").unwrap();

        for chunk in [&b"first packet"[..], b"", b"x", b"a somewhat longer third packet"] {
            let mut data = chunk.to_vec();
            sender.process(&mut data);
            if !chunk.is_empty() {
                assert_ne!(data.as_slice(), chunk);
            }
            receiver.process(&mut data);
            assert_eq!(data.as_slice(), chunk);
        }
    }

    #[test]
    fn test_state_carries_between_calls() {
        let mut split = StreamCipher::new(b"k", b"n").unwrap();
        let mut whole = StreamCipher::new(b"k", b"n").unwrap();

        let mut a = [0u8; 5];
        let mut b = [0u8; 7];
        split.process(&mut a);
        split.process(&mut b);

        let mut joined = [0u8; 12];
        whole.process(&mut joined);

        assert_eq!(&joined[..5], &a);
        assert_eq!(&joined[5..], &b);
    }

    #[test]
    fn test_nonce_changes_keystream() {
        let mut one = StreamCipher::new(b"secret", b"nonce").unwrap();
        let mut two = StreamCipher::new(b"secret", b"other").unwrap();
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        one.process(&mut a);
        two.process(&mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_seed_is_misuse() {
        assert!(matches!(
            StreamCipher::new(b"", b""),
            Err(ProtocolError::CipherMisuse(_))
        ));
    }
}
