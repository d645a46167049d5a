//! Keyed reply validation.
//!
//! The sender stamps each probe with a token derived from
//! `(local address, target address, target port)` and a per-process secret.
//! A genuine reply carries that token back (in a sequence number, a payload,
//! an echo identifier; placement is up to the probe module). The receive
//! side recomputes the token from the reply's `(dst, src, src_port)` and
//! the probe module compares.

use std::net::Ipv4Addr;

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Token length in bytes (four 32-bit words).
pub const VALIDATE_BYTES: usize = 16;

/// Secret key length in bytes.
pub const KEY_BYTES: usize = 32;

/// Validation token for one (local, remote, remote port) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValidationToken([u8; VALIDATE_BYTES]);

impl ValidationToken {
    pub fn from_bytes(bytes: [u8; VALIDATE_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; VALIDATE_BYTES] {
        &self.0
    }

    /// Word `i` (0..4), big-endian.
    ///
    /// # Panics
    /// Panics if `i >= 4`.
    pub fn word(&self, i: usize) -> u32 {
        let b = &self.0[i * 4..i * 4 + 4];
        u32::from_be_bytes([b[0], b[1], b[2], b[3]])
    }

    pub fn words(&self) -> [u32; 4] {
        [self.word(0), self.word(1), self.word(2), self.word(3)]
    }
}

/// Errors from validator construction.
#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error("validation key must be {expected} hex characters, got {actual}")]
    KeyLength { expected: usize, actual: usize },

    #[error("validation key contains non-hex character at position {0}")]
    KeyNotHex(usize),
}

/// Deterministic keyed token generator.
///
/// Shared (read-only) between the send and receive sides for the lifetime
/// of a scan.
#[derive(Clone)]
pub struct Validator {
    key: [u8; KEY_BYTES],
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator").finish_non_exhaustive()
    }
}

impl Validator {
    /// Create a validator with a fresh random secret.
    pub fn new() -> Self {
        let mut key = [0u8; KEY_BYTES];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    pub fn with_key(key: [u8; KEY_BYTES]) -> Self {
        Self { key }
    }

    /// Parse a 64-character hex secret (used when the sender runs in
    /// another process and the key is handed over out of band).
    pub fn from_hex_key(hex: &str) -> Result<Self, ValidatorError> {
        let hex = hex.trim();
        if hex.len() != KEY_BYTES * 2 {
            return Err(ValidatorError::KeyLength {
                expected: KEY_BYTES * 2,
                actual: hex.len(),
            });
        }
        let mut key = [0u8; KEY_BYTES];
        let bytes = hex.as_bytes();
        for (i, out) in key.iter_mut().enumerate() {
            let hi = hex_nibble(bytes[i * 2]).ok_or(ValidatorError::KeyNotHex(i * 2))?;
            let lo = hex_nibble(bytes[i * 2 + 1]).ok_or(ValidatorError::KeyNotHex(i * 2 + 1))?;
            *out = (hi << 4) | lo;
        }
        Ok(Self { key })
    }

    /// Compute the token for `(local, remote, remote_port)`.
    ///
    /// On the receive side these are the reply's destination address,
    /// source address and source port.
    pub fn generate(&self, local: Ipv4Addr, remote: Ipv4Addr, remote_port: u16) -> ValidationToken {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(local.octets());
        hasher.update(remote.octets());
        hasher.update(remote_port.to_be_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; VALIDATE_BYTES];
        out.copy_from_slice(&digest[..VALIDATE_BYTES]);
        ValidationToken(out)
    }

    /// Recompute and compare. Comparison does not short-circuit.
    pub fn check(
        &self,
        token: &ValidationToken,
        local: Ipv4Addr,
        remote: Ipv4Addr,
        remote_port: u16,
    ) -> bool {
        let expected = self.generate(local, remote, remote_port);
        expected
            .0
            .iter()
            .zip(token.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
