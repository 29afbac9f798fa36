//! Sequential device tokens.
//!
//! A generator holds one counter.  On first use it starts at a random
//! non-negative 63-bit value; every token increments it first and then
//! renders it as big-endian bytes, left-padded with zeros to the token
//! length.  Consecutive tokens are therefore distinct and sortable.

use rand::Rng;

/// Token length used when none (or zero) is configured.
pub const DEFAULT_TOKEN_LEN: usize = 32;

#[derive(Debug, Clone, Default)]
pub struct DevtokenGenerator {
    /// Minimum token length in bytes; `0` means [`DEFAULT_TOKEN_LEN`].
    pub token_len: usize,
    next: Option<u64>,
}

impl DevtokenGenerator {
    pub fn new(token_len: usize) -> Self {
        Self {
            token_len,
            next: None,
        }
    }

    /// Start counting from `start` instead of a random value.
    pub fn starting_at(mut self, start: u64) -> Self {
        self.next = Some(start);
        self
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> Vec<u8> {
        if self.token_len == 0 {
            self.token_len = DEFAULT_TOKEN_LEN;
        }
        let current = self
            .next
            .unwrap_or_else(|| rand::rng().random_range(0..=i64::MAX as u64));
        let value = current.wrapping_add(1);
        self.next = Some(value);
        expand(&minimal_be_bytes(value), self.token_len)
    }

    /// Produce the next token as lowercase hex.
    pub fn next_hex(&mut self) -> String {
        hex::encode(self.next_token())
    }
}

/// Big-endian bytes of `value` without leading zero bytes.
fn minimal_be_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

/// Left-pad `bytes` with zeros to at least `min_len`; never truncates.
fn expand(bytes: &[u8], min_len: usize) -> Vec<u8> {
    if bytes.len() >= min_len {
        return bytes.to_vec();
    }
    let mut out = vec![0u8; min_len];
    out[min_len - bytes.len()..].copy_from_slice(bytes);
    out
}
