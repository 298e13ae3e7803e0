//! Invite token generation.

use crate::errors::*;
use parking_lot::Mutex;
use qrlink_types::InviteToken;
use rand_core::{CryptoRng, OsRng, RngCore};
use std::fmt;

/// URL-safe 64 symbol alphabet; each symbol carries exactly 6 bits, so masking
/// a random byte with `0x3f` selects a symbol without bias.
pub const TOKEN_ALPHABET: &[u8; 64] =
    b"useandom-26T198340PX75pxJACKVERYMINDBUSHWOLF_GQZbfghjklqvwyzrict";

/// 21 symbols, 126 bits.
pub const DEFAULT_TOKEN_LENGTH: usize = 21;

/// 12 symbols, 72 bits.
pub const MIN_TOKEN_LENGTH: usize = 12;

/// Cryptographically random invite token source.
pub struct TokenGenerator {
    length: usize,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl TokenGenerator {
    /// Default-length tokens drawn from the operating system RNG.
    pub fn new() -> Self {
        Self {
            length: DEFAULT_TOKEN_LENGTH,
            rng: Mutex::new(Box::new(OsRng)),
        }
    }

    pub fn with_length(length: usize) -> Result<Self> {
        if length < MIN_TOKEN_LENGTH {
            return Err(InviteError::InvalidTokenLength {
                length,
                min: MIN_TOKEN_LENGTH,
            });
        }
        Ok(Self {
            length,
            ..Self::new()
        })
    }

    /// Replace the entropy source.
    pub fn with_rng<R>(mut self, rng: R) -> Self
    where
        R: RngCore + CryptoRng + Send + 'static,
    {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Security level of generated tokens.
    pub fn entropy_bits(&self) -> usize {
        self.length * 6
    }

    pub fn generate(&self) -> Result<InviteToken> {
        let mut bytes = vec![0u8; self.length];
        self.rng
            .lock()
            .try_fill_bytes(&mut bytes)
            .map_err(|e| InviteError::Resource(format!("entropy source failed: {e}")))?;

        let token: String = bytes
            .iter()
            .map(|b| TOKEN_ALPHABET[(b & 0x3f) as usize] as char)
            .collect();
        Ok(InviteToken::new(token))
    }
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGenerator")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct BrokenRng;

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> std::result::Result<(), rand_core::Error> {
            Err(rand_core::Error::new("entropy pool drained"))
        }
    }

    impl CryptoRng for BrokenRng {}

    #[test]
    fn tokens_use_alphabet_and_length() {
        let generator = TokenGenerator::new();
        let token = generator.generate().unwrap();
        assert_eq!(token.len(), DEFAULT_TOKEN_LENGTH);
        assert!(token.as_bytes().iter().all(|b| TOKEN_ALPHABET.contains(b)));
        assert!(generator.entropy_bits() >= 70);
    }

    #[test]
    fn alphabet_has_no_repeats() {
        let unique: HashSet<_> = TOKEN_ALPHABET.iter().collect();
        assert_eq!(unique.len(), 64);
    }

    #[test]
    fn tokens_do_not_repeat() {
        let generator = TokenGenerator::new();
        let tokens: HashSet<_> = (0..2_000).map(|_| generator.generate().unwrap()).collect();
        assert_eq!(tokens.len(), 2_000);
    }

    #[test]
    fn short_lengths_are_rejected() {
        let err = TokenGenerator::with_length(8).unwrap_err();
        assert!(matches!(
            err,
            InviteError::InvalidTokenLength { length: 8, min: 12 }
        ));
        assert_eq!(TokenGenerator::with_length(32).unwrap().length(), 32);
    }

    #[test]
    fn entropy_failure_is_a_resource_error() {
        let generator = TokenGenerator::new().with_rng(BrokenRng);
        let err = generator.generate().unwrap_err();
        assert!(matches!(err, InviteError::Resource(_)));
        assert!(err.is_retryable());
    }
}
