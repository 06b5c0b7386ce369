//! Arbitrary-precision balances.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
pub use num_bigint::BigInt as Number;
use num_bigint::Sign;
use num_traits::Zero;

/// Signed big-endian two's complement bytes; zero is the empty string.
pub fn number_bytes(n: &Number) -> Vec<u8> {
    if n.is_zero() {
        Vec::new()
    } else {
        n.to_signed_bytes_be()
    }
}

/// Inverse of [`number_bytes`].
pub fn number_from_bytes(bytes: &[u8]) -> Number {
    if bytes.is_empty() {
        Number::zero()
    } else {
        Number::from_signed_bytes_be(bytes)
    }
}

/// True when `n` is strictly greater than zero.
pub fn is_positive(n: &Number) -> bool {
    n.sign() == Sign::Plus
}

/// True when `n` is strictly below zero.
pub fn is_negative(n: &Number) -> bool {
    n.sign() == Sign::Minus
}

impl Encode for Number {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        number_bytes(self).encode(out);
    }
}

impl Decode for Number {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = Vec::<u8>::decode(input)?;
        let n = number_from_bytes(&bytes);
        // minimal two's complement only, so every number has one encoding
        if number_bytes(&n) != bytes {
            return Err(DecodeError::NonCanonical);
        }
        Ok(n)
    }
}
