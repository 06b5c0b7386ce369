//! Canonical binary encoding for everything the ledger hashes, signs or stores.
//!
//! The same bytes serve as hash pre-image, wire format and storage format, so
//! decoding is strict: every value has exactly one accepted encoding and
//! `from_bytes` rejects trailing input.
//!
//! # Binary Format
//!
//! - `u8`, `i8`, `bool`: one byte
//! - `u16`, `u32`, `u64`, `usize`: unsigned LEB128 varint
//! - `i32`, `i64`: zig-zag mapped, then varint
//! - `[T]`, `Vec<T>`, `str`, `String`: varint length followed by elements
//! - `Option<T>`: one tag byte (0 = None, 1 = Some) followed by the value
//! - `[T; N]`: elements back to back, no length
//!
//! ```ignore
//! use crate::types::encoding::{Decode, Encode};
//!
//! let bytes = 300u64.to_bytes();
//! assert_eq!(bytes, [0xac, 0x02]);
//! assert_eq!(u64::from_bytes(&bytes).unwrap(), 300);
//! ```

use ledger_derive::Error;

/// Sink for writing encoded bytes.
///
/// Implemented by byte buffers and hashers, so a value can be hashed without
/// first being serialized into a temporary buffer.
pub trait EncodeSink {
    fn write(&mut self, bytes: &[u8]);
}

/// Counts encoded bytes without storing them.
#[derive(Default)]
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl EncodeSink for SizeCounter {
    fn write(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }
}

impl EncodeSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Types that can be written in the canonical binary format.
pub trait Encode {
    fn encode<S: EncodeSink>(&self, out: &mut S);

    /// Number of bytes `encode` writes.
    fn encoded_len(&self) -> usize {
        let mut counter = SizeCounter::new();
        self.encode(&mut counter);
        counter.len()
    }

    /// Serializes into a buffer allocated with the exact size.
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode(&mut out);
        out
    }
}

/// Errors that can occur during decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("invalid value")]
    InvalidValue,
    #[error("length or integer overflow")]
    LengthOverflow,
    #[error("non-canonical varint")]
    NonCanonical,
}

/// Types that can be read back from the canonical binary format.
pub trait Decode: Sized {
    /// Decodes a value and advances `input` past the consumed bytes.
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError>;

    /// Decodes a value that must span all of `data`.
    fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let mut input = data;
        let value = Self::decode(&mut input)?;
        if !input.is_empty() {
            return Err(DecodeError::InvalidValue);
        }
        Ok(value)
    }
}

/// Upper bound on decoded collection lengths.
pub const MAX_VEC_LEN: usize = 1_000_000;

/// Reads exactly `n` bytes, advancing the slice.
pub fn read_bytes<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    if input.len() < n {
        return Err(DecodeError::UnexpectedEof);
    }
    let (bytes, rest) = input.split_at(n);
    *input = rest;
    Ok(bytes)
}

/// Writes `value` as an unsigned LEB128 varint.
pub fn write_uvarint<S: EncodeSink>(mut value: u64, out: &mut S) {
    let mut buf = [0u8; 10];
    let mut n = 0;
    while value >= 0x80 {
        buf[n] = (value as u8) | 0x80;
        value >>= 7;
        n += 1;
    }
    buf[n] = value as u8;
    out.write(&buf[..=n]);
}

/// Reads an unsigned LEB128 varint, rejecting overlong and padded forms.
pub fn read_uvarint(input: &mut &[u8]) -> Result<u64, DecodeError> {
    let mut value: u64 = 0;
    for i in 0..10 {
        let byte = read_bytes(input, 1)?[0];
        let low = u64::from(byte & 0x7f);
        if i == 9 && byte > 0x01 {
            return Err(DecodeError::LengthOverflow);
        }
        value |= low << (7 * i);
        if byte & 0x80 == 0 {
            if i > 0 && byte == 0 {
                return Err(DecodeError::NonCanonical);
            }
            return Ok(value);
        }
    }
    Err(DecodeError::LengthOverflow)
}

fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

impl Encode for u8 {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self]);
    }
}

impl Decode for u8 {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(read_bytes(input, 1)?[0])
    }
}

impl Encode for i8 {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self as u8]);
    }
}

impl Decode for i8 {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(read_bytes(input, 1)?[0] as i8)
    }
}

impl Encode for bool {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self as u8]);
    }
}

impl Decode for bool {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

macro_rules! impl_uvarint {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode<S: EncodeSink>(&self, out: &mut S) {
                    write_uvarint(*self as u64, out);
                }
            }

            impl Decode for $t {
                fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
                    <$t>::try_from(read_uvarint(input)?).map_err(|_| DecodeError::LengthOverflow)
                }
            }
        )*
    };
}

impl_uvarint!(u16, u32, u64, usize);

macro_rules! impl_svarint {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode<S: EncodeSink>(&self, out: &mut S) {
                    write_uvarint(zigzag(*self as i64), out);
                }
            }

            impl Decode for $t {
                fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
                    <$t>::try_from(unzigzag(read_uvarint(input)?))
                        .map_err(|_| DecodeError::LengthOverflow)
                }
            }
        )*
    };
}

impl_svarint!(i32, i64);

impl<T: Encode + ?Sized> Encode for &T {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        (**self).encode(out);
    }
}

impl<T: Encode> Encode for [T] {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.as_slice().encode(out);
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = usize::decode(input)?;
        if len > MAX_VEC_LEN {
            return Err(DecodeError::LengthOverflow);
        }
        // every element takes at least one byte, so cap the preallocation
        let mut vec = Vec::with_capacity(len.min(input.len()));
        for _ in 0..len {
            vec.push(T::decode(input)?);
        }
        Ok(vec)
    }
}

impl Encode for str {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        out.write(self.as_bytes());
    }
}

impl Encode for String {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.as_str().encode(out);
    }
}

impl Decode for String {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = usize::decode(input)?;
        if len > MAX_VEC_LEN {
            return Err(DecodeError::LengthOverflow);
        }
        let bytes = read_bytes(input, len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidValue)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        match self {
            None => 0u8.encode(out),
            Some(v) => {
                1u8.encode(out);
                v.encode(out);
            }
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(input)?)),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let mut vec = Vec::with_capacity(N);
        for _ in 0..N {
            vec.push(T::decode(input)?);
        }
        vec.try_into().map_err(|_| DecodeError::InvalidValue)
    }
}

impl<A: Encode, B: Encode> Encode for (A, B) {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.0.encode(out);
        self.1.encode(out);
    }
}

impl<A: Decode, B: Decode> Decode for (A, B) {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok((A::decode(input)?, B::decode(input)?))
    }
}

impl<A: Encode, B: Encode, C: Encode> Encode for (A, B, C) {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.0.encode(out);
        self.1.encode(out);
        self.2.encode(out);
    }
}

impl<A: Decode, B: Decode, C: Decode> Decode for (A, B, C) {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok((A::decode(input)?, B::decode(input)?, C::decode(input)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== SizeCounter Tests ==========

    #[test]
    fn size_counter_accumulates() {
        let mut counter = SizeCounter::new();
        assert!(counter.is_empty());

        counter.write(&[1, 2, 3]);
        counter.write(&[4, 5]);
        assert_eq!(counter.len(), 5);
    }

    #[test]
    fn to_bytes_allocates_exact_capacity() {
        let data: Vec<u8> = vec![1, 2, 3, 4, 5];
        let bytes = data.to_bytes();
        assert_eq!(bytes.len(), 1 + 5);
        assert_eq!(bytes.capacity(), bytes.len());
        assert_eq!(data.encoded_len(), 6);
    }

    // ========== Varint Tests ==========

    #[test]
    fn small_integers_take_one_byte() {
        assert_eq!(0u64.to_bytes(), [0x00]);
        assert_eq!(127u32.to_bytes(), [0x7f]);
        assert_eq!(128u16.to_bytes(), [0x80, 0x01]);
        assert_eq!(300usize.to_bytes(), [0xac, 0x02]);
    }

    #[test]
    fn u64_max_takes_ten_bytes() {
        let bytes = u64::MAX.to_bytes();
        assert_eq!(bytes.len(), 10);
        assert_eq!(*bytes.last().unwrap(), 0x01);
        assert_eq!(u64::from_bytes(&bytes).unwrap(), u64::MAX);
    }

    #[test]
    fn padded_varint_is_rejected() {
        // 0 written with a redundant continuation byte
        assert_eq!(u64::from_bytes(&[0x80, 0x00]), Err(DecodeError::NonCanonical));
    }

    #[test]
    fn overlong_varint_is_rejected() {
        let mut bytes = vec![0xff; 9];
        bytes.push(0x02);
        assert_eq!(u64::from_bytes(&bytes), Err(DecodeError::LengthOverflow));
    }

    #[test]
    fn narrow_integer_overflow_is_rejected() {
        let bytes = (u16::MAX as u64 + 1).to_bytes();
        assert_eq!(u16::from_bytes(&bytes), Err(DecodeError::LengthOverflow));
    }

    #[test]
    fn signed_integers_use_zigzag() {
        assert_eq!(0i64.to_bytes(), [0x00]);
        assert_eq!((-1i64).to_bytes(), [0x01]);
        assert_eq!(1i64.to_bytes(), [0x02]);
        for v in [i64::MIN, -65, -1, 0, 64, i64::MAX] {
            assert_eq!(i64::from_bytes(&v.to_bytes()).unwrap(), v);
        }
        assert_eq!(i32::from_bytes(&i32::MIN.to_bytes()).unwrap(), i32::MIN);
    }

    #[test]
    fn truncated_varint_is_eof() {
        assert_eq!(u64::from_bytes(&[0x80]), Err(DecodeError::UnexpectedEof));
    }

    // ========== bool Tests ==========

    #[test]
    fn bool_invalid_value() {
        for invalid in [2u8, 128, 255] {
            assert_eq!(bool::from_bytes(&[invalid]), Err(DecodeError::InvalidValue));
        }
    }

    // ========== Collection Tests ==========

    #[test]
    fn vec_is_length_prefixed() {
        let vec: Vec<u8> = vec![0xAA, 0xBB, 0xCC];
        assert_eq!(vec.to_bytes(), [0x03, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn vec_of_varints_decodes() {
        let original: Vec<u32> = vec![1, 200, 70_000];
        assert_eq!(Vec::<u32>::from_bytes(&original.to_bytes()).unwrap(), original);
    }

    #[test]
    fn vec_length_overflow() {
        let bytes = (MAX_VEC_LEN as u64 + 1).to_bytes();
        assert_eq!(Vec::<u8>::from_bytes(&bytes), Err(DecodeError::LengthOverflow));
    }

    #[test]
    fn vec_with_missing_elements_is_eof() {
        assert_eq!(Vec::<u8>::from_bytes(&[0x04, 1, 2]), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn str_and_string_encode_identically() {
        let owned = String::from("like");
        assert_eq!("like".to_bytes(), owned.to_bytes());
        assert_eq!(String::from_bytes(&owned.to_bytes()).unwrap(), owned);
    }

    #[test]
    fn string_invalid_utf8() {
        assert_eq!(
            String::from_bytes(&[0x02, 0xFF, 0xFE]),
            Err(DecodeError::InvalidValue)
        );
    }

    // ========== Option / Array / Tuple Tests ==========

    #[test]
    fn option_tag_bytes() {
        assert_eq!(None::<u8>.to_bytes(), [0]);
        assert_eq!(Some(7u8).to_bytes(), [1, 7]);
        assert_eq!(Option::<u8>::from_bytes(&[2, 7]), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn arrays_have_no_prefix() {
        let arr = [9u8; 4];
        assert_eq!(arr.to_bytes(), [9, 9, 9, 9]);
        assert_eq!(<[u8; 4]>::from_bytes(&arr.to_bytes()).unwrap(), arr);
    }

    #[test]
    fn tuple_of_references_matches_owned_tuple() {
        let name = String::from("x");
        assert_eq!((&name, &5u64).to_bytes(), (name.clone(), 5u64).to_bytes());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        assert_eq!(u8::from_bytes(&[1, 2]), Err(DecodeError::InvalidValue));
    }
}
