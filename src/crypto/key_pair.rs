//! Schnorr signature key pairs on secp256k1.

use crate::types::address::Address;
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::hash::Hash;
use k256::schnorr::signature::{Signer, Verifier};
use k256::schnorr::{SigningKey, VerifyingKey};
use rand_core::OsRng;
use std::fmt;

/// Length of an x-only public key in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of a Schnorr signature in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Private key for signing transactions and blocks.
///
/// Never serialized by the codec; see `crypto::key_file` for encrypted storage.
#[derive(Clone)]
pub struct PrivateKey {
    key: SigningKey,
}

/// Public key for signature verification and address derivation.
///
/// The address is derived once when the key is built and carried along,
/// since every ledger lookup by sender needs it.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub key: VerifyingKey,
    pub address: Address,
}

/// Schnorr signature (64 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature(pub k256::schnorr::Signature);

impl PrivateKey {
    /// Generates a new random private key using OS-provided entropy.
    pub fn new() -> Self {
        Self {
            key: SigningKey::random(&mut OsRng),
        }
    }

    /// Creates a private key from raw bytes.
    ///
    /// Returns `None` if the bytes are not a valid secp256k1 scalar.
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        SigningKey::from_bytes(bytes).ok().map(|key| Self { key })
    }

    /// Raw scalar bytes. Callers must zeroize them after use.
    pub(crate) fn to_bytes(&self) -> [u8; 32] {
        self.key.to_bytes().into()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_verifying_key(*self.key.verifying_key())
    }

    pub fn sign(&self, data: &[u8]) -> Signature {
        Signature(self.key.sign(data))
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({})", self.public_key())
    }
}

/// Address derivation: first 24 bytes of `SHA3-256("ADDRESS" ‖ x-only key)`.
fn derive_address(key: &VerifyingKey) -> Address {
    let digest = Hash::sha3()
        .chain(b"ADDRESS")
        .chain(&key.to_bytes())
        .finalize();
    Address::from_hash(&digest)
}

impl PublicKey {
    fn from_verifying_key(key: VerifyingKey) -> Self {
        PublicKey {
            address: derive_address(&key),
            key,
        }
    }

    /// Parses an x-only public key.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        VerifyingKey::from_bytes(bytes)
            .ok()
            .map(Self::from_verifying_key)
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.key.to_bytes().into()
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Verifies a Schnorr signature against the given data.
    pub fn verify(&self, data: &[u8], signature: &Signature) -> bool {
        self.key.verify(data, &signature.0).is_ok()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

impl Encode for PublicKey {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.to_bytes());
    }
}

impl Decode for PublicKey {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = <[u8; PUBLIC_KEY_LEN]>::decode(input)?;
        PublicKey::from_bytes(&bytes).ok_or(DecodeError::InvalidValue)
    }
}

impl Signature {
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.0.to_bytes()
    }
}

impl Encode for Signature {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.to_bytes());
    }
}

impl Decode for Signature {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = <[u8; SIGNATURE_LEN]>::decode(input)?;
        k256::schnorr::Signature::try_from(bytes.as_slice())
            .map(Signature)
            .map_err(|_| DecodeError::InvalidValue)
    }
}
