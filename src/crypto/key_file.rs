//! Encrypted on-disk storage for the block authority key.
//!
//! File format: `[4B magic][1B version][32B salt][24B nonce][ciphertext + 16B tag]`.
//! The encryption key is derived from a passphrase with Argon2id and the
//! scalar is sealed with XChaCha20-Poly1305.

use crate::crypto::key_pair::PrivateKey;
use crate::info;
use argon2::Argon2;
use chacha20poly1305::{
    XChaCha20Poly1305,
    aead::{Aead, KeyInit},
};
use ledger_derive::Error;
use rand_core::{OsRng, RngCore};
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

const KEY_FILE_MAGIC: &[u8; 4] = b"LKEY";
const KEY_FILE_VERSION: u8 = 1;
const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 24;
const HEADER_LEN: usize = 4 + 1 + SALT_LEN + NONCE_LEN;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum KeyFileError {
    #[error("key file i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot determine home directory")]
    NoHomeDir,
    #[error("key file too short: {0} bytes")]
    TooShort(usize),
    #[error("invalid key file magic")]
    InvalidMagic,
    #[error("unsupported key file version {0}")]
    UnsupportedVersion(u8),
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("encryption failed")]
    Encryption,
    #[error("decryption failed: wrong passphrase or corrupt file")]
    Decryption,
    #[error("decrypted bytes are not a valid private key")]
    InvalidKey,
}

/// Default location of the authority key for a chain:
/// `~/.ledger/{chain_id}/authority.key`.
pub fn default_key_path(chain_id: u64) -> Result<PathBuf, KeyFileError> {
    let home = dirs::home_dir().ok_or(KeyFileError::NoHomeDir)?;
    Ok(home
        .join(".ledger")
        .join(chain_id.to_string())
        .join("authority.key"))
}

fn derive_key(passphrase: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, KeyFileError> {
    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::default()
        .hash_password_into(passphrase, salt, key.as_mut())
        .map_err(|e| KeyFileError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Encrypts `key` with `passphrase` and writes it to `path`, creating parent
/// directories as needed.
pub fn save_key(key: &PrivateKey, path: &Path, passphrase: &[u8]) -> Result<(), KeyFileError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let derived = derive_key(passphrase, &salt)?;
    let cipher = XChaCha20Poly1305::new(derived.as_ref().into());

    let plaintext = Zeroizing::new(key.to_bytes());
    let ciphertext = cipher
        .encrypt(nonce.as_ref().into(), plaintext.as_ref())
        .map_err(|_| KeyFileError::Encryption)?;

    let mut data = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    data.extend_from_slice(KEY_FILE_MAGIC);
    data.push(KEY_FILE_VERSION);
    data.extend_from_slice(&salt);
    data.extend_from_slice(&nonce);
    data.extend_from_slice(&ciphertext);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &data)?;

    info!("authority key saved to {}", path.display());
    Ok(())
}

/// Reads and decrypts a key written by [`save_key`].
pub fn load_key(path: &Path, passphrase: &[u8]) -> Result<PrivateKey, KeyFileError> {
    let data = fs::read(path)?;

    if data.len() < HEADER_LEN + TAG_LEN {
        return Err(KeyFileError::TooShort(data.len()));
    }
    if &data[0..4] != KEY_FILE_MAGIC {
        return Err(KeyFileError::InvalidMagic);
    }
    if data[4] != KEY_FILE_VERSION {
        return Err(KeyFileError::UnsupportedVersion(data[4]));
    }

    let salt = &data[5..5 + SALT_LEN];
    let nonce = &data[5 + SALT_LEN..HEADER_LEN];
    let ciphertext = &data[HEADER_LEN..];

    let derived = derive_key(passphrase, salt)?;
    let cipher = XChaCha20Poly1305::new(derived.as_ref().into());
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(nonce.into(), ciphertext)
            .map_err(|_| KeyFileError::Decryption)?,
    );

    let bytes: Zeroizing<[u8; 32]> = Zeroizing::new(
        plaintext
            .as_slice()
            .try_into()
            .map_err(|_| KeyFileError::InvalidKey)?,
    );
    PrivateKey::from_bytes(&bytes).ok_or(KeyFileError::InvalidKey)
}

/// Loads the key at `path`, or generates, saves and returns a fresh one.
pub fn load_or_generate(path: &Path, passphrase: &[u8]) -> Result<PrivateKey, KeyFileError> {
    if path.exists() {
        info!("loading authority key from {}", path.display());
        load_key(path, passphrase)
    } else {
        info!("generating new authority key");
        let key = PrivateKey::new();
        save_key(&key, path, passphrase)?;
        Ok(key)
    }
}
