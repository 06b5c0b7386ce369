//! Key pairs, signatures and encrypted key storage.

pub mod key_file;
pub mod key_pair;
