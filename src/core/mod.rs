//! Core ledger data structures.
//!
//! This module contains the building blocks of the chain:
//! - `Envelope`: signed transaction carrying an opaque typed payload
//! - `Payload`: emission, transfer and user registration business rules
//! - `Registry`: transaction type to payload decoder table
//! - `Block` and `Header`: chain linkage, roots and the authority signature
//! - `Blockchain`: block production on top of the chain store

pub mod block;
pub mod blockchain;
pub mod config;
pub mod payload;
pub mod registry;
pub mod transaction;
