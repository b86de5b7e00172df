//! Crypto module - Seal and open data with AES-256-GCM.
//!
//! This module contains:
//! - AES-256-GCM encryption/decryption bound to associated data
//! - Random key and nonce generation

pub mod encryption;

pub use encryption::{generate_key, Encryptor, KEY_LEN, NONCE_LEN, TAG_LEN};
