//! Permit text formats.
//!
//! Two fixed-layout ASCII formats, both sealed with Blowfish and CRC-32:
//!
//! ```text
//! User permit (28 chars)
//! ┌──────────────────────────────┬──────────────┬────────┐
//! │ E(M_KEY, HW_ID ‖ 03 03 03)   │ CRC32(0..16) │ M_ID   │
//! │ 16 hex                       │ 8 hex        │ 4 hex  │
//! └──────────────────────────────┴──────────────┴────────┘
//!
//! Cell permit (64 chars), K = HW_ID ‖ HW_ID[0]
//! ┌──────────┬──────────┬─────────────────┬─────────────────┬──────────────────────────┐
//! │ name     │ YYYYMMDD │ E(K, CK1‖030303)│ E(K, CK2‖030303)│ E(K, CRC32be(0..48)‖04*4)│
//! │ 8 chars  │ 8 chars  │ 16 hex          │ 16 hex          │ 16 hex                   │
//! └──────────┴──────────┴─────────────────┴─────────────────┴──────────────────────────┘
//! ```
//!
//! The marker bytes appended inside each encrypted block are the only thing
//! telling a right key from a wrong one. A decryption that happens to end in
//! the right marker under the wrong key is possible (about 1 in 2^24 for the
//! 3-byte marker), so recovered secrets are likely, not certain, to be
//! unique.

pub mod cell;
pub mod user;

pub use cell::{create_cell_permit, try_decrypt_cell_permit, CellPermit, CellPermitProbe};
pub use user::{create_user_permit, decrypt_user_permit, UserPermit};

use crate::crypto::BLOCK_SIZE;
use crate::error::{PermitError, Result};
use crate::types::SECRET_LEN;

/// Marker closing a block that carries a 5-byte secret.
pub const SECRET_MARKER: [u8; 3] = [3, 3, 3];

/// Marker closing the block that carries a cell permit checksum.
pub const CHECKSUM_MARKER: [u8; 4] = [4, 4, 4, 4];

/// Plaintext block for a 5-byte secret.
pub(crate) fn seal_secret(secret: &[u8; SECRET_LEN]) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[..SECRET_LEN].copy_from_slice(secret);
    block[SECRET_LEN..].copy_from_slice(&SECRET_MARKER);
    block
}

/// Secret from a decrypted block, if the marker is intact.
pub(crate) fn open_secret(block: &[u8; BLOCK_SIZE]) -> Option<[u8; SECRET_LEN]> {
    if block[SECRET_LEN..] != SECRET_MARKER {
        return None;
    }
    let mut secret = [0u8; SECRET_LEN];
    secret.copy_from_slice(&block[..SECRET_LEN]);
    Some(secret)
}

pub(crate) fn seal_checksum(crc: u32) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[..4].copy_from_slice(&crc.to_be_bytes());
    block[4..].copy_from_slice(&CHECKSUM_MARKER);
    block
}

pub(crate) fn open_checksum(block: &[u8; BLOCK_SIZE]) -> Option<u32> {
    if block[4..] != CHECKSUM_MARKER {
        return None;
    }
    Some(u32::from_be_bytes([block[0], block[1], block[2], block[3]]))
}

/// Decode a 16-digit hex field into one cipher block.
pub(crate) fn read_block(field: &[u8]) -> Result<[u8; BLOCK_SIZE]> {
    let mut block = [0u8; BLOCK_SIZE];
    hex::decode_to_slice(field, &mut block)?;
    Ok(block)
}

/// Decode an 8-digit hex field, most significant nibble first.
pub(crate) fn read_u32(field: &[u8]) -> Result<u32> {
    let mut bytes = [0u8; 4];
    hex::decode_to_slice(field, &mut bytes)?;
    Ok(u32::from_be_bytes(bytes))
}

pub(crate) fn check_len(what: &'static str, text: &str, expected: usize) -> Result<()> {
    if text.len() != expected {
        return Err(PermitError::length(what, expected, text.len()));
    }
    Ok(())
}
