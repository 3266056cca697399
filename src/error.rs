//! Error types for permit decoding, key recovery and cell decryption.
//!
//! This module provides the [`PermitError`] type which covers every failure
//! that is *raised* by the crate. Expected negative outcomes of a probe, such
//! as a wrong candidate hardware id or a wrong candidate key during a search,
//! are not errors: they come back as [`CellPermitProbe::Invalid`] or
//! [`Recovered::NotFound`].
//!
//! ## Error Categories
//!
//! | Category | Errors | Description |
//! |----------|--------|-------------|
//! | Precondition | [`InvalidLength`], [`InvalidHex`], [`InvalidCellName`], [`InvalidExpiry`] | Malformed fixed-size input |
//! | Integrity | [`ChecksumMismatch`], [`SentinelMismatch`] | A permit expected to be valid is not |
//! | Search | [`NotFound`], [`ThreadPool`] | Exhaustive search failures |
//! | Loading | [`LoadFailed`], [`Io`], [`Archive`] | Permit list and cell file handling |
//!
//! ## Example
//!
//! ```rust
//! use s63_permit::{decrypt_user_permit, MasterKey, PermitError};
//!
//! let key = MasterKey::new(*b"01234");
//! match decrypt_user_permit("0000000000000000FFFFFFFF4142", &key) {
//!     Ok((hw_id, m_id)) => println!("{} from {}", hw_id, m_id),
//!     Err(PermitError::ChecksumMismatch { .. }) => eprintln!("Corrupt permit"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```
//!
//! [`CellPermitProbe::Invalid`]: crate::CellPermitProbe::Invalid
//! [`Recovered::NotFound`]: crate::Recovered::NotFound
//! [`InvalidLength`]: PermitError::InvalidLength
//! [`InvalidHex`]: PermitError::InvalidHex
//! [`InvalidCellName`]: PermitError::InvalidCellName
//! [`InvalidExpiry`]: PermitError::InvalidExpiry
//! [`ChecksumMismatch`]: PermitError::ChecksumMismatch
//! [`SentinelMismatch`]: PermitError::SentinelMismatch
//! [`NotFound`]: PermitError::NotFound
//! [`ThreadPool`]: PermitError::ThreadPool
//! [`LoadFailed`]: PermitError::LoadFailed
//! [`Io`]: PermitError::Io
//! [`Archive`]: PermitError::Archive

use std::io;

use thiserror::Error;

/// Error type for permit operations.
#[derive(Debug, Error)]
pub enum PermitError {
    /// A fixed-size input had the wrong length.
    ///
    /// Raised for 5-byte secrets built from slices, for permit strings that
    /// are not 28 or 64 characters long, for cipher keys that are not 5 or 6
    /// bytes, and for ECB buffers that are not a whole number of blocks.
    #[error("invalid {what} length: expected {expected}, got {actual}")]
    InvalidLength {
        /// What was being measured.
        what: &'static str,
        /// Required length.
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },

    /// A hex field contained a character outside `0-9A-Fa-f`.
    #[error("invalid hex field: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The cell name does not fit the 8-character ASCII field.
    #[error("invalid cell name {0:?}: must be at most 8 ASCII characters")]
    InvalidCellName(String),

    /// The expiry date can not be written as, or read from, `YYYYMMDD`.
    #[error("invalid expiry date: {0}")]
    InvalidExpiry(String),

    /// The checksum embedded in a permit does not match its contents.
    #[error("checksum mismatch: permit says {expected:08X}, computed {actual:08X}")]
    ChecksumMismatch {
        /// Checksum carried by the permit.
        expected: u32,
        /// Checksum computed over the permit text.
        actual: u32,
    },

    /// A decrypted block did not end with the expected marker bytes.
    ///
    /// For a user permit with a valid checksum this means the key is wrong.
    #[error("decrypted block has no valid marker, wrong key?")]
    SentinelMismatch,

    /// The whole 16^5 candidate space was searched without a match.
    #[error("no matching candidate in the search space")]
    NotFound,

    /// None of the candidate hardware ids decoded the permit list.
    #[error("failed to load the permits: {0}")]
    LoadFailed(String),

    /// The search worker pool could not be started.
    #[error("failed to start worker pool: {0}")]
    ThreadPool(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A decrypted cell could not be read as a ZIP archive.
    #[cfg(feature = "cells")]
    #[error("cell archive error: {0}")]
    Archive(String),
}

impl PermitError {
    pub(crate) fn length(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::InvalidLength {
            what,
            expected,
            actual,
        }
    }
}

#[cfg(feature = "cells")]
impl From<zip::result::ZipError> for PermitError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => Self::Io(io),
            other => Self::Archive(other.to_string()),
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for PermitError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PermitError>;
