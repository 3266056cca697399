//! S-63 permit codec and key recovery.
//!
//! Encodes and decodes the two permit formats of the S-63 chart protection
//! scheme and recovers the secrets behind them when they come from the
//! 16-character hex alphabet.
//!
//! - [`permit`]: user permits (hardware id under a manufacturer master key)
//!   and cell permits (two cell keys under a key derived from the hardware id)
//! - [`finder`]: parallel exhaustive search for master keys and hardware ids
//! - [`store`]: batch decoding of `PERMIT.TXT` permit lists
//! - [`cells`]: decryption of chart cell files (feature `cells`)
//!
//! ## Features
//! - `cells` (default) - cell file decryption, pulls in `zip`
//! - `cli` - the `s63-permit` binary
//!
//! ```
//! use s63_permit::{create_user_permit, KeyFinder, HardwareId, ManufacturerId, MasterKey};
//!
//! let hw_id = HardwareId::new([0x12, 0x34, 0x56, 0x78, 0x9A]);
//! let permit = create_user_permit(&hw_id, &MasterKey::new(*b"01234"), ManufacturerId(0x4142))?;
//!
//! let recovered = KeyFinder::new().recover_user_permit(&permit)?.found()?;
//! assert_eq!(recovered.hardware_id, hw_id);
//! # Ok::<(), s63_permit::PermitError>(())
//! ```

mod crc32;
pub mod crypto;
pub mod error;
pub mod finder;
pub mod permit;
pub mod store;
pub mod types;

#[cfg(feature = "cells")]
pub mod cells;

pub use crc32::{checksum, Crc32};
pub use crypto::PermitCipher;
pub use error::{PermitError, Result};
pub use finder::{
    HardwareIdMatch, KeyFinder, MasterKeyMatch, Recovered, UserPermitRecovery, SEARCH_SPACE,
};
pub use permit::{
    create_cell_permit, create_user_permit, decrypt_user_permit, try_decrypt_cell_permit,
    CellPermit, CellPermitProbe, UserPermit,
};
pub use store::{load_permit_list, parse_permit_list, PermitEntry, PermitList, PermitStore};
pub use types::{CellKey, CellKeys, HardwareId, ManufacturerId, MasterKey};

#[cfg(feature = "cells")]
pub use cells::{decrypt_cell, decrypt_cell_tree, extract_first_entry};
