//! Fixed-size identifiers and secrets carried by permits.

use std::fmt;
use std::str::FromStr;

use crate::error::{PermitError, Result};

/// Length of every hardware id, master key and cell key.
pub const SECRET_LEN: usize = 5;

/// The 16 characters every weak secret byte is drawn from.
pub const HEX_ALPHABET: &[u8; 16] = b"0123456789ABCDEF";

macro_rules! secret_type {
    ($(#[$doc:meta])* $name:ident, $what:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; SECRET_LEN]);

        impl $name {
            /// Wrap raw bytes.
            pub const fn new(bytes: [u8; SECRET_LEN]) -> Self {
                Self(bytes)
            }

            /// The raw bytes.
            pub const fn as_bytes(&self) -> &[u8; SECRET_LEN] {
                &self.0
            }

            /// True when every byte is one of `0-9A-F`, i.e. the value lies
            /// inside the space searched by [`KeyFinder`](crate::KeyFinder).
            pub fn is_hex_alphabet(&self) -> bool {
                self.0.iter().all(|b| HEX_ALPHABET.contains(b))
            }

            /// The bytes as text, if they are all printable ASCII.
            pub fn as_ascii(&self) -> Option<&str> {
                if self.0.iter().all(|b| b.is_ascii_graphic()) {
                    std::str::from_utf8(&self.0).ok()
                } else {
                    None
                }
            }
        }

        impl From<[u8; SECRET_LEN]> for $name {
            fn from(bytes: [u8; SECRET_LEN]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = PermitError;

            fn try_from(bytes: &[u8]) -> Result<Self> {
                let arr: [u8; SECRET_LEN] = bytes
                    .try_into()
                    .map_err(|_| PermitError::length($what, SECRET_LEN, bytes.len()))?;
                Ok(Self(arr))
            }
        }

        /// Accepts either the 5 raw characters (`"1A2B3"`) or 10 hex digits
        /// spelling the bytes (`"3141324233"`).
        impl FromStr for $name {
            type Err = PermitError;

            fn from_str(s: &str) -> Result<Self> {
                match s.len() {
                    SECRET_LEN => Self::try_from(s.as_bytes()),
                    n if n == SECRET_LEN * 2 => {
                        let mut bytes = [0u8; SECRET_LEN];
                        hex::decode_to_slice(s, &mut bytes)?;
                        Ok(Self(bytes))
                    }
                    n => Err(PermitError::length($what, SECRET_LEN, n)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode_upper(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }
    };
}

secret_type!(
    /// Device-bound identifier (`HW_ID`) sealed inside both permit formats.
    HardwareId,
    "hardware id"
);

secret_type!(
    /// Manufacturer key (`M_KEY`) that seals a user permit.
    MasterKey,
    "master key"
);

secret_type!(
    /// Key decrypting one cell data file.
    CellKey,
    "cell key"
);

impl HardwareId {
    /// Cell permits are sealed with a 6-byte key: the hardware id followed
    /// by its own first byte.
    pub fn cell_permit_key(&self) -> [u8; SECRET_LEN + 1] {
        let mut key = [0u8; SECRET_LEN + 1];
        key[..SECRET_LEN].copy_from_slice(&self.0);
        key[SECRET_LEN] = self.0[0];
        key
    }
}

/// 16-bit manufacturer id printed at the end of a user permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManufacturerId(pub u16);

impl ManufacturerId {
    /// The two bytes read as characters, e.g. `0x4142` is `"AB"`.
    pub fn vendor_code(&self) -> String {
        self.0.to_be_bytes().iter().map(|&b| b as char).collect()
    }
}

impl From<u16> for ManufacturerId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for ManufacturerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// The two keys of one cell, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKeys {
    /// Tried first.
    pub first: CellKey,
    /// Tried when the first key does not open the cell.
    pub second: CellKey,
}

impl CellKeys {
    pub fn new(first: CellKey, second: CellKey) -> Self {
        Self { first, second }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellKey> {
        [&self.first, &self.second].into_iter()
    }
}
