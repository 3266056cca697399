//! Cell permit: two cell keys for one chart cell, sealed under a key derived
//! from the hardware id.

use chrono::{Datelike, NaiveDate};

use super::{check_len, open_checksum, open_secret, seal_checksum, seal_secret};
use crate::crc32;
use crate::crypto::{PermitCipher, BLOCK_SIZE};
use crate::error::{PermitError, Result};
use crate::types::{CellKey, CellKeys, HardwareId};

/// Length of a cell permit in characters.
pub const CELL_PERMIT_LEN: usize = 64;

/// Width of the cell name field. Shorter names are padded with NUL bytes.
pub const CELL_NAME_LEN: usize = 8;

const NAME_END: usize = CELL_NAME_LEN;
const EXPIRY_END: usize = 16;
const KEY1_END: usize = 32;
const KEY2_END: usize = 48;

/// Number of characters covered by the cell permit checksum.
pub const CHECKSUMMED_LEN: usize = KEY2_END;

/// Outcome of trying a hardware id against a cell permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellPermitProbe {
    /// Checksum and both key markers matched.
    Found(CellKeys),
    /// Wrong hardware id or a corrupted permit.
    Invalid,
}

impl CellPermitProbe {
    pub fn keys(self) -> Option<CellKeys> {
        match self {
            Self::Found(keys) => Some(keys),
            Self::Invalid => None,
        }
    }
}

/// A cell permit split into its fields, not yet decrypted.
#[derive(Debug, Clone, PartialEq)]
pub struct CellPermit {
    name: String,
    expiry: [u8; 8],
    blocks: std::result::Result<[u8; 3 * BLOCK_SIZE], hex::FromHexError>,
    checksum: u32,
}

impl CellPermit {
    /// Split `text` into its fields and compute the checksum of the first 48
    /// characters. Nothing is decrypted here.
    ///
    /// Only the length and the cell name are checked. Malformed block hex
    /// surfaces from [`encrypted_blocks`](Self::encrypted_blocks) and makes
    /// [`try_decrypt`](Self::try_decrypt) return `Invalid`.
    pub fn parse(text: &str) -> Result<Self> {
        check_len("cell permit", text, CELL_PERMIT_LEN)?;
        let raw = text.as_bytes();

        let name_field = &raw[..NAME_END];
        if !name_field.is_ascii() {
            return Err(PermitError::InvalidCellName(
                String::from_utf8_lossy(name_field).into_owned(),
            ));
        }
        let name = String::from_utf8_lossy(name_field)
            .trim_end_matches('\0')
            .to_string();

        let mut expiry = [0u8; 8];
        expiry.copy_from_slice(&raw[NAME_END..EXPIRY_END]);

        let mut blocks = [0u8; 3 * BLOCK_SIZE];
        let blocks = hex::decode_to_slice(&raw[EXPIRY_END..], &mut blocks).map(|()| blocks);

        Ok(Self {
            name,
            expiry,
            blocks,
            checksum: crc32::checksum(&raw[..CHECKSUMMED_LEN]),
        })
    }

    /// Cell name with any NUL padding removed.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expiry(&self) -> Result<NaiveDate> {
        parse_date(&self.expiry)
    }

    /// Encrypted key 1, key 2 and checksum blocks, in permit order.
    pub fn encrypted_blocks(&self) -> Result<&[u8; 3 * BLOCK_SIZE]> {
        self.blocks.as_ref().map_err(|e| PermitError::InvalidHex(e.clone()))
    }

    /// Checksum computed over the text, to compare against the decrypted one.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Open the key blocks with `hw_id`. Malformed block hex is `Invalid`,
    /// like any other permit that does not open.
    pub fn try_decrypt(&self, hw_id: &HardwareId) -> Result<CellPermitProbe> {
        let Ok(blocks) = &self.blocks else {
            return Ok(CellPermitProbe::Invalid);
        };
        let cipher = PermitCipher::new(&hw_id.cell_permit_key())?;
        Ok(match open_blocks(&cipher, blocks, self.checksum) {
            Some(keys) => CellPermitProbe::Found(keys),
            None => CellPermitProbe::Invalid,
        })
    }
}

/// Check the checksum block first, then both key blocks.
///
/// Single-block CBC with a zero IV is a raw block decryption, so every block
/// is decrypted on its own.
pub(crate) fn open_blocks(
    cipher: &PermitCipher,
    blocks: &[u8; 3 * BLOCK_SIZE],
    checksum: u32,
) -> Option<CellKeys> {
    let [key1, key2, crc] = split_blocks(blocks);

    let decrypted = open_checksum(&cipher.decrypt_block(crc))?;
    if decrypted != checksum {
        return None;
    }

    let first = open_secret(&cipher.decrypt_block(key1))?;
    let second = open_secret(&cipher.decrypt_block(key2))?;
    Some(CellKeys::new(CellKey::new(first), CellKey::new(second)))
}

fn split_blocks(blocks: &[u8; 3 * BLOCK_SIZE]) -> [[u8; BLOCK_SIZE]; 3] {
    let mut out = [[0u8; BLOCK_SIZE]; 3];
    for (dst, src) in out.iter_mut().zip(blocks.chunks_exact(BLOCK_SIZE)) {
        dst.copy_from_slice(src);
    }
    out
}

/// Build the 64-character cell permit.
///
/// `cell_name` must be 1 to 8 printable ASCII characters without commas;
/// anything longer is rejected rather than truncated.
pub fn create_cell_permit(
    hw_id: &HardwareId,
    cell_name: &str,
    expiry: NaiveDate,
    ck1: &CellKey,
    ck2: &CellKey,
) -> Result<String> {
    if cell_name.is_empty()
        || cell_name.len() > CELL_NAME_LEN
        || !cell_name.bytes().all(|b| b.is_ascii_graphic() && b != b',')
    {
        return Err(PermitError::InvalidCellName(cell_name.to_string()));
    }

    let mut permit = String::with_capacity(CELL_PERMIT_LEN);
    permit.push_str(cell_name);
    for _ in cell_name.len()..CELL_NAME_LEN {
        permit.push('\0');
    }
    permit.push_str(&format_date(expiry)?);

    let cipher = PermitCipher::new(&hw_id.cell_permit_key())?;
    for key in [ck1, ck2] {
        let block = cipher.encrypt_block(seal_secret(key.as_bytes()));
        permit.push_str(&hex::encode_upper(block));
    }

    let crc = crc32::checksum(permit.as_bytes());
    permit.push_str(&hex::encode_upper(cipher.encrypt_block(seal_checksum(crc))));
    Ok(permit)
}

/// Decode a cell permit with a candidate hardware id.
///
/// A wrong hardware id is an expected outcome and comes back as
/// [`CellPermitProbe::Invalid`]; only malformed text is an error.
pub fn try_decrypt_cell_permit(text: &str, hw_id: &HardwareId) -> Result<CellPermitProbe> {
    CellPermit::parse(text)?.try_decrypt(hw_id)
}

fn format_date(date: NaiveDate) -> Result<String> {
    if !(0..=9999).contains(&date.year()) {
        return Err(PermitError::InvalidExpiry(format!(
            "year {} does not fit 4 digits",
            date.year()
        )));
    }
    Ok(format!("{:04}{:02}{:02}", date.year(), date.month(), date.day()))
}

fn parse_date(field: &[u8; 8]) -> Result<NaiveDate> {
    let text = std::str::from_utf8(field)
        .ok()
        .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| {
            PermitError::InvalidExpiry(String::from_utf8_lossy(field).into_owned())
        })?;

    let year: i32 = text[..4].parse().unwrap_or_default();
    let month: u32 = text[4..6].parse().unwrap_or_default();
    let day: u32 = text[6..].parse().unwrap_or_default();
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| PermitError::InvalidExpiry(text.to_string()))
}
