//! User permit: the hardware id sealed under a manufacturer master key.

use super::{check_len, open_secret, read_block, read_u32, seal_secret};
use crate::crc32;
use crate::crypto::{PermitCipher, BLOCK_SIZE};
use crate::error::{PermitError, Result};
use crate::types::{HardwareId, ManufacturerId, MasterKey};

/// Length of a user permit in characters.
pub const USER_PERMIT_LEN: usize = 28;

const BLOCK_END: usize = 16;
const CHECKSUM_END: usize = 24;

/// A user permit whose checksum has been verified but whose hardware id is
/// still encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserPermit {
    encrypted_hw_id: [u8; BLOCK_SIZE],
    checksum: u32,
    manufacturer_id: ManufacturerId,
}

impl UserPermit {
    /// Verify the checksum over the first 16 characters as typed, then split
    /// `text` into its fields.
    ///
    /// Any change to the checksummed characters, including a non-hex one, is
    /// a [`PermitError::ChecksumMismatch`]. A checksum field that is not hex
    /// reads as 0.
    pub fn parse(text: &str) -> Result<Self> {
        check_len("user permit", text, USER_PERMIT_LEN)?;
        let raw = text.as_bytes();

        let checksum = read_u32(&raw[BLOCK_END..CHECKSUM_END]).unwrap_or(0);
        let actual = crc32::checksum(&raw[..BLOCK_END]);
        if actual != checksum {
            return Err(PermitError::ChecksumMismatch {
                expected: checksum,
                actual,
            });
        }

        let encrypted_hw_id = read_block(&raw[..BLOCK_END])?;
        let mut m_id = [0u8; 2];
        hex::decode_to_slice(&raw[CHECKSUM_END..], &mut m_id)?;

        Ok(Self {
            encrypted_hw_id,
            checksum,
            manufacturer_id: ManufacturerId(u16::from_be_bytes(m_id)),
        })
    }

    /// The still-encrypted `HW_ID ‖ 03 03 03` block.
    pub fn encrypted_hw_id(&self) -> [u8; BLOCK_SIZE] {
        self.encrypted_hw_id
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn manufacturer_id(&self) -> ManufacturerId {
        self.manufacturer_id
    }

    /// Open the hardware id block with a known master key.
    pub fn decrypt(&self, key: &MasterKey) -> Result<HardwareId> {
        let cipher = PermitCipher::new(key.as_bytes())?;
        let mut block = self.encrypted_hw_id;
        cipher.cbc_decrypt(&mut block)?;
        open_secret(&block)
            .map(HardwareId::new)
            .ok_or(PermitError::SentinelMismatch)
    }
}

/// Build the 28-character user permit for `hw_id`.
pub fn create_user_permit(
    hw_id: &HardwareId,
    key: &MasterKey,
    m_id: ManufacturerId,
) -> Result<String> {
    let cipher = PermitCipher::new(key.as_bytes())?;
    let mut block = seal_secret(hw_id.as_bytes());
    cipher.ecb_encrypt(&mut block)?;

    let mut permit = String::with_capacity(USER_PERMIT_LEN);
    permit.push_str(&hex::encode_upper(block));
    let crc = crc32::checksum(permit.as_bytes());
    permit.push_str(&format!("{:08X}{:04X}", crc, m_id.0));
    Ok(permit)
}

/// Decode a user permit with a known master key.
///
/// Fails with [`PermitError::ChecksumMismatch`] if the permit text was
/// altered and [`PermitError::SentinelMismatch`] if the key is wrong.
pub fn decrypt_user_permit(text: &str, key: &MasterKey) -> Result<(HardwareId, ManufacturerId)> {
    let permit = UserPermit::parse(text)?;
    let hw_id = permit.decrypt(key)?;
    Ok((hw_id, permit.manufacturer_id()))
}
