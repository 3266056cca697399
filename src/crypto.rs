//! Blowfish with short keys, as used by the permit scheme.
//!
//! Permits are sealed with Blowfish using either a 5-byte key (user permit
//! master key, cell keys) or a 6-byte key (cell permits, derived from the
//! hardware id). The Blowfish key schedule cycles over short keys, so no
//! padding of the key is needed.
//!
//! Chaining:
//! - ECB for whole cell files, each 8-byte block on its own
//! - CBC with an all-zero IV for permit blocks; for a single block this is
//!   the same as one raw block decryption, so permits never carry an IV

use blowfish::cipher::block_padding::NoPadding;
use blowfish::cipher::crypto_common::InnerInit;
use blowfish::cipher::generic_array::GenericArray;
use blowfish::cipher::{
    BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, InnerIvInit, KeyInit,
};
use blowfish::Blowfish;

use crate::error::{PermitError, Result};

type BlowfishCbcDec = cbc::Decryptor<Blowfish>;
type BlowfishEcbDec = ecb::Decryptor<Blowfish>;
type BlowfishEcbEnc = ecb::Encryptor<Blowfish>;

/// Cipher block size in bytes.
pub const BLOCK_SIZE: usize = 8;

/// Permit keys are either 5 bytes (master and cell keys) or 6 bytes
/// (hardware id with its first byte repeated).
pub const KEY_SIZES: [usize; 2] = [5, 6];

const ZERO_IV: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

/// A keyed Blowfish instance.
#[derive(Clone)]
pub struct PermitCipher {
    inner: Blowfish,
}

impl PermitCipher {
    /// Run the key schedule for `key`.
    pub fn new(key: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: schedule(key)?,
        })
    }

    /// Re-key in place. Used by the search loop to avoid reallocating state
    /// per candidate.
    pub fn setup_key(&mut self, key: &[u8]) -> Result<()> {
        self.inner = schedule(key)?;
        Ok(())
    }

    /// Encrypt one block.
    pub fn encrypt_block(&self, mut block: [u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
        self.inner
            .encrypt_block(GenericArray::from_mut_slice(&mut block));
        block
    }

    /// Decrypt one block.
    pub fn decrypt_block(&self, mut block: [u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
        self.inner
            .decrypt_block(GenericArray::from_mut_slice(&mut block));
        block
    }

    /// Encrypt whole blocks in place, each independently.
    pub fn ecb_encrypt(&self, data: &mut [u8]) -> Result<()> {
        check_blocks(data)?;
        let len = data.len();
        BlowfishEcbEnc::inner_init(self.inner.clone())
            .encrypt_padded_mut::<NoPadding>(data, len)
            .map_err(|_| PermitError::length("ECB buffer", round_up(len), len))?;
        Ok(())
    }

    /// Decrypt whole blocks in place, each independently.
    pub fn ecb_decrypt(&self, data: &mut [u8]) -> Result<()> {
        check_blocks(data)?;
        let len = data.len();
        BlowfishEcbDec::inner_init(self.inner.clone())
            .decrypt_padded_mut::<NoPadding>(data)
            .map_err(|_| PermitError::length("ECB buffer", round_up(len), len))?;
        Ok(())
    }

    /// CBC decrypt in place with an all-zero IV.
    pub fn cbc_decrypt(&self, data: &mut [u8]) -> Result<()> {
        check_blocks(data)?;
        let len = data.len();
        BlowfishCbcDec::inner_iv_slice_init(self.inner.clone(), &ZERO_IV)
            .map_err(|_| PermitError::length("IV", BLOCK_SIZE, ZERO_IV.len()))?
            .decrypt_padded_mut::<NoPadding>(data)
            .map_err(|_| PermitError::length("CBC buffer", round_up(len), len))?;
        Ok(())
    }
}

impl std::fmt::Debug for PermitCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermitCipher").finish_non_exhaustive()
    }
}

fn schedule(key: &[u8]) -> Result<Blowfish> {
    if !KEY_SIZES.contains(&key.len()) {
        return Err(PermitError::length("cipher key", KEY_SIZES[0], key.len()));
    }
    Blowfish::new_from_slice(key).map_err(|_| PermitError::length("cipher key", 5, key.len()))
}

fn check_blocks(data: &[u8]) -> Result<()> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(PermitError::length("cipher buffer", round_up(data.len()), data.len()));
    }
    Ok(())
}

fn round_up(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_roundtrip_both_key_sizes() {
        for key in [&b"01234"[..], &b"A1B2C3"[..]] {
            let cipher = PermitCipher::new(key).unwrap();
            let plain = [0x12, 0x34, 0x56, 0x78, 0x9A, 3, 3, 3];
            let enc = cipher.encrypt_block(plain);
            assert_ne!(enc, plain);
            assert_eq!(cipher.decrypt_block(enc), plain);
        }
    }

    #[test]
    fn test_rejects_other_key_lengths() {
        assert!(matches!(
            PermitCipher::new(b"0123"),
            Err(PermitError::InvalidLength { actual: 4, .. })
        ));
        assert!(PermitCipher::new(b"0123456").is_err());
    }

    #[test]
    fn test_single_block_cbc_equals_ecb() {
        let cipher = PermitCipher::new(b"9F00A").unwrap();
        let block = cipher.encrypt_block(*b"ABCDE\x03\x03\x03");

        let mut cbc = block;
        cipher.cbc_decrypt(&mut cbc).unwrap();
        assert_eq!(cbc, cipher.decrypt_block(block));
        assert_eq!(&cbc, b"ABCDE\x03\x03\x03");
    }

    #[test]
    fn test_cbc_chains_later_blocks() {
        let cipher = PermitCipher::new(b"12345").unwrap();
        let mut data = [0u8; 16];
        data[..8].copy_from_slice(&cipher.encrypt_block([1; 8]));
        data[8..].copy_from_slice(&cipher.encrypt_block([2; 8]));

        let mut cbc = data;
        cipher.cbc_decrypt(&mut cbc).unwrap();
        assert_eq!(cbc[..8], [1; 8]);
        // second block is XORed with the first ciphertext block
        let expected: Vec<u8> = (0..8).map(|i| 2 ^ data[i]).collect();
        assert_eq!(&cbc[8..], &expected[..]);
    }

    #[test]
    fn test_ecb_roundtrip() {
        let cipher = PermitCipher::new(b"CAFE0").unwrap();
        let original: Vec<u8> = (0u8..64).collect();
        let mut data = original.clone();
        cipher.ecb_encrypt(&mut data).unwrap();
        assert_ne!(data, original);
        assert_eq!(data[..8], cipher.encrypt_block(original[..8].try_into().unwrap()));
        cipher.ecb_decrypt(&mut data).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn test_ecb_rejects_partial_block() {
        let cipher = PermitCipher::new(b"CAFE0").unwrap();
        let mut data = [0u8; 12];
        assert!(matches!(
            cipher.ecb_decrypt(&mut data),
            Err(PermitError::InvalidLength { expected: 16, actual: 12, .. })
        ));
    }

    #[test]
    fn test_setup_key_changes_schedule() {
        let mut cipher = PermitCipher::new(b"00000").unwrap();
        let a = cipher.encrypt_block([0; 8]);
        cipher.setup_key(b"00001").unwrap();
        assert_ne!(a, cipher.encrypt_block([0; 8]));
    }
}
