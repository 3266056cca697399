//! Exhaustive search for secrets drawn from the hex-digit alphabet.
//!
//! Master keys and hardware ids are 5 bytes, but every byte is one of the 16
//! characters `0-9A-F`. That leaves 16^5 = 1,048,576 candidates, few enough to
//! try them all.
//!
//! ## Candidates
//!
//! Candidate `i` in `0..0x100000` is the 20-bit value `i` spelled as five hex
//! digits, most significant nibble first: `0x01234` is `"01234"`.
//!
//! ## Modes
//!
//! | Mode | Input | Accept when |
//! |------|-------|-------------|
//! | [`find_master_key`] | user permit block | plaintext ends in `03 03 03` |
//! | [`find_hardware_id`] | cell permit blocks + checksum | checksum block ends in `04 04 04 04` and carries the checksum, then both key blocks end in `03 03 03` |
//!
//! ## Workers
//!
//! A fixed pool of workers shares one atomic counter. Each worker claims the
//! next index with `fetch_add`, tests it, and either records a hit into a
//! write-once slot or claims again. Workers stop when the counter passes the
//! end of the space or the slot is filled; the call returns once all of them
//! have stopped. A worker that claimed an index just before the hit was
//! recorded still finishes that one candidate, so up to `workers - 1` extra
//! candidates may be tested after the winner. The slot is never overwritten.
//!
//! A 3-byte marker matches by chance once in 2^24 decryptions, so mode A can
//! report a wrong key for roughly one permit in sixteen. Mode B checks 88
//! bits and is effectively exact.
//!
//! [`find_master_key`]: KeyFinder::find_master_key
//! [`find_hardware_id`]: KeyFinder::find_hardware_id

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use tracing::{debug, info};

use crate::crypto::{PermitCipher, BLOCK_SIZE};
use crate::error::{PermitError, Result};
use crate::permit::cell::open_blocks;
use crate::permit::{open_secret, CellPermit, UserPermit};
use crate::store::PermitList;
use crate::types::{
    CellKeys, HardwareId, ManufacturerId, MasterKey, HEX_ALPHABET, SECRET_LEN,
};

/// Number of candidates: every 5-character hex-digit string.
pub const SEARCH_SPACE: u32 = 1 << (4 * SECRET_LEN);

/// Spell candidate `index` as five hex-digit characters.
pub fn candidate(index: u32) -> [u8; SECRET_LEN] {
    let mut out = [0u8; SECRET_LEN];
    for (pos, byte) in out.iter_mut().enumerate() {
        let shift = 4 * (SECRET_LEN - 1 - pos);
        *byte = HEX_ALPHABET[((index >> shift) & 0xF) as usize];
    }
    out
}

/// Result of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovered<T> {
    /// A candidate passed the marker checks.
    Found(T),
    /// Every candidate was tried and none matched.
    NotFound,
}

impl<T> Recovered<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound => None,
        }
    }

    /// Turn an exhausted search into [`PermitError::NotFound`].
    pub fn found(self) -> Result<T> {
        self.into_option().ok_or(PermitError::NotFound)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Recovered<U> {
        match self {
            Self::Found(value) => Recovered::Found(f(value)),
            Self::NotFound => Recovered::NotFound,
        }
    }
}

impl<T> From<Option<T>> for Recovered<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::NotFound, Self::Found)
    }
}

/// Master key recovered from a user permit block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterKeyMatch {
    /// Key that opened the block.
    pub key: MasterKey,
    /// First five bytes of the opened block.
    pub hardware_id: HardwareId,
}

/// Hardware id recovered from a cell permit, with the keys it unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareIdMatch {
    pub hardware_id: HardwareId,
    /// Keys from the two key blocks.
    pub cell_keys: CellKeys,
}

/// Everything a user permit gives up once its master key is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserPermitRecovery {
    pub key: MasterKey,
    pub hardware_id: HardwareId,
    /// Copied from the permit text, not encrypted.
    pub manufacturer_id: ManufacturerId,
}

/// Parallel brute-force engine.
#[derive(Debug, Clone)]
pub struct KeyFinder {
    workers: usize,
}

impl Default for KeyFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyFinder {
    /// One worker per available hardware thread.
    pub fn new() -> Self {
        let workers = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self { workers }
    }

    /// Fixed worker count; 0 is treated as 1.
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Mode A: find the master key that opens a user permit block.
    pub fn find_master_key(&self, block: [u8; BLOCK_SIZE]) -> Result<Recovered<MasterKeyMatch>> {
        let started = Instant::now();
        info!(workers = self.workers, "searching master key");

        let found = self.search(|cipher, index| {
            let key = candidate(index);
            cipher.setup_key(&key)?;
            Ok(open_secret(&cipher.decrypt_block(block)).map(|hw_id| MasterKeyMatch {
                key: MasterKey::new(key),
                hardware_id: HardwareId::new(hw_id),
            }))
        })?;

        info!(
            found = found.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "master key search finished"
        );
        Ok(found.into())
    }

    /// Mode B: find the hardware id that opens a cell permit.
    ///
    /// `blocks` are the encrypted key 1, key 2 and checksum blocks; `checksum`
    /// is the CRC-32 of the first 48 permit characters.
    pub fn find_hardware_id(
        &self,
        blocks: &[u8; 3 * BLOCK_SIZE],
        checksum: u32,
    ) -> Result<Recovered<HardwareIdMatch>> {
        let started = Instant::now();
        info!(
            workers = self.workers,
            checksum = %format!("{:08X}", checksum),
            "searching hardware id"
        );

        let found = self.search(|cipher, index| {
            let hardware_id = HardwareId::new(candidate(index));
            cipher.setup_key(&hardware_id.cell_permit_key())?;
            Ok(open_blocks(cipher, blocks, checksum).map(|cell_keys| HardwareIdMatch {
                hardware_id,
                cell_keys,
            }))
        })?;

        info!(
            found = found.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "hardware id search finished"
        );
        Ok(found.into())
    }

    /// Check a user permit's checksum, then run mode A on its block.
    pub fn recover_user_permit(&self, text: &str) -> Result<Recovered<UserPermitRecovery>> {
        let permit = UserPermit::parse(text)?;
        debug!(
            block = %hex::encode_upper(permit.encrypted_hw_id()),
            manufacturer = %permit.manufacturer_id(),
            "user permit checksum ok"
        );
        let manufacturer_id = permit.manufacturer_id();
        Ok(self
            .find_master_key(permit.encrypted_hw_id())?
            .map(|m| UserPermitRecovery {
                key: m.key,
                hardware_id: m.hardware_id,
                manufacturer_id,
            }))
    }

    /// Run mode B on the last cell permit entry of a permit list.
    pub fn recover_from_permit_text(&self, text: &str) -> Result<Recovered<HardwareIdMatch>> {
        let entry = PermitList::new(text)
            .last()
            .ok_or_else(|| PermitError::LoadFailed("no cell permit entries".to_string()))?;
        let permit = CellPermit::parse(entry.permit)?;
        debug!(cell = permit.name(), line = entry.line, "using cell permit");
        self.find_hardware_id(permit.encrypted_blocks()?, permit.checksum())
    }

    /// [`recover_from_permit_text`](Self::recover_from_permit_text) on a file.
    pub fn recover_from_permit_list(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Recovered<HardwareIdMatch>> {
        let text = std::fs::read_to_string(path)?;
        self.recover_from_permit_text(&text)
    }

    /// Fan `probe` out over the whole candidate space.
    ///
    /// An error from `probe` stops every worker and is returned instead of a
    /// result.
    fn search<T, F>(&self, probe: F) -> Result<Option<T>>
    where
        T: Send + Sync,
        F: Fn(&mut PermitCipher, u32) -> Result<Option<T>> + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("key-finder-{}", i))
            .build()?;

        let template = PermitCipher::new(&candidate(0))?;
        let next = AtomicU32::new(0);
        let slot = OnceLock::new();
        let failed = OnceLock::new();

        pool.broadcast(|_| {
            let mut cipher = template.clone();
            loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                if index >= SEARCH_SPACE || slot.get().is_some() || failed.get().is_some() {
                    break;
                }
                match probe(&mut cipher, index) {
                    Ok(None) => {}
                    Ok(Some(hit)) => {
                        // a later hit from another worker loses the race
                        let _ = slot.set(hit);
                        break;
                    }
                    Err(e) => {
                        let _ = failed.set(e);
                        break;
                    }
                }
            }
        });

        if let Some(e) = failed.into_inner() {
            return Err(e);
        }
        Ok(slot.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permit::{create_cell_permit, create_user_permit};
    use crate::types::CellKey;
    use chrono::NaiveDate;

    #[test]
    fn test_candidate_spelling() {
        assert_eq!(&candidate(0), b"00000");
        assert_eq!(&candidate(0x01234), b"01234");
        assert_eq!(&candidate(0xABCDE), b"ABCDE");
        assert_eq!(&candidate(SEARCH_SPACE - 1), b"FFFFF");
        assert_eq!(SEARCH_SPACE, 1_048_576);
    }

    #[test]
    fn test_candidates_are_distinct_hex_strings() {
        let mut seen = std::collections::HashSet::new();
        for index in (0..SEARCH_SPACE).step_by(97) {
            let key = MasterKey::new(candidate(index));
            assert!(key.is_hex_alphabet());
            assert!(seen.insert(key));
        }
    }

    #[test]
    fn test_recovered_helpers() {
        let hit: Recovered<u8> = Some(7).into();
        assert!(hit.is_found());
        assert_eq!(hit.map(|v| v + 1).found().unwrap(), 8);

        let miss: Recovered<u8> = None.into();
        assert!(matches!(miss.found(), Err(PermitError::NotFound)));
    }

    #[test]
    fn test_zero_workers_clamped() {
        assert_eq!(KeyFinder::with_workers(0).workers(), 1);
        assert!(KeyFinder::new().workers() >= 1);
    }

    #[test]
    fn test_keying_error_stops_search() {
        for workers in [1, 4] {
            let result: Result<Option<u32>> = KeyFinder::with_workers(workers).search(|cipher, index| {
                let key: &[u8] = if index == 0x100 { b"0123" } else { b"01234" };
                cipher.setup_key(key)?;
                Ok(None)
            });
            assert!(
                matches!(result, Err(PermitError::InvalidLength { actual: 4, .. })),
                "{} workers",
                workers
            );
        }
    }

    #[test]
    fn test_recover_from_permit_text_with_malformed_blocks() {
        let expiry = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let key = CellKey::new(*b"KEY01");
        let mut permit = create_cell_permit(&HardwareId::new(*b"012C5"), "GB000001", expiry, &key, &key).unwrap();
        permit.replace_range(30..31, "Q");
        let err = KeyFinder::new()
            .recover_from_permit_text(&format!("{},0,0,GB,\n", permit))
            .unwrap_err();
        assert!(matches!(err, PermitError::InvalidHex(_)));
    }

    #[test]
    fn test_master_key_found_with_one_and_many_workers() {
        let hw_id = HardwareId::new([0x12, 0x34, 0x56, 0x78, 0x9A]);
        let key = MasterKey::new(*b"01234");
        let permit = create_user_permit(&hw_id, &key, ManufacturerId(0x4142)).unwrap();
        let block = UserPermit::parse(&permit).unwrap().encrypted_hw_id();

        let expected = Recovered::Found(MasterKeyMatch {
            key,
            hardware_id: hw_id,
        });
        assert_eq!(KeyFinder::with_workers(1).find_master_key(block).unwrap(), expected);
        assert_eq!(KeyFinder::with_workers(4).find_master_key(block).unwrap(), expected);
    }

    #[test]
    fn test_recover_user_permit_keeps_manufacturer() {
        let hw_id = HardwareId::new(*b"7A0C4");
        let key = MasterKey::new(*b"0B1D2");
        let permit = create_user_permit(&hw_id, &key, ManufacturerId(0x5053)).unwrap();

        let recovery = KeyFinder::new().recover_user_permit(&permit).unwrap().found().unwrap();
        assert_eq!(recovery.key, key);
        assert_eq!(recovery.hardware_id, hw_id);
        assert_eq!(recovery.manufacturer_id.vendor_code(), "PS");
    }

    #[test]
    fn test_recover_user_permit_rejects_bad_checksum() {
        let err = KeyFinder::new()
            .recover_user_permit("220E95A05108542300000000AAAA")
            .unwrap_err();
        assert!(matches!(err, PermitError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_key_outside_alphabet_exhausts() {
        // 'g' is not a candidate byte, and no candidate hits the marker by chance
        let hw_id = HardwareId::new([0x12, 0x34, 0x56, 0x78, 0x9A]);
        let key = MasterKey::new(*b"0123g");
        let permit = create_user_permit(&hw_id, &key, ManufacturerId(0x4142)).unwrap();
        let block = UserPermit::parse(&permit).unwrap().encrypted_hw_id();

        let result = KeyFinder::new().find_master_key(block).unwrap();
        assert_eq!(result, Recovered::NotFound);
    }

    #[test]
    fn test_hardware_id_found_with_cell_keys() {
        let hw_id = HardwareId::new(*b"00A3F");
        let keys = CellKeys::new(
            CellKey::new([0x10, 0x20, 0x30, 0x40, 0x50]),
            CellKey::new([0x60, 0x70, 0x80, 0x90, 0xA0]),
        );
        let expiry = NaiveDate::from_ymd_opt(2027, 6, 30).unwrap();
        let text = create_cell_permit(&hw_id, "NO4D0611", expiry, &keys.first, &keys.second).unwrap();
        let permit = CellPermit::parse(&text).unwrap();

        for workers in [1, 3] {
            let hit = KeyFinder::with_workers(workers)
                .find_hardware_id(permit.encrypted_blocks().unwrap(), permit.checksum())
                .unwrap();
            assert_eq!(
                hit,
                Recovered::Found(HardwareIdMatch {
                    hardware_id: hw_id,
                    cell_keys: keys,
                })
            );
        }
    }

    #[test]
    fn test_hardware_id_wrong_checksum_exhausts() {
        let hw_id = HardwareId::new(*b"00A3F");
        let key = CellKey::new([1, 2, 3, 4, 5]);
        let expiry = NaiveDate::from_ymd_opt(2027, 6, 30).unwrap();
        let text = create_cell_permit(&hw_id, "NO4D0611", expiry, &key, &key).unwrap();
        let permit = CellPermit::parse(&text).unwrap();

        let result = KeyFinder::new()
            .find_hardware_id(permit.encrypted_blocks().unwrap(), permit.checksum() ^ 1)
            .unwrap();
        assert_eq!(result, Recovered::NotFound);
    }

    #[test]
    fn test_recover_from_permit_text_uses_last_entry() {
        let hw_id = HardwareId::new(*b"012C5");
        let expiry = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let key = CellKey::new(*b"KEY01");
        let first = create_cell_permit(&HardwareId::new(*b"99999"), "GB000001", expiry, &key, &key).unwrap();
        let last = create_cell_permit(&hw_id, "GB000002", expiry, &key, &key).unwrap();
        let text = format!(":DATE 20260101\n:VERSION 2\n{},0,0,GB,\n{},0,0,GB,\n", first, last);

        let hit = KeyFinder::new().recover_from_permit_text(&text).unwrap().found().unwrap();
        assert_eq!(hit.hardware_id, hw_id);
    }

    #[test]
    fn test_recover_from_permit_text_without_entries() {
        let err = KeyFinder::new()
            .recover_from_permit_text(":ENC\n:ECS\nshort,line\n")
            .unwrap_err();
        assert!(matches!(err, PermitError::LoadFailed(_)));
    }
}
