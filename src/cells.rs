//! Encrypted chart cell files.
//!
//! A cell file is named `<cell name>.<number>` and holds a ZIP archive
//! encrypted block by block under one of the two cell keys from the cell's
//! permit. The right key is the one whose output starts with a ZIP local file
//! header.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::crypto::PermitCipher;
use crate::error::{PermitError, Result};
use crate::types::CellKeys;

/// `PK\x03\x04` read as a little-endian u32.
pub const ZIP_LOCAL_HEADER: u32 = 0x0403_4b50;

/// Decrypt a cell file with the first, then the second cell key.
///
/// Returns `None` if neither key yields a ZIP archive.
pub fn decrypt_cell(data: &[u8], keys: &CellKeys) -> Result<Option<Vec<u8>>> {
    for (n, key) in keys.iter().enumerate() {
        let cipher = PermitCipher::new(key.as_bytes())?;
        let mut plain = data.to_vec();
        cipher.ecb_decrypt(&mut plain)?;
        if starts_with_zip_header(&plain) {
            debug!(key = n + 1, "cell key accepted");
            return Ok(Some(plain));
        }
    }
    Ok(None)
}

fn starts_with_zip_header(data: &[u8]) -> bool {
    data.get(..4)
        .map(|h| u32::from_le_bytes([h[0], h[1], h[2], h[3]]) == ZIP_LOCAL_HEADER)
        .unwrap_or(false)
}

/// Contents of the first entry of an in-memory ZIP archive.
pub fn extract_first_entry(zip_bytes: &[u8]) -> Result<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes))?;
    if archive.is_empty() {
        return Err(PermitError::Archive("archive has no entries".to_string()));
    }
    let mut entry = archive.by_index(0)?;
    let mut out = Vec::new();
    entry.read_to_end(&mut out)?;
    Ok(out)
}

/// Decrypt every cell file under `root` that has keys in `permits`.
///
/// Files without a numeric extension are ignored. Cells with no keys, files
/// neither key opens and malformed files are skipped with a warning; only
/// filesystem errors abort the walk. The first entry of each decrypted
/// archive is written to `out_dir` under the cell file's name. Returns the
/// written paths in walk order.
pub fn decrypt_cell_tree(
    root: impl AsRef<Path>,
    permits: &HashMap<String, CellKeys>,
    out_dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>> {
    let out_dir = out_dir.as_ref();
    let mut files = Vec::new();
    collect_files(root.as_ref(), &mut files)?;
    fs::create_dir_all(out_dir)?;

    let mut written = Vec::new();
    for path in files {
        let Some(cell_name) = cell_name(&path) else {
            continue;
        };
        let Some(keys) = permits.get(cell_name) else {
            warn!(path = %path.display(), "no permit for cell");
            continue;
        };

        let data = fs::read(&path)?;
        let contents = match decrypt_cell(&data, keys).and_then(|zip| match zip {
            Some(zip) => extract_first_entry(&zip).map(Some),
            None => Ok(None),
        }) {
            Ok(Some(contents)) => contents,
            Ok(None) => {
                warn!(path = %path.display(), "neither cell key opens file");
                continue;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping cell file");
                continue;
            }
        };

        let Some(file_name) = path.file_name() else {
            continue;
        };
        let target = out_dir.join(file_name);
        fs::write(&target, &contents)?;
        debug!(cell = cell_name, bytes = contents.len(), "cell decrypted");
        written.push(target);
    }

    info!(count = written.len(), "cell files decrypted");
    Ok(written)
}

/// Cell name of a file named `<name>.<digits>`.
fn cell_name(path: &Path) -> Option<&str> {
    let ext = path.extension()?.to_str()?;
    if ext.is_empty() || !ext.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    path.file_stem()?.to_str()
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
