//! Permit list loading.
//!
//! A permit list (`PERMIT.TXT`) is plain text:
//!
//! ```text
//! :DATE 20260101 12:00
//! :VERSION 2
//! :ENC
//! GB100001202612318E6A…,0,1,GB,
//! ```
//!
//! Lines starting with `:` are section headers or comments. Lines with more
//! than two comma-separated fields are entries whose first field is a cell
//! permit; everything else is ignored.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::{PermitError, Result};
use crate::permit::{CellPermit, CellPermitProbe};
use crate::types::{CellKeys, HardwareId};

/// One cell permit entry of a permit list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermitEntry<'a> {
    /// 1-based line number.
    pub line: usize,
    /// The cell permit text (first field).
    pub permit: &'a str,
}

/// Iterator over the entries of a permit list.
#[derive(Debug, Clone)]
pub struct PermitList<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> PermitList<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
        }
    }
}

impl<'a> Iterator for PermitList<'a> {
    type Item = PermitEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        for (index, line) in self.lines.by_ref() {
            if line.starts_with(':') {
                continue;
            }
            let mut fields = line.split(',');
            let permit = fields.next().unwrap_or_default();
            if fields.count() < 2 {
                continue;
            }
            return Some(PermitEntry {
                line: index + 1,
                permit: permit.trim(),
            });
        }
        None
    }
}

/// Cell keys decoded from a permit list, together with the hardware id that
/// decoded every entry.
#[derive(Debug, Clone)]
pub struct PermitStore {
    hardware_id: HardwareId,
    cells: HashMap<String, CellKeys>,
}

impl PermitStore {
    /// Decode `text` with each candidate hardware id in turn.
    ///
    /// The first candidate that decodes every entry wins. A candidate that
    /// fails on any entry is dropped along with its partial results. If all
    /// candidates fail, the last raised error is returned, or
    /// [`PermitError::LoadFailed`] if none raised.
    pub fn from_text(text: &str, candidates: &[HardwareId]) -> Result<Self> {
        let mut last_error = None;

        for hw_id in candidates {
            match decode_all(text, hw_id) {
                Ok(Some(cells)) => {
                    debug!(hardware_id = %hw_id, cells = cells.len(), "permit list decoded");
                    return Ok(Self {
                        hardware_id: *hw_id,
                        cells,
                    });
                }
                Ok(None) => {
                    debug!(hardware_id = %hw_id, "hardware id does not fit permit list");
                }
                Err(e) => {
                    debug!(hardware_id = %hw_id, error = %e, "permit list rejected");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            PermitError::LoadFailed(format!(
                "none of {} hardware id(s) decoded every permit",
                candidates.len()
            ))
        }))
    }

    /// Read the permit list at `path` and decode it like
    /// [`from_text`](Self::from_text). Read errors are returned as they are.
    pub fn load(path: impl AsRef<Path>, candidates: &[HardwareId]) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_text(&text, candidates)
    }

    pub fn hardware_id(&self) -> HardwareId {
        self.hardware_id
    }

    pub fn keys_for(&self, cell_name: &str) -> Option<&CellKeys> {
        self.cells.get(cell_name)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellKeys)> {
        self.cells.iter().map(|(name, keys)| (name.as_str(), keys))
    }

    pub fn into_cells(self) -> HashMap<String, CellKeys> {
        self.cells
    }
}

/// `None` as soon as one entry does not open under `hw_id`.
fn decode_all(text: &str, hw_id: &HardwareId) -> Result<Option<HashMap<String, CellKeys>>> {
    let mut cells = HashMap::new();
    for entry in PermitList::new(text) {
        let permit = CellPermit::parse(entry.permit)?;
        match permit.try_decrypt(hw_id)? {
            CellPermitProbe::Found(keys) => {
                cells.insert(permit.name().to_string(), keys);
            }
            CellPermitProbe::Invalid => {
                debug!(line = entry.line, cell = permit.name(), "cell permit did not open");
                return Ok(None);
            }
        }
    }
    Ok(Some(cells))
}

/// Decode the permit list at `path`, returning cell name to keys.
pub fn load_permit_list(
    path: impl AsRef<Path>,
    candidates: &[HardwareId],
) -> Result<HashMap<String, CellKeys>> {
    PermitStore::load(path, candidates).map(PermitStore::into_cells)
}

/// In-memory form of [`load_permit_list`].
pub fn parse_permit_list(
    text: &str,
    candidates: &[HardwareId],
) -> Result<HashMap<String, CellKeys>> {
    PermitStore::from_text(text, candidates).map(PermitStore::into_cells)
}
