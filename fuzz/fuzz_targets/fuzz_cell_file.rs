#![no_main]
use libfuzzer_sys::fuzz_target;
use s63_permit::{decrypt_cell, extract_first_entry, CellKey, CellKeys};

// Decrypt with fixed keys, then feed the raw input to the archive reader too
// so both the cipher path and the ZIP path get coverage.
fuzz_target!(|data: &[u8]| {
    let keys = CellKeys::new(CellKey::new(*b"KEY01"), CellKey::new(*b"KEY02"));
    if let Ok(Some(zip)) = decrypt_cell(data, &keys) {
        let _ = extract_first_entry(&zip);
    }
    let _ = extract_first_entry(data);
});
