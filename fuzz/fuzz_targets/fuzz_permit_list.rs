#![no_main]
use libfuzzer_sys::fuzz_target;
use s63_permit::{parse_permit_list, HardwareId, PermitList};

// Candidates are fixed; the list text is the input.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    for entry in PermitList::new(text) {
        assert!(entry.line >= 1);
    }
    let _ = parse_permit_list(
        text,
        &[HardwareId::new(*b"12345"), HardwareId::new(*b"ABCDE")],
    );
});
