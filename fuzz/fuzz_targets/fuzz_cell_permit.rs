#![no_main]
use libfuzzer_sys::fuzz_target;
use s63_permit::{CellPermit, HardwareId};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(permit) = CellPermit::parse(text) else {
        return;
    };
    let _ = permit.expiry();
    let _ = permit.try_decrypt(&HardwareId::new(*b"12345"));
});
