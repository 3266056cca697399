#![no_main]
use libfuzzer_sys::fuzz_target;
use s63_permit::{decrypt_user_permit, MasterKey, UserPermit};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(permit) = UserPermit::parse(text) {
        let _ = permit.decrypt(&MasterKey::new(*b"01234"));
    }
    let _ = decrypt_user_permit(text, &MasterKey::new(*b"FFFFF"));
});
