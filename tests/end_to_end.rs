//! Permit creation, recovery and cell decryption across module boundaries.

#![cfg(feature = "cells")]

use std::fs;
use std::io::{Cursor, Write};

use chrono::NaiveDate;
use s63_permit::{
    create_cell_permit, create_user_permit, decrypt_cell_tree, decrypt_user_permit,
    load_permit_list, CellKey, CellKeys, HardwareId, KeyFinder, ManufacturerId, MasterKey,
    PermitCipher, PermitError, PermitStore, Recovered,
};
use zip::write::SimpleFileOptions;

const USER_PERMIT: &str = "220E95A0510854239A876DB34142";

#[test]
fn user_permit_known_answer() {
    let hw_id = HardwareId::new([0x12, 0x34, 0x56, 0x78, 0x9A]);
    let key = MasterKey::new(*b"01234");

    let permit = create_user_permit(&hw_id, &key, ManufacturerId(0x4142)).unwrap();
    assert_eq!(permit, USER_PERMIT);
    assert_eq!(
        decrypt_user_permit(USER_PERMIT, &key).unwrap(),
        (hw_id, ManufacturerId(0x4142))
    );
}

#[test]
fn user_permit_recovered_without_key() {
    let recovery = KeyFinder::new()
        .recover_user_permit(USER_PERMIT)
        .unwrap()
        .found()
        .unwrap();

    assert_eq!(recovery.key.as_ascii(), Some("01234"));
    assert_eq!(recovery.hardware_id.to_string(), "123456789A");
    assert_eq!(recovery.manufacturer_id.to_string(), "4142");
    assert_eq!(recovery.manufacturer_id.vendor_code(), "AB");
}

#[test]
fn tampered_user_permit_is_rejected_before_search() {
    let tampered = USER_PERMIT.replacen('2', "3", 1);
    let err = KeyFinder::new().recover_user_permit(&tampered).unwrap_err();
    assert!(matches!(err, PermitError::ChecksumMismatch { .. }));
}

fn block_aligned_zip(name: &str, contents: &[u8]) -> Vec<u8> {
    let build = |comment: String| {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file(name, options).unwrap();
        writer.write_all(contents).unwrap();
        writer.set_comment(comment);
        writer.finish().unwrap().into_inner()
    };
    let pad = (8 - build(String::new()).len() % 8) % 8;
    build("-".repeat(pad))
}

fn encrypt_cell(zip: &[u8], key: &CellKey) -> Vec<u8> {
    let mut data = zip.to_vec();
    PermitCipher::new(key.as_bytes())
        .unwrap()
        .ecb_encrypt(&mut data)
        .unwrap();
    data
}

/// Recover the hardware id from a permit list, load the list with it and
/// decrypt the cells it unlocks.
#[test]
fn cell_permits_to_decrypted_cells() {
    let hw_id = HardwareId::new(*b"7A0C4");
    let expiry = NaiveDate::from_ymd_opt(2027, 3, 31).unwrap();
    let cells = [
        ("GB100001", CellKeys::new(CellKey::new(*b"K1AAA"), CellKey::new(*b"K2AAA"))),
        ("GB100002", CellKeys::new(CellKey::new(*b"K1BBB"), CellKey::new(*b"K2BBB"))),
    ];

    let dir = tempfile::tempdir().unwrap();
    let mut list = String::from(":DATE 20270101 08:00\r\n:VERSION 2\r\n:ENC\r\n");
    for (name, keys) in &cells {
        let permit = create_cell_permit(&hw_id, name, expiry, &keys.first, &keys.second).unwrap();
        list.push_str(&format!("{},0,1,GB,\r\n", permit));
    }
    list.push_str(":ECS\r\n");
    let permit_file = dir.path().join("PERMIT.TXT");
    fs::write(&permit_file, list).unwrap();

    let hit = KeyFinder::new().recover_from_permit_list(&permit_file).unwrap();
    let Recovered::Found(hit) = hit else {
        panic!("hardware id not recovered");
    };
    assert_eq!(hit.hardware_id, hw_id);
    assert_eq!(hit.cell_keys, cells[1].1);

    let candidates = [HardwareId::new(*b"00000"), hit.hardware_id];
    let store = PermitStore::load(&permit_file, &candidates).unwrap();
    assert_eq!(store.hardware_id(), hw_id);
    let permits = load_permit_list(&permit_file, &candidates).unwrap();
    assert_eq!(permits.len(), 2);

    let cell_dir = dir.path().join("ENC_ROOT");
    fs::create_dir_all(cell_dir.join("GB")).unwrap();
    let first = block_aligned_zip("GB100001.000", b"first cell");
    fs::write(
        cell_dir.join("GB").join("GB100001.000"),
        encrypt_cell(&first, &cells[0].1.first),
    )
    .unwrap();
    let second = block_aligned_zip("GB100002.000", b"second cell");
    fs::write(
        cell_dir.join("GB100002.000"),
        encrypt_cell(&second, &cells[1].1.second),
    )
    .unwrap();

    let out_dir = dir.path().join("out");
    let mut written = decrypt_cell_tree(&cell_dir, &permits, &out_dir).unwrap();
    written.sort();
    assert_eq!(written.len(), 2);
    assert_eq!(fs::read(out_dir.join("GB100001.000")).unwrap(), b"first cell");
    assert_eq!(fs::read(out_dir.join("GB100002.000")).unwrap(), b"second cell");
}
