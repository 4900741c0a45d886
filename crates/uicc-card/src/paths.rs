//! Symbolic file names and their paths from the MF
//!
//! Each card generation has its own table. Paths are the concatenated file
//! identifiers below the MF (3F00), which is never part of the path.

use crate::error::CardError;

/// Name/path table
pub type PathTable = &'static [(&'static str, &'static [u8])];

/// GSM 11.11 SIM files
pub static SIM_FILES: PathTable = &[
    ("EFDIR", &[0x2F, 0x00]),
    ("ICCID", &[0x2F, 0xE2]),
    ("Extended language preference", &[0x2F, 0x05]),
    ("language preference", &[0x7F, 0x20, 0x6F, 0x05]),
    ("IMSI", &[0x7F, 0x20, 0x6F, 0x07]),
    ("Access control class", &[0x7F, 0x20, 0x6F, 0x78]),
    ("Location information", &[0x7F, 0x20, 0x6F, 0x7E]),
    ("Administrative data", &[0x7F, 0x20, 0x6F, 0xAD]),
    ("Service Provider Name", &[0x7F, 0x20, 0x6F, 0x46]),
    ("PLMN selector", &[0x7F, 0x20, 0x6F, 0x30]),
    ("Higher Priority PLMN search period", &[0x7F, 0x20, 0x6F, 0x31]),
    ("Forbidden PLMN", &[0x7F, 0x20, 0x6F, 0x7B]),
    ("Equivalent home PLMN", &[0x7F, 0x20, 0x6F, 0xD9]),
    ("Group Identifier Level 1", &[0x7F, 0x20, 0x6F, 0x3E]),
    ("Group Identifier Level 2", &[0x7F, 0x20, 0x6F, 0x3F]),
    ("emergency call codes", &[0x7F, 0x20, 0x6F, 0xB7]),
    ("SIM service table", &[0x7F, 0x20, 0x6F, 0x38]),
    ("ACM maximum value", &[0x7F, 0x20, 0x6F, 0x37]),
    ("Accumulated call meter", &[0x7F, 0x20, 0x6F, 0x39]),
    ("Phase identification", &[0x7F, 0x20, 0x6F, 0xAE]),
    ("HPLMN Selector with Access Technology", &[0x7F, 0x20, 0x6F, 0x62]),
    ("MSISDN", &[0x7F, 0x10, 0x6F, 0x40]),
    ("SMSC", &[0x7F, 0x10, 0x6F, 0x42]),
    ("GR OPc", &[0x7F, 0xF0, 0xFF, 0x01]),
    ("GR Ki", &[0x7F, 0xF0, 0xFF, 0x02]),
    ("GR R", &[0x7F, 0xF0, 0xFF, 0x03]),
    ("GR C", &[0x7F, 0xF0, 0xFF, 0x04]),
    ("GR secret", &[0x7F, 0x20, 0x00, 0x01]),
    ("GR type", &[0xA0, 0x00]),
];

/// ETSI TS 131 102 USIM files, reached through the selected application
pub static USIM_FILES: PathTable = &[
    ("EFDIR", &[0x2F, 0x00]),
    ("ICCID", &[0x2F, 0xE2]),
    ("Extended language preference", &[0x2F, 0x05]),
    ("language preference", &[0x7F, 0x20, 0x6F, 0x05]),
    ("SMSC", &[0x7F, 0x10, 0x6F, 0x42]),
    ("IMSI", &[0x7F, 0xF0, 0x6F, 0x07]),
    ("Access control class", &[0x7F, 0xF0, 0x6F, 0x78]),
    ("PS Location information", &[0x7F, 0xF0, 0x6F, 0x73]),
    ("CS Location information", &[0x7F, 0xF0, 0x6F, 0x7E]),
    ("Administrative data", &[0x7F, 0xF0, 0x6F, 0xAD]),
    ("PLMN selector with Access Technology", &[0x7F, 0xF0, 0x6F, 0x60]),
    (
        "Operator controlled PLMN selector with Access Technology",
        &[0x7F, 0xF0, 0x6F, 0x61],
    ),
    ("Home PLMN selector with Access Technology", &[0x7F, 0xF0, 0x6F, 0x62]),
    ("Forbidden PLMNs", &[0x7F, 0xF0, 0x6F, 0x7B]),
    ("Higher Priority PLMN search period", &[0x7F, 0xF0, 0x6F, 0x31]),
    ("Equivalent Home PLMN", &[0x7F, 0xF0, 0x6F, 0xD9]),
    ("Group Identifier Level 1", &[0x7F, 0xF0, 0x6F, 0x3E]),
    ("Group Identifier Level 2", &[0x7F, 0xF0, 0x6F, 0x3F]),
    ("emergency call codes", &[0x7F, 0xF0, 0x6F, 0xB7]),
    ("Short Message Service Parameters", &[0x7F, 0xF0, 0x6F, 0x42]),
    ("Service Provider Name", &[0x7F, 0xF0, 0x6F, 0x46]),
    ("EPS LOCation Information", &[0x7F, 0xF0, 0x6F, 0xE3]),
    ("EPS NAS Security Context", &[0x7F, 0xF0, 0x6F, 0xE4]),
    ("MSISDN", &[0x7F, 0xF0, 0x6F, 0x40]),
    ("USIM service table", &[0x7F, 0xF0, 0x6F, 0x38]),
    ("GR OPc", &[0x7F, 0xF0, 0xFF, 0x01]),
    ("GR Ki", &[0x7F, 0xF0, 0xFF, 0x02]),
    ("GR R", &[0x7F, 0xF0, 0xFF, 0x03]),
    ("GR C", &[0x7F, 0xF0, 0xFF, 0x04]),
    ("GR secret", &[0x7F, 0x20, 0x00, 0x01]),
    ("GR type", &[0xA0, 0x00]),
];

/// Resolve a symbolic name to its path
///
/// An unknown name means the caller asked for a file this generation does
/// not define, which is treated as a configuration error.
pub fn lookup(table: PathTable, name: &str) -> Result<&'static [u8], CardError> {
    table
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, path)| *path)
        .ok_or_else(|| CardError::UnknownFile(name.to_string()))
}

/// Name of the file whose path ends with `fid`
pub fn file_name(table: PathTable, fid: u16) -> Option<&'static str> {
    let fid = fid.to_be_bytes();
    table
        .iter()
        .find(|(_, path)| path.ends_with(&fid))
        .map(|(name, _)| *name)
}
