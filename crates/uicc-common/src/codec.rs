//! Encoders and decoders for the telecom data formats stored on SIM/USIM cards
//!
//! Everything here is pure: byte slices and digit strings in, byte vectors
//! and strings out. Digits are read as hexadecimal so the same BCD packer
//! serves phone numbers, identities and raw key material.

use thiserror::Error;
use tracing::warn;

/// Errors raised while encoding card data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid digit {0:?}")]
    InvalidDigit(char),

    #[error("{what} must have {expected} digits, got {got}")]
    DigitCount {
        what: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("record of {got} bytes is shorter than the {min} bytes required")]
    RecordTooShort { got: usize, min: usize },
}

/// Size of the dialling-number tail at the end of an EF.MSISDN record
pub const ISDN_TAIL_LEN: usize = 14;

/// Type of number / numbering plan: international, ISDN telephony
pub const TON_INTERNATIONAL: u8 = 0x81;

const ISDN_MAX_BCD: usize = 10;

fn nibble(c: char) -> Result<u8, CodecError> {
    c.to_digit(16)
        .map(|d| d as u8)
        .ok_or(CodecError::InvalidDigit(c))
}

/// Pack a string of hex digits into BCD
///
/// # Arguments
/// * `digits` - Digits to pack; an odd count gets an `F` filler nibble
/// * `swap` - Put the first digit of each pair in the low nibble (the
///   telecom convention) instead of the high nibble
/// * `output_len` - Pad the result with `0xFF` bytes up to this many bytes
pub fn make_bcd(digits: &str, swap: bool, output_len: usize) -> Result<Vec<u8>, CodecError> {
    let mut nibbles = digits.chars().map(nibble).collect::<Result<Vec<u8>, _>>()?;
    if nibbles.len() % 2 == 1 {
        nibbles.push(0x0F);
    }

    let mut out: Vec<u8> = nibbles
        .chunks(2)
        .map(|pair| {
            if swap {
                (pair[1] << 4) | pair[0]
            } else {
                (pair[0] << 4) | pair[1]
            }
        })
        .collect();

    if out.len() < output_len {
        out.resize(output_len, 0xFF);
    }
    Ok(out)
}

/// Unpack BCD digits, skipping filler nibbles
pub fn decode_bcd(data: &[u8], swap: bool) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for &byte in data {
        let (first, second) = if swap {
            (byte & 0x0F, byte >> 4)
        } else {
            (byte >> 4, byte & 0x0F)
        };
        for n in [first, second] {
            if n <= 9 {
                out.push((b'0' + n) as char);
            }
        }
    }
    out
}

/// Unpack swapped BCD, the layout used by every identity file
pub fn bcd_to_ascii(data: &[u8]) -> String {
    decode_bcd(data, true)
}

fn require_decimal(what: &'static str, value: &str) -> Result<(), CodecError> {
    match value.chars().find(|c| !c.is_ascii_digit()) {
        Some(c) => Err(CodecError::InvalidDigit(c)),
        None if value.is_empty() => Err(CodecError::DigitCount {
            what,
            expected: "at least 1",
            got: 0,
        }),
        None => Ok(()),
    }
}

/// Encode an IMSI for EF.IMSI
///
/// Byte 0 counts the bytes that follow. Byte 1 carries the parity nibble
/// (9 for an odd digit count, 1 for even) with the first digit in the high
/// nibble; the remaining digits follow as swapped BCD.
pub fn encode_imsi(imsi: &str) -> Result<Vec<u8>, CodecError> {
    require_decimal("IMSI", imsi)?;

    let first = imsi.as_bytes()[0] - b'0';
    let parity = if imsi.len() % 2 == 1 { 0x09 } else { 0x01 };
    let tail = make_bcd(&imsi[1..], true, 0)?;

    let mut out = Vec::with_capacity(tail.len() + 2);
    out.push((tail.len() + 1) as u8);
    out.push(parity | (first << 4));
    out.extend_from_slice(&tail);
    Ok(out)
}

/// Decode the content of EF.IMSI back to its digits
pub fn decode_imsi(raw: &[u8]) -> String {
    let Some((&len, body)) = raw.split_first() else {
        return String::new();
    };
    let body = &body[..(len as usize).min(body.len())];

    // The first unpacked digit is the parity nibble
    bcd_to_ascii(body).chars().skip(1).collect()
}

/// Encode a dialling number into a record of `record_len` bytes
///
/// The last 14 bytes hold `[BCD length][TON][BCD digits][0xFF...]`; any room
/// in front of them (the alpha identifier) is filled with `0xFF`.
pub fn encode_isdn(isdn: &str, record_len: usize) -> Result<Vec<u8>, CodecError> {
    if record_len < ISDN_TAIL_LEN {
        return Err(CodecError::RecordTooShort {
            got: record_len,
            min: ISDN_TAIL_LEN,
        });
    }
    require_decimal("MSISDN", isdn)?;
    let bcd = make_bcd(isdn, true, 0)?;
    if bcd.len() > ISDN_MAX_BCD {
        return Err(CodecError::DigitCount {
            what: "MSISDN",
            expected: "at most 20",
            got: isdn.len(),
        });
    }

    let mut out = vec![0xFF; record_len - ISDN_TAIL_LEN];
    out.push(bcd.len() as u8);
    out.push(TON_INTERNATIONAL);
    out.extend_from_slice(&bcd);
    out.resize(record_len, 0xFF);
    Ok(out)
}

/// Decode the dialling number held in the last 14 bytes of a record
pub fn decode_isdn(raw: &[u8]) -> String {
    if raw.len() < ISDN_TAIL_LEN {
        return String::new();
    }
    let tail = &raw[raw.len() - ISDN_TAIL_LEN..];
    let len = tail[0] as usize;
    let end = (2 + len).min(ISDN_TAIL_LEN);
    bcd_to_ascii(&tail[2..end])
}

/// Encode an MCC/MNC pair as a 3-byte PLMN identity
///
/// A two digit MNC leaves the `F` filler nibble in the second byte.
pub fn encode_mcc_mnc(mcc: &str, mnc: &str) -> Result<[u8; 3], CodecError> {
    require_decimal("MCC", mcc)?;
    require_decimal("MNC", mnc)?;
    if mcc.len() != 3 {
        return Err(CodecError::DigitCount {
            what: "MCC",
            expected: "3",
            got: mcc.len(),
        });
    }
    if !(2..=3).contains(&mnc.len()) {
        return Err(CodecError::DigitCount {
            what: "MNC",
            expected: "2 or 3",
            got: mnc.len(),
        });
    }

    let c: Vec<u8> = mcc.bytes().map(|b| b - b'0').collect();
    let n: Vec<u8> = mnc.bytes().map(|b| b - b'0').collect();
    let mnc3 = n.get(2).copied().unwrap_or(0x0F);

    Ok([(c[1] << 4) | c[0], (mnc3 << 4) | c[2], (n[1] << 4) | n[0]])
}

/// Encode an ICCID into the 10 bytes of EF.ICCID
///
/// A failing Luhn check digit is reported but does not stop the encoding.
pub fn encode_iccid(iccid: &str) -> Result<Vec<u8>, CodecError> {
    require_decimal("ICCID", iccid)?;
    if !luhn(iccid) {
        warn!(iccid, "ICCID Luhn check digit is not valid");
    }
    make_bcd(iccid, true, 10)
}

/// Luhn checksum over a digit string
///
/// Every second digit counted from the right is doubled; the digit sum
/// must be a multiple of ten. The empty string is valid.
pub fn luhn(id: &str) -> bool {
    const DOUBLED: [u32; 10] = [0, 2, 4, 6, 8, 1, 3, 5, 7, 9];

    let mut sum = 0;
    for (i, c) in id.chars().rev().enumerate() {
        let Some(d) = c.to_digit(10) else {
            return false;
        };
        sum += if i % 2 == 0 { d } else { DOUBLED[d as usize] };
    }
    sum % 10 == 0
}
