//! APDU (Application Protocol Data Unit) command handling
//!
//! Commands go out in T=0 form: a 5-byte header whose last byte (P3) is
//! either the length of the outgoing data or the length of the expected
//! answer, followed by the data if any.

use crate::error::CardError;

/// Class byte of GSM 11.11 SIM commands
pub const CLA_GSM: u8 = 0xA0;
/// Class byte of ETSI TS 102 221 UICC commands
pub const CLA_UICC: u8 = 0x00;

/// Length of a command header
pub const HEADER_LEN: usize = 5;

/// Status word for normal completion
pub const SW_OK: [u8; 2] = [0x90, 0x00];
/// SW1 announcing response bytes on a UICC (61XX)
pub const SW1_UICC_RESPONSE: u8 = 0x61;
/// SW1 announcing response bytes on a GSM SIM (9FXX)
pub const SW1_GSM_RESPONSE: u8 = 0x9F;

/// Instruction bytes
pub mod ins {
    pub const SELECT: u8 = 0xA4;
    pub const GET_RESPONSE: u8 = 0xC0;
    pub const READ_BINARY: u8 = 0xB0;
    pub const UPDATE_BINARY: u8 = 0xD6;
    pub const READ_RECORD: u8 = 0xB2;
    pub const UPDATE_RECORD: u8 = 0xDC;
    pub const VERIFY_CHV: u8 = 0x20;
    pub const CHANGE_CHV: u8 = 0x24;
    pub const AUTHENTICATE: u8 = 0x88;
}

/// APDU response containing data and status word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    /// Response data (without status word)
    pub data: Vec<u8>,
    /// Status word SW1
    pub sw1: u8,
    /// Status word SW2
    pub sw2: u8,
}

impl ApduResponse {
    /// Split raw bytes read from the card into data and status word
    pub fn from_bytes(mut raw: Vec<u8>, expected: usize) -> Result<Self, CardError> {
        if raw.len() < 2 {
            return Err(CardError::MalformedResponse {
                expected,
                got: raw.len(),
            });
        }

        let sw2 = raw.pop().unwrap_or_default();
        let sw1 = raw.pop().unwrap_or_default();
        Ok(Self { data: raw, sw1, sw2 })
    }

    /// Check if the response indicates success (9000)
    pub fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }

    /// Get the full status word as a 16-bit value
    pub fn status_word(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Get status word as hex string (e.g., "9000")
    pub fn status_string(&self) -> String {
        format!("{:02X}{:02X}", self.sw1, self.sw2)
    }

    /// Number of bytes waiting for GET RESPONSE, if the status announces any
    pub fn pending_bytes(&self) -> Option<usize> {
        match self.sw1 {
            SW1_UICC_RESPONSE | SW1_GSM_RESPONSE => Some(pending_len(self.sw2)),
            _ => None,
        }
    }

    /// Turn anything but 9000 into an error naming the command
    pub fn check(self, command: &'static str) -> Result<Self, CardError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(CardError::UnexpectedStatus {
                command,
                sw: self.status_word(),
            })
        }
    }

    /// Require success and exactly `len` data bytes
    pub fn expect_data(self, command: &'static str, len: usize) -> Result<Vec<u8>, CardError> {
        let response = self.check(command)?;
        if response.data.len() != len {
            return Err(CardError::MalformedResponse {
                expected: len + 2,
                got: response.data.len() + 2,
            });
        }
        Ok(response.data)
    }
}

/// A length byte of zero stands for 256 in T=0
pub fn pending_len(sw2: u8) -> usize {
    if sw2 == 0 {
        256
    } else {
        sw2 as usize
    }
}

/// APDU command builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduCommand {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Vec<u8>,
    le: Option<u8>,
}

impl ApduCommand {
    /// Create a new APDU command
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    /// Set command data
    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Set expected response length (0 requests 256 bytes)
    pub fn le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// Build the APDU command bytes
    pub fn build(&self) -> Vec<u8> {
        let p3 = if self.data.is_empty() {
            self.le.unwrap_or(0)
        } else {
            self.data.len() as u8
        };

        let mut apdu = Vec::with_capacity(HEADER_LEN + self.data.len());
        apdu.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2, p3]);
        apdu.extend_from_slice(&self.data);
        apdu
    }
}

/// Right-pad a PIN to 8 bytes with 0xFF
fn pad_pin(pin: &[u8]) -> Vec<u8> {
    let mut padded = pin.to_vec();
    padded.resize(8, 0xFF);
    padded
}

/// Common UICC and GSM APDU commands
pub mod commands {
    use super::{ins, pad_pin, ApduCommand, CLA_UICC};

    /// SELECT a file by its 2-byte identifier (GSM)
    pub fn select_id(cla: u8, fid: &[u8]) -> ApduCommand {
        ApduCommand::new(cla, ins::SELECT, 0x00, 0x00).data(fid.to_vec())
    }

    /// SELECT by path from the MF, FCP returned (UICC)
    pub fn select_path(path: &[u8]) -> ApduCommand {
        ApduCommand::new(CLA_UICC, ins::SELECT, 0x08, 0x04).data(path.to_vec())
    }

    /// SELECT an application by AID, no data returned (UICC)
    pub fn select_aid(aid: &[u8]) -> ApduCommand {
        ApduCommand::new(CLA_UICC, ins::SELECT, 0x04, 0x0C).data(aid.to_vec())
    }

    /// GET RESPONSE for bytes announced by 61XX or 9FXX
    pub fn get_response(cla: u8, len: usize) -> ApduCommand {
        ApduCommand::new(cla, ins::GET_RESPONSE, 0x00, 0x00).le(len as u8)
    }

    /// READ BINARY at a 15-bit offset
    pub fn read_binary(cla: u8, offset: u16, len: usize) -> ApduCommand {
        let [p1, p2] = offset.to_be_bytes();
        ApduCommand::new(cla, ins::READ_BINARY, p1, p2).le(len as u8)
    }

    /// UPDATE BINARY at a 15-bit offset
    pub fn update_binary(cla: u8, offset: u16, data: Vec<u8>) -> ApduCommand {
        let [p1, p2] = offset.to_be_bytes();
        ApduCommand::new(cla, ins::UPDATE_BINARY, p1, p2).data(data)
    }

    /// READ RECORD in absolute mode
    pub fn read_record(cla: u8, record: u8, len: usize) -> ApduCommand {
        ApduCommand::new(cla, ins::READ_RECORD, record, 0x04).le(len as u8)
    }

    /// UPDATE RECORD in absolute mode
    pub fn update_record(cla: u8, record: u8, data: Vec<u8>) -> ApduCommand {
        ApduCommand::new(cla, ins::UPDATE_RECORD, record, 0x04).data(data)
    }

    /// VERIFY CHV with the PIN padded to 8 bytes
    pub fn verify_chv(cla: u8, chv: u8, pin: &[u8]) -> ApduCommand {
        ApduCommand::new(cla, ins::VERIFY_CHV, 0x00, chv).data(pad_pin(pin))
    }

    /// CHANGE CHV with old and new PIN each padded to 8 bytes
    pub fn change_chv(cla: u8, chv: u8, old: &[u8], new: &[u8]) -> ApduCommand {
        let mut data = pad_pin(old);
        data.extend_from_slice(&pad_pin(new));
        ApduCommand::new(cla, ins::CHANGE_CHV, 0x00, chv).data(data)
    }

    /// AUTHENTICATE in 3G security context
    pub fn authenticate(rand: &[u8], autn: &[u8]) -> ApduCommand {
        let mut data = Vec::with_capacity(rand.len() + autn.len() + 2);
        data.push(rand.len() as u8);
        data.extend_from_slice(rand);
        data.push(autn.len() as u8);
        data.extend_from_slice(autn);
        ApduCommand::new(CLA_UICC, ins::AUTHENTICATE, 0x00, 0x81).data(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_data() {
        let apdu = commands::select_id(CLA_GSM, &[0x3F, 0x00]).build();
        assert_eq!(apdu, vec![0xA0, 0xA4, 0x00, 0x00, 0x02, 0x3F, 0x00]);
    }

    #[test]
    fn test_build_with_le() {
        let apdu = commands::read_binary(CLA_UICC, 0x01FE, 255).build();
        assert_eq!(apdu, vec![0x00, 0xB0, 0x01, 0xFE, 0xFF]);
        let apdu = commands::read_binary(CLA_GSM, 0, 256).build();
        assert_eq!(apdu, vec![0xA0, 0xB0, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_verify_chv_pads_pin() {
        let apdu = commands::verify_chv(CLA_UICC, 0x0A, b"1234").build();
        assert_eq!(
            apdu,
            vec![0x00, 0x20, 0x00, 0x0A, 0x08, b'1', b'2', b'3', b'4', 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_change_chv_layout() {
        let apdu = commands::change_chv(CLA_GSM, 0x01, b"0000", b"12345678").build();
        assert_eq!(apdu.len(), 5 + 16);
        assert_eq!(apdu[4], 16);
        assert_eq!(&apdu[9..13], &[0xFF; 4]);
        assert_eq!(&apdu[13..], b"12345678");
    }

    #[test]
    fn test_authenticate_layout() {
        let apdu = commands::authenticate(&[0x11; 16], &[0x22; 16]).build();
        assert_eq!(&apdu[..5], &[0x00, 0x88, 0x00, 0x81, 34]);
        assert_eq!(apdu[5], 16);
        assert_eq!(apdu[22], 16);
        assert_eq!(apdu.len(), 39);
    }

    #[test]
    fn test_response_parsing() {
        let response = ApduResponse::from_bytes(vec![0x01, 0x02, 0x90, 0x00], 4).unwrap();
        assert!(response.is_success());
        assert_eq!(response.data, vec![0x01, 0x02]);
        assert_eq!(response.status_string(), "9000");

        let response = ApduResponse::from_bytes(vec![0x61, 0x1C], 2).unwrap();
        assert_eq!(response.pending_bytes(), Some(0x1C));
        let response = ApduResponse::from_bytes(vec![0x9F, 0x00], 2).unwrap();
        assert_eq!(response.pending_bytes(), Some(256));

        let err = ApduResponse::from_bytes(vec![0x90], 2).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_expect_data() {
        let response = ApduResponse::from_bytes(vec![0x6A, 0x82], 12).unwrap();
        let err = response.expect_data("READ BINARY", 10).unwrap_err();
        assert!(!err.is_fatal());

        let response = ApduResponse::from_bytes(vec![0x01, 0x90, 0x00], 4).unwrap();
        let err = response.expect_data("READ BINARY", 2).unwrap_err();
        assert!(err.is_fatal());
    }
}
