//! File access shared by both card generations
//!
//! [`FileAccess`] is implemented by [`crate::Sim`] and [`crate::Usim`]. Each
//! implementation keeps the descriptor of the last selected file and clears
//! it at the start of every select, so reads and writes always act on the
//! file the caller last named.

use std::fmt;

use uicc_common::{be_uint, extract, Tag};

use crate::apdu::{commands, SW_OK};
use crate::error::CardError;
use crate::transport::{Link, Transport};

/// Maximum PIN length in bytes
pub const PIN_LEN: usize = 8;

/// CHV references
pub mod chv {
    pub const PIN1: u8 = 0x01;
    /// Administrative key, needed to provision a card
    pub const ADM: u8 = 0x0A;
}

/// Elementary file structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStructure {
    Transparent,
    LinearFixed,
    Cyclic,
}

impl FileStructure {
    pub fn name(&self) -> &'static str {
        match self {
            FileStructure::Transparent => "Transparent",
            FileStructure::LinearFixed => "Linear Fixed",
            FileStructure::Cyclic => "Cyclic",
        }
    }
}

/// Access conditions of a selected file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessConditions {
    /// GSM 11.11 nibbles: read/update, increase/RFU, rehabilitate/invalidate
    Gsm([u8; 3]),
    /// Value of the UICC security attribute TLV
    Uicc(Vec<u8>),
}

impl AccessConditions {
    /// GSM access level needed to read the file
    pub fn read_level(&self) -> Option<u8> {
        match self {
            AccessConditions::Gsm(ac) => Some(ac[0] >> 4),
            AccessConditions::Uicc(_) => None,
        }
    }

    /// GSM access level needed to update the file
    pub fn update_level(&self) -> Option<u8> {
        match self {
            AccessConditions::Gsm(ac) => Some(ac[0] & 0x0F),
            AccessConditions::Uicc(_) => None,
        }
    }
}

impl fmt::Display for AccessConditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessConditions::Gsm(ac) => {
                let (read, update) = (ac[0] >> 4, ac[0] & 0x0F);
                write!(
                    f,
                    "read={read:X} ({}), update={update:X} ({})",
                    access_level_name(read),
                    access_level_name(update)
                )
            }
            AccessConditions::Uicc(attributes) => {
                write!(f, "security attributes {}", hex::encode_upper(attributes))
            }
        }
    }
}

/// Human-readable name of a GSM access condition level
pub fn access_level_name(level: u8) -> &'static str {
    match level {
        0x0 => "Always",
        0x1 => "Pin1",
        0x2 => "Pin2",
        0x3 => "RFU",
        0x4 | 0xE => "ADM",
        0xA => "GR",
        0xF => "Never",
        _ => "Unknown",
    }
}

/// Metadata of the most recently selected file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub id: u16,
    pub structure: FileStructure,
    /// Zero for transparent files
    pub record_length: usize,
    /// Zero for transparent files
    pub record_count: usize,
    /// Total size in bytes
    pub size: usize,
    pub access: AccessConditions,
}

/// Minimum length of a GSM EF GET RESPONSE block
const GSM_EF_INFO_MIN: usize = 14;

impl FileDescriptor {
    /// Decode the GSM 11.11 GET RESPONSE block of an elementary file
    ///
    /// Layout: RFU(2) size(2) id(2) type(1) RFU(1) access(3) status(1)
    /// length-following(1) structure(1) record-length(1).
    pub fn from_gsm_response(block: &[u8]) -> Result<Self, CardError> {
        if block.len() < GSM_EF_INFO_MIN {
            return Err(CardError::MalformedResponse {
                expected: GSM_EF_INFO_MIN,
                got: block.len(),
            });
        }

        let size = u16::from_be_bytes([block[2], block[3]]) as usize;
        let id = u16::from_be_bytes([block[4], block[5]]);
        let access = AccessConditions::Gsm([block[8], block[9], block[10]]);
        let structure = match block[13] {
            0x01 => FileStructure::LinearFixed,
            0x03 => FileStructure::Cyclic,
            _ => FileStructure::Transparent,
        };

        let (record_length, record_count) = match structure {
            FileStructure::Transparent => (0, 0),
            _ => {
                let record_length = block.get(14).copied().unwrap_or(0) as usize;
                let record_count = size.checked_div(record_length).unwrap_or(0);
                (record_length, record_count)
            }
        };

        Ok(Self {
            id,
            structure,
            record_length,
            record_count,
            size,
            access,
        })
    }

    /// Decode the content of a UICC FCP template (tag 0x62)
    ///
    /// A File Descriptor of at least 5 bytes describes a record file: bytes
    /// 2..4 hold the record length and byte 4 the record count. Shorter
    /// descriptors belong to transparent files.
    pub fn from_fcp(fcp: &[u8]) -> Self {
        let descriptor = extract(fcp, Tag::FileDescriptor);

        let (structure, record_length, record_count) = if descriptor.len() >= 5 {
            let structure = if descriptor[0] & 0x07 == 0x06 {
                FileStructure::Cyclic
            } else {
                FileStructure::LinearFixed
            };
            let record_length = u16::from_be_bytes([descriptor[2], descriptor[3]]) as usize;
            (structure, record_length, descriptor[4] as usize)
        } else {
            (FileStructure::Transparent, 0, 0)
        };

        let attributes = [
            Tag::SecurityAttributesReferenced,
            Tag::SecurityAttributesCompact,
            Tag::SecurityAttributesExpanded,
        ]
        .into_iter()
        .map(|tag| extract(fcp, tag))
        .find(|value| !value.is_empty())
        .unwrap_or_default();

        Self {
            id: be_uint(extract(fcp, Tag::FileIdentifier)) as u16,
            structure,
            record_length,
            record_count,
            size: be_uint(extract(fcp, Tag::FileSizeData)) as usize,
            access: AccessConditions::Uicc(attributes.to_vec()),
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.structure == FileStructure::Transparent
    }

    /// Record length, `None` for transparent files
    pub fn record_length(&self) -> Option<usize> {
        (!self.is_transparent()).then_some(self.record_length)
    }
}

/// File operations common to SIM and USIM cards
pub trait FileAccess {
    type Link: Link;

    /// Class byte used for this card generation
    fn class(&self) -> u8;

    fn transport(&mut self) -> &mut Transport<Self::Link>;

    /// Select a file by symbolic name and decode its descriptor
    fn select_file(&mut self, name: &str) -> Result<&FileDescriptor, CardError>;

    /// Descriptor of the currently selected file
    fn selected(&self) -> Option<&FileDescriptor>;

    /// Read a file: one element for transparent files, one per record otherwise
    fn read_file(&mut self, name: &str) -> Result<Vec<Vec<u8>>, CardError>;

    /// Write a file
    ///
    /// # Arguments
    /// * `records` - Content; only the first element is used for transparent files
    /// * `fill_pad` - Pad a transparent file to its full size with 0xFF
    /// * `force_record_mode` - Write records even if the file reports otherwise
    fn write_file(
        &mut self,
        name: &str,
        records: &[Vec<u8>],
        fill_pad: bool,
        force_record_mode: bool,
    ) -> Result<(), CardError>;

    /// Select a file only to learn its record length
    fn file_record_size(&mut self, name: &str) -> Result<Option<usize>, CardError> {
        Ok(self.select_file(name)?.record_length())
    }

    /// Present a PIN
    ///
    /// # Returns
    /// * `Ok(true)` - PIN accepted
    /// * `Ok(false)` - PIN refused by the card
    fn verify_chv(&mut self, chv: u8, pin: &[u8]) -> Result<bool, CardError> {
        check_pin(pin)?;
        let command = commands::verify_chv(self.class(), chv, pin).build();
        self.transport().send_check(&command, &SW_OK)
    }

    /// Replace a PIN
    fn update_chv(&mut self, chv: u8, old: &[u8], new: &[u8]) -> Result<bool, CardError> {
        check_pin(old)?;
        check_pin(new)?;
        let command = commands::change_chv(self.class(), chv, old, new).build();
        self.transport().send_check(&command, &SW_OK)
    }
}

fn check_pin(pin: &[u8]) -> Result<(), CardError> {
    if pin.len() > PIN_LEN {
        return Err(CardError::PinTooLong(pin.len()));
    }
    Ok(())
}

/// Read records 1..N of the selected record file
pub(crate) fn read_records<L: Link>(
    transport: &mut Transport<L>,
    cla: u8,
    file: &FileDescriptor,
) -> Result<Vec<Vec<u8>>, CardError> {
    let len = file.record_length().ok_or(CardError::NotRecordFile)?;
    if len > 255 {
        return Err(CardError::TransferTooLarge {
            requested: len,
            limit: 255,
        });
    }

    let mut records = Vec::with_capacity(file.record_count);
    for number in 1..=file.record_count.min(254) {
        let response = transport.transmit(&commands::read_record(cla, number as u8, len), len)?;
        records.push(response.expect_data("READ RECORD", len)?);
    }
    Ok(records)
}

/// Write `records` from record 1 on, each padded to the record length
///
/// All records are validated before the first one is sent.
pub(crate) fn write_records<L: Link>(
    transport: &mut Transport<L>,
    cla: u8,
    file: &FileDescriptor,
    records: &[Vec<u8>],
) -> Result<(), CardError> {
    let record_length = file.record_length().ok_or(CardError::NotRecordFile)?;
    if records.len() > file.record_count {
        return Err(CardError::TooManyRecords {
            count: records.len(),
            capacity: file.record_count,
        });
    }
    if let Some(record) = records.iter().find(|r| r.len() > record_length) {
        return Err(CardError::RecordTooLong {
            len: record.len(),
            record_length,
        });
    }

    for (i, record) in records.iter().enumerate() {
        let mut data = record.clone();
        data.resize(record_length, 0xFF);
        transport
            .transmit(&commands::update_record(cla, (i + 1) as u8, data), 0)?
            .check("UPDATE RECORD")?;
    }
    Ok(())
}

/// Transparent write payload, padded to the file size when requested
pub(crate) fn binary_payload(
    file: &FileDescriptor,
    records: &[Vec<u8>],
    fill_pad: bool,
) -> Result<Vec<u8>, CardError> {
    let mut data = records.first().cloned().unwrap_or_default();
    if data.len() > file.size {
        return Err(CardError::TransferTooLarge {
            requested: data.len(),
            limit: file.size,
        });
    }
    if fill_pad {
        data.resize(file.size, 0xFF);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gsm_transparent_descriptor() {
        // EF.ICCID: 10 bytes, read always, update ADM
        let block = hex::decode("0000000A2FE204000F4401020000").unwrap();
        let file = FileDescriptor::from_gsm_response(&block).unwrap();
        assert_eq!(file.id, 0x2FE2);
        assert_eq!(file.size, 10);
        assert!(file.is_transparent());
        assert_eq!(file.record_length(), None);
        assert_eq!(file.access.read_level(), Some(0x0));
        assert_eq!(file.access.update_level(), Some(0xF));
    }

    #[test]
    fn test_gsm_record_descriptor() {
        // EF.MSISDN: 2 records of 28 bytes
        let block = hex::decode("000000386F40040011F0440102011C").unwrap();
        let file = FileDescriptor::from_gsm_response(&block).unwrap();
        assert_eq!(file.structure, FileStructure::LinearFixed);
        assert_eq!(file.record_length(), Some(28));
        assert_eq!(file.record_count, 2);
        assert_eq!(
            file.access.to_string(),
            "read=1 (Pin1), update=1 (Pin1)"
        );
    }

    #[test]
    fn test_gsm_short_block_is_rejected() {
        assert!(FileDescriptor::from_gsm_response(&[0x00; 9]).is_err());
    }

    #[test]
    fn test_fcp_transparent() {
        let fcp = hex::decode("8202412183022FE28A01058B036F06038002000A").unwrap();
        let file = FileDescriptor::from_fcp(&fcp);
        assert_eq!(file.id, 0x2FE2);
        assert_eq!(file.size, 10);
        assert!(file.is_transparent());
        assert_eq!(file.access, AccessConditions::Uicc(vec![0x6F, 0x06, 0x03]));
    }

    #[test]
    fn test_fcp_linear_fixed() {
        let fcp = hex::decode("8205422100260283026F40800200988C03030101").unwrap();
        let file = FileDescriptor::from_fcp(&fcp);
        assert_eq!(file.structure, FileStructure::LinearFixed);
        assert_eq!(file.record_length(), Some(0x26));
        assert_eq!(file.record_count, 2);
        assert_eq!(file.size, 0x98);
    }

    #[test]
    fn test_fcp_cyclic() {
        let fcp = hex::decode("82054621000A058302AAAA").unwrap();
        let file = FileDescriptor::from_fcp(&fcp);
        assert_eq!(file.structure, FileStructure::Cyclic);
        assert_eq!(file.record_count, 5);
    }

    #[test]
    fn test_binary_payload() {
        let file = FileDescriptor::from_fcp(&hex::decode("820241218002000C").unwrap());
        let payload = binary_payload(&file, &[vec![0x01, 0x02]], true).unwrap();
        assert_eq!(payload.len(), 12);
        assert_eq!(&payload[2..], &[0xFF; 10]);

        let payload = binary_payload(&file, &[vec![0x01, 0x02]], false).unwrap();
        assert_eq!(payload, vec![0x01, 0x02]);

        let err = binary_payload(&file, &[vec![0x00; 13]], false).unwrap_err();
        assert!(matches!(err, CardError::TransferTooLarge { requested: 13, limit: 12 }));
    }

    #[test]
    fn test_access_level_names() {
        assert_eq!(access_level_name(0x4), "ADM");
        assert_eq!(access_level_name(0xE), "ADM");
        assert_eq!(access_level_name(0xA), "GR");
        assert_eq!(access_level_name(0x7), "Unknown");
    }
}
