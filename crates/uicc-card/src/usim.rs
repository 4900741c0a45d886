//! ETSI TS 102 221 UICC cards running a USIM application (class 00)

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};
use uicc_common::{extract, Tag};
use uicc_milenage::Block;

use crate::apdu::{
    commands, pending_len, CLA_UICC, SW1_GSM_RESPONSE, SW1_UICC_RESPONSE, SW_OK,
};
use crate::auth::Authenticate;
use crate::error::CardError;
use crate::file::{binary_payload, read_records, write_records, FileAccess, FileDescriptor};
use crate::paths::{self, USIM_FILES};
use crate::transport::{Link, SerialLink, SessionConfig, Transport};

/// 3GPP USIM application identifier prefix (RID + application code)
pub const USIM_AID_PREFIX: [u8; 7] = [0xA0, 0x00, 0x00, 0x00, 0x87, 0x10, 0x02];

/// Time the card needs to run the authentication algorithm
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Largest READ/UPDATE BINARY window
const MAX_WINDOW: usize = 255;
/// Offsets are 15 bits wide
const MAX_OFFSET: usize = 0x7FFF;

/// First byte of a successful AUTHENTICATE answer
const AUTH_SUCCESS: u8 = 0xDB;
/// First byte of a synchronization failure answer
const AUTH_SYNC_FAILURE: u8 = 0xDC;

/// A UICC card with its USIM application
pub struct Usim<L: Link = SerialLink> {
    transport: Transport<L>,
    selected: Option<FileDescriptor>,
    settle_delay: Duration,
}

impl Usim<SerialLink> {
    /// Open a serial session to a UICC card
    pub fn open(config: &SessionConfig) -> Result<Self, CardError> {
        Ok(Self::new(Transport::open(config)?))
    }
}

impl<L: Link> Usim<L> {
    pub fn new(transport: Transport<L>) -> Self {
        Self {
            transport,
            selected: None,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Change the wait between AUTHENTICATE and reading its status
    pub fn set_settle_delay(&mut self, delay: Duration) {
        self.settle_delay = delay;
    }

    pub fn into_transport(self) -> Transport<L> {
        self.transport
    }

    /// Find the USIM application in EF.DIR and select it
    ///
    /// # Returns
    /// * `Ok(Vec<u8>)` - The selected AID
    /// * `Err(CardError::ApplicationNotFound)` - EF.DIR lists no application
    pub fn select_application(&mut self) -> Result<Vec<u8>, CardError> {
        let records = self.read_file("EFDIR")?;
        let aid = find_usim_aid(&records).ok_or(CardError::ApplicationNotFound)?;

        self.selected = None;
        let command = commands::select_aid(&aid).build();
        if !self.transport.send_check(&command, &SW_OK)? {
            return Err(CardError::Rejected("SELECT AID"));
        }

        info!(aid = %hex::encode_upper(&aid), "USIM application selected");
        Ok(aid)
    }

    fn get_response(&mut self, len: usize) -> Result<Vec<u8>, CardError> {
        self.transport
            .transmit(&commands::get_response(CLA_UICC, len), len)?
            .expect_data("GET RESPONSE", len)
    }
}

/// AID of the USIM application listed in EF.DIR records
///
/// Prefers an AID carrying the 3GPP USIM prefix and falls back to the
/// first AID found.
pub fn find_usim_aid(records: &[Vec<u8>]) -> Option<Vec<u8>> {
    let aids: Vec<&[u8]> = records
        .iter()
        .map(|record| extract(extract(record, Tag::ApplicationTemplate), Tag::Aid))
        .filter(|aid| !aid.is_empty())
        .collect();

    aids.iter()
        .find(|aid| aid.starts_with(&USIM_AID_PREFIX))
        .or_else(|| aids.first())
        .map(|aid| aid.to_vec())
}

/// Split the data of an AUTHENTICATE answer into its items
///
/// A synchronization failure (0xDC) yields the single AUTS item. A success
/// (0xDB) yields RES, CK, IK and, when present, Kc. Anything else is empty.
pub fn parse_authenticate_response(data: &[u8]) -> Vec<Vec<u8>> {
    match data.first() {
        Some(&AUTH_SYNC_FAILURE) => {
            let len = data.get(1).copied().unwrap_or(0) as usize;
            let end = (2 + len).min(data.len());
            vec![data.get(2..end).unwrap_or_default().to_vec()]
        }
        Some(&AUTH_SUCCESS) => {
            let mut items = Vec::new();
            let mut pos = 1;
            while let Some(&len) = data.get(pos) {
                let start = pos + 1;
                let end = (start + len as usize).min(data.len());
                items.push(data[start..end].to_vec());
                pos = start + len as usize;
            }
            items
        }
        _ => Vec::new(),
    }
}

impl<L: Link> FileAccess for Usim<L> {
    type Link = L;

    fn class(&self) -> u8 {
        CLA_UICC
    }

    fn transport(&mut self) -> &mut Transport<L> {
        &mut self.transport
    }

    fn select_file(&mut self, name: &str) -> Result<&FileDescriptor, CardError> {
        self.selected = None;
        let path = paths::lookup(USIM_FILES, name)?;

        let response = self.transport.transmit(&commands::select_path(path), 0)?;
        let len = match (response.sw1, response.pending_bytes()) {
            (SW1_UICC_RESPONSE, Some(len)) => len,
            _ => {
                return Err(CardError::UnexpectedStatus {
                    command: "SELECT",
                    sw: response.status_word(),
                })
            }
        };

        let answer = self.get_response(len)?;
        if answer.first() != Some(&Tag::FcpTemplate.byte()) {
            return Err(CardError::InvalidFcp);
        }
        let file = FileDescriptor::from_fcp(extract(&answer, Tag::FcpTemplate));

        if self.transport.is_debug() {
            debug!(
                file = name,
                structure = file.structure.name(),
                records = file.record_count,
                size = file.size,
                "Selected file"
            );
        }
        Ok(self.selected.insert(file))
    }

    fn selected(&self) -> Option<&FileDescriptor> {
        self.selected.as_ref()
    }

    fn read_file(&mut self, name: &str) -> Result<Vec<Vec<u8>>, CardError> {
        let file = self.select_file(name)?.clone();

        if !file.is_transparent() {
            return read_records(&mut self.transport, CLA_UICC, &file);
        }

        if file.size > MAX_OFFSET {
            return Err(CardError::TransferTooLarge {
                requested: file.size,
                limit: MAX_OFFSET,
            });
        }

        let mut content = Vec::with_capacity(file.size);
        while content.len() < file.size {
            let offset = content.len();
            let window = (file.size - offset).min(MAX_WINDOW);
            let data = self
                .transport
                .transmit(
                    &commands::read_binary(CLA_UICC, offset as u16, window),
                    window,
                )?
                .expect_data("READ BINARY", window)?;
            content.extend(data);
        }
        Ok(vec![content])
    }

    fn write_file(
        &mut self,
        name: &str,
        records: &[Vec<u8>],
        fill_pad: bool,
        force_record_mode: bool,
    ) -> Result<(), CardError> {
        let file = self.select_file(name)?.clone();

        if force_record_mode || !file.is_transparent() {
            return write_records(&mut self.transport, CLA_UICC, &file, records);
        }

        let data = binary_payload(&file, records, fill_pad)?;
        if data.len() > MAX_OFFSET {
            return Err(CardError::TransferTooLarge {
                requested: data.len(),
                limit: MAX_OFFSET,
            });
        }

        for (i, window) in data.chunks(MAX_WINDOW).enumerate() {
            let offset = (i * MAX_WINDOW) as u16;
            self.transport
                .transmit(
                    &commands::update_binary(CLA_UICC, offset, window.to_vec()),
                    0,
                )?
                .check("UPDATE BINARY")?;
        }
        Ok(())
    }
}

impl<L: Link> Authenticate for Usim<L> {
    fn authenticate(&mut self, rand: &Block, autn: &Block) -> Result<Vec<Vec<u8>>, CardError> {
        self.transport
            .write(&commands::authenticate(rand, autn).build())?;
        thread::sleep(self.settle_delay);

        let status = self.transport.read(2)?;
        let len = match status[..] {
            [SW1_UICC_RESPONSE | SW1_GSM_RESPONSE, sw2] => pending_len(sw2),
            _ => {
                let trailing = self.transport.drain()?;
                warn!(
                    status = %hex::encode_upper(&status),
                    trailing = %hex::encode_upper(&trailing),
                    "No usable answer to the authentication challenge"
                );
                return Ok(Vec::new());
            }
        };

        let response = self
            .transport
            .transmit(&commands::get_response(CLA_UICC, len), len)?;
        if !response.is_success() {
            warn!(sw = %response.status_string(), "GET RESPONSE after AUTHENTICATE failed");
            return Ok(Vec::new());
        }

        let items = parse_authenticate_response(&response.data);
        if self.transport.is_debug() {
            for item in &items {
                debug!(item = %hex::encode_upper(item), "Authentication item");
            }
        }
        Ok(items)
    }
}
