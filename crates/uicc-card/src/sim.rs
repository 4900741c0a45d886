//! GSM 11.11 SIM cards (class A0)

use tracing::debug;

use crate::apdu::{commands, CLA_GSM, SW1_GSM_RESPONSE};
use crate::error::CardError;
use crate::file::{binary_payload, read_records, write_records, FileAccess, FileDescriptor};
use crate::paths::{self, SIM_FILES};
use crate::transport::{Link, SerialLink, SessionConfig, Transport};

/// Master file identifier
const MF: [u8; 2] = [0x3F, 0x00];

/// Largest transparent read: P3=0 requests 256 bytes
const MAX_BINARY_READ: usize = 256;
/// Largest transparent write: P3 carries the data length
const MAX_BINARY_WRITE: usize = 255;

/// A legacy SIM card
pub struct Sim<L: Link = SerialLink> {
    transport: Transport<L>,
    selected: Option<FileDescriptor>,
}

impl Sim<SerialLink> {
    /// Open a serial session to a SIM card
    pub fn open(config: &SessionConfig) -> Result<Self, CardError> {
        Ok(Self::new(Transport::open(config)?))
    }
}

impl<L: Link> Sim<L> {
    pub fn new(transport: Transport<L>) -> Self {
        Self {
            transport,
            selected: None,
        }
    }

    pub fn into_transport(self) -> Transport<L> {
        self.transport
    }

    /// SELECT one file id; the card must answer 9FXX
    ///
    /// Returns the number of response bytes announced by the card.
    fn select_id(&mut self, fid: &[u8]) -> Result<usize, CardError> {
        let response = self
            .transport
            .transmit(&commands::select_id(CLA_GSM, fid), 0)?;

        match (response.sw1, response.pending_bytes()) {
            (SW1_GSM_RESPONSE, Some(len)) => Ok(len),
            _ => Err(CardError::UnexpectedStatus {
                command: "SELECT",
                sw: response.status_word(),
            }),
        }
    }

    fn log_selected(&self, file: &FileDescriptor) {
        if !self.transport.is_debug() {
            return;
        }
        debug!(
            file = paths::file_name(SIM_FILES, file.id).unwrap_or("Not existing"),
            structure = file.structure.name(),
            access = %file.access,
            size = file.size,
            "Selected file"
        );
    }
}

impl<L: Link> FileAccess for Sim<L> {
    type Link = L;

    fn class(&self) -> u8 {
        CLA_GSM
    }

    fn transport(&mut self) -> &mut Transport<L> {
        &mut self.transport
    }

    fn select_file(&mut self, name: &str) -> Result<&FileDescriptor, CardError> {
        self.selected = None;
        let path = paths::lookup(SIM_FILES, name)?;

        let mut pending = self.select_id(&MF)?;
        for fid in path.chunks(2) {
            pending = self.select_id(fid)?;
        }

        let info = self
            .transport
            .transmit(&commands::get_response(CLA_GSM, pending), pending)?
            .expect_data("GET RESPONSE", pending)?;
        let file = FileDescriptor::from_gsm_response(&info)?;

        self.log_selected(&file);
        Ok(self.selected.insert(file))
    }

    fn selected(&self) -> Option<&FileDescriptor> {
        self.selected.as_ref()
    }

    fn read_file(&mut self, name: &str) -> Result<Vec<Vec<u8>>, CardError> {
        let file = self.select_file(name)?.clone();

        if !file.is_transparent() {
            return read_records(&mut self.transport, CLA_GSM, &file);
        }

        if file.size > MAX_BINARY_READ {
            return Err(CardError::TransferTooLarge {
                requested: file.size,
                limit: MAX_BINARY_READ,
            });
        }
        if file.size == 0 {
            return Ok(vec![Vec::new()]);
        }

        let data = self
            .transport
            .transmit(&commands::read_binary(CLA_GSM, 0, file.size), file.size)?
            .expect_data("READ BINARY", file.size)?;
        Ok(vec![data])
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
            return write_records(&mut self.transport, CLA_GSM, &file, records);
        }

        let data = binary_payload(&file, records, fill_pad)?;
        if data.len() > MAX_BINARY_WRITE {
            return Err(CardError::TransferTooLarge {
                requested: data.len(),
                limit: MAX_BINARY_WRITE,
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        self.transport
            .transmit(&commands::update_binary(CLA_GSM, 0, data), 0)?
            .check("UPDATE BINARY")?;
        Ok(())
    }
}
