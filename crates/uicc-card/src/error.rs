//! Error type for card sessions
//!
//! Errors fall in two tiers. Fatal errors mean the single-wire line or the
//! caller's configuration can no longer be trusted; the session must be
//! dropped. Everything else is an operational outcome the caller may handle.

use thiserror::Error;
use uicc_common::codec::CodecError;

#[derive(Debug, Error)]
pub enum CardError {
    #[error("failed to open serial port {port}: {source}")]
    PortOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("serial line I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("card did not answer to reset")]
    NoAnswerToReset,

    #[error("echo mismatch: sent {sent:02X}, read back {echoed:02X?}")]
    EchoMismatch { sent: u8, echoed: Option<u8> },

    #[error("card acknowledged instruction {expected:02X} with {got:02X?}")]
    ProcedureByte { expected: u8, got: Option<u8> },

    #[error("command of {0} bytes is shorter than an APDU header")]
    CommandTooShort(usize),

    #[error("malformed response: expected {expected} bytes, got {got}")]
    MalformedResponse { expected: usize, got: usize },

    #[error("file {0:?} is not defined for this card generation")]
    UnknownFile(String),

    #[error("{command} failed with status {sw:04X}")]
    UnexpectedStatus { command: &'static str, sw: u16 },

    #[error("card rejected {0}")]
    Rejected(&'static str),

    #[error("SELECT answer is not an FCP template")]
    InvalidFcp,

    #[error("transfer of {requested} bytes exceeds the {limit} byte limit")]
    TransferTooLarge { requested: usize, limit: usize },

    #[error("record of {len} bytes exceeds the record length {record_length}")]
    RecordTooLong { len: usize, record_length: usize },

    #[error("{count} records do not fit in a file of {capacity} records")]
    TooManyRecords { count: usize, capacity: usize },

    #[error("selected file is not a record file")]
    NotRecordFile,

    #[error("PIN of {0} bytes is longer than 8 bytes")]
    PinTooLong(usize),

    #[error("no USIM application found in EF.DIR")]
    ApplicationNotFound,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl CardError {
    /// Whether the session must be abandoned after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CardError::PortOpen { .. }
                | CardError::Io(_)
                | CardError::NoAnswerToReset
                | CardError::EchoMismatch { .. }
                | CardError::ProcedureByte { .. }
                | CardError::CommandTooShort(_)
                | CardError::MalformedResponse { .. }
                | CardError::UnknownFile(_)
        )
    }
}
