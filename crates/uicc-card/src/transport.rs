//! Echo-verified half-duplex transport
//!
//! Card readers built on a single I/O wire hear every byte they send. The
//! transport checks each echo before sending the next byte, and for the
//! GSM and UICC classes waits for the procedure byte after the header.

use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info, warn};

use crate::apdu::{ApduCommand, ApduResponse, CLA_GSM, CLA_UICC, HEADER_LEN};
use crate::error::CardError;

/// Fixed line speed of the reader
pub const BAUD_RATE: u32 = 9600;

/// Time the control lines stay low during a cold reset
const RESET_DELAY: Duration = Duration::from_millis(100);

/// Upper bound on bytes collected as ATR or drained from an idle line
const READ_UNTIL_IDLE: usize = 1024;

/// Session parameters taken by [`Transport::open`]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Serial device path, e.g. `/dev/ttyUSB0`
    pub port: String,
    /// Inter-byte inactivity timeout
    pub read_timeout: Duration,
    /// Dump every exchanged byte and selected file metadata
    pub debug: bool,
}

impl SessionConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            read_timeout: Duration::from_millis(100),
            debug: false,
        }
    }
}

/// Physical byte link to the card
pub trait Link {
    /// Put one byte on the wire
    fn send_byte(&mut self, byte: u8) -> io::Result<()>;

    /// Next byte from the wire, `None` once the inter-byte timeout elapses
    fn recv_byte(&mut self) -> io::Result<Option<u8>>;

    /// Power-cycle the card so that it emits its ATR
    fn cold_reset(&mut self) -> io::Result<()>;
}

/// Serial reader wired to the card I/O line
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Open and configure the serial device
    pub fn open(config: &SessionConfig) -> Result<Self, CardError> {
        let port = serialport::new(config.port.as_str(), BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::Even)
            .stop_bits(StopBits::Two)
            .flow_control(FlowControl::None)
            .timeout(config.read_timeout)
            .open()
            .map_err(|source| CardError::PortOpen {
                port: config.port.clone(),
                source,
            })?;

        Ok(Self { port })
    }
}

impl Link for SerialLink {
    fn send_byte(&mut self, byte: u8) -> io::Result<()> {
        self.port.write_all(&[byte])?;
        self.port.flush()
    }

    fn recv_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn cold_reset(&mut self) -> io::Result<()> {
        self.port
            .write_data_terminal_ready(false)
            .map_err(io::Error::from)?;
        self.port
            .write_request_to_send(false)
            .map_err(io::Error::from)?;
        thread::sleep(RESET_DELAY);
        Ok(())
    }
}

/// An open card session
///
/// Owns the link exclusively; dropping the transport releases the port.
pub struct Transport<L: Link = SerialLink> {
    link: L,
    debug: bool,
    atr: Vec<u8>,
}

impl Transport<SerialLink> {
    /// Open the serial reader, reset the card and capture its ATR
    pub fn open(config: &SessionConfig) -> Result<Self, CardError> {
        let link = SerialLink::open(config)?;
        info!(port = %config.port, "Serial port opened");
        Self::connect(link, config.debug)
    }
}

impl<L: Link> Transport<L> {
    /// Reset the card behind an already open link and capture its ATR
    pub fn connect(mut link: L, debug: bool) -> Result<Self, CardError> {
        link.cold_reset()?;

        let mut transport = Self {
            link,
            debug,
            atr: Vec::new(),
        };
        transport.atr = transport.read(READ_UNTIL_IDLE)?;
        if transport.atr.is_empty() {
            return Err(CardError::NoAnswerToReset);
        }

        info!(atr = %hex::encode_upper(&transport.atr), "Card answered to reset");
        Ok(transport)
    }

    /// Answer To Reset captured when the session was opened
    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    fn send_echoed(&mut self, byte: u8) -> Result<(), CardError> {
        self.link.send_byte(byte)?;
        let echoed = self.link.recv_byte()?;
        if echoed != Some(byte) {
            return Err(CardError::EchoMismatch { sent: byte, echoed });
        }
        Ok(())
    }

    /// Send a raw command, verifying every echo and the procedure byte
    pub fn write(&mut self, command: &[u8]) -> Result<(), CardError> {
        if command.len() < HEADER_LEN {
            return Err(CardError::CommandTooShort(command.len()));
        }
        if self.debug {
            debug!(data = %hex::encode_upper(command), "Sending");
        }

        let (header, body) = command.split_at(HEADER_LEN);
        for &byte in header {
            self.send_echoed(byte)?;
        }

        let (cla, ins) = (header[0], header[1]);
        if cla == CLA_GSM || cla == CLA_UICC {
            let ack = self.link.recv_byte()?;
            if ack != Some(ins) {
                return Err(CardError::ProcedureByte { expected: ins, got: ack });
            }
        } else {
            warn!(
                cla = %format!("{cla:02X}"),
                "Class byte has no known procedure byte handling, acknowledgement not checked"
            );
        }

        for &byte in body {
            self.send_echoed(byte)?;
        }
        Ok(())
    }

    /// Collect up to `max` bytes, stopping early when the line goes idle
    pub fn read(&mut self, max: usize) -> Result<Vec<u8>, CardError> {
        let mut data = Vec::with_capacity(max.min(READ_UNTIL_IDLE));
        while data.len() < max {
            match self.link.recv_byte()? {
                Some(byte) => data.push(byte),
                None => break,
            }
        }

        if self.debug {
            debug!(data = %hex::encode_upper(&data), "Received");
        }
        Ok(data)
    }

    /// Read until the line is idle
    pub fn drain(&mut self) -> Result<Vec<u8>, CardError> {
        self.read(READ_UNTIL_IDLE)
    }

    /// Send a command and compare the answer byte for byte
    ///
    /// # Returns
    /// * `Ok(true)` - The card answered exactly `expected`
    /// * `Ok(false)` - Any other answer; trailing bytes are drained and logged
    pub fn send_check(&mut self, command: &[u8], expected: &[u8]) -> Result<bool, CardError> {
        self.write(command)?;
        let mut answer = self.read(expected.len())?;

        if answer == expected {
            return Ok(true);
        }

        answer.extend(self.drain()?);
        warn!(
            command = %hex::encode_upper(command),
            expected = %hex::encode_upper(expected),
            answer = %hex::encode_upper(&answer),
            "Unexpected answer from card"
        );
        Ok(false)
    }

    /// Send a built command and read `expected_len` data bytes plus status word
    pub fn transmit(
        &mut self,
        command: &ApduCommand,
        expected_len: usize,
    ) -> Result<ApduResponse, CardError> {
        self.write(&command.build())?;
        let raw = self.read(expected_len + 2)?;
        ApduResponse::from_bytes(raw, expected_len + 2)
    }

    /// Release the link
    pub fn close(self) {
        info!("Card session closed");
    }
}
