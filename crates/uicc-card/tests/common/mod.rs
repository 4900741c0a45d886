//! Scripted card simulator for integration tests
//!
//! `MockCard` stands in for a card behind an echoing single-wire reader. It
//! echoes every byte, acknowledges headers of the GSM and UICC classes with
//! the instruction byte, and answers each complete command with the next
//! scripted reply. Once the script runs out the card stays silent.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use uicc_card::transport::{Link, Transport};

/// ATR of a typical programmable UICC
pub const ATR: &str = "3B9F96801FC78031A073BE21136743200718000001A5";

/// Instructions whose P3 counts outgoing data bytes
const DATA_INS: [u8; 6] = [0xA4, 0xD6, 0xDC, 0x20, 0x24, 0x88];

pub struct MockCard {
    atr: Vec<u8>,
    inbound: VecDeque<u8>,
    command: Vec<u8>,
    script: VecDeque<Vec<u8>>,
    /// Every complete command received, in order
    pub commands: Vec<Vec<u8>>,
}

impl MockCard {
    pub fn new() -> Self {
        Self {
            atr: hex::decode(ATR).unwrap(),
            inbound: VecDeque::new(),
            command: Vec::new(),
            script: VecDeque::new(),
            commands: Vec::new(),
        }
    }

    /// Queue the answer to the next command, as hex
    pub fn reply(mut self, answer: &str) -> Self {
        self.script.push_back(hex::decode(answer).unwrap());
        self
    }

    /// Queue the answer to the next command, as bytes
    pub fn reply_bytes(mut self, answer: Vec<u8>) -> Self {
        self.script.push_back(answer);
        self
    }

    /// Commands received so far, as upper-case hex
    pub fn sent(&self) -> Vec<String> {
        self.commands.iter().map(hex::encode_upper).collect()
    }

    pub fn script_exhausted(&self) -> bool {
        self.script.is_empty()
    }

    fn command_len(&self) -> usize {
        let (ins, p3) = (self.command[1], self.command[4]);
        if DATA_INS.contains(&ins) {
            5 + p3 as usize
        } else {
            5
        }
    }
}

impl Link for MockCard {
    fn send_byte(&mut self, byte: u8) -> io::Result<()> {
        self.inbound.push_back(byte);
        self.command.push(byte);

        if self.command.len() < 5 {
            return Ok(());
        }
        if self.command.len() == 5 && matches!(self.command[0], 0xA0 | 0x00) {
            self.inbound.push_back(self.command[1]);
        }
        if self.command.len() == self.command_len() {
            self.commands.push(std::mem::take(&mut self.command));
            if let Some(answer) = self.script.pop_front() {
                self.inbound.extend(answer);
            }
        }
        Ok(())
    }

    fn recv_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.inbound.pop_front())
    }

    fn cold_reset(&mut self) -> io::Result<()> {
        self.inbound.clear();
        self.command.clear();
        self.inbound.extend(self.atr.iter().copied());
        Ok(())
    }
}

/// Open a debug session on the scripted card
pub fn connect(card: MockCard) -> Transport<MockCard> {
    Transport::connect(card, true).unwrap()
}

/// FCP template wrapping `content`, as hex
pub fn fcp(content: &str) -> String {
    format!("62{:02X}{}", content.len() / 2, content)
}

/// Log sink shared with a test subscriber
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with log events written to the returned buffer
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, CapturedLogs) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_target(false)
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    (result, logs)
}
