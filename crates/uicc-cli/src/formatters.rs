//! File content formatters for human-readable output

use clap::ValueEnum;
use uicc_common::codec::{bcd_to_ascii, decode_imsi, decode_isdn};

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatMode {
    /// Raw hex output
    Raw,
    /// Decoded values
    Human,
}

impl FormatMode {
    pub fn description(&self) -> &'static str {
        match self {
            FormatMode::Raw => "Raw",
            FormatMode::Human => "Human-Readable",
        }
    }
}

/// Format the content of a file based on its name
pub fn format_value(file: &str, value: &[u8], mode: FormatMode) -> String {
    if mode == FormatMode::Raw {
        return hex::encode_upper(value);
    }

    match file {
        "ICCID" => bcd_to_ascii(value),

        "IMSI" => decode_imsi(value),

        // Dialling number in the record tail
        "MSISDN" => {
            let number = decode_isdn(value);
            if number.is_empty() {
                "(not set)".to_string()
            } else {
                number
            }
        }

        // Display condition byte, then the name padded with 0xFF
        "Service Provider Name" => printable(value.get(1..).unwrap_or_default()),

        _ => hex::encode_upper(value),
    }
}

/// Keep only printable ASCII characters
pub fn printable(value: &[u8]) -> String {
    value
        .iter()
        .filter(|b| b.is_ascii_graphic() || **b == b' ')
        .map(|&b| b as char)
        .collect()
}
