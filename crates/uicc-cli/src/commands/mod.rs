pub mod authenticate;
pub mod program;
pub mod read;

use anyhow::{bail, Context, Result};
use uicc_card::{CardError, FileAccess};
use uicc_milenage::Block;

use crate::formatters::{self, FormatMode};

/// Read a file and print its first element
///
/// Files the card refuses are reported and skipped; transport failures abort.
pub(crate) fn display_file<C: FileAccess>(
    card: &mut C,
    label: &str,
    file: &str,
    mode: FormatMode,
) -> Result<Option<Vec<u8>>> {
    match card.read_file(file) {
        Ok(content) => {
            let first = content.into_iter().next().unwrap_or_default();
            println!("{}: {}", label, formatters::format_value(file, &first, mode));
            Ok(Some(first))
        }
        Err(err) => skip_recoverable(err, file).map(|()| None),
    }
}

fn skip_recoverable(err: CardError, file: &str) -> Result<()> {
    if err.is_fatal() {
        return Err(err).with_context(|| format!("reading {}", file));
    }
    println!("{}: unavailable ({})", file, err);
    Ok(())
}

/// Parse a 128-bit value given as 32 hex digits
pub(crate) fn parse_block(what: &str, value: &str) -> Result<Block> {
    let bytes = hex::decode(value).with_context(|| format!("invalid hex string for {}", what))?;
    match Block::try_from(bytes.as_slice()) {
        Ok(block) => Ok(block),
        Err(_) => bail!("{} must be 16 bytes (32 hex digits), got {} bytes", what, bytes.len()),
    }
}
