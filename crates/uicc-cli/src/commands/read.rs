use anyhow::{Context, Result};
use tracing::warn;
use uicc_card::{FileAccess, SessionConfig, Sim, Usim};
use uicc_common::codec::{bcd_to_ascii, luhn};

use super::display_file;
use crate::formatters::FormatMode;

pub fn cmd_read(session: &SessionConfig, legacy: bool, mode: FormatMode) -> Result<()> {
    println!("UICC Reader - {} Mode\n", mode.description());

    if legacy {
        read_sim(session, mode)
    } else {
        read_usim(session, mode)
    }
}

fn read_sim(session: &SessionConfig, mode: FormatMode) -> Result<()> {
    let mut sim = Sim::open(session)
        .with_context(|| format!("failed to open the card reader on {}", session.port))?;
    println!("ATR: {}\n", hex::encode_upper(sim.transport().atr()));

    println!("=== GSM Files ===\n");
    display_file(&mut sim, "GSM IMSI", "IMSI", mode)?;
    // Only the first number is shown
    display_file(&mut sim, "GSM MSISDN", "MSISDN", mode)?;

    sim.into_transport().close();
    Ok(())
}

fn read_usim(session: &SessionConfig, mode: FormatMode) -> Result<()> {
    let mut usim = Usim::open(session)
        .with_context(|| format!("failed to open the card reader on {}", session.port))?;
    println!("ATR: {}\n", hex::encode_upper(usim.transport().atr()));

    println!("=== Card Identity ===\n");
    if let Some(iccid) = display_file(&mut usim, "ICCID", "ICCID", mode)? {
        let digits = bcd_to_ascii(&iccid);
        if !luhn(&digits) {
            warn!(iccid = %digits, "ICCID Luhn check digit is not valid");
        }
    }

    println!("\n=== USIM Application ===\n");
    match usim.select_application() {
        Ok(aid) => println!("AID: {}", hex::encode_upper(aid)),
        Err(err) if !err.is_fatal() => {
            println!("No USIM application selected ({})", err);
        }
        Err(err) => return Err(err).context("selecting the USIM application"),
    }

    display_file(&mut usim, "USIM IMSI", "IMSI", mode)?;
    display_file(&mut usim, "USIM MSISDN", "MSISDN", mode)?;
    display_file(
        &mut usim,
        "USIM Service Provider Name",
        "Service Provider Name",
        mode,
    )?;

    usim.into_transport().close();
    Ok(())
}
