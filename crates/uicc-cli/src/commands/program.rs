use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::{info, warn};
use uicc_card::file::chv;
use uicc_card::{Credentials, FileAccess, Milenage3gpp, SessionConfig, Sim, Usim};
use uicc_common::codec::{encode_iccid, encode_imsi, encode_isdn, encode_mcc_mnc, make_bcd};
use uicc_milenage::Block;

use super::parse_block;
use crate::formatters::FormatMode;

/// GSM service table enabling the usual services (3GPP TS 51.011)
const SIM_SERVICE_TABLE: &str = "ff33ffff00003f033000f0c3";
/// USIM service table (3GPP TS 31.102)
const USIM_SERVICE_TABLE: &str = "867F1F1C230E0000400050";
/// Milenage rotation constants r1..r5
const MILENAGE_R: &str = "4000204060";
/// E-UTRAN access technology identifier
const ACT_EUTRAN: [u8; 2] = [0x40, 0x00];
/// Location area code, update status and routing tail of a fresh location file
const LOCI_TAIL: [u8; 4] = [0x00, 0x00, 0xFF, 0x01];

#[derive(Args)]
pub struct ProgramArgs {
    /// ADM code of the card: 8 characters, or 16 hex digits
    #[arg(long)]
    pub adm: String,

    /// ICCID to set
    #[arg(long)]
    pub iccid: Option<String>,

    /// IMSI to set; the home PLMN files are derived from it
    #[arg(long)]
    pub imsi: Option<String>,

    /// OPc as 32 hex digits, must match the HSS
    #[arg(long, conflicts_with = "op")]
    pub opc: Option<String>,

    /// OP as 32 hex digits, used with --key to compute OPc
    #[arg(long, requires = "key")]
    pub op: Option<String>,

    /// Subscriber phone number
    #[arg(long)]
    pub isdn: Option<String>,

    /// Access control class as hex digits
    #[arg(long)]
    pub acc: Option<String>,

    /// Authentication key Ki as 32 hex digits, must match the HSS
    #[arg(long)]
    pub key: Option<String>,

    /// Number of MNC digits in the IMSI
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(2..=3))]
    pub mnc_size: u8,

    /// Service provider name shown by the handset
    #[arg(long, default_value = "open cells")]
    pub spn: String,
}

/// Values to write, validated before the card is touched
#[derive(Debug, Default)]
pub struct Profile {
    pub adm: Vec<u8>,
    pub iccid: Option<Vec<u8>>,
    pub imsi: Option<Vec<u8>>,
    pub plmn: Option<[u8; 3]>,
    pub isdn: Option<String>,
    pub acc: Option<Vec<u8>>,
    pub key: Option<Block>,
    pub opc: Option<Block>,
    pub mnc_len: u8,
    pub spn: String,
}

impl Profile {
    pub fn from_args(args: &ProgramArgs) -> Result<Self> {
        let key = args
            .key
            .as_deref()
            .map(|key| parse_block("key", key))
            .transpose()?;

        let opc = match (&args.opc, &args.op, key) {
            (Some(opc), _, _) => Some(parse_block("OPc", opc)?),
            (None, Some(op), Some(key)) => {
                let op = parse_block("OP", op)?;
                let credentials = Credentials::with_op(&Milenage3gpp, key, &op);
                println!(
                    "Computed OPc from OP and Ki as: {}",
                    hex::encode_upper(credentials.opc)
                );
                Some(credentials.opc)
            }
            (None, Some(_), None) => bail!("--op requires --key"),
            (None, None, _) => None,
        };

        let (imsi, plmn) = match &args.imsi {
            Some(imsi) => {
                let encoded = encode_imsi(imsi).context("invalid IMSI")?;
                (Some(encoded), Some(home_plmn(imsi, args.mnc_size as usize)?))
            }
            None => (None, None),
        };

        let iccid = args
            .iccid
            .as_deref()
            .map(encode_iccid)
            .transpose()
            .context("invalid ICCID")?;

        let acc = args
            .acc
            .as_deref()
            .map(hex::decode)
            .transpose()
            .context("invalid hex string for access control class")?;

        Ok(Self {
            adm: adm_code(&args.adm)?,
            iccid,
            imsi,
            plmn,
            isdn: args.isdn.clone(),
            acc,
            key,
            opc,
            mnc_len: args.mnc_size,
            spn: args.spn.clone(),
        })
    }
}

/// Decode the ADM code
///
/// 16 characters are taken as hex digits of the 8-byte code, 8 characters
/// are presented as they are. The hex digits are not nibble-swapped, unlike
/// the BCD packing some older programming tools apply to ADM codes.
pub fn adm_code(adm: &str) -> Result<Vec<u8>> {
    match adm.len() {
        16 => hex::decode(adm).context("invalid hex string for ADM code"),
        8 => Ok(adm.as_bytes().to_vec()),
        n => bail!("ADM code must be 8 characters or 16 hex digits, got {}", n),
    }
}

/// PLMN identity built from the MCC and MNC at the head of an IMSI
pub fn home_plmn(imsi: &str, mnc_len: usize) -> Result<[u8; 3]> {
    let (Some(mcc), Some(mnc)) = (imsi.get(..3), imsi.get(3..3 + mnc_len)) else {
        bail!("IMSI {} is too short to hold MCC and MNC", imsi);
    };
    encode_mcc_mnc(mcc, mnc).context("invalid IMSI")
}

/// One file update of a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub name: &'static str,
    pub records: Vec<Vec<u8>>,
    pub fill: bool,
    /// Refused updates of optional files are only logged
    pub required: bool,
}

impl FileWrite {
    fn new(name: &'static str, content: Vec<u8>) -> Self {
        Self {
            name,
            records: vec![content],
            fill: false,
            required: true,
        }
    }

    fn records(name: &'static str, records: Vec<Vec<u8>>) -> Self {
        Self {
            records,
            ..Self::new(name, Vec::new())
        }
    }

    fn filled(mut self) -> Self {
        self.fill = true;
        self
    }

    fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

fn location(unknown_len: usize, plmn: &[u8; 3]) -> Vec<u8> {
    let mut loci = vec![0xFF; unknown_len];
    loci.extend_from_slice(plmn);
    loci.extend_from_slice(&LOCI_TAIL);
    loci
}

fn spn_content(spn: &str) -> Vec<u8> {
    let mut content = vec![0x01];
    content.extend_from_slice(spn.as_bytes());
    content
}

fn hex_content(value: &str) -> Result<Vec<u8>> {
    Ok(make_bcd(value, false, 0)?)
}

/// Files of the GSM directory tree, written with class A0 commands
pub fn sim_profile(profile: &Profile) -> Result<Vec<FileWrite>> {
    let mut writes = Vec::new();

    if let Some(iccid) = &profile.iccid {
        writes.push(FileWrite::new("ICCID", iccid.clone()));
    }
    writes.push(FileWrite::new("Extended language preference", b"en".to_vec()));
    writes.push(FileWrite::new("language preference", vec![0x01]));

    if let (Some(imsi), Some(plmn)) = (&profile.imsi, &profile.plmn) {
        writes.push(FileWrite::new("IMSI", imsi.clone()));
        writes.push(FileWrite::new("PLMN selector", plmn.to_vec()).filled());
        writes.push(FileWrite::new("Equivalent home PLMN", plmn.to_vec()));
        writes.push(FileWrite::new("Location information", location(4, plmn)));
    }

    if let Some(acc) = &profile.acc {
        writes.push(FileWrite::new("Access control class", acc.clone()));
    }

    writes.push(FileWrite::new("Administrative data", vec![0, 0, 0, profile.mnc_len]));
    writes.push(FileWrite::new("Service Provider Name", spn_content(&profile.spn)).filled());
    writes.push(FileWrite::new("Higher Priority PLMN search period", vec![0x02]));
    for name in [
        "Forbidden PLMN",
        "Group Identifier Level 1",
        "Group Identifier Level 2",
        "emergency call codes",
    ] {
        writes.push(FileWrite::new(name, Vec::new()).filled());
    }
    writes.push(FileWrite::new("SIM service table", hex_content(SIM_SERVICE_TABLE)?));
    writes.push(FileWrite::new("SMSC", Vec::new()).filled());

    Ok(writes)
}

/// Files of the USIM application and the card vendor's Milenage settings
pub fn usim_profile(profile: &Profile) -> Result<Vec<FileWrite>> {
    let mut writes = Vec::new();

    if let Some(key) = &profile.key {
        writes.push(FileWrite::new("GR Ki", key.to_vec()));
    }
    if let Some(opc) = &profile.opc {
        writes.push(FileWrite::new("GR OPc", opc.to_vec()));
    }

    writes.push(FileWrite::new("GR R", hex_content(MILENAGE_R)?).optional());
    let constants = [0u8, 1, 2, 4, 8]
        .iter()
        .map(|&last| {
            let mut c = vec![0u8; 16];
            c[15] = last;
            c
        })
        .collect();
    writes.push(FileWrite::records("GR C", constants).optional());

    writes.push(FileWrite::new("language preference", b"en".to_vec()));
    writes.push(FileWrite::new("SMSC", vec![0xFF; 40]));

    if let Some(acc) = &profile.acc {
        writes.push(FileWrite::new("Access control class", acc.clone()));
    }

    if let (Some(imsi), Some(plmn)) = (&profile.imsi, &profile.plmn) {
        writes.push(FileWrite::new("IMSI", imsi.clone()));

        let mut with_act = plmn.to_vec();
        with_act.extend_from_slice(&ACT_EUTRAN);
        for name in [
            "PLMN selector with Access Technology",
            "Operator controlled PLMN selector with Access Technology",
            "Home PLMN selector with Access Technology",
        ] {
            writes.push(FileWrite::new(name, with_act.clone()).filled());
        }

        writes.push(FileWrite::new("Equivalent Home PLMN", plmn.to_vec()));
        writes.push(FileWrite::new("PS Location information", location(7, plmn)));
        writes.push(FileWrite::new("CS Location information", location(4, plmn)));
    }

    writes.push(FileWrite::new("Administrative data", vec![0, 0, 0, profile.mnc_len]));
    writes.push(FileWrite::new("Service Provider Name", spn_content(&profile.spn)).filled());
    writes.push(FileWrite::new("Higher Priority PLMN search period", vec![0x02]));
    writes.push(FileWrite::new("Forbidden PLMNs", vec![0xFF; 12]));
    writes.push(FileWrite::new("Group Identifier Level 1", vec![0xFF; 4]));
    writes.push(FileWrite::new("Group Identifier Level 2", vec![0xFF; 4]));
    writes.push(FileWrite::records("emergency call codes", vec![vec![0xFF; 18]; 4]));
    writes.push(FileWrite::new("USIM service table", hex_content(USIM_SERVICE_TABLE)?));

    Ok(writes)
}

fn apply<C: FileAccess>(card: &mut C, writes: &[FileWrite]) -> Result<()> {
    for write in writes {
        match card.write_file(write.name, &write.records, write.fill, false) {
            Ok(()) => info!(file = write.name, "updated"),
            Err(err) if !write.required && !err.is_fatal() => {
                warn!(file = write.name, error = %err, "update refused, skipped");
            }
            Err(err) => return Err(err).with_context(|| format!("can't set {}", write.name)),
        }
    }
    Ok(())
}

/// MSISDN records are sized by the card, so the number is encoded on the spot
fn write_msisdn<C: FileAccess>(card: &mut C, isdn: &str) -> Result<()> {
    let record_len = card
        .file_record_size("MSISDN")?
        .context("MSISDN is not a record file")?;
    let record = encode_isdn(isdn, record_len).context("invalid MSISDN")?;
    card.write_file("MSISDN", &[record], false, false)
        .with_context(|| format!("can't set msisdn {}", isdn))
}

fn unlock<C: FileAccess>(card: &mut C, adm: &[u8]) -> Result<()> {
    if !card.verify_chv(chv::ADM, adm)? {
        bail!("ADM code refused by the card");
    }
    Ok(())
}

pub fn cmd_program(session: &SessionConfig, args: &ProgramArgs, mode: FormatMode) -> Result<()> {
    println!("UICC Programmer\n");

    let profile = Profile::from_args(args)?;

    println!("=== Programming GSM Files ===\n");
    let mut sim = Sim::open(session)
        .with_context(|| format!("failed to open the card reader on {}", session.port))?;
    unlock(&mut sim, &profile.adm)?;
    apply(&mut sim, &sim_profile(&profile)?)?;
    if let Some(isdn) = &profile.isdn {
        write_msisdn(&mut sim, isdn)?;
    }
    sim.into_transport().close();
    println!("GSM files updated\n");

    println!("=== Programming USIM Files ===\n");
    let mut usim = Usim::open(session)
        .with_context(|| format!("failed to open the card reader on {}", session.port))?;
    usim.select_application()
        .context("selecting the USIM application")?;
    unlock(&mut usim, &profile.adm)?;
    apply(&mut usim, &usim_profile(&profile)?)?;
    if let Some(isdn) = &profile.isdn {
        write_msisdn(&mut usim, isdn)?;
    }
    usim.into_transport().close();
    println!("USIM files updated\n");

    println!("=== Reading Back ===\n");
    super::read::cmd_read(session, false, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ProgramArgs {
        ProgramArgs {
            adm: "12345678".to_string(),
            iccid: Some("89330061100000000822".to_string()),
            imsi: Some("208920100001100".to_string()),
            opc: None,
            op: None,
            isdn: Some("33611223344".to_string()),
            acc: Some("0001".to_string()),
            key: Some("465b5ce8b199b49faa5f0a2ee238a6bc".to_string()),
            mnc_size: 2,
            spn: "open cells".to_string(),
        }
    }

    fn find<'a>(writes: &'a [FileWrite], name: &str) -> &'a FileWrite {
        writes.iter().find(|w| w.name == name).unwrap()
    }

    #[test]
    fn test_adm_code() {
        assert_eq!(adm_code("12345678").unwrap(), b"12345678".to_vec());
        assert_eq!(
            adm_code("3132333435363738").unwrap(),
            b"12345678".to_vec()
        );
        // High nibble first, no BCD swap
        assert_eq!(adm_code("0123456789ABCDEF").unwrap()[0], 0x01);
        assert!(adm_code("1234").is_err());
        assert!(adm_code("313233343536373G").is_err());
    }

    #[test]
    fn test_home_plmn() {
        assert_eq!(home_plmn("208920100001100", 2).unwrap(), [0x02, 0xF8, 0x29]);
        assert_eq!(home_plmn("310410123456789", 3).unwrap(), [0x13, 0x00, 0x14]);
        assert!(home_plmn("2089", 2).is_err());
    }

    #[test]
    fn test_opc_from_op() {
        let mut args = args();
        args.op = Some("cdc202d5123e20f62b6d676ac72cb318".to_string());

        let profile = Profile::from_args(&args).unwrap();
        // 3GPP TS 35.207 test set 1
        assert_eq!(
            hex::encode(profile.opc.unwrap()),
            "cd63cb71954a9f4e48a5994e37a02baf"
        );
    }

    #[test]
    fn test_sim_profile() {
        let profile = Profile::from_args(&args()).unwrap();
        let writes = sim_profile(&profile).unwrap();

        let loci = find(&writes, "Location information");
        assert_eq!(
            hex::encode_upper(&loci.records[0]),
            "FFFFFFFF02F8290000FF01"
        );
        assert!(find(&writes, "PLMN selector").fill);
        assert_eq!(find(&writes, "Administrative data").records[0], vec![0, 0, 0, 2]);
        assert_eq!(find(&writes, "Access control class").records[0], vec![0x00, 0x01]);
        assert_eq!(
            hex::encode(&find(&writes, "SIM service table").records[0]),
            SIM_SERVICE_TABLE
        );

        let spn = find(&writes, "Service Provider Name");
        assert_eq!(spn.records[0][0], 0x01);
        assert_eq!(&spn.records[0][1..], b"open cells");
        assert!(spn.fill);
    }

    #[test]
    fn test_usim_profile() {
        let profile = Profile::from_args(&args()).unwrap();
        let writes = usim_profile(&profile).unwrap();

        assert_eq!(writes[0].name, "GR Ki");
        let c = find(&writes, "GR C");
        assert_eq!(c.records.len(), 5);
        assert_eq!(c.records[4][15], 8);
        assert!(!c.required);

        let hplmn = find(&writes, "Home PLMN selector with Access Technology");
        assert_eq!(hex::encode_upper(&hplmn.records[0]), "02F8294000");

        let ps = find(&writes, "PS Location information");
        assert_eq!(
            hex::encode_upper(&ps.records[0]),
            "FFFFFFFFFFFFFF02F8290000FF01"
        );
        assert_eq!(find(&writes, "emergency call codes").records.len(), 4);
    }

    #[test]
    fn test_profile_without_identity() {
        let mut args = args();
        args.imsi = None;
        args.acc = None;

        let profile = Profile::from_args(&args).unwrap();
        let writes = usim_profile(&profile).unwrap();
        assert!(writes.iter().all(|w| w.name != "IMSI"));
        assert!(writes.iter().all(|w| w.name != "Access control class"));
    }

    #[test]
    fn test_invalid_imsi() {
        let mut args = args();
        args.imsi = Some("20892A".to_string());
        assert!(Profile::from_args(&args).is_err());
    }
}
