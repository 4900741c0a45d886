use anyhow::{Context, Result};
use clap::Args;
use rand::rngs::OsRng;
use uicc_card::{
    Credentials, FileAccess, Milenage3gpp, Resync, ResyncConfig, SessionConfig, Usim,
};

use super::parse_block;

#[derive(Args)]
pub struct AuthenticateArgs {
    /// Authentication key Ki as 32 hex digits
    #[arg(long)]
    pub key: String,

    /// OPc as 32 hex digits
    #[arg(long, required_unless_present = "op", conflicts_with = "op")]
    pub opc: Option<String>,

    /// OP as 32 hex digits, OPc is computed from it
    #[arg(long)]
    pub op: Option<String>,
}

fn credentials(args: &AuthenticateArgs) -> Result<Credentials> {
    let key = parse_block("key", &args.key)?;
    match (&args.opc, &args.op) {
        (Some(opc), _) => Ok(Credentials::new(key, parse_block("OPc", opc)?)),
        (None, Some(op)) => Ok(Credentials::with_op(
            &Milenage3gpp,
            key,
            &parse_block("OP", op)?,
        )),
        (None, None) => anyhow::bail!("either --opc or --op is required"),
    }
}

pub fn cmd_authenticate(session: &SessionConfig, args: &AuthenticateArgs) -> Result<()> {
    println!("Milenage Authentication\n");

    let credentials = credentials(args)?;

    let mut usim = Usim::open(session)
        .with_context(|| format!("failed to open the card reader on {}", session.port))?;
    println!("ATR: {}", hex::encode_upper(usim.transport().atr()));

    let aid = usim
        .select_application()
        .context("selecting the USIM application")?;
    println!("USIM AID: {}", hex::encode_upper(aid));

    println!("\n=== Resynchronizing Sequence Number ===\n");
    let result = Resync::new(Milenage3gpp, ResyncConfig::default())
        .run(&mut usim, &credentials, &mut OsRng)
        .context("authentication failed")?;

    println!("Card SQN: {}", result.card_sqn);
    println!("Succeeded to authenticate with SQN: {}", result.sqn);
    println!("Set HSS SQN value as: {}", result.network_sqn());

    usim.into_transport().close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const K: &str = "465b5ce8b199b49faa5f0a2ee238a6bc";

    #[test]
    fn test_credentials_from_op() {
        let args = AuthenticateArgs {
            key: K.to_string(),
            opc: None,
            op: Some("cdc202d5123e20f62b6d676ac72cb318".to_string()),
        };
        let credentials = credentials(&args).unwrap();
        assert_eq!(
            hex::encode(credentials.opc),
            "cd63cb71954a9f4e48a5994e37a02baf"
        );
    }

    #[test]
    fn test_credentials_need_operator_constant() {
        let args = AuthenticateArgs {
            key: K.to_string(),
            opc: None,
            op: None,
        };
        assert!(credentials(&args).is_err());
    }
}
