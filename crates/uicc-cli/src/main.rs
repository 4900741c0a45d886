use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uicc_card::SessionConfig;

mod commands;
mod formatters;

use commands::authenticate::AuthenticateArgs;
use commands::program::ProgramArgs;
use formatters::FormatMode;

#[derive(Parser)]
#[command(name = "uicc-prog")]
#[command(about = "SIM/USIM programmer - read, program and authenticate cards on a serial reader")]
#[command(version)]
struct Cli {
    /// Serial port of the card reader
    #[arg(short, long, global = true, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Log every byte exchanged with the card
    #[arg(short, long, global = true)]
    debug: bool,

    /// Output format mode
    #[arg(short, long, global = true, value_enum, default_value_t = FormatMode::Human)]
    format: FormatMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the identity files of the card
    Read {
        /// Use the GSM command set (class A0) instead of the USIM application
        #[arg(long)]
        legacy: bool,
    },
    /// Write a subscriber profile to the card, then read it back
    Program(ProgramArgs),
    /// Run Milenage authentication and recover the card's sequence number
    Authenticate(AuthenticateArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG overrides the default level; --debug raises it so the
    // line dumps are shown
    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let session = SessionConfig::new(&cli.port).debug(cli.debug);

    let result = match cli.command {
        Command::Read { legacy } => commands::read::cmd_read(&session, legacy, cli.format),
        Command::Program(args) => commands::program::cmd_program(&session, &args, cli.format),
        Command::Authenticate(args) => commands::authenticate::cmd_authenticate(&session, &args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
