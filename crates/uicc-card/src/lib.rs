//! UICC Card - SIM/USIM access over a single-wire serial reader
//!
//! This crate talks to GSM SIM and UICC/USIM cards through a reader whose
//! I/O line echoes every byte. It provides the echo-verified transport, the
//! APDU layer, symbolic file access for both card generations and the
//! Milenage SQN resynchronization exchange.

pub mod apdu;
pub mod auth;
pub mod error;
pub mod file;
pub mod paths;
pub mod sim;
pub mod transport;
pub mod usim;

pub use auth::{
    AuthError, AuthVector, Authenticate, Credentials, Milenage3gpp, MilenageAlgorithm,
    Resync, ResyncConfig, Resynchronized,
};
pub use error::CardError;
pub use file::{FileAccess, FileDescriptor, FileStructure};
pub use sim::Sim;
pub use transport::{Link, SerialLink, SessionConfig, Transport};
pub use usim::Usim;
