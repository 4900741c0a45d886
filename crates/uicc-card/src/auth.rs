//! Milenage challenge and SQN resynchronization
//!
//! The card's sequence number is unknown to a freshly provisioned network.
//! A probe challenge with SQN 0 makes the card answer with AUTS, from which
//! its SQN is recovered. A second challenge just above that value confirms
//! the keys and tells the operator which SQN to configure in the HSS.

use rand::{CryptoRng, RngCore};
use thiserror::Error;
use tracing::{debug, info};
use uicc_milenage::Milenage;

use crate::error::CardError;

pub use uicc_milenage::{Amf, Block, Sqn, Vector as AuthVector};

/// Distance between the card SQN and the one used to confirm
pub const SQN_RESYNC_MARGIN: u64 = 32;

/// Largest 48-bit sequence number
pub const SQN_MAX: u64 = (1 << 48) - 1;

/// Length of an AUTS token
pub const AUTS_LEN: usize = 14;

/// Card side of an authentication exchange
pub trait Authenticate {
    /// Send RAND and AUTN, returning the items the card answered with
    ///
    /// One item (AUTS) means the card refused the SQN, four items
    /// (RES, CK, IK, Kc) mean success, none means the challenge failed.
    fn authenticate(&mut self, rand: &Block, autn: &Block) -> Result<Vec<Vec<u8>>, CardError>;
}

/// Network side Milenage primitive
pub trait MilenageAlgorithm {
    fn derive_opc(&self, k: &Block, op: &Block) -> Block;

    fn generate(&self, opc: &Block, amf: &Amf, k: &Block, sqn: &Sqn, rand: &Block) -> AuthVector;

    /// Recover SQN_MS, `None` if MAC-S does not verify
    fn decode_auts(&self, opc: &Block, k: &Block, rand: &Block, auts: &[u8; AUTS_LEN])
        -> Option<Sqn>;
}

/// 3GPP TS 35.206 Milenage on AES-128
#[derive(Debug, Clone, Copy, Default)]
pub struct Milenage3gpp;

impl MilenageAlgorithm for Milenage3gpp {
    fn derive_opc(&self, k: &Block, op: &Block) -> Block {
        uicc_milenage::compute_opc(k, op)
    }

    fn generate(&self, opc: &Block, amf: &Amf, k: &Block, sqn: &Sqn, rand: &Block) -> AuthVector {
        Milenage::new(k, opc).generate(amf, sqn, rand)
    }

    fn decode_auts(
        &self,
        opc: &Block,
        k: &Block,
        rand: &Block,
        auts: &[u8; AUTS_LEN],
    ) -> Option<Sqn> {
        Milenage::new(k, opc).auts_sqn(rand, auts)
    }
}

/// Subscriber key material
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub k: Block,
    pub opc: Block,
}

impl Credentials {
    pub fn new(k: Block, opc: Block) -> Self {
        Self { k, opc }
    }

    /// Derive OPc from the operator constant OP
    pub fn with_op<M: MilenageAlgorithm>(milenage: &M, k: Block, op: &Block) -> Self {
        let opc = milenage.derive_opc(&k, op);
        Self { k, opc }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}

pub fn sqn_to_u64(sqn: &Sqn) -> u64 {
    sqn.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// 48-bit big-endian layout of `value`; higher bits are dropped
pub fn u64_to_sqn(value: u64) -> Sqn {
    let mut sqn = [0u8; 6];
    sqn.copy_from_slice(&value.to_be_bytes()[2..]);
    sqn
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Card(#[from] CardError),

    #[error("card answered the probe with {items} items instead of AUTS; Ki or OPc is probably wrong")]
    ChallengeRejected { items: usize },

    #[error("AUTS has {0} bytes instead of 14")]
    MalformedAuts(usize),

    #[error("AUTS does not verify with these keys")]
    AutsUndecodable,

    #[error("card SQN {0} cannot be advanced within 48 bits")]
    SqnOverflow(u64),

    #[error("card refused the challenge with SQN {sqn} ({items} items returned)")]
    ConfirmRejected { sqn: u64, items: usize },

    #[error("card vectors for SQN {sqn} differ from the computed RES/CK/IK")]
    VectorMismatch { sqn: u64 },
}

impl AuthError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuthError::Card(e) if e.is_fatal())
    }
}

/// Settings of the resynchronization exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncConfig {
    /// RAND of the probe challenge
    pub probe_rand: Block,
    /// AMF of both challenges
    pub amf: Amf,
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            probe_rand: [0u8; 16],
            amf: [0u8; 2],
        }
    }
}

/// Outcome of a successful resynchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resynchronized {
    /// SQN recovered from the card's AUTS
    pub card_sqn: u64,
    /// SQN the card accepted in the confirm round
    pub sqn: u64,
}

impl Resynchronized {
    /// Value to configure as the subscriber SQN in the network
    pub fn network_sqn(&self) -> u64 {
        self.sqn + SQN_RESYNC_MARGIN
    }
}

/// Two-round resynchronization driver
pub struct Resync<M> {
    milenage: M,
    config: ResyncConfig,
}

impl<M: MilenageAlgorithm> Resync<M> {
    pub fn new(milenage: M, config: ResyncConfig) -> Self {
        Self { milenage, config }
    }

    /// Run probe and confirm rounds against `card`
    pub fn run<A, R>(
        &self,
        card: &mut A,
        credentials: &Credentials,
        rng: &mut R,
    ) -> Result<Resynchronized, AuthError>
    where
        A: Authenticate,
        R: RngCore + CryptoRng,
    {
        let (k, opc, amf) = (&credentials.k, &credentials.opc, &self.config.amf);

        let rand = self.config.probe_rand;
        let probe = self.milenage.generate(opc, amf, k, &[0u8; 6], &rand);
        let items = card.authenticate(&rand, &probe.autn)?;
        let [auts] = items.as_slice() else {
            return Err(AuthError::ChallengeRejected { items: items.len() });
        };

        let auts: &[u8; AUTS_LEN] = auts
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::MalformedAuts(auts.len()))?;
        let card_sqn = self
            .milenage
            .decode_auts(opc, k, &rand, auts)
            .map(|sqn| sqn_to_u64(&sqn))
            .ok_or(AuthError::AutsUndecodable)?;

        let sqn = card_sqn
            .checked_add(SQN_RESYNC_MARGIN)
            .filter(|sqn| *sqn <= SQN_MAX)
            .ok_or(AuthError::SqnOverflow(card_sqn))?;
        info!(card_sqn, sqn, "Card SQN recovered");

        let mut rand = [0u8; 16];
        rng.fill_bytes(&mut rand);
        let vector = self.milenage.generate(opc, amf, k, &u64_to_sqn(sqn), &rand);
        debug!(
            rand = %hex::encode_upper(rand),
            autn = %hex::encode_upper(vector.autn),
            "Confirm challenge"
        );

        let items = card.authenticate(&rand, &vector.autn)?;
        if items.len() != 4 {
            return Err(AuthError::ConfirmRejected {
                sqn,
                items: items.len(),
            });
        }
        let expected: [&[u8]; 3] = [&vector.res, &vector.ck, &vector.ik];
        if items.iter().zip(expected).any(|(item, value)| item[..] != *value) {
            return Err(AuthError::VectorMismatch { sqn });
        }

        info!(sqn, "Card accepted the challenge");
        Ok(Resynchronized { card_sqn, sqn })
    }
}
