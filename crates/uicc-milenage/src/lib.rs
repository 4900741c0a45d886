//! UICC Milenage - 3GPP authentication and key generation functions
//!
//! Implements f1, f1*, f2, f3, f4, f5 and f5* from 3GPP TS 35.206 on top of
//! AES-128, together with OPc derivation, AUTN construction and AUTS
//! verification as used by the resynchronization procedure (TS 33.102).
//!
//! # Example
//! ```
//! use uicc_milenage::Milenage;
//!
//! let k = [0x46; 16];
//! let op = [0xCD; 16];
//! let milenage = Milenage::with_op(&k, &op);
//! let vector = milenage.generate(&[0, 0], &[0; 6], &[0; 16]);
//! assert_eq!(vector.res.len(), 8);
//! ```

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;

/// 128-bit value: keys, OP/OPc, RAND and cipher blocks
pub type Block = [u8; 16];

/// Sequence number, 48 bits big-endian
pub type Sqn = [u8; 6];

/// Authentication management field
pub type Amf = [u8; 2];

/// AMF used when computing MAC-S for a resynchronization token
pub const RESYNC_AMF: Amf = [0x00, 0x00];

/// Values computed for one authentication challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vector {
    pub autn: Block,
    pub ik: Block,
    pub ck: Block,
    pub res: [u8; 8],
}

/// Milenage instance keyed with a subscriber key and operator variant
pub struct Milenage {
    cipher: Aes128,
    opc: Block,
}

fn xor(a: &Block, b: &Block) -> Block {
    let mut out = [0u8; 16];
    for (i, o) in out.iter_mut().enumerate() {
        *o = a[i] ^ b[i];
    }
    out
}

/// Cyclic left rotation by `bytes` bytes
fn rot(block: &Block, bytes: usize) -> Block {
    let mut out = [0u8; 16];
    for (i, o) in out.iter_mut().enumerate() {
        *o = block[(i + bytes) % 16];
    }
    out
}

fn constant(last: u8) -> Block {
    let mut c = [0u8; 16];
    c[15] = last;
    c
}

fn encrypt(cipher: &Aes128, block: &Block) -> Block {
    let mut buf = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut buf);
    let mut out = [0u8; 16];
    out.copy_from_slice(&buf);
    out
}

/// Derive OPc = E_K(OP) xor OP
pub fn compute_opc(k: &Block, op: &Block) -> Block {
    let cipher = Aes128::new(GenericArray::from_slice(k));
    xor(&encrypt(&cipher, op), op)
}

impl Milenage {
    /// Create an instance from K and an already derived OPc
    pub fn new(k: &Block, opc: &Block) -> Self {
        Self {
            cipher: Aes128::new(GenericArray::from_slice(k)),
            opc: *opc,
        }
    }

    /// Create an instance from K and the operator constant OP
    pub fn with_op(k: &Block, op: &Block) -> Self {
        Self::new(k, &compute_opc(k, op))
    }

    fn temp(&self, rand: &Block) -> Block {
        encrypt(&self.cipher, &xor(rand, &self.opc))
    }

    fn out1(&self, rand: &Block, sqn: &Sqn, amf: &Amf) -> Block {
        let mut in1 = [0u8; 16];
        in1[..6].copy_from_slice(sqn);
        in1[6..8].copy_from_slice(amf);
        in1[8..14].copy_from_slice(sqn);
        in1[14..].copy_from_slice(amf);

        // r1 = 64 bits, c1 = 0
        let input = xor(&self.temp(rand), &rot(&xor(&in1, &self.opc), 8));
        xor(&encrypt(&self.cipher, &input), &self.opc)
    }

    /// OUT2..OUT5: rotation in bytes and the last byte of the constant
    fn out(&self, temp: &Block, rotation: usize, c: u8) -> Block {
        let input = xor(&rot(&xor(temp, &self.opc), rotation), &constant(c));
        xor(&encrypt(&self.cipher, &input), &self.opc)
    }

    /// f1: network authentication code MAC-A
    pub fn f1(&self, rand: &Block, sqn: &Sqn, amf: &Amf) -> [u8; 8] {
        let out = self.out1(rand, sqn, amf);
        let mut mac = [0u8; 8];
        mac.copy_from_slice(&out[..8]);
        mac
    }

    /// f1*: resynchronization authentication code MAC-S
    pub fn f1_star(&self, rand: &Block, sqn: &Sqn, amf: &Amf) -> [u8; 8] {
        let out = self.out1(rand, sqn, amf);
        let mut mac = [0u8; 8];
        mac.copy_from_slice(&out[8..]);
        mac
    }

    /// f2, f3, f4 and f5: (RES, CK, IK, AK)
    pub fn f2345(&self, rand: &Block) -> ([u8; 8], Block, Block, Sqn) {
        let temp = self.temp(rand);

        let out2 = self.out(&temp, 0, 0x01);
        let ck = self.out(&temp, 4, 0x02);
        let ik = self.out(&temp, 8, 0x04);

        let mut res = [0u8; 8];
        res.copy_from_slice(&out2[8..]);
        let mut ak = [0u8; 6];
        ak.copy_from_slice(&out2[..6]);

        (res, ck, ik, ak)
    }

    /// f5*: anonymity key used to conceal SQN in AUTS
    pub fn f5_star(&self, rand: &Block) -> Sqn {
        let out5 = self.out(&self.temp(rand), 12, 0x08);
        let mut ak = [0u8; 6];
        ak.copy_from_slice(&out5[..6]);
        ak
    }

    /// Compute AUTN, IK, CK and RES for a challenge
    pub fn generate(&self, amf: &Amf, sqn: &Sqn, rand: &Block) -> Vector {
        let mac_a = self.f1(rand, sqn, amf);
        let (res, ck, ik, ak) = self.f2345(rand);

        let mut autn = [0u8; 16];
        for i in 0..6 {
            autn[i] = sqn[i] ^ ak[i];
        }
        autn[6..8].copy_from_slice(amf);
        autn[8..].copy_from_slice(&mac_a);

        Vector { autn, ik, ck, res }
    }

    /// Build the AUTS token a card returns on synchronization failure
    pub fn auts(&self, sqn_ms: &Sqn, rand: &Block) -> [u8; 14] {
        let ak = self.f5_star(rand);
        let mac_s = self.f1_star(rand, sqn_ms, &RESYNC_AMF);

        let mut auts = [0u8; 14];
        for i in 0..6 {
            auts[i] = sqn_ms[i] ^ ak[i];
        }
        auts[6..].copy_from_slice(&mac_s);
        auts
    }

    /// Recover SQN_MS from an AUTS token, verifying its MAC-S
    ///
    /// # Returns
    /// * `Some(Sqn)` - The card's sequence number
    /// * `None` - If MAC-S does not match (wrong K or OPc, or a corrupt token)
    pub fn auts_sqn(&self, rand: &Block, auts: &[u8; 14]) -> Option<Sqn> {
        let ak = self.f5_star(rand);
        let mut sqn = [0u8; 6];
        for i in 0..6 {
            sqn[i] = auts[i] ^ ak[i];
        }

        let mac_s = self.f1_star(rand, &sqn, &RESYNC_AMF);
        if mac_s[..] == auts[6..] {
            Some(sqn)
        } else {
            None
        }
    }
}
