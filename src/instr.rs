//! Patch VM Instruction Set
//!
//! A patch instruction is a single 64-bit word with six fields:
//!
//! ```text
//! ┌────────┬────────┬────────┬────────┬────────────┬────────────┐
//! │ opcode │  dst   │ src_a  │ src_b  │   imm_hi   │   imm_lo   │
//! │  8 bit │  8 bit │  8 bit │  8 bit │   16 bit   │   16 bit   │
//! └────────┴────────┴────────┴────────┴────────────┴────────────┘
//!  63    56 55    48 47    40 39    32 31        16 15         0
//! ```
//!
//! The bit layout and the opcode numbering are part of the contract
//! between assemblers and the interpreter; serialized programs carry these
//! words verbatim.

use serde::{Deserialize, Serialize};

/// Patch VM opcodes, grouped by family.
///
/// The discriminants are fixed: they are the wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    // Constants
    Const = 0,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Abs,
    // Oscillators
    Osc,
    Saw,
    Square,
    Tri,
    Phase,
    // Modulation
    Fm,
    Pm,
    Am,
    Sync,
    // Noise
    Noise,
    LpNoise,
    RandStep,
    // Nonlinearities
    Tanh,
    Clip,
    Fold,
    Sign,
    // Filters
    Lpf,
    Hpf,
    Bpf,
    OnePole,
    // Envelope & time
    Adsr,
    Ramp,
    ExpDecay,
    // Utility
    Min,
    Max,
    MixN,
    Out,
}

impl Opcode {
    /// Number of defined opcodes.
    pub const COUNT: u8 = 34;

    /// Decode an opcode byte. Unknown bytes yield `None`; the interpreter
    /// skips such instructions.
    #[inline]
    pub fn from_u8(byte: u8) -> Option<Self> {
        use Opcode::*;
        const DECODE: [Opcode; Opcode::COUNT as usize] = [
            Const, Add, Sub, Mul, Div, Neg, Abs, //
            Osc, Saw, Square, Tri, Phase, //
            Fm, Pm, Am, Sync, //
            Noise, LpNoise, RandStep, //
            Tanh, Clip, Fold, Sign, //
            Lpf, Hpf, Bpf, OnePole, //
            Adsr, Ramp, ExpDecay, //
            Min, Max, MixN, Out,
        ];
        DECODE.get(byte as usize).copied()
    }
}

/// One packed patch instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instr(pub u64);

impl Instr {
    /// An all-zero word, used to pad program storage beyond the program
    /// length. Never executed.
    pub const NOP: Instr = Instr(0);

    /// Pack the six fields into a word.
    #[inline]
    pub fn new(op: Opcode, dst: u8, a: u8, b: u8, hi: u16, lo: u16) -> Self {
        Instr(
            (op as u64) << 56
                | (dst as u64) << 48
                | (a as u64) << 40
                | (b as u64) << 32
                | (hi as u64) << 16
                | lo as u64,
        )
    }

    /// The raw opcode byte.
    #[inline]
    pub fn op_byte(self) -> u8 {
        (self.0 >> 56) as u8
    }

    /// The decoded opcode, if the byte is in range.
    #[inline]
    pub fn opcode(self) -> Option<Opcode> {
        Opcode::from_u8(self.op_byte())
    }

    /// Destination register index.
    #[inline]
    pub fn dst(self) -> u8 {
        (self.0 >> 48) as u8
    }

    /// Source register A index.
    #[inline]
    pub fn src_a(self) -> u8 {
        (self.0 >> 40) as u8
    }

    /// Source register B index.
    #[inline]
    pub fn src_b(self) -> u8 {
        (self.0 >> 32) as u8
    }

    /// High 16-bit immediate.
    #[inline]
    pub fn imm_hi(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Low 16-bit immediate.
    #[inline]
    pub fn imm_lo(self) -> u16 {
        self.0 as u16
    }
}

impl From<u64> for Instr {
    fn from(word: u64) -> Self {
        Instr(word)
    }
}

impl From<Instr> for u64 {
    fn from(instr: Instr) -> Self {
        instr.0
    }
}

/// Encode a float as Q8.8 signed fixed point for a `Const` immediate.
///
/// Values outside roughly ±128 saturate; the practical constant range for
/// patches is frequency ratios and gains well inside that.
#[inline]
pub fn encode_q8_8(value: f32) -> u16 {
    let q = (value * 256.0).clamp(i16::MIN as f32, i16::MAX as f32);
    q as i16 as u16
}

/// Decode a Q8.8 signed fixed-point immediate.
#[inline]
pub fn decode_q8_8(raw: u16) -> f32 {
    raw as i16 as f32 / 256.0
}

/// Pack ADSR indices into the two immediates:
/// `hi = attack(6b) << 10 | decay(5b) << 5 | sustain(5b)`,
/// `lo = release(5b) << 11`.
#[inline]
pub fn pack_adsr(attack: u8, decay: u8, sustain: u8, release: u8) -> (u16, u16) {
    let hi = ((attack as u16 & 0x3F) << 10) | ((decay as u16 & 0x1F) << 5) | (sustain as u16 & 0x1F);
    let lo = (release as u16 & 0x1F) << 11;
    (hi, lo)
}

/// Unpack the four ADSR indices from the two immediates.
#[inline]
pub fn unpack_adsr(hi: u16, lo: u16) -> (u8, u8, u8, u8) {
    (
        ((hi >> 10) & 0x3F) as u8,
        ((hi >> 5) & 0x1F) as u8,
        (hi & 0x1F) as u8,
        ((lo >> 11) & 0x1F) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_fields() {
        let i = Instr::new(Opcode::MixN, 17, 4, 9, 0xBEEF, 0x1234);
        assert_eq!(i.opcode(), Some(Opcode::MixN));
        assert_eq!(i.dst(), 17);
        assert_eq!(i.src_a(), 4);
        assert_eq!(i.src_b(), 9);
        assert_eq!(i.imm_hi(), 0xBEEF);
        assert_eq!(i.imm_lo(), 0x1234);
    }

    #[test]
    fn test_opcode_roundtrip() {
        for byte in 0..Opcode::COUNT {
            let op = Opcode::from_u8(byte).unwrap();
            assert_eq!(op as u8, byte);
        }
        assert_eq!(Opcode::from_u8(Opcode::COUNT), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_opcode_wire_values() {
        // Spot-check the wire numbering contract
        assert_eq!(Opcode::Const as u8, 0);
        assert_eq!(Opcode::Osc as u8, 7);
        assert_eq!(Opcode::Fm as u8, 12);
        assert_eq!(Opcode::Noise as u8, 16);
        assert_eq!(Opcode::Lpf as u8, 23);
        assert_eq!(Opcode::Adsr as u8, 27);
        assert_eq!(Opcode::Out as u8, 33);
    }

    #[test]
    fn test_q8_8_roundtrip() {
        for v in [-2.0f32, -1.0, -0.5, 0.0, 0.25, 1.0, 1.008, 3.0, 4.0] {
            let decoded = decode_q8_8(encode_q8_8(v));
            assert!((decoded - v).abs() <= 1.0 / 256.0, "{} -> {}", v, decoded);
        }
    }

    #[test]
    fn test_q8_8_negative() {
        let raw = encode_q8_8(-1.5);
        assert_eq!(decode_q8_8(raw), -1.5);
    }

    #[test]
    fn test_adsr_packing() {
        let (hi, lo) = pack_adsr(3, 10, 22, 18);
        assert_eq!(unpack_adsr(hi, lo), (3, 10, 22, 18));

        // Attack field is 6 bits wide, others 5
        let (hi, lo) = pack_adsr(63, 31, 31, 31);
        assert_eq!(unpack_adsr(hi, lo), (63, 31, 31, 31));
    }

    #[test]
    fn test_instr_serde_word() {
        let i = Instr::new(Opcode::Adsr, 4, 0, 0, 0x0D2A, 0x9000);
        let json = serde_json::to_string(&i).unwrap();
        let back: Instr = serde_json::from_str(&json).unwrap();
        assert_eq!(i, back);
    }
}
