//! Patch Programs and the Inline Assembler
//!
//! A [`PatchProgram`] is a flat, immutable sequence of packed instructions
//! describing an audio-rate signal graph. Programs are pure data: one
//! program may be shared by any number of independently-running patches.
//!
//! [`PatchBuilder`] is a forward-only assembler. Each emitter allocates the
//! next free destination register, appends one instruction, and returns the
//! register so expressions compose naturally:
//!
//! ```rust
//! use carillon::program::{PatchBuilder, Reg};
//!
//! let mut b = PatchBuilder::new();
//! let env = b.adsr(3, 10, 22, 18);
//! let osc = b.sine(Reg::ONE);
//! let sig = b.mul(osc, env);
//! b.out(sig);
//! let program = b.finish().unwrap();
//! assert_eq!(program.len(), 4);
//! ```
//!
//! Capacity overflow latches an error on the builder; [`PatchBuilder::finish`]
//! reports it. Emitters stay infallible so patch construction reads as
//! straight-line code.

use crate::instr::{encode_q8_8, pack_adsr, Instr, Opcode};

/// Maximum instructions per program.
pub const MAX_INSTRS: usize = 1024;
/// Size of the register file.
pub const MAX_REGS: usize = 256;
/// Size of the persistent state arena.
pub const MAX_STATE: usize = 512;
/// Persistent state slots owned by each instruction.
pub const SLOTS_PER_INSTR: usize = 4;
/// Default render block length in samples.
pub const AUDIO_BLOCK: usize = 64;

/// A register index in the patch VM.
///
/// Registers 0..=3 are reserved and populated at note-on; user registers
/// begin at [`Reg::FIRST_FREE`]. The reserved indices are part of the ABI
/// between programs and the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reg(pub u8);

impl Reg {
    /// Note frequency in Hz.
    pub const FREQ: Reg = Reg(0);
    /// Note velocity in [0, 1].
    pub const VEL: Reg = Reg(1);
    /// Seconds since note-on, refreshed before every sample.
    pub const TIME: Reg = Reg(2);
    /// The constant 1.0.
    pub const ONE: Reg = Reg(3);
    /// First register available to the allocator.
    pub const FIRST_FREE: u8 = 4;
}

/// Errors latched by the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    /// The instruction budget (1024) was exceeded.
    TooManyInstructions,
    /// The register file (256) was exhausted.
    TooManyRegisters,
}

impl core::fmt::Display for BuildError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BuildError::TooManyInstructions => {
                write!(f, "Program exceeds {} instructions", MAX_INSTRS)
            }
            BuildError::TooManyRegisters => write!(f, "Program exceeds {} registers", MAX_REGS),
        }
    }
}

impl std::error::Error for BuildError {}

/// A complete, immutable patch program.
#[derive(Clone)]
pub struct PatchProgram {
    code: [Instr; MAX_INSTRS],
    len: usize,
    regs_used: usize,
    state_used: usize,
}

impl PatchProgram {
    /// The instructions, in execution order.
    #[inline]
    pub fn instrs(&self) -> &[Instr] {
        &self.code[..self.len]
    }

    /// Number of instructions.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the program contains no instructions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Registers in use, counting the reserved four.
    #[inline]
    pub fn regs_used(&self) -> usize {
        self.regs_used
    }

    /// Persistent state slots claimed by the instructions.
    #[inline]
    pub fn state_used(&self) -> usize {
        self.state_used
    }

    /// Rebuild a program from raw instruction words, e.g. from a
    /// deserialized definition. Register and state counters are recovered
    /// by scanning the words.
    pub fn from_words(words: &[u64]) -> Result<Self, BuildError> {
        if words.len() > MAX_INSTRS {
            return Err(BuildError::TooManyInstructions);
        }
        let mut code = [Instr::NOP; MAX_INSTRS];
        let mut regs_used = Reg::FIRST_FREE as usize;
        for (slot, &word) in code.iter_mut().zip(words) {
            let instr = Instr(word);
            regs_used = regs_used.max(instr.dst() as usize + 1);
            *slot = instr;
        }
        Ok(Self {
            code,
            len: words.len(),
            regs_used,
            state_used: (words.len() * SLOTS_PER_INSTR).min(MAX_STATE),
        })
    }
}

impl Default for PatchProgram {
    fn default() -> Self {
        Self {
            code: [Instr::NOP; MAX_INSTRS],
            len: 0,
            regs_used: Reg::FIRST_FREE as usize,
            state_used: 0,
        }
    }
}

/// Forward-only assembler for [`PatchProgram`]s.
///
/// Instruction `i` owns persistent state slots `(4i) mod 512 .. +3`, so
/// programs in which more than 128 instructions carry multi-slot state can
/// alias each other's memory. Programs are responsible for staying inside
/// that limit.
pub struct PatchBuilder {
    prog: PatchProgram,
    next_reg: usize,
    error: Option<BuildError>,
}

impl PatchBuilder {
    /// Create an empty builder with user registers starting at 4.
    pub fn new() -> Self {
        Self {
            prog: PatchProgram::default(),
            next_reg: Reg::FIRST_FREE as usize,
            error: None,
        }
    }

    fn alloc(&mut self) -> Reg {
        if self.next_reg >= MAX_REGS {
            self.error.get_or_insert(BuildError::TooManyRegisters);
            return Reg(0);
        }
        let r = Reg(self.next_reg as u8);
        self.next_reg += 1;
        r
    }

    fn emit(&mut self, instr: Instr) {
        if self.prog.len >= MAX_INSTRS {
            self.error.get_or_insert(BuildError::TooManyInstructions);
            return;
        }
        self.prog.code[self.prog.len] = instr;
        self.prog.len += 1;
        self.prog.state_used = (self.prog.len * SLOTS_PER_INSTR).min(MAX_STATE);
    }

    fn unary(&mut self, op: Opcode, a: Reg) -> Reg {
        let d = self.alloc();
        self.emit(Instr::new(op, d.0, a.0, 0, 0, 0));
        d
    }

    fn binary(&mut self, op: Opcode, a: Reg, b: Reg) -> Reg {
        let d = self.alloc();
        self.emit(Instr::new(op, d.0, a.0, b.0, 0, 0));
        d
    }

    // --- Constants ---

    /// Emit a Q8.8 fixed-point constant.
    pub fn constant(&mut self, value: f32) -> Reg {
        let d = self.alloc();
        self.emit(Instr::new(Opcode::Const, d.0, 0, 0, encode_q8_8(value), 1));
        d
    }

    /// Emit a constant drawn from the modulation table.
    pub fn constant_mod(&mut self, index: u8) -> Reg {
        let d = self.alloc();
        self.emit(Instr::new(Opcode::Const, d.0, 0, 0, index as u16, 0));
        d
    }

    // --- Arithmetic ---

    pub fn add(&mut self, a: Reg, b: Reg) -> Reg {
        self.binary(Opcode::Add, a, b)
    }

    pub fn sub(&mut self, a: Reg, b: Reg) -> Reg {
        self.binary(Opcode::Sub, a, b)
    }

    pub fn mul(&mut self, a: Reg, b: Reg) -> Reg {
        self.binary(Opcode::Mul, a, b)
    }

    /// Division; a zero divisor yields 0 at run time.
    pub fn div(&mut self, a: Reg, b: Reg) -> Reg {
        self.binary(Opcode::Div, a, b)
    }

    pub fn neg(&mut self, a: Reg) -> Reg {
        self.unary(Opcode::Neg, a)
    }

    pub fn abs(&mut self, a: Reg) -> Reg {
        self.unary(Opcode::Abs, a)
    }

    // --- Oscillators ---
    //
    // Each takes a frequency-multiplier register; a non-positive multiplier
    // falls back to 1.0 at run time, so Reg::ONE is the plain case.

    /// Sine oscillator at `note_freq * mult`.
    pub fn sine(&mut self, mult: Reg) -> Reg {
        self.unary(Opcode::Osc, mult)
    }

    /// Sawtooth oscillator.
    pub fn saw(&mut self, mult: Reg) -> Reg {
        self.unary(Opcode::Saw, mult)
    }

    /// Square oscillator.
    pub fn square(&mut self, mult: Reg) -> Reg {
        self.unary(Opcode::Square, mult)
    }

    /// Triangle oscillator.
    pub fn triangle(&mut self, mult: Reg) -> Reg {
        self.unary(Opcode::Tri, mult)
    }

    /// Raw phase output in [0, 2π).
    pub fn phase(&mut self, mult: Reg) -> Reg {
        self.unary(Opcode::Phase, mult)
    }

    // --- Modulation ---

    /// Frequency modulation: a sine whose phase increment is augmented by
    /// `MOD_DEPTH[depth_index] * modulator` each sample.
    pub fn fm(&mut self, mult: Reg, modulator: Reg, depth_index: u8) -> Reg {
        let d = self.alloc();
        self.emit(Instr::new(
            Opcode::Fm,
            d.0,
            mult.0,
            modulator.0,
            depth_index as u16,
            0,
        ));
        d
    }

    /// Phase modulation: sine of `own_phase + modulator`.
    pub fn pm(&mut self, mult: Reg, modulator: Reg) -> Reg {
        let d = self.alloc();
        self.emit(Instr::new(Opcode::Pm, d.0, mult.0, modulator.0, 0, 0));
        d
    }

    /// Amplitude modulation: `carrier * (1 + depth * modulator)`.
    pub fn am(&mut self, carrier: Reg, modulator: Reg, depth_index: u8) -> Reg {
        let d = self.alloc();
        self.emit(Instr::new(
            Opcode::Am,
            d.0,
            carrier.0,
            modulator.0,
            depth_index as u16,
            0,
        ));
        d
    }

    /// Hard sync: the follower phase resets when the leader crosses zero
    /// upward. The follower runs at `note_freq * ratio` (fallback 2.0).
    pub fn sync(&mut self, leader: Reg, ratio: Reg) -> Reg {
        let d = self.alloc();
        self.emit(Instr::new(Opcode::Sync, d.0, leader.0, ratio.0, 0, 0));
        d
    }

    // --- Noise ---

    /// White noise in [-1, 1).
    pub fn noise(&mut self) -> Reg {
        let d = self.alloc();
        self.emit(Instr::new(Opcode::Noise, d.0, 0, 0, 0, 0));
        d
    }

    /// One-pole low-passed noise, cutoff from the cutoff table.
    pub fn lp_noise(&mut self, cutoff_index: u8) -> Reg {
        let d = self.alloc();
        self.emit(Instr::new(Opcode::LpNoise, d.0, 0, 0, cutoff_index as u16, 0));
        d
    }

    /// Sample-and-hold noise, redrawn every `period` samples (0 selects the
    /// default of 100).
    pub fn rand_step(&mut self, period: u16) -> Reg {
        let d = self.alloc();
        self.emit(Instr::new(Opcode::RandStep, d.0, 0, 0, period, 0));
        d
    }

    // --- Nonlinearities ---

    pub fn tanh(&mut self, a: Reg) -> Reg {
        self.unary(Opcode::Tanh, a)
    }

    /// Hard clip to ±1.
    pub fn clip(&mut self, a: Reg) -> Reg {
        self.unary(Opcode::Clip, a)
    }

    /// Triangular wavefolder.
    pub fn fold(&mut self, a: Reg) -> Reg {
        self.unary(Opcode::Fold, a)
    }

    /// Signum: -1, 0, or 1.
    pub fn sign(&mut self, a: Reg) -> Reg {
        self.unary(Opcode::Sign, a)
    }

    // --- Filters ---

    /// One-pole lowpass, cutoff from the cutoff table.
    pub fn lpf(&mut self, input: Reg, cutoff_index: u8) -> Reg {
        let d = self.alloc();
        self.emit(Instr::new(Opcode::Lpf, d.0, input.0, 0, cutoff_index as u16, 0));
        d
    }

    /// One-pole highpass (input minus the lowpassed input).
    pub fn hpf(&mut self, input: Reg, cutoff_index: u8) -> Reg {
        let d = self.alloc();
        self.emit(Instr::new(Opcode::Hpf, d.0, input.0, 0, cutoff_index as u16, 0));
        d
    }

    /// State-variable bandpass; damping from the modulation table.
    pub fn bpf(&mut self, input: Reg, cutoff_index: u8, q_index: u8) -> Reg {
        let d = self.alloc();
        self.emit(Instr::new(
            Opcode::Bpf,
            d.0,
            input.0,
            0,
            cutoff_index as u16,
            q_index as u16,
        ));
        d
    }

    /// One-pole smoother with a direct coefficient in [0, 1].
    pub fn one_pole(&mut self, input: Reg, coeff: f32) -> Reg {
        let d = self.alloc();
        let byte = (coeff.clamp(0.0, 1.0) * 255.0) as u16;
        self.emit(Instr::new(Opcode::OnePole, d.0, input.0, 0, byte << 8, 0));
        d
    }

    // --- Envelope & time ---

    /// Four-stage envelope. Attack, decay, and release index the
    /// envelope-time table; sustain indexes the modulation table.
    pub fn adsr(&mut self, attack: u8, decay: u8, sustain: u8, release: u8) -> Reg {
        let d = self.alloc();
        let (hi, lo) = pack_adsr(attack, decay, sustain, release);
        self.emit(Instr::new(Opcode::Adsr, d.0, 0, 0, hi, lo));
        d
    }

    /// Linear ramp from 0 to 1 over an envelope-table time.
    pub fn ramp(&mut self, time_index: u8) -> Reg {
        let d = self.alloc();
        self.emit(Instr::new(Opcode::Ramp, d.0, 0, 0, time_index as u16, 0));
        d
    }

    /// Exponential decay from 1; rate is `MOD_DEPTH[rate_index] * 20` per
    /// second.
    pub fn exp_decay(&mut self, rate_index: u8) -> Reg {
        let d = self.alloc();
        self.emit(Instr::new(Opcode::ExpDecay, d.0, 0, 0, rate_index as u16, 0));
        d
    }

    // --- Utility ---

    pub fn min(&mut self, a: Reg, b: Reg) -> Reg {
        self.binary(Opcode::Min, a, b)
    }

    pub fn max(&mut self, a: Reg, b: Reg) -> Reg {
        self.binary(Opcode::Max, a, b)
    }

    /// Weighted sum of two signals, weights from the modulation table.
    pub fn mix(&mut self, a: Reg, b: Reg, weight_a: u8, weight_b: u8) -> Reg {
        let d = self.alloc();
        self.emit(Instr::new(
            Opcode::MixN,
            d.0,
            a.0,
            b.0,
            weight_a as u16,
            weight_b as u16,
        ));
        d
    }

    /// Output tap: the sample becomes `src * note_vel` and execution stops
    /// for this sample. Allocates no register.
    pub fn out(&mut self, src: Reg) {
        self.emit(Instr::new(Opcode::Out, 0, src.0, 0, 0, 0));
    }

    /// The latched error, if any emitter overflowed a budget.
    pub fn error(&self) -> Option<BuildError> {
        self.error
    }

    /// Finalize the program, recording the register high-water mark.
    pub fn finish(mut self) -> Result<PatchProgram, BuildError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        self.prog.regs_used = self.next_reg;
        Ok(self.prog)
    }
}

impl Default for PatchBuilder {
    fn default() -> Self {
        Self::new()
    }
}
