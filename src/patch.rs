//! Patch State and the Per-Sample Interpreter
//!
//! The patch VM evaluates its whole program once per output sample. The
//! register file is scratch, rewritten on every pass; the only memory that
//! survives from one sample to the next is the persistent state arena, the
//! note clock, and the RNG.
//!
//! Instruction `i` exclusively owns state slots `(4i) mod 512 .. +3`. Slot
//! indices derive from the instruction's *position*, never from its
//! destination register, so two instructions of the same opcode keep
//! independent phases, filter memories, and envelope stages.
//!
//! Execution never branches on data beyond the opcode: every instruction
//! runs every sample, and an `Out` instruction ends the sample early with
//! the tapped register scaled by note velocity.

use crate::instr::{decode_q8_8, unpack_adsr, Opcode};
use crate::program::{PatchProgram, Reg, MAX_REGS, MAX_STATE, SLOTS_PER_INSTR};
use crate::rng::Xorshift32;
use crate::tables::{self, MOD_DEPTH};
use libm::Libm;

const TWO_PI: f32 = core::f32::consts::TAU;

// ADSR stage encoding inside the state arena.
const STAGE_ATTACK: f32 = 0.0;
const STAGE_DECAY: f32 = 1.0;
const STAGE_SUSTAIN: f32 = 2.0;
const STAGE_RELEASE: f32 = 3.0;
const STAGE_SILENT: f32 = 4.0;

/// Per-voice mutable execution state.
///
/// Owned exclusively by one voice; a [`PatchProgram`] may be shared by any
/// number of states.
#[derive(Clone)]
pub struct PatchState {
    regs: [f32; MAX_REGS],
    state: [f32; MAX_STATE],
    note_freq: f32,
    note_vel: f32,
    note_time: f32,
    sample_rate: f32,
    dt: f32,
    rng: Xorshift32,
}

impl PatchState {
    fn new(sample_rate: f32) -> Self {
        Self {
            regs: [0.0; MAX_REGS],
            state: [0.0; MAX_STATE],
            note_freq: 0.0,
            note_vel: 0.0,
            note_time: 0.0,
            sample_rate,
            dt: 1.0 / sample_rate,
            rng: Xorshift32::default(),
        }
    }

    fn clear(&mut self) {
        self.regs = [0.0; MAX_REGS];
        self.state = [0.0; MAX_STATE];
        self.note_freq = 0.0;
        self.note_vel = 0.0;
        self.note_time = 0.0;
        self.rng = Xorshift32::default();
    }
}

/// A program bound to one voice's execution state.
pub struct Patch<'p> {
    program: &'p PatchProgram,
    state: PatchState,
}

impl<'p> Patch<'p> {
    /// Bind `program` to fresh state at the given sample rate.
    ///
    /// The shared tables are populated here if this is the first touch.
    pub fn new(program: &'p PatchProgram, sample_rate: f32) -> Self {
        tables::tables();
        Self {
            program,
            state: PatchState::new(sample_rate),
        }
    }

    /// The bound program.
    #[inline]
    pub fn program(&self) -> &'p PatchProgram {
        self.program
    }

    /// The sample rate this patch renders at.
    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.state.sample_rate
    }

    /// Seconds since the last note-on.
    #[inline]
    pub fn note_time(&self) -> f32 {
        self.state.note_time
    }

    /// Blank the state to post-note-off silence and reseed the RNG to the
    /// canonical constant.
    pub fn reset(&mut self) {
        self.state.clear();
    }

    /// Start a note: reset state, bind the note context, and populate the
    /// reserved registers. `FREQ`, `VEL`, and `ONE` stay constant for the
    /// note's lifetime; `TIME` is refreshed before every sample.
    pub fn note_on(&mut self, midi: u8, velocity: f32) {
        self.reset();
        let st = &mut self.state;
        st.note_freq = tables::pitch_hz(midi as i32);
        st.note_vel = velocity;
        st.note_time = 0.0;
        st.regs[Reg::FREQ.0 as usize] = st.note_freq;
        st.regs[Reg::VEL.0 as usize] = velocity;
        st.regs[Reg::TIME.0 as usize] = 0.0;
        st.regs[Reg::ONE.0 as usize] = 1.0;
    }

    /// Push every `Adsr` instruction in the program into its release stage
    /// by writing `(stage = release, timer = 0)` into the slots it owns.
    ///
    /// This is how a scheduler injects a note-off without the envelope
    /// having a gate input of its own.
    pub fn release(&mut self) {
        for (i, instr) in self.program.instrs().iter().enumerate() {
            if instr.opcode() == Some(Opcode::Adsr) {
                let sb = (i * SLOTS_PER_INSTR) % MAX_STATE;
                self.state.state[sb] = STAGE_RELEASE;
                self.state.state[sb + 2] = 0.0;
            }
        }
    }

    /// Evaluate one sample.
    #[inline]
    pub fn tick(&mut self) -> f32 {
        self.state.regs[Reg::TIME.0 as usize] = self.state.note_time;
        exec_sample(&mut self.state, self.program)
    }

    /// Fill `out` with consecutive mono samples.
    ///
    /// A program that executes no `Out` instruction yields register 0 by
    /// convention.
    pub fn step(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = self.tick();
        }
    }
}

/// Execute the program once, producing one sample.
fn exec_sample(ps: &mut PatchState, prog: &PatchProgram) -> f32 {
    let tb = tables::tables();
    let dt = ps.dt;
    let freq = ps.note_freq;

    for (i, instr) in prog.instrs().iter().enumerate() {
        let op = match instr.opcode() {
            Some(op) => op,
            None => continue,
        };
        let dst = instr.dst() as usize;
        let a = instr.src_a() as usize;
        let b = instr.src_b() as usize;
        let hi = instr.imm_hi();
        let lo = instr.imm_lo();
        let sb = (i * SLOTS_PER_INSTR) % MAX_STATE;

        match op {
            // Constants
            Opcode::Const => ps.regs[dst] = decode_const(hi, lo),

            // Arithmetic
            Opcode::Add => ps.regs[dst] = ps.regs[a] + ps.regs[b],
            Opcode::Sub => ps.regs[dst] = ps.regs[a] - ps.regs[b],
            Opcode::Mul => ps.regs[dst] = ps.regs[a] * ps.regs[b],
            Opcode::Div => {
                ps.regs[dst] = if ps.regs[b] != 0.0 {
                    ps.regs[a] / ps.regs[b]
                } else {
                    0.0
                }
            }
            Opcode::Neg => ps.regs[dst] = -ps.regs[a],
            Opcode::Abs => ps.regs[dst] = Libm::<f32>::fabs(ps.regs[a]),

            // Oscillators
            Opcode::Osc => {
                let p = osc_tick(&mut ps.state[sb], freq * freq_mult(ps.regs[a]), dt);
                ps.regs[dst] = fast_sin(p);
            }
            Opcode::Saw => {
                let p = osc_tick(&mut ps.state[sb], freq * freq_mult(ps.regs[a]), dt);
                ps.regs[dst] = saw_wave(p);
            }
            Opcode::Square => {
                let p = osc_tick(&mut ps.state[sb], freq * freq_mult(ps.regs[a]), dt);
                ps.regs[dst] = square_wave(p);
            }
            Opcode::Tri => {
                let p = osc_tick(&mut ps.state[sb], freq * freq_mult(ps.regs[a]), dt);
                ps.regs[dst] = tri_wave(p);
            }
            Opcode::Phase => {
                osc_tick(&mut ps.state[sb], freq * freq_mult(ps.regs[a]), dt);
                ps.regs[dst] = ps.state[sb];
            }

            // Modulation
            Opcode::Fm => {
                // Phase increment augmented by depth * modulator, wrapped
                // in place with the same single subtraction as osc_tick.
                let depth = mod_depth_or(hi, 0.5);
                let carrier = freq * freq_mult(ps.regs[a]);
                ps.state[sb] += TWO_PI * carrier * dt + depth * ps.regs[b];
                if ps.state[sb] >= TWO_PI {
                    ps.state[sb] -= TWO_PI;
                }
                ps.regs[dst] = fast_sin(ps.state[sb]);
            }
            Opcode::Pm => {
                let p = osc_tick(&mut ps.state[sb], freq * freq_mult(ps.regs[a]), dt);
                ps.regs[dst] = fast_sin(p + ps.regs[b]);
            }
            Opcode::Am => {
                let depth = mod_depth_or(hi, 0.5);
                ps.regs[dst] = ps.regs[a] * (1.0 + depth * ps.regs[b]);
            }
            Opcode::Sync => {
                // Slot 0 remembers the leader; slot 1 is the follower phase.
                let prev = ps.state[sb];
                let leader = ps.regs[a];
                ps.state[sb] = leader;
                if prev <= 0.0 && leader > 0.0 {
                    ps.state[sb + 1] = 0.0;
                }
                let ratio = ps.regs[b];
                let follower = freq * if ratio > 0.0 { ratio } else { 2.0 };
                let p = osc_tick(&mut ps.state[sb + 1], follower, dt);
                ps.regs[dst] = fast_sin(p);
            }

            // Noise
            Opcode::Noise => ps.regs[dst] = ps.rng.next_f32_bipolar(),
            Opcode::LpNoise => {
                let n = ps.rng.next_f32_bipolar();
                let c = if (hi as usize) < tb.cutoff_hz.len() {
                    one_pole_coeff(tb.cutoff_hz[hi as usize], dt)
                } else {
                    0.05
                };
                ps.state[sb] += c * (n - ps.state[sb]);
                ps.regs[dst] = ps.state[sb];
            }
            Opcode::RandStep => {
                let period = if hi > 0 { hi as f32 } else { 100.0 };
                if ps.state[sb + 1] as i32 <= 0 {
                    ps.state[sb] = ps.rng.next_f32_bipolar();
                    ps.state[sb + 1] = period;
                }
                ps.state[sb + 1] -= 1.0;
                ps.regs[dst] = ps.state[sb];
            }

            // Nonlinearities
            Opcode::Tanh => ps.regs[dst] = Libm::<f32>::tanh(ps.regs[a]),
            Opcode::Clip => ps.regs[dst] = ps.regs[a].clamp(-1.0, 1.0),
            Opcode::Fold => ps.regs[dst] = fold_wave(ps.regs[a]),
            Opcode::Sign => {
                ps.regs[dst] = if ps.regs[a] > 0.0 {
                    1.0
                } else if ps.regs[a] < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }

            // Filters
            Opcode::Lpf => {
                let c = cutoff_coeff_or(hi, dt, 0.1);
                ps.state[sb] += c * (ps.regs[a] - ps.state[sb]);
                ps.regs[dst] = ps.state[sb];
            }
            Opcode::Hpf => {
                let c = cutoff_coeff_or(hi, dt, 0.1);
                let lp = ps.state[sb] + c * (ps.regs[a] - ps.state[sb]);
                ps.state[sb] = lp;
                ps.regs[dst] = ps.regs[a] - lp;
            }
            Opcode::Bpf => {
                // Chamberlin state-variable core; slot 0 low, slot 1 band.
                let c = cutoff_coeff_or(hi, dt, 0.1);
                let q = if (lo as usize) < MOD_DEPTH.len() {
                    MOD_DEPTH[lo as usize] + 0.1
                } else {
                    0.5
                };
                let mut low = ps.state[sb];
                let mut band = ps.state[sb + 1];
                let high = ps.regs[a] - low - q * band;
                band += c * high;
                low += c * band;
                ps.state[sb] = low;
                ps.state[sb + 1] = band;
                ps.regs[dst] = band;
            }
            Opcode::OnePole => {
                let c = (hi >> 8) as u8 as f32 / 255.0;
                ps.state[sb] = c * ps.regs[a] + (1.0 - c) * ps.state[sb];
                ps.regs[dst] = ps.state[sb];
            }

            // Envelope & time
            Opcode::Adsr => {
                ps.regs[dst] = adsr_tick(&mut ps.state[sb..sb + 3], hi, lo, dt);
            }
            Opcode::Ramp => {
                let dur = if (hi as usize) < tb.env_seconds.len() {
                    tb.env_seconds[hi as usize]
                } else {
                    0.1
                };
                ps.regs[dst] = (ps.note_time / dur).min(1.0);
            }
            Opcode::ExpDecay => {
                let rate = mod_depth_or(hi, 0.1) * 20.0;
                ps.regs[dst] = Libm::<f32>::exp(-rate * ps.note_time);
            }

            // Utility
            Opcode::Min => ps.regs[dst] = ps.regs[a].min(ps.regs[b]),
            Opcode::Max => ps.regs[dst] = ps.regs[a].max(ps.regs[b]),
            Opcode::MixN => {
                let wa = mod_depth_or(hi, 0.5);
                let wb = mod_depth_or(lo, 0.5);
                ps.regs[dst] = ps.regs[a] * wa + ps.regs[b] * wb;
            }
            Opcode::Out => {
                ps.note_time += dt;
                return ps.regs[a] * ps.note_vel;
            }
        }
    }

    // No Out executed: register 0 is the output by convention.
    ps.note_time += dt;
    ps.regs[0] * ps.note_vel
}

/// `Const` immediate decoding: `lo == 0` selects the modulation table when
/// the index fits, otherwise the high immediate is Q8.8 signed fixed point.
#[inline]
fn decode_const(hi: u16, lo: u16) -> f32 {
    if lo == 0 && (hi as usize) < MOD_DEPTH.len() {
        MOD_DEPTH[hi as usize]
    } else {
        decode_q8_8(hi)
    }
}

#[inline]
fn mod_depth_or(index: u16, fallback: f32) -> f32 {
    if (index as usize) < MOD_DEPTH.len() {
        MOD_DEPTH[index as usize]
    } else {
        fallback
    }
}

#[inline]
fn cutoff_coeff_or(index: u16, dt: f32, fallback: f32) -> f32 {
    let tb = tables::tables();
    if (index as usize) < tb.cutoff_hz.len() {
        one_pole_coeff(tb.cutoff_hz[index as usize], dt)
    } else {
        fallback
    }
}

/// Non-positive frequency multipliers fall back to 1.0.
#[inline]
fn freq_mult(r: f32) -> f32 {
    if r > 0.0 {
        r
    } else {
        1.0
    }
}

/// Advance a phase slot by `2π·freq·dt`, wrap at 2π, and return the
/// post-advance phase.
#[inline]
fn osc_tick(phase: &mut f32, freq: f32, dt: f32) -> f32 {
    *phase += TWO_PI * freq * dt;
    if *phase >= TWO_PI {
        *phase -= TWO_PI;
    }
    *phase
}

/// Sine approximation with absolute error below 2e-3.
///
/// Range-reduces to [-π, π], then applies the rational half-period
/// approximation `16·t / (5π² − 4t)` with `t = |x|·(π − |x|)`, odd-extended.
/// Exact at 0, ±π/2, and ±π, so the oscillator wrap is seamless.
#[inline]
fn fast_sin(x: f32) -> f32 {
    use core::f32::consts::PI;
    let x = x - TWO_PI * Libm::<f32>::floor(x / TWO_PI + 0.5);
    let ax = Libm::<f32>::fabs(x);
    let t = ax * (PI - ax);
    let y = 16.0 * t / (5.0 * PI * PI - 4.0 * t);
    if x < 0.0 {
        -y
    } else {
        y
    }
}

#[inline]
fn saw_wave(phase: f32) -> f32 {
    2.0 * (phase / TWO_PI) - 1.0
}

#[inline]
fn square_wave(phase: f32) -> f32 {
    if phase < core::f32::consts::PI {
        1.0
    } else {
        -1.0
    }
}

#[inline]
fn tri_wave(phase: f32) -> f32 {
    let t = phase / TWO_PI;
    if t < 0.5 {
        4.0 * t - 1.0
    } else {
        3.0 - 4.0 * t
    }
}

/// Triangular wavefolder: maps any input into [-1, 1] by reflection.
#[inline]
fn fold_wave(x: f32) -> f32 {
    let mut t = x * 0.5 + 0.5;
    t -= Libm::<f32>::floor(t);
    Libm::<f32>::fabs(t * 2.0 - 1.0) * 2.0 - 1.0
}

/// One-pole lowpass coefficient `ω / (1 + ω)` for `ω = 2π·cutoff·dt`.
#[inline]
fn one_pole_coeff(cutoff: f32, dt: f32) -> f32 {
    let w = TWO_PI * cutoff * dt;
    w / (1.0 + w)
}

/// Four-stage linear envelope over state slots `[stage, level, timer]`.
///
/// Attack 0→1, decay 1→sustain, sustain holds, release sustain→0, then
/// silent. A scheduler triggers release externally by writing the stage
/// slot; see [`Patch::release`].
fn adsr_tick(st: &mut [f32], hi: u16, lo: u16, dt: f32) -> f32 {
    let (ai, di, si, ri) = unpack_adsr(hi, lo);
    let attack = tables::env_seconds(ai as i32);
    let decay = tables::env_seconds(di as i32);
    let sustain = MOD_DEPTH[si as usize];
    let release = tables::env_seconds(ri as i32);

    let mut stage = st[0];
    let mut level = st[1];
    let mut timer = st[2] + dt;

    if stage == STAGE_ATTACK {
        level = timer / attack;
        if timer >= attack {
            level = 1.0;
            timer = 0.0;
            stage = STAGE_DECAY;
        }
    } else if stage == STAGE_DECAY {
        level = 1.0 - (1.0 - sustain) * (timer / decay);
        if timer >= decay {
            level = sustain;
            timer = 0.0;
            stage = STAGE_SUSTAIN;
        }
    } else if stage == STAGE_SUSTAIN {
        level = sustain;
    } else if stage == STAGE_RELEASE {
        level = sustain * (1.0 - timer / release);
        if level < 0.0 {
            level = 0.0;
            stage = STAGE_SILENT;
        }
    } else {
        level = 0.0;
    }

    st[0] = stage;
    st[1] = level;
    st[2] = timer;
    level
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::PatchBuilder;
    use approx::assert_relative_eq;

    const SR: f32 = 44_100.0;

    fn sine_program() -> PatchProgram {
        let mut b = PatchBuilder::new();
        let osc = b.sine(Reg::ONE);
        b.out(osc);
        b.finish().unwrap()
    }

    fn adsr_program(attack: u8, decay: u8, sustain: u8, release: u8) -> PatchProgram {
        let mut b = PatchBuilder::new();
        let env = b.adsr(attack, decay, sustain, release);
        b.out(env);
        b.finish().unwrap()
    }

    fn render(prog: &PatchProgram, midi: u8, vel: f32, n: usize) -> Vec<f32> {
        let mut patch = Patch::new(prog, SR);
        patch.note_on(midi, vel);
        let mut buf = vec![0.0f32; n];
        patch.step(&mut buf);
        buf
    }

    #[test]
    fn test_silence_before_note_on() {
        let prog = sine_program();
        let mut patch = Patch::new(&prog, SR);
        patch.reset();
        let mut buf = [0.0f32; 64];
        patch.step(&mut buf);
        for s in buf {
            assert!(s.abs() < 1e-3, "expected near-silence, got {}", s);
        }
    }

    #[test]
    fn test_deterministic_render() {
        let mut b = PatchBuilder::new();
        let n = b.noise();
        let f = b.bpf(n, 35, 25);
        b.out(f);
        let prog = b.finish().unwrap();

        let first = render(&prog, 60, 0.8, 2048);
        let second = render(&prog, 60, 0.8, 2048);
        assert_eq!(first, second, "renders must be bit-identical");
    }

    #[test]
    fn test_phase_continuity() {
        let prog = sine_program();
        let buf = render(&prog, 69, 1.0, 4096);
        let freq = tables::pitch_hz(69);
        let bound = TWO_PI * freq / SR + 5e-3;
        for w in buf.windows(2) {
            assert!(
                (w[1] - w[0]).abs() <= bound,
                "sample step {} exceeds {}",
                (w[1] - w[0]).abs(),
                bound
            );
        }
    }

    #[test]
    fn test_oscillator_bounded() {
        let builds: [fn(&mut PatchBuilder); 4] = [
            |b: &mut PatchBuilder| {
                let o = b.sine(Reg::ONE);
                b.out(o)
            },
            |b: &mut PatchBuilder| {
                let o = b.saw(Reg::ONE);
                b.out(o)
            },
            |b: &mut PatchBuilder| {
                let o = b.square(Reg::ONE);
                b.out(o)
            },
            |b: &mut PatchBuilder| {
                let o = b.triangle(Reg::ONE);
                b.out(o)
            },
        ];
        for build in builds {
            let mut b = PatchBuilder::new();
            build(&mut b);
            let prog = b.finish().unwrap();
            for s in render(&prog, 81, 1.0, 8192) {
                assert!(s.is_finite() && s.abs() <= 1.01, "sample {} out of range", s);
            }
        }
    }

    #[test]
    fn test_adsr_attack_reaches_one() {
        let prog = adsr_program(3, 10, 22, 18);
        let attack_samples = (tables::env_seconds(3) * SR) as usize;

        let buf = render(&prog, 60, 1.0, attack_samples + 2);
        // The peak lands within one sample of the nominal attack time
        let peak = buf[attack_samples - 1..=attack_samples + 1]
            .iter()
            .cloned()
            .fold(0.0f32, f32::max);
        assert_relative_eq!(peak, 1.0, epsilon = 1e-4);
        // Monotone rise during the attack
        for w in buf[..attack_samples].windows(2) {
            assert!(w[1] >= w[0]);
        }
    }

    #[test]
    fn test_adsr_sustain_holds() {
        let prog = adsr_program(3, 10, 22, 18);
        let sustain = MOD_DEPTH[22];
        let settle = ((tables::env_seconds(3) + tables::env_seconds(10)) * SR) as usize + 8;

        let buf = render(&prog, 60, 1.0, settle + 1000);
        for &s in &buf[settle..] {
            assert!((s - sustain).abs() < 1e-4, "sustain {} drifted to {}", sustain, s);
        }
    }

    #[test]
    fn test_adsr_release_reaches_zero() {
        let prog = adsr_program(3, 10, 22, 14);
        let mut patch = Patch::new(&prog, SR);
        patch.note_on(60, 1.0);

        // Settle into sustain, then inject release
        let settle = ((tables::env_seconds(3) + tables::env_seconds(10)) * SR) as usize + 8;
        let mut buf = vec![0.0f32; settle];
        patch.step(&mut buf);
        patch.release();

        let release_samples = (tables::env_seconds(14) * SR) as usize + 2;
        let mut tail = vec![0.0f32; release_samples + 100];
        patch.step(&mut tail);
        assert_eq!(tail[release_samples + 50], 0.0);
        // Monotone fall until silent
        for w in tail[..release_samples].windows(2) {
            assert!(w[1] <= w[0] + 1e-6);
        }
    }

    #[test]
    fn test_div_by_zero_yields_zero() {
        let mut b = PatchBuilder::new();
        let zero = b.constant(0.0);
        let q = b.div(Reg::ONE, zero);
        b.out(q);
        let prog = b.finish().unwrap();
        assert_eq!(render(&prog, 60, 1.0, 4), vec![0.0; 4]);
    }

    #[test]
    fn test_const_decoding() {
        let mut b = PatchBuilder::new();
        let m = b.constant_mod(5);
        b.out(m);
        let prog = b.finish().unwrap();
        assert_relative_eq!(render(&prog, 60, 1.0, 1)[0], MOD_DEPTH[5]);

        let mut b = PatchBuilder::new();
        let c = b.constant(1.008);
        b.out(c);
        let prog = b.finish().unwrap();
        // Q8.8 quantizes to the nearest 1/256
        assert!((render(&prog, 60, 1.0, 1)[0] - 1.008).abs() <= 1.0 / 256.0);
    }

    #[test]
    fn test_clip_and_fold_bounded() {
        let mut b = PatchBuilder::new();
        let g = b.constant(7.5);
        let o = b.sine(Reg::ONE);
        let hot = b.mul(o, g);
        let clipped = b.clip(hot);
        b.out(clipped);
        let prog = b.finish().unwrap();
        for s in render(&prog, 60, 1.0, 2048) {
            assert!(s.abs() <= 1.0);
        }

        let mut b = PatchBuilder::new();
        let g = b.constant(7.5);
        let o = b.sine(Reg::ONE);
        let hot = b.mul(o, g);
        let folded = b.fold(hot);
        b.out(folded);
        let prog = b.finish().unwrap();
        for s in render(&prog, 60, 1.0, 2048) {
            assert!(s.abs() <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn test_sign_values() {
        let mut b = PatchBuilder::new();
        let o = b.sine(Reg::ONE);
        let s = b.sign(o);
        b.out(s);
        let prog = b.finish().unwrap();
        for s in render(&prog, 60, 1.0, 2048) {
            assert!(s == 1.0 || s == -1.0 || s == 0.0);
        }
    }

    #[test]
    fn test_mix_weights() {
        // MixN of ONE with itself: weight sum scales the constant
        let mut b = PatchBuilder::new();
        let m = b.mix(Reg::ONE, Reg::ONE, 15, 15);
        b.out(m);
        let prog = b.finish().unwrap();
        let expected = MOD_DEPTH[15] * 2.0;
        assert_relative_eq!(render(&prog, 60, 1.0, 1)[0], expected, epsilon = 1e-6);
    }

    #[test]
    fn test_min_max() {
        let mut b = PatchBuilder::new();
        let half = b.constant(0.5);
        let lo = b.min(Reg::ONE, half);
        let hi = b.max(Reg::ONE, half);
        let sum = b.add(lo, hi);
        b.out(sum);
        let prog = b.finish().unwrap();
        assert_relative_eq!(render(&prog, 60, 1.0, 1)[0], 1.5, epsilon = 1e-6);
    }

    #[test]
    fn test_lpf_converges_to_constant_input() {
        let mut b = PatchBuilder::new();
        let f = b.lpf(Reg::ONE, 50);
        b.out(f);
        let prog = b.finish().unwrap();
        let buf = render(&prog, 60, 1.0, 8192);
        assert!(buf[8191] > 0.99, "LPF settled at {}", buf[8191]);
        // Monotone approach from below
        for w in buf.windows(2) {
            assert!(w[1] >= w[0]);
        }
    }

    #[test]
    fn test_hpf_rejects_dc() {
        let mut b = PatchBuilder::new();
        let f = b.hpf(Reg::ONE, 30);
        b.out(f);
        let prog = b.finish().unwrap();
        let buf = render(&prog, 60, 1.0, 16_384);
        assert!(buf[16_383].abs() < 1e-2, "HPF left DC {}", buf[16_383]);
    }

    #[test]
    fn test_one_pole_smoothing() {
        let mut b = PatchBuilder::new();
        let f = b.one_pole(Reg::ONE, 0.25);
        b.out(f);
        let prog = b.finish().unwrap();
        let buf = render(&prog, 60, 1.0, 64);
        // First sample is exactly c * input
        assert_relative_eq!(buf[0], 63.0 / 255.0, epsilon = 1e-5);
        assert!(buf[63] > 0.99);
    }

    #[test]
    fn test_rand_step_holds() {
        let mut b = PatchBuilder::new();
        let r = b.rand_step(50);
        b.out(r);
        let prog = b.finish().unwrap();
        let buf = render(&prog, 60, 1.0, 200);
        // Constant within each 50-sample window, changed across windows
        for chunk in buf.chunks(50) {
            for &s in chunk {
                assert_eq!(s, chunk[0]);
            }
        }
        assert_ne!(buf[0], buf[50]);
    }

    #[test]
    fn test_noise_in_range_and_nonsilent() {
        let mut b = PatchBuilder::new();
        let n = b.noise();
        b.out(n);
        let prog = b.finish().unwrap();
        let buf = render(&prog, 60, 1.0, 4096);
        let mut peak = 0.0f32;
        for s in &buf {
            assert!(s.abs() <= 1.0);
            peak = peak.max(s.abs());
        }
        assert!(peak > 0.5);
    }

    #[test]
    fn test_ramp_reaches_one() {
        let mut b = PatchBuilder::new();
        let r = b.ramp(10);
        b.out(r);
        let prog = b.finish().unwrap();
        let dur_samples = (tables::env_seconds(10) * SR) as usize;
        let buf = render(&prog, 60, 1.0, dur_samples + 100);
        assert!(buf[0] < 0.01);
        assert_relative_eq!(buf[dur_samples + 50], 1.0);
    }

    #[test]
    fn test_exp_decay_falls() {
        let mut b = PatchBuilder::new();
        let e = b.exp_decay(18);
        b.out(e);
        let prog = b.finish().unwrap();
        let buf = render(&prog, 60, 1.0, 44_100);
        assert!(buf[0] > 0.9);
        assert!(buf[44_099] < buf[0] * 0.1);
        for w in buf.windows(2) {
            assert!(w[1] <= w[0]);
        }
    }

    #[test]
    fn test_fallthrough_outputs_register_zero() {
        // No Out instruction: the sample is regs[0] (FREQ) times velocity.
        let mut b = PatchBuilder::new();
        b.sine(Reg::ONE);
        let prog = b.finish().unwrap();
        let buf = render(&prog, 69, 0.5, 1);
        assert_relative_eq!(buf[0], 440.0 * 0.5, epsilon = 1e-2);
    }

    #[test]
    fn test_velocity_scales_output() {
        let prog = sine_program();
        let full = render(&prog, 69, 1.0, 512);
        let half = render(&prog, 69, 0.5, 512);
        for (f, h) in full.iter().zip(&half) {
            assert_relative_eq!(f * 0.5, *h, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_sync_output_bounded() {
        let mut b = PatchBuilder::new();
        let leader = b.sine(Reg::ONE);
        let two = b.constant(3.0);
        let s = b.sync(leader, two);
        b.out(s);
        let prog = b.finish().unwrap();
        for s in render(&prog, 60, 1.0, 8192) {
            assert!(s.is_finite() && s.abs() <= 1.01);
        }
    }

    #[test]
    fn test_unknown_opcode_skipped() {
        let mut b = PatchBuilder::new();
        let o = b.sine(Reg::ONE);
        b.out(o);
        let prog = b.finish().unwrap();
        let mut words: Vec<u64> = prog.instrs().iter().map(|i| i.0).collect();
        // Prepend a word with an undefined opcode byte
        words.insert(0, 0xFFu64 << 56);
        let patched = PatchProgram::from_words(&words).unwrap();

        let clean = render(&prog, 69, 1.0, 256);
        let skipped = render(&patched, 69, 1.0, 256);
        // The undefined instruction shifts state-slot ownership by one
        // position, but the oscillator still runs from its own slot.
        assert_eq!(clean.len(), skipped.len());
        for s in skipped {
            assert!(s.is_finite());
        }
        assert!(clean.iter().any(|s| s.abs() > 0.1));
    }
}
