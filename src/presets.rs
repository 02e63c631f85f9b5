//! Reference Instrument Programs
//!
//! A small library of ready-to-play patch programs: the classic
//! oscillator/filter/envelope combinations the engine is exercised with.
//! Each builder returns a fresh [`PatchProgram`]; programs are pure data,
//! so callers can share one across any number of voices.

use crate::program::{PatchBuilder, PatchProgram, Reg};

/// Preset category for organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetCategory {
    /// Plucked and struck keyboard-like sounds
    Keys,
    /// Bass sounds
    Bass,
    /// Lead sounds
    Lead,
    /// Pad/ambient sounds
    Pad,
    /// Percussion and noise-based sounds
    Percussion,
}

/// Catalogue entry: metadata plus the program builder.
#[derive(Clone, Copy)]
pub struct PresetInfo {
    pub name: &'static str,
    pub category: PresetCategory,
    pub description: &'static str,
    pub build: fn() -> PatchProgram,
}

/// All reference programs.
pub const CATALOGUE: &[PresetInfo] = &[
    PresetInfo {
        name: "sine_adsr",
        category: PresetCategory::Keys,
        description: "Pure sine with a full ADSR contour",
        build: sine_adsr,
    },
    PresetInfo {
        name: "saw_lpf",
        category: PresetCategory::Bass,
        description: "Sawtooth through a one-pole lowpass",
        build: saw_lpf,
    },
    PresetInfo {
        name: "fm_two_op",
        category: PresetCategory::Keys,
        description: "Two-operator FM, modulator an octave up",
        build: fm_two_op,
    },
    PresetInfo {
        name: "fm_fold",
        category: PresetCategory::Lead,
        description: "FM into a wavefolder, lowpassed",
        build: fm_fold,
    },
    PresetInfo {
        name: "noise_bpf",
        category: PresetCategory::Percussion,
        description: "Bandpassed noise burst with exponential decay",
        build: noise_bpf,
    },
    PresetInfo {
        name: "detuned_pad",
        category: PresetCategory::Pad,
        description: "Two detuned sines, slow AM, lowpassed",
        build: detuned_pad,
    },
    PresetInfo {
        name: "square_hpf",
        category: PresetCategory::Lead,
        description: "Square wave with the fundamental thinned by a highpass",
        build: square_hpf,
    },
    PresetInfo {
        name: "tri_tanh",
        category: PresetCategory::Lead,
        description: "Triangle driven into tanh saturation",
        build: tri_tanh,
    },
    PresetInfo {
        name: "fm_piano",
        category: PresetCategory::Keys,
        description: "Bright FM with a fast decay, piano-like",
        build: fm_piano,
    },
    PresetInfo {
        name: "saw_bass",
        category: PresetCategory::Bass,
        description: "Dark lowpassed saw with a tight release",
        build: saw_bass,
    },
    PresetInfo {
        name: "saturated_lead",
        category: PresetCategory::Lead,
        description: "Triangle overdriven into tanh, singing sustain",
        build: saturated_lead,
    },
    PresetInfo {
        name: "soft_pad",
        category: PresetCategory::Pad,
        description: "Detuned sines into a gentle lowpass, slow attack",
        build: soft_pad,
    },
];

/// Pure sine with a full ADSR contour.
pub fn sine_adsr() -> PatchProgram {
    let mut b = PatchBuilder::new();
    let env = b.adsr(3, 10, 22, 18);
    let osc = b.sine(Reg::ONE);
    let sig = b.mul(osc, env);
    b.out(sig);
    b.finish().expect("preset within budget")
}

/// Sawtooth through a one-pole lowpass.
pub fn saw_lpf() -> PatchProgram {
    let mut b = PatchBuilder::new();
    let env = b.adsr(2, 8, 20, 15);
    let saw = b.saw(Reg::ONE);
    let flt = b.lpf(saw, 30);
    let sig = b.mul(flt, env);
    b.out(sig);
    b.finish().expect("preset within budget")
}

/// Two-operator FM: modulator at twice the note frequency.
pub fn fm_two_op() -> PatchProgram {
    let mut b = PatchBuilder::new();
    let two = b.constant(2.0);
    let modulator = b.sine(two);
    let carrier = b.fm(Reg::ONE, modulator, 20);
    let env = b.adsr(2, 12, 18, 14);
    let sig = b.mul(carrier, env);
    b.out(sig);
    b.finish().expect("preset within budget")
}

/// FM into a wavefolder, then lowpassed.
pub fn fm_fold() -> PatchProgram {
    let mut b = PatchBuilder::new();
    let three = b.constant(3.0);
    let modulator = b.sine(three);
    let carrier = b.fm(Reg::ONE, modulator, 25);
    let folded = b.fold(carrier);
    let flt = b.lpf(folded, 38);
    let env = b.adsr(1, 8, 16, 12);
    let sig = b.mul(flt, env);
    b.out(sig);
    b.finish().expect("preset within budget")
}

/// Bandpassed noise with an exponential decay; snare-ish.
pub fn noise_bpf() -> PatchProgram {
    let mut b = PatchBuilder::new();
    let noise = b.noise();
    let flt = b.bpf(noise, 35, 25);
    let env = b.exp_decay(18);
    let sig = b.mul(flt, env);
    b.out(sig);
    b.finish().expect("preset within budget")
}

/// Two slightly detuned sines under a slow AM wobble, lowpassed.
pub fn detuned_pad() -> PatchProgram {
    let mut b = PatchBuilder::new();
    let osc1 = b.sine(Reg::ONE);
    let detune = b.constant(1.008);
    let osc2 = b.sine(detune);
    let mixed = b.mix(osc1, osc2, 15, 15);
    let lfo_rate = b.constant(0.03);
    let lfo = b.sine(lfo_rate);
    let wobble = b.am(mixed, lfo, 8);
    let flt = b.lpf(wobble, 40);
    let env = b.adsr(15, 5, 28, 20);
    let sig = b.mul(flt, env);
    b.out(sig);
    b.finish().expect("preset within budget")
}

/// Square wave with the fundamental thinned by a highpass; buzzy.
pub fn square_hpf() -> PatchProgram {
    let mut b = PatchBuilder::new();
    let sq = b.square(Reg::ONE);
    let flt = b.hpf(sq, 15);
    let env = b.adsr(0, 8, 18, 12);
    let sig = b.mul(flt, env);
    b.out(sig);
    b.finish().expect("preset within budget")
}

/// Triangle driven into tanh saturation.
pub fn tri_tanh() -> PatchProgram {
    let mut b = PatchBuilder::new();
    let tri = b.triangle(Reg::ONE);
    let gain = b.constant(4.0);
    let driven = b.mul(tri, gain);
    let shaped = b.tanh(driven);
    let env = b.adsr(2, 10, 20, 15);
    let sig = b.mul(shaped, env);
    b.out(sig);
    b.finish().expect("preset within budget")
}

/// Bright FM with a fast decay and short release; piano-like, and quick to
/// fall silent after note-off.
pub fn fm_piano() -> PatchProgram {
    let mut b = PatchBuilder::new();
    let two = b.constant(2.0);
    let modulator = b.sine(two);
    let carrier = b.fm(Reg::ONE, modulator, 15);
    let env = b.adsr(0, 14, 8, 10);
    let sig = b.mul(carrier, env);
    b.out(sig);
    b.finish().expect("preset within budget")
}

/// Sawtooth through a darker lowpass with an instant attack and tight
/// release; sits under a moving line without smearing.
pub fn saw_bass() -> PatchProgram {
    let mut b = PatchBuilder::new();
    let saw = b.saw(Reg::ONE);
    let flt = b.lpf(saw, 28);
    let env = b.adsr(0, 8, 20, 8);
    let sig = b.mul(flt, env);
    b.out(sig);
    b.finish().expect("preset within budget")
}

/// Triangle driven to 3x into tanh, with a longer sustain than the
/// reference saturator; made for melody lines.
pub fn saturated_lead() -> PatchProgram {
    let mut b = PatchBuilder::new();
    let tri = b.triangle(Reg::ONE);
    let gain = b.constant(3.0);
    let driven = b.mul(tri, gain);
    let shaped = b.tanh(driven);
    let env = b.adsr(1, 10, 22, 12);
    let sig = b.mul(shaped, env);
    b.out(sig);
    b.finish().expect("preset within budget")
}

/// Two detuned sines mixed into a gentle lowpass, slow attack and long
/// release; the plain-pad companion to [`detuned_pad`] without the AM
/// wobble.
pub fn soft_pad() -> PatchProgram {
    let mut b = PatchBuilder::new();
    let osc1 = b.sine(Reg::ONE);
    let detune = b.constant(1.008);
    let osc2 = b.sine(detune);
    let mixed = b.mix(osc1, osc2, 15, 15);
    let flt = b.lpf(mixed, 42);
    let env = b.adsr(14, 4, 28, 20);
    let sig = b.mul(flt, env);
    b.out(sig);
    b.finish().expect("preset within budget")
}
