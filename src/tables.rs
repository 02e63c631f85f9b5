//! Shared Quantized Constant Tables
//!
//! Every parameter the patch VM reads from an immediate field is an index
//! into one of five small dictionaries: pitches, filter cutoffs, envelope
//! times, modulation depths, and note durations. Quantizing parameters this
//! way keeps instructions at a fixed width and makes programs portable
//! across sample rates.
//!
//! The three computed tables are populated once behind a [`OnceLock`];
//! [`tables`] is both the initializer and the accessor and is safe to call
//! from any entry point, in any order, any number of times.

use libm::Libm;
use std::sync::OnceLock;

/// Modulation depth table: 32 linear steps across [0, 1].
///
/// Used for FM/AM depths, mix weights, BPF damping, and ADSR sustain
/// levels. The values are part of the instruction-set contract.
pub const MOD_DEPTH: [f32; 32] = [
    0.000, 0.032, 0.065, 0.097, 0.129, 0.161, 0.194, 0.226, //
    0.258, 0.290, 0.323, 0.355, 0.387, 0.419, 0.452, 0.484, //
    0.516, 0.548, 0.581, 0.613, 0.645, 0.677, 0.710, 0.742, //
    0.774, 0.806, 0.839, 0.871, 0.903, 0.935, 0.968, 1.000,
];

/// Note duration table in beats: 1/64 up to a whole beat.
pub const DURATION_BEATS: [f32; 7] = [
    1.0 / 64.0,
    1.0 / 32.0,
    1.0 / 16.0,
    1.0 / 8.0,
    1.0 / 4.0,
    1.0 / 2.0,
    1.0,
];

/// Velocity table: 8 dynamic steps, pppp through ff.
pub const VELOCITY: [f32; 8] = [0.125, 0.250, 0.375, 0.500, 0.625, 0.750, 0.875, 1.000];

/// The runtime-computed dictionaries shared by every voice.
#[derive(Debug)]
pub struct Tables {
    /// MIDI 0-127 to Hz, equal temperament, A4 = 440 Hz.
    pub pitch_hz: [f32; 128],
    /// 64 geometric steps, 20 Hz to 20 kHz.
    pub cutoff_hz: [f32; 64],
    /// 32 geometric steps, 1 ms to 4 s.
    pub env_seconds: [f32; 32],
}

static TABLES: OnceLock<Tables> = OnceLock::new();

/// Access the shared tables, computing them on first use.
pub fn tables() -> &'static Tables {
    TABLES.get_or_init(|| {
        let mut pitch_hz = [0.0f32; 128];
        for (m, f) in pitch_hz.iter_mut().enumerate() {
            *f = 440.0 * Libm::<f32>::pow(2.0, (m as f32 - 69.0) / 12.0);
        }

        let mut cutoff_hz = [0.0f32; 64];
        for (i, c) in cutoff_hz.iter_mut().enumerate() {
            *c = 20.0 * Libm::<f32>::pow(1000.0, i as f32 / 63.0);
        }

        let mut env_seconds = [0.0f32; 32];
        for (i, t) in env_seconds.iter_mut().enumerate() {
            *t = 0.001 * Libm::<f32>::pow(4000.0, i as f32 / 31.0);
        }

        Tables {
            pitch_hz,
            cutoff_hz,
            env_seconds,
        }
    })
}

/// Look up the frequency of a MIDI pitch, clamping to 0..=127.
#[inline]
pub fn pitch_hz(midi: i32) -> f32 {
    tables().pitch_hz[midi.clamp(0, 127) as usize]
}

/// Look up a filter cutoff in Hz, clamping the index to the table.
#[inline]
pub fn cutoff_hz(index: i32) -> f32 {
    tables().cutoff_hz[index.clamp(0, 63) as usize]
}

/// Look up an envelope segment time in seconds, clamping the index.
#[inline]
pub fn env_seconds(index: i32) -> f32 {
    tables().env_seconds[index.clamp(0, 31) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pitch_table_anchors() {
        assert_relative_eq!(pitch_hz(69), 440.0, epsilon = 1e-3);
        // One octave down halves the frequency
        assert_relative_eq!(pitch_hz(57), 220.0, epsilon = 1e-3);
        // Middle C
        assert_relative_eq!(pitch_hz(60), 261.626, epsilon = 1e-2);
    }

    #[test]
    fn test_pitch_table_clamps() {
        assert_eq!(pitch_hz(-5), pitch_hz(0));
        assert_eq!(pitch_hz(500), pitch_hz(127));
    }

    #[test]
    fn test_cutoff_table_endpoints() {
        assert_relative_eq!(cutoff_hz(0), 20.0, epsilon = 1e-3);
        assert_relative_eq!(cutoff_hz(63), 20_000.0, epsilon = 1.0);
        assert_eq!(cutoff_hz(99), cutoff_hz(63));
    }

    #[test]
    fn test_cutoff_table_monotonic() {
        let t = tables();
        for i in 1..64 {
            assert!(t.cutoff_hz[i] > t.cutoff_hz[i - 1]);
        }
    }

    #[test]
    fn test_env_table_endpoints() {
        assert_relative_eq!(env_seconds(0), 0.001, epsilon = 1e-6);
        assert_relative_eq!(env_seconds(31), 4.0, epsilon = 1e-3);
        assert_eq!(env_seconds(-1), env_seconds(0));
    }

    #[test]
    fn test_mod_depth_range() {
        assert_eq!(MOD_DEPTH[0], 0.0);
        assert_eq!(MOD_DEPTH[31], 1.0);
        for w in MOD_DEPTH.windows(2) {
            assert!(w[1] > w[0]);
        }
    }

    #[test]
    fn test_duration_table() {
        assert_relative_eq!(DURATION_BEATS[4], 0.25);
        assert_relative_eq!(DURATION_BEATS[6], 1.0);
    }

    #[test]
    fn test_idempotent_init() {
        let a = tables() as *const Tables;
        let b = tables() as *const Tables;
        assert_eq!(a, b);
    }
}
