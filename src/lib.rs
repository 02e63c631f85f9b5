//! # Carillon: A Two-Layer Bytecode Synthesis Engine
//!
//! > *"A carillon is a set of bells played from a keyboard: one mechanism
//! > strikes the bells, another reads the music. Here, one virtual machine
//! > makes the sound and a second one plays the score."*
//!
//! `carillon` is a Rust library built around two cooperating bytecode
//! virtual machines:
//!
//! - **The patch VM**: a register-based, fixed-width instruction set that
//!   evaluates one sample of audio per program execution across a graph of
//!   oscillators, filters, envelopes, modulators, noise sources, and
//!   nonlinearities. Each instruction owns a handful of persistent state
//!   slots, so phases, filter memories, and envelope stages survive from
//!   sample to sample while the register file is rebuilt every pass.
//! - **The voice VM**: a symbolic score bytecode (notes, rests, ties,
//!   glides, nested repeats) that compiles to a time-sorted event stream
//!   and is rendered by driving the patch VM with note-on/note-off events
//!   at single-sample accuracy.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Voice VM                               │  Musical time
//! │  - VoiceBuilder → VoiceProgram          │  "the score"
//! │  - compile() → EventStream (beats)      │
//! │  - VoiceRenderer: events → samples      │
//! ├─────────────────────────────────────────┤
//! │  Patch VM                               │  Audio rate
//! │  - PatchBuilder → PatchProgram          │  "the instrument"
//! │  - Patch: program + per-voice state     │
//! │  - one program pass per output sample   │
//! ├─────────────────────────────────────────┤
//! │  Shared Tables                          │  Quantized parameters
//! │  - pitches, cutoffs, envelope times,    │
//! │    modulation depths, note durations    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! All buffers are fixed-capacity; the audio path performs no allocation
//! and never branches on errors; numeric edge cases have defined local
//! fallbacks. Rendering is deterministic: identical inputs produce
//! bit-identical sample buffers.
//!
//! ## Quick Start
//!
//! ```rust
//! use carillon::prelude::*;
//!
//! // Build an instrument: sine through an ADSR contour
//! let mut b = PatchBuilder::new();
//! let env = b.adsr(3, 10, 22, 18);
//! let osc = b.sine(Reg::ONE);
//! let sig = b.mul(osc, env);
//! b.out(sig);
//! let instrument = b.finish().unwrap();
//!
//! // Write a score: C major arpeggio, repeated twice
//! let mut v = VoiceBuilder::new();
//! v.repeat_begin();
//! v.note(60, Dur::Eighth, Vel::Mf);
//! v.note(64, Dur::Eighth, Vel::Mf);
//! v.note(67, Dur::Eighth, Vel::Mf);
//! v.repeat_end(2);
//! let score = v.finish().unwrap().compile().unwrap();
//!
//! // Render at 120 BPM, 44.1 kHz
//! let mut renderer = VoiceRenderer::new(&score, &instrument, 120.0, 44_100.0);
//! let mut block = [0.0f32; 64];
//! while !renderer.render_block(&mut block) {
//!     // hand the block to your sink
//! }
//! ```
//!
//! ## Module Guide
//!
//! - [`tables`] - Shared quantized parameter dictionaries
//! - [`instr`] - Patch opcodes and the 64-bit instruction word
//! - [`program`] - Patch programs and the inline assembler
//! - [`patch`] - Per-voice state and the per-sample interpreter
//! - [`voice`] - Score bytecode, builder, and the event compiler
//! - [`render`] - Sample-accurate event scheduling
//! - [`presets`] - Reference instrument programs
//! - [`serialize`] - JSON program definitions
//! - [`rng`] - The deterministic noise generator

pub mod instr;
pub mod patch;
pub mod presets;
pub mod program;
pub mod render;
pub mod rng;
pub mod serialize;
pub mod tables;
pub mod voice;

/// Prelude module for convenient imports
pub mod prelude {
    // Patch VM
    pub use crate::instr::{Instr, Opcode};
    pub use crate::patch::Patch;
    pub use crate::program::{BuildError, PatchBuilder, PatchProgram, Reg};

    // Voice VM
    pub use crate::render::VoiceRenderer;
    pub use crate::voice::{
        CompileError, Dur, Event, EventKind, EventStream, Vel, VoiceBuildError, VoiceBuilder,
        VoiceInstr, VoiceOp, VoiceProgram,
    };

    // Shared tables
    pub use crate::tables::{tables, Tables, DURATION_BEATS, MOD_DEPTH, VELOCITY};

    // Presets
    pub use crate::presets::{PresetCategory, PresetInfo, CATALOGUE};

    // Serialization
    pub use crate::serialize::{PatchDef, VoiceDef};

    // Noise
    pub use crate::rng::Xorshift32;
}

// Re-export key types at crate root for convenience
pub use prelude::*;
