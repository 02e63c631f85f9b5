//! Score Bytecode: Voice Programs and the Event Compiler
//!
//! A voice program is an ordered sequence of 32-bit symbolic score
//! instructions (notes, rests, ties, glides, nested repeats):
//!
//! ```text
//! ┌────────┬────────┬─────────┬──────────────────┐
//! │ opcode │ pitch  │ dur_idx │ vel_idx / count  │
//! │  8 bit │  8 bit │  8 bit  │      8 bit       │
//! └────────┴────────┴─────────┴──────────────────┘
//!  31    24 23    16 15      8 7                0
//! ```
//!
//! Compilation walks the program once, expanding repeat blocks inline and
//! resolving ties, and produces a chronologically ordered [`EventStream`]
//! in beat units. The stream is pure data; the renderer consumes it
//! read-only.

use crate::tables::{DURATION_BEATS, VELOCITY};
use serde::{Deserialize, Serialize};

/// Maximum instructions per voice program.
pub const VOICE_MAX_INSTRS: usize = 4096;
/// Maximum events per compiled stream.
pub const VOICE_MAX_EVENTS: usize = 8192;
/// Maximum repeat nesting depth.
pub const VOICE_MAX_REPEAT_DEPTH: usize = 8;

/// Velocity used when an instruction carries an out-of-range index.
const DEFAULT_VELOCITY: f32 = 0.75;

/// Score opcodes. Discriminants are the wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VoiceOp {
    /// Play a pitch for a duration.
    Note = 0,
    /// Silence for a duration.
    Rest,
    /// Extend the previous note's duration.
    Tie,
    /// Move to a new pitch with no gap.
    Glide,
    /// Open a repeat block.
    RepeatBegin,
    /// Close a repeat block; the count rides in the velocity byte.
    RepeatEnd,
}

impl VoiceOp {
    #[inline]
    fn from_u8(byte: u8) -> Option<Self> {
        use VoiceOp::*;
        [Note, Rest, Tie, Glide, RepeatBegin, RepeatEnd]
            .get(byte as usize)
            .copied()
    }
}

/// Note durations, indexing the duration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Dur {
    SixtyFourth = 0,
    ThirtySecond,
    Sixteenth,
    Eighth,
    Quarter,
    Half,
    Whole,
}

impl Dur {
    /// Length in beats.
    #[inline]
    pub fn beats(self) -> f32 {
        DURATION_BEATS[self as usize]
    }
}

/// Dynamic levels, pppp through ff, indexing the velocity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Vel {
    Pppp = 0,
    Ppp,
    Pp,
    P,
    Mp,
    Mf,
    F,
    Ff,
}

impl Vel {
    /// Velocity in [0, 1].
    #[inline]
    pub fn value(self) -> f32 {
        VELOCITY[self as usize]
    }
}

/// One packed score instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInstr(pub u32);

impl VoiceInstr {
    #[inline]
    fn new(op: VoiceOp, pitch: u8, dur: u8, vel: u8) -> Self {
        VoiceInstr((op as u32) << 24 | (pitch as u32) << 16 | (dur as u32) << 8 | vel as u32)
    }

    /// The decoded opcode, if the byte is in range.
    #[inline]
    pub fn op(self) -> Option<VoiceOp> {
        VoiceOp::from_u8((self.0 >> 24) as u8)
    }

    /// MIDI pitch 0-127.
    #[inline]
    pub fn pitch(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Duration table index.
    #[inline]
    pub fn dur_index(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Velocity table index; repeat count for `RepeatEnd`.
    #[inline]
    pub fn vel_index(self) -> u8 {
        self.0 as u8
    }
}

/// A complete score program.
#[derive(Clone)]
pub struct VoiceProgram {
    code: [VoiceInstr; VOICE_MAX_INSTRS],
    len: usize,
}

impl VoiceProgram {
    /// The instructions, in score order.
    #[inline]
    pub fn instrs(&self) -> &[VoiceInstr] {
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

    /// Rebuild a program from raw instruction words.
    pub fn from_words(words: &[u32]) -> Result<Self, VoiceBuildError> {
        if words.len() > VOICE_MAX_INSTRS {
            return Err(VoiceBuildError::TooManyInstructions);
        }
        let mut code = [VoiceInstr(0); VOICE_MAX_INSTRS];
        for (slot, &word) in code.iter_mut().zip(words) {
            *slot = VoiceInstr(word);
        }
        Ok(Self {
            code,
            len: words.len(),
        })
    }

    /// Compile to a time-sorted event stream.
    ///
    /// Repeat blocks are expanded inline (count clamped to at least 1),
    /// ties shift the most recent note-off, and glides compile as plain
    /// note-on/off pairs. `total_beats` is the final cursor position.
    pub fn compile(&self) -> Result<EventStream, CompileError> {
        let mut stream = EventStream::default();
        let mut beat = 0.0f32;
        compile_range(self.instrs(), 0, self.len, &mut stream, &mut beat)?;
        stream.total_beats = beat;
        Ok(stream)
    }
}

impl Default for VoiceProgram {
    fn default() -> Self {
        Self {
            code: [VoiceInstr(0); VOICE_MAX_INSTRS],
            len: 0,
        }
    }
}

/// Errors latched by the score assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceBuildError {
    /// The instruction budget (4096) was exceeded.
    TooManyInstructions,
    /// Repeats nested deeper than 8 levels.
    RepeatTooDeep,
    /// `repeat_end` with no open `repeat_begin`.
    UnmatchedRepeatEnd,
}

impl core::fmt::Display for VoiceBuildError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            VoiceBuildError::TooManyInstructions => {
                write!(f, "Voice program exceeds {} instructions", VOICE_MAX_INSTRS)
            }
            VoiceBuildError::RepeatTooDeep => {
                write!(f, "Repeats nested deeper than {}", VOICE_MAX_REPEAT_DEPTH)
            }
            VoiceBuildError::UnmatchedRepeatEnd => {
                write!(f, "repeat_end without matching repeat_begin")
            }
        }
    }
}

impl std::error::Error for VoiceBuildError {}

/// Errors from event-stream compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileError {
    /// A `RepeatBegin` has no matching `RepeatEnd`.
    UnmatchedRepeatBegin,
    /// The event budget (8192) was exceeded.
    TooManyEvents,
}

impl core::fmt::Display for CompileError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CompileError::UnmatchedRepeatBegin => {
                write!(f, "repeat_begin without matching repeat_end")
            }
            CompileError::TooManyEvents => {
                write!(f, "Compiled stream exceeds {} events", VOICE_MAX_EVENTS)
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// Forward-only assembler for [`VoiceProgram`]s.
///
/// Like the patch assembler, capacity problems latch rather than panic;
/// [`VoiceBuilder::finish`] reports them. An unmatched `repeat_begin` is
/// left for the compiler to reject.
pub struct VoiceBuilder {
    prog: VoiceProgram,
    repeat_depth: usize,
    error: Option<VoiceBuildError>,
}

impl VoiceBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            prog: VoiceProgram::default(),
            repeat_depth: 0,
            error: None,
        }
    }

    fn emit(&mut self, instr: VoiceInstr) {
        if self.prog.len >= VOICE_MAX_INSTRS {
            self.error.get_or_insert(VoiceBuildError::TooManyInstructions);
            return;
        }
        self.prog.code[self.prog.len] = instr;
        self.prog.len += 1;
    }

    /// Play `pitch` for `dur` at dynamic `vel`.
    pub fn note(&mut self, pitch: u8, dur: Dur, vel: Vel) {
        self.emit(VoiceInstr::new(VoiceOp::Note, pitch, dur as u8, vel as u8));
    }

    /// Silence for `dur`.
    pub fn rest(&mut self, dur: Dur) {
        self.emit(VoiceInstr::new(VoiceOp::Rest, 0, dur as u8, 0));
    }

    /// Extend the previous note by `dur`.
    pub fn tie(&mut self, dur: Dur) {
        self.emit(VoiceInstr::new(VoiceOp::Tie, 0, dur as u8, 0));
    }

    /// Move to `pitch` with no gap from the previous note.
    pub fn glide(&mut self, pitch: u8, dur: Dur, vel: Vel) {
        self.emit(VoiceInstr::new(VoiceOp::Glide, pitch, dur as u8, vel as u8));
    }

    /// Open a repeat block.
    pub fn repeat_begin(&mut self) {
        if self.repeat_depth >= VOICE_MAX_REPEAT_DEPTH {
            self.error.get_or_insert(VoiceBuildError::RepeatTooDeep);
            return;
        }
        self.repeat_depth += 1;
        self.emit(VoiceInstr::new(VoiceOp::RepeatBegin, 0, 0, 0));
    }

    /// Close the innermost repeat block, playing it `count` times.
    pub fn repeat_end(&mut self, count: u8) {
        if self.repeat_depth == 0 {
            self.error.get_or_insert(VoiceBuildError::UnmatchedRepeatEnd);
            return;
        }
        self.repeat_depth -= 1;
        self.emit(VoiceInstr::new(VoiceOp::RepeatEnd, 0, 0, count));
    }

    /// The latched error, if any.
    pub fn error(&self) -> Option<VoiceBuildError> {
        self.error
    }

    /// Finalize the program.
    pub fn finish(self) -> Result<VoiceProgram, VoiceBuildError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.prog),
        }
    }
}

impl Default for VoiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Event kinds delivered to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    NoteOn,
    NoteOff,
}

/// One timed note event, in beats from the start of the score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub beat: f32,
    pub kind: EventKind,
    pub pitch: u8,
    pub velocity: f32,
}

impl Event {
    const EMPTY: Event = Event {
        beat: 0.0,
        kind: EventKind::NoteOn,
        pitch: 0,
        velocity: 0.0,
    };
}

/// A compiled, time-sorted sequence of events.
#[derive(Clone, Debug)]
pub struct EventStream {
    events: [Event; VOICE_MAX_EVENTS],
    len: usize,
    total_beats: f32,
}

impl EventStream {
    /// The events, in chronological order.
    #[inline]
    pub fn events(&self) -> &[Event] {
        &self.events[..self.len]
    }

    /// Number of events.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the stream holds no events.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total score length in beats.
    #[inline]
    pub fn total_beats(&self) -> f32 {
        self.total_beats
    }

    fn push(&mut self, event: Event) -> Result<(), CompileError> {
        if self.len >= VOICE_MAX_EVENTS {
            return Err(CompileError::TooManyEvents);
        }
        self.events[self.len] = event;
        self.len += 1;
        Ok(())
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self {
            events: [Event::EMPTY; VOICE_MAX_EVENTS],
            len: 0,
            total_beats: 0.0,
        }
    }
}

#[inline]
fn dur_beats(index: u8) -> f32 {
    DURATION_BEATS
        .get(index as usize)
        .copied()
        .unwrap_or(DURATION_BEATS[Dur::Quarter as usize])
}

#[inline]
fn velocity_value(index: u8) -> f32 {
    VELOCITY
        .get(index as usize)
        .copied()
        .unwrap_or(DEFAULT_VELOCITY)
}

/// Compile `code[lo..hi)`, advancing the beat cursor.
fn compile_range(
    code: &[VoiceInstr],
    lo: usize,
    hi: usize,
    stream: &mut EventStream,
    beat: &mut f32,
) -> Result<(), CompileError> {
    let mut i = lo;
    while i < hi {
        let vi = code[i];
        let dur = dur_beats(vi.dur_index());
        match vi.op() {
            // A glide is a plain note pair at the event layer: the intent
            // is sequential close pitches with no gap.
            Some(VoiceOp::Note) | Some(VoiceOp::Glide) => {
                let vel = velocity_value(vi.vel_index());
                stream.push(Event {
                    beat: *beat,
                    kind: EventKind::NoteOn,
                    pitch: vi.pitch(),
                    velocity: vel,
                })?;
                stream.push(Event {
                    beat: *beat + dur,
                    kind: EventKind::NoteOff,
                    pitch: vi.pitch(),
                    velocity: vel,
                })?;
                *beat += dur;
            }
            Some(VoiceOp::Rest) => *beat += dur,
            Some(VoiceOp::Tie) => {
                // Extend the most recent note-off; with no prior note the
                // tie still advances time.
                if let Some(ev) = stream.events[..stream.len]
                    .iter_mut()
                    .rev()
                    .find(|e| e.kind == EventKind::NoteOff)
                {
                    ev.beat += dur;
                }
                *beat += dur;
            }
            Some(VoiceOp::RepeatBegin) => {
                let mut depth = 1usize;
                let mut end = None;
                for (j, w) in code.iter().enumerate().take(hi).skip(i + 1) {
                    match w.op() {
                        Some(VoiceOp::RepeatBegin) => depth += 1,
                        Some(VoiceOp::RepeatEnd) => {
                            depth -= 1;
                            if depth == 0 {
                                end = Some(j);
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                let end = end.ok_or(CompileError::UnmatchedRepeatBegin)?;
                let count = code[end].vel_index().max(1);
                for _ in 0..count {
                    compile_range(code, i + 1, end, stream, beat)?;
                }
                i = end;
            }
            // A stray RepeatEnd (or an undefined opcode byte) is skipped.
            Some(VoiceOp::RepeatEnd) | None => {}
        }
        i += 1;
    }
    Ok(())
}
