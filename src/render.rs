//! Sample-Accurate Voice Rendering
//!
//! The renderer walks an [`EventStream`] and a bound patch in lockstep. At
//! every output sample it drains all events due at the current beat (a
//! note-on reseeds the patch, a note-off injects envelope release), then
//! advances the patch by exactly one sample. Scheduling therefore lands on
//! sample boundaries, never block boundaries.
//!
//! The voice is monophonic by contract: a note-on simply replaces whatever
//! was sounding, and note-off pitch is ignored.

use crate::patch::Patch;
use crate::program::PatchProgram;
use crate::voice::{EventKind, EventStream};

/// Residual magnitude under which a release tail counts as silence.
const SILENCE_THRESHOLD: f32 = 1e-5;

/// Stateful playback of an [`EventStream`] through one patch.
pub struct VoiceRenderer<'a> {
    events: &'a EventStream,
    bpm: f32,
    dt: f32,
    beat_time: f32,
    sample_time: f32,
    cursor: usize,
    patch: Patch<'a>,
    voice_active: bool,
    done: bool,
}

impl<'a> VoiceRenderer<'a> {
    /// Create a renderer over `events`, playing `program` at `bpm` beats
    /// per minute and `sample_rate` Hz.
    pub fn new(
        events: &'a EventStream,
        program: &'a PatchProgram,
        bpm: f32,
        sample_rate: f32,
    ) -> Self {
        Self {
            events,
            bpm,
            dt: 1.0 / sample_rate,
            beat_time: 0.0,
            sample_time: 0.0,
            cursor: 0,
            patch: Patch::new(program, sample_rate),
            voice_active: false,
            done: false,
        }
    }

    /// True once every event has fired and the last voice has decayed.
    #[inline]
    pub fn done(&self) -> bool {
        self.done
    }

    /// Current position in beats.
    #[inline]
    pub fn beat_time(&self) -> f32 {
        self.beat_time
    }

    /// Current position in seconds.
    #[inline]
    pub fn sample_time(&self) -> f32 {
        self.sample_time
    }

    /// Render one block of samples.
    ///
    /// Returns `false` while playing and `true` once done; after that,
    /// every call zero-fills the buffer and keeps reporting done.
    pub fn render_block(&mut self, out: &mut [f32]) -> bool {
        if self.done {
            out.fill(0.0);
            return true;
        }

        let secs_per_beat = 60.0 / self.bpm;

        for sample in out.iter_mut() {
            // Fire everything due at or before the current beat, in
            // stream order.
            while self.cursor < self.events.len() {
                let ev = self.events.events()[self.cursor];
                if ev.beat > self.beat_time {
                    break;
                }
                match ev.kind {
                    EventKind::NoteOn => {
                        self.patch.note_on(ev.pitch, ev.velocity);
                        self.voice_active = true;
                    }
                    EventKind::NoteOff => {
                        if self.voice_active {
                            self.patch.release();
                        }
                    }
                }
                self.cursor += 1;
            }

            *sample = if self.voice_active {
                self.patch.tick()
            } else {
                0.0
            };

            self.sample_time += self.dt;
            self.beat_time = self.sample_time / secs_per_beat;
        }

        // All events fired: probe one sample of the tail and latch done
        // once it has decayed to silence.
        if self.cursor >= self.events.len() {
            let silent = if self.voice_active {
                self.patch.tick().abs() < SILENCE_THRESHOLD
            } else {
                true
            };
            if silent {
                self.done = true;
            }
        }
        self.done
    }
}
