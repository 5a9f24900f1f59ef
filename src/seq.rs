// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The common sequence representation.
//!
//! Every input format is adapted into a single flat stream of delta-timed
//! [`SeqEvent`]s plus sequence-wide timing and per-channel initial state.
//! The driver consumes this representation only; it neither knows nor cares
//! where the events came from.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod midi;

pub use midi::sequence_from_midi;

/// Errors adapting an input format into a [`Sequence`].
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("unable to parse standard MIDI file: {0}")]
    Midi(#[from] midly::Error),
}

/// What happened, without the when.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8 },
    Controller { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    /// Bend position in MSB units, 0-127, 64 center.
    PitchBend { channel: u8, value: u8 },
    /// Tempo change, in beats per minute.
    Tempo { bpm: f32 },
    /// Terminal sentinel; nothing after it is played.
    EndOfTrack,
}

/// One event, `delta` ticks after the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeqEvent {
    pub delta: u32,
    pub kind: EventKind,
}

/// Initial controller state for one channel, as carried by native sequence
/// headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInit {
    pub channel: u8,
    pub program: u8,
    pub volume: u8,
    pub pan: u8,
    pub modulation: u8,
    pub pitch_bend: u8,
    pub vibrato_rate: u8,
}

/// A complete performance ready for the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub events: Vec<SeqEvent>,
    pub ticks_per_quarter: u16,
    /// Starting tempo; tempo events in the stream override it.
    pub tempo_bpm: f32,
    pub channel_inits: Vec<ChannelInit>,
}

impl Default for Sequence {
    fn default() -> Sequence {
        Sequence {
            events: Vec::new(),
            ticks_per_quarter: 480,
            tempo_bpm: 120.0,
            channel_inits: Vec::new(),
        }
    }
}
