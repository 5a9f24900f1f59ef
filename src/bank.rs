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

//! The instrument bank data model.
//!
//! A [`Bank`] is a flat table of optional [`Program`]s plus a table of breath
//! scripts (vibrato depth curves). Each program owns a list of [`Tone`]s: a
//! key range, tuning, envelope registers, mixing parameters and an offset
//! into the sample body. Banks are immutable once constructed; how the bytes
//! got here (container parsing, tooling) is someone else's job.

use std::fmt;

/// Per-tone behavior flags.
///
/// The flag byte travels with the tone straight out of the bank data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToneFlags(u8);

impl ToneFlags {
    /// The tone plays the pseudo-random noise source instead of its sample.
    pub const NOISE: u8 = 0x01;
    /// The tone contributes to the reverb send.
    pub const REVERB: u8 = 0x02;
    /// Prefer the program's pitch-bend multiplier over the tone's.
    pub const USE_PROGRAM_PITCH: u8 = 0x04;
    /// The tone responds to the modulation controller with vibrato.
    pub const USE_MODULATION: u8 = 0x08;
    /// Prefer the program's breath script index over the tone's.
    pub const USE_PROGRAM_BREATH: u8 = 0x10;
    /// Marked high priority for voice allocation. Carried, not consumed.
    pub const HIGH_PRIORITY: u8 = 0x20;

    pub fn new(bits: u8) -> ToneFlags {
        ToneFlags(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn noise(self) -> bool {
        self.0 & Self::NOISE != 0
    }

    pub fn reverb(self) -> bool {
        self.0 & Self::REVERB != 0
    }

    pub fn use_program_pitch(self) -> bool {
        self.0 & Self::USE_PROGRAM_PITCH != 0
    }

    pub fn use_modulation(self) -> bool {
        self.0 & Self::USE_MODULATION != 0
    }

    pub fn use_program_breath(self) -> bool {
        self.0 & Self::USE_PROGRAM_BREATH != 0
    }

    pub fn high_priority(self) -> bool {
        self.0 & Self::HIGH_PRIORITY != 0
    }
}

impl fmt::Display for ToneFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// A single zone of a program: one sample, one key range, one envelope.
#[derive(Debug, Clone)]
pub struct Tone {
    /// Lowest MIDI key this tone responds to, inclusive.
    pub min_key: u8,
    /// Highest MIDI key this tone responds to, inclusive.
    pub max_key: u8,
    /// The key at which the sample plays at its recorded rate. 0 means
    /// unspecified and is treated as 60 (middle C).
    pub root_key: u8,
    /// Fine tuning in twentieths of a semitone... ish. Divided by 20 to get
    /// the semitone fraction applied against the root key.
    pub fine_tune: i8,
    /// Offset of the tone's ADPCM stream within the sample body.
    pub sample_offset: u32,
    /// Low half of the hardware envelope register pair.
    pub adsr1: u16,
    /// High half of the hardware envelope register pair.
    pub adsr2: u16,
    /// Tone volume, 0-127.
    pub volume: u8,
    /// Tone pan, 0-127, 64 center.
    pub pan: u8,
    /// Pitch-bend multiplier in semitones; 0 leaves the channel's current
    /// multiplier untouched.
    pub pitch_mult: u8,
    /// Breath script (vibrato depth curve) index; 0xFF and 0x7F mean none.
    pub breath_index: u8,
    pub flags: ToneFlags,
}

impl Tone {
    /// Whether this tone's key range contains the given MIDI key.
    pub fn contains(&self, key: u8) -> bool {
        self.min_key <= key && key <= self.max_key
    }
}

impl Default for Tone {
    fn default() -> Tone {
        Tone {
            min_key: 0,
            max_key: 127,
            root_key: 60,
            fine_tune: 0,
            sample_offset: 0,
            adsr1: 0,
            adsr2: 0,
            volume: 127,
            pan: 64,
            pitch_mult: 0,
            breath_index: 0xFF,
            flags: ToneFlags::default(),
        }
    }
}

/// How a program's tones respond to a pitched note-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    /// The first tone whose key range contains the note sounds.
    Split,
    /// Every tone whose key range contains the note sounds.
    Layered,
    /// Never triggered by pitched note-on; tones are fired directly by
    /// index (see `Synth::trigger_tone`).
    Sfx,
}

/// A playable instrument: a tone list plus program-wide mixing parameters.
#[derive(Debug, Clone)]
pub struct Program {
    pub kind: ProgramKind,
    pub tones: Vec<Tone>,
    /// Program master volume, 0-127.
    pub volume: u8,
    /// Program master pan, 0-127, 64 center. Summed with the tone pan.
    pub pan: u8,
    /// Program-wide pitch-bend multiplier; consulted when a tone carries the
    /// use-program-pitch flag.
    pub pitch_mult: u8,
    /// Program-wide breath script index; consulted when a tone carries the
    /// use-program-breath flag.
    pub breath_index: u8,
}

impl Default for Program {
    fn default() -> Program {
        Program {
            kind: ProgramKind::Split,
            tones: Vec::new(),
            volume: 127,
            pan: 64,
            pitch_mult: 0,
            breath_index: 0xFF,
        }
    }
}

/// An immutable instrument bank.
///
/// Program slots may be empty (banks index programs sparsely); notes landing
/// on an empty slot are ignored by the mixer.
#[derive(Debug, Clone, Default)]
pub struct Bank {
    programs: Vec<Option<Program>>,
    breath_scripts: Vec<Vec<u8>>,
}

impl Bank {
    pub fn new(programs: Vec<Option<Program>>, breath_scripts: Vec<Vec<u8>>) -> Bank {
        Bank {
            programs,
            breath_scripts,
        }
    }

    /// Fetches a program by slot index, if the slot exists and is populated.
    pub fn program(&self, index: usize) -> Option<&Program> {
        self.programs.get(index)?.as_ref()
    }

    /// The number of program slots, populated or not.
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Fetches a breath script (vibrato depth curve) by index.
    pub fn breath_script(&self, index: usize) -> Option<&[u8]> {
        self.breath_scripts.get(index).map(Vec::as_slice)
    }
}

/// Source of raw ADPCM sample bytes for the decoder.
///
/// Implementations hand back the byte stream starting at a tone's sample
/// offset; the decoder itself finds the end-flagged block. Returning `None`
/// for an unknown offset makes the affected voice silent rather than failing
/// the render.
pub trait SampleSource {
    fn sample_bytes(&self, offset: u32) -> Option<&[u8]>;
}

/// The whole sample body held in memory, addressed by plain offsets.
#[derive(Debug, Clone, Default)]
pub struct SampleBody {
    data: Vec<u8>,
}

impl SampleBody {
    pub fn new(data: Vec<u8>) -> SampleBody {
        SampleBody { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl SampleSource for SampleBody {
    fn sample_bytes(&self, offset: u32) -> Option<&[u8]> {
        self.data.get(offset as usize..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_flags() {
        let flags = ToneFlags::new(ToneFlags::NOISE | ToneFlags::USE_MODULATION);
        assert!(flags.noise());
        assert!(flags.use_modulation());
        assert!(!flags.reverb());
        assert!(!flags.use_program_pitch());
        assert!(!flags.use_program_breath());
        assert!(!flags.high_priority());
        assert_eq!(flags.bits(), 0x09);
    }

    #[test]
    fn test_tone_key_range() {
        let tone = Tone {
            min_key: 40,
            max_key: 52,
            ..Tone::default()
        };
        assert!(!tone.contains(39));
        assert!(tone.contains(40));
        assert!(tone.contains(52));
        assert!(!tone.contains(53));
    }

    #[test]
    fn test_bank_sparse_slots() {
        let bank = Bank::new(
            vec![None, Some(Program::default()), None],
            vec![vec![1, 2, 3]],
        );
        assert_eq!(bank.program_count(), 3);
        assert!(bank.program(0).is_none());
        assert!(bank.program(1).is_some());
        assert!(bank.program(2).is_none());
        assert!(bank.program(3).is_none());
        assert_eq!(bank.breath_script(0), Some(&[1u8, 2, 3][..]));
        assert!(bank.breath_script(1).is_none());
    }

    #[test]
    fn test_sample_body_offsets() {
        let body = SampleBody::new(vec![0xAA, 0xBB, 0xCC]);
        assert_eq!(body.sample_bytes(0), Some(&[0xAA, 0xBB, 0xCC][..]));
        assert_eq!(body.sample_bytes(2), Some(&[0xCC][..]));
        assert_eq!(body.sample_bytes(3), Some(&[][..]));
        assert_eq!(body.sample_bytes(4), None);
    }
}
