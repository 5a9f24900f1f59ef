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

//! A sounding voice.

use super::envelope::Adsr;
use super::vibrato::Vibrato;

/// Handle into the mixer's decode cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleId(pub(crate) usize);

/// One sounding note: playback position, pitch state, envelope and vibrato.
#[derive(Debug, Clone)]
pub(crate) struct Voice {
    pub(crate) sample: SampleId,
    /// Fractional playback position in source samples.
    pub(crate) position: f64,
    /// Frequency ratio of the played key against the tone's root.
    pub(crate) note_base_pitch: f64,
    /// Current portamento multiplier; 1.0 when not gliding.
    pub(crate) base_pitch_mult: f64,
    pub(crate) target_pitch_mult: f64,
    /// Per-sample multiplicative glide step.
    pub(crate) portamento_step: f64,
    pub(crate) sliding: bool,
    /// tone volume x program volume x velocity, all normalized.
    pub(crate) base_volume: f32,
    /// Combined tone and program pan, 0-127.
    pub(crate) tone_pan: i32,
    pub(crate) channel: usize,
    pub(crate) key: u8,
    pub(crate) active: bool,
    pub(crate) reverb_send: bool,
    /// Note-off arrived while the sustain pedal was down.
    pub(crate) release_pending: bool,
    pub(crate) noise_mode: bool,
    pub(crate) adsr: Adsr,
    pub(crate) vibrato: Vibrato,
    pub(crate) vibrato_enabled: bool,
    /// Shape-table steps per output sample.
    pub(crate) vibrato_rate: f64,
    /// Depth-table steps per output sample.
    pub(crate) vibrato_depth_rate: f64,
}
