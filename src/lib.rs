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

//! Software rendition of a fixed-function hardware sound processor (SPU).
//!
//! Given an instrument bank (programs of key-ranged tones referencing
//! compressed sample data) and a tick-based performance, this crate renders
//! sample-accurate stereo PCM, reproducing the hardware's ADPCM decoding,
//! envelope shaping, vibrato and reverb arithmetic.
//!
//! - [`bank`] holds the immutable bank data model and the raw sample
//!   provider seam.
//! - [`synth`] is the core: decoder, envelope, reverb, vibrato and the
//!   polyphonic voice mixer.
//! - [`seq`] is the common event representation plus the standard-MIDI
//!   adapter.
//! - [`render`] drives a sequence through the mixer into a finished buffer
//!   and can pack it into a WAVE container.

pub mod bank;
pub mod render;
pub mod seq;
pub mod synth;

pub use render::{render_sequence, RenderOptions, RenderedAudio};
pub use synth::{Synth, SAMPLE_RATE};
