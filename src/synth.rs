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

//! The synthesis core: hardware-faithful building blocks and the voice mixer
//! that combines them.

pub mod adpcm;
pub mod envelope;
pub mod reverb;
pub mod vibrato;

mod channel;
mod engine;
mod noise;
mod voice;

pub use channel::ChannelState;
pub use engine::{RenderBlock, Synth, CHANNEL_COUNT, SAMPLE_RATE};
pub use noise::NoiseGenerator;
pub use voice::SampleId;
