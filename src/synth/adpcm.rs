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

//! Decoder for the SPU's block-compressed ADPCM sample format.
//!
//! Samples are streams of 16-byte blocks: a shift/filter byte, a flag byte,
//! and 14 data bytes holding 28 four-bit deltas (low nibble first). Each
//! delta is scaled by the block shift and run through a two-tap predictor
//! selected by the block filter. Decoding runs until the block carrying the
//! end flag has been fully emitted, so callers can hand over the rest of the
//! sample body and let the stream terminate itself.

pub const BLOCK_SIZE: usize = 16;
pub const SAMPLES_PER_BLOCK: usize = 28;

/// Upper bound on how many input bytes a single sample may span. Real banks
/// keep individual samples far below this; streams missing their end flag
/// get cut off here instead of decoding the entire body.
const MAX_INPUT_BYTES: usize = 1024 * 1024;

const FLAG_END: u8 = 0x01;
const FLAG_LOOP: u8 = 0x02;
const FLAG_LOOP_START: u8 = 0x04;

/// Predictor coefficients, indexed by the block filter value.
const FILTER_POS: [f64; 5] = [0.0, 0.9375, 1.796875, 1.53125, 1.90625];
const FILTER_NEG: [f64; 5] = [0.0, 0.0, -0.8125, -0.859375, -0.9375];

/// A fully decoded sample with its loop metadata.
#[derive(Debug, Clone, Default)]
pub struct DecodedSample {
    pub pcm: Vec<i16>,
    /// First sample index of the loop region. When several blocks carry the
    /// loop-start flag the last one wins.
    pub loop_start: usize,
    /// One past the last sample index of the loop region. Set to the full
    /// length for one-shot samples.
    pub loop_end: usize,
    pub looping: bool,
}

impl DecodedSample {
    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }
}

/// Decodes an ADPCM stream starting at the head of `data`.
///
/// Stops after emitting the block that carries the end flag; trailing bytes
/// (the next sample in the body) are ignored. A partial trailing block is
/// dropped. Never fails: malformed input just yields a shorter (possibly
/// empty) sample.
pub fn decode(data: &[u8]) -> DecodedSample {
    let data = if data.len() > MAX_INPUT_BYTES {
        &data[..MAX_INPUT_BYTES]
    } else {
        data
    };

    let mut out = DecodedSample::default();
    let mut s1 = 0.0f64;
    let mut s2 = 0.0f64;

    for block in data.chunks_exact(BLOCK_SIZE) {
        let shift = 12 - (block[0] & 0x0F) as i32;
        let mut filter = ((block[0] >> 4) & 0x07) as usize;
        if filter > 4 {
            filter = 0;
        }

        let flags = block[1];
        if flags & FLAG_LOOP_START != 0 {
            out.loop_start = out.pcm.len();
        }
        if flags & FLAG_END != 0 {
            if flags & FLAG_LOOP != 0 {
                out.looping = true;
            }
            out.loop_end = out.pcm.len() + SAMPLES_PER_BLOCK;
        }

        for &byte in &block[2..BLOCK_SIZE] {
            for nibble in [byte & 0x0F, byte >> 4] {
                let delta = if nibble < 8 {
                    i32::from(nibble)
                } else {
                    i32::from(nibble) - 16
                };
                let scaled = if shift >= 0 {
                    f64::from(delta << shift)
                } else {
                    f64::from(delta >> -shift)
                };
                let value = scaled + s1 * FILTER_POS[filter] + s2 * FILTER_NEG[filter];
                s2 = s1;
                s1 = value;
                out.pcm.push(value.clamp(-32768.0, 32767.0) as i16);
            }
        }

        if flags & FLAG_END != 0 {
            break;
        }
    }

    if out.loop_end == 0 {
        out.loop_end = out.pcm.len();
    }
    out
}
