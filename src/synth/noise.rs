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

//! The noise source for noise-mode voices.
//!
//! A plain xorshift generator with a fixed seed; the exact sequence is part
//! of the audible output, so this stays hand-rolled rather than pulling in a
//! randomness crate. Each mixer owns its own generator so renders are
//! reproducible and independent.

const SEED: u32 = 0xA491;

#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    state: u32,
}

impl NoiseGenerator {
    pub fn new() -> NoiseGenerator {
        NoiseGenerator { state: SEED }
    }

    /// The next noise sample: low 16 bits of the xorshift state,
    /// reinterpreted as signed.
    pub fn next(&mut self) -> i16 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        (x as u16) as i16
    }
}

impl Default for NoiseGenerator {
    fn default() -> NoiseGenerator {
        NoiseGenerator::new()
    }
}
