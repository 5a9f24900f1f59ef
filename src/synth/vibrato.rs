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

//! Table-driven vibrato.
//!
//! A vibrato runs two wavetables in parallel: a shape table (defaulting to a
//! 256-entry sine) read as the pitch offset waveform, and an optional depth
//! table (a bank breath script) that scales the offset over time. Both are
//! byte tables sampled with fractional phase and linear interpolation; the
//! phase wraps circularly so the waveform is continuous across table ends.

use std::sync::OnceLock;

const DEFAULT_TABLE_LEN: usize = 256;
/// Table bytes are unsigned with 127/128 as the neutral midpoint.
const NEUTRAL_VALUE: f64 = 127.0;

static SINE_TABLE: OnceLock<Vec<u8>> = OnceLock::new();

fn default_sine_table() -> &'static [u8] {
    SINE_TABLE.get_or_init(|| {
        (0..DEFAULT_TABLE_LEN)
            .map(|i| {
                let angle = i as f64 * std::f64::consts::TAU / DEFAULT_TABLE_LEN as f64;
                (127.5 + 127.5 * angle.sin()).round().clamp(0.0, 255.0) as u8
            })
            .collect()
    })
}

/// Linear interpolation over a circular byte table at a fractional index.
fn sample_table(table: &[u8], phase: f64) -> f64 {
    let index = phase as usize;
    let frac = phase - index as f64;
    let index = index % table.len();
    let next = (index + 1) % table.len();
    let a = f64::from(table[index]);
    let b = f64::from(table[next]);
    let value = a + (b - a) * frac;
    value.round().min(255.0)
}

#[derive(Debug, Clone, Default)]
pub struct Vibrato {
    shape: Vec<u8>,
    depth_curve: Vec<u8>,
    phase: f64,
    depth_phase: f64,
    /// Peak pitch offset in semitones at full depth-table value.
    depth: f32,
    active: bool,
}

impl Vibrato {
    /// Loads the wavetables. An empty `shape` selects the default sine.
    ///
    /// The depth curve is smoothed with a three-tap circular moving average
    /// (scripts are authored coarsely) and its last entry is pinned to the
    /// first so the loop seam is level.
    pub fn init(&mut self, shape: &[u8], depth_curve: &[u8]) {
        self.shape = if shape.is_empty() {
            default_sine_table().to_vec()
        } else {
            shape.to_vec()
        };

        self.depth_curve.clear();
        if !depth_curve.is_empty() {
            if depth_curve.len() > 3 {
                let len = depth_curve.len();
                self.depth_curve = (0..len)
                    .map(|i| {
                        let previous = u32::from(depth_curve[(i + len - 1) % len]);
                        let current = u32::from(depth_curve[i]);
                        let next = u32::from(depth_curve[(i + 1) % len]);
                        ((previous + current + next) / 3) as u8
                    })
                    .collect();
            } else {
                self.depth_curve.extend_from_slice(depth_curve);
            }
            if self.depth_curve.len() >= 2 {
                let first = self.depth_curve[0];
                if let Some(last) = self.depth_curve.last_mut() {
                    *last = first;
                }
            }
        }

        self.active = true;
        self.phase = neutral_index(&self.shape);
        self.depth_phase = 0.0;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_depth(&mut self, depth: f32) {
        self.depth = depth;
    }

    pub fn depth(&self) -> f32 {
        self.depth
    }

    pub fn shape_len(&self) -> usize {
        self.shape.len()
    }

    pub fn depth_len(&self) -> usize {
        self.depth_curve.len()
    }

    /// Advances both table phases by their per-sample steps.
    pub fn tick(&mut self, rate_step: f64, depth_rate_step: f64) {
        if !self.active {
            return;
        }
        self.phase = wrap(self.phase + rate_step, self.shape.len());
        if !self.depth_curve.is_empty() {
            self.depth_phase = wrap(self.depth_phase + depth_rate_step, self.depth_curve.len());
        }
    }

    /// The current pitch offset in semitones.
    pub fn pitch_offset(&self) -> f32 {
        if !self.active || self.shape.is_empty() {
            return 0.0;
        }
        let center = sample_table(&self.shape, self.phase) / 255.0 - 0.5;
        let depth_scale = if self.depth_curve.is_empty() {
            1.0
        } else {
            sample_table(&self.depth_curve, self.depth_phase) / 255.0
        };
        (center * 2.0 * f64::from(self.depth) * depth_scale) as f32
    }
}

fn wrap(phase: f64, len: usize) -> f64 {
    let len = len as f64;
    if phase >= len {
        phase % len
    } else if phase < 0.0 {
        (phase % len) + len
    } else {
        phase
    }
}

/// The table index whose value is closest to the neutral midpoint. Starting
/// there means a fresh vibrato begins with no audible pitch jump.
fn neutral_index(table: &[u8]) -> f64 {
    let mut best = 0usize;
    let mut best_distance = f64::MAX;
    for (i, &value) in table.iter().enumerate() {
        let distance = (f64::from(value) - NEUTRAL_VALUE).abs();
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }
    best as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sine_table() {
        let table = default_sine_table();
        assert_eq!(table.len(), DEFAULT_TABLE_LEN);
        assert_eq!(table[64], 255);
        assert_eq!(table[192], 0);
        // Midpoints sit at the neutral value.
        assert!((f64::from(table[0]) - 127.5).abs() <= 0.5);
        assert!((f64::from(table[128]) - 127.5).abs() <= 0.5);
    }

    #[test]
    fn test_starts_near_neutral() {
        let mut vibrato = Vibrato::default();
        vibrato.set_depth(1.0);
        vibrato.init(&[], &[]);
        assert!(vibrato.pitch_offset().abs() < 0.01);
    }

    #[test]
    fn test_peak_offset_matches_depth() {
        let mut vibrato = Vibrato::default();
        vibrato.set_depth(0.5);
        vibrato.init(&[], &[]);
        let mut peak = 0.0f32;
        for _ in 0..DEFAULT_TABLE_LEN {
            vibrato.tick(1.0, 1.0);
            peak = peak.max(vibrato.pitch_offset().abs());
        }
        assert!((peak - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_phase_wraps_continuously() {
        let mut vibrato = Vibrato::default();
        vibrato.set_depth(1.0);
        vibrato.init(&[], &[]);
        let start = vibrato.pitch_offset();
        // One full cycle lands back on the starting phase.
        vibrato.tick(DEFAULT_TABLE_LEN as f64, 0.0);
        assert!((vibrato.pitch_offset() - start).abs() < 1e-6);
    }

    #[test]
    fn test_interpolates_between_entries() {
        let mut vibrato = Vibrato::default();
        vibrato.set_depth(1.0);
        // Two-entry ramp: phase 0.5 should read halfway between 0 and 255.
        vibrato.init(&[0, 255], &[]);
        vibrato.phase = 0.5;
        let expected = ((128.0 / 255.0 - 0.5) * 2.0) as f32;
        assert!((vibrato.pitch_offset() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_depth_curve_smoothing_and_seam() {
        let mut vibrato = Vibrato::default();
        vibrato.set_depth(1.0);
        vibrato.init(&[], &[0, 90, 30, 60, 120]);
        // Three-tap circular average, then last pinned to first.
        assert_eq!(vibrato.depth_curve, vec![70, 40, 60, 70, 70]);
    }

    #[test]
    fn test_short_depth_curve_kept_as_is() {
        let mut vibrato = Vibrato::default();
        vibrato.set_depth(1.0);
        vibrato.init(&[], &[10, 20, 30]);
        assert_eq!(vibrato.depth_curve, vec![10, 20, 10]);
    }

    #[test]
    fn test_depth_curve_scales_offset() {
        let mut vibrato = Vibrato::default();
        vibrato.set_depth(1.0);
        // All-zero depth curve silences the vibrato entirely.
        vibrato.init(&[], &[0, 0]);
        for _ in 0..512 {
            vibrato.tick(1.7, 0.3);
            assert_eq!(vibrato.pitch_offset(), 0.0);
        }
    }
}
