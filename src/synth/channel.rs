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

//! Per-channel controller state.

/// The persistent state of one of the sixteen performance channels.
///
/// Voices read this every sample, so channel controller changes affect
/// already-sounding notes immediately.
#[derive(Debug, Clone)]
pub struct ChannelState {
    /// Current program slot index.
    pub program: usize,
    /// Pitch factor from the last pitch-bend event.
    pub pitch_bend_factor: f64,
    /// Bend range in semitones at full deflection; tones and programs may
    /// override it at note-on.
    pub pitch_mult: f64,
    pub volume: u8,
    pub expression: u8,
    pub pan: u8,
    /// Reverb send depth (CC 91), 0-127.
    pub reverb_depth: u8,
    pub sustain_active: bool,
    pub portamento_active: bool,
    /// Portamento time (CC 5), 0-127.
    pub portamento_time: u8,
    /// Modulation wheel (CC 1), 0-127; becomes vibrato depth at note-on.
    pub modulation: u8,
    /// Vibrato rate controller from the sequence header, 0-127.
    pub breath_rate: u8,
    pub lfo_enabled: bool,
    /// Channel LFO rate in Hz.
    pub lfo_rate: f32,
    /// Channel LFO depth in semitones.
    pub lfo_depth: f32,
    pub lfo_phase: f32,
    /// Scales LFO depth by the channel's bend range; set at note-on.
    pub lfo_sensitivity: f32,
    /// Base frequency ratio of the last pitched note, for portamento
    /// glides. Negative until the first note sounds.
    pub last_note_pitch: f64,
}

impl ChannelState {
    /// Handles CC 121 (reset all controllers). Program, reverb depth,
    /// portamento time and the bend range survive the reset.
    pub fn reset_controllers(&mut self) {
        self.volume = 127;
        self.expression = 127;
        self.pan = 64;
        self.pitch_bend_factor = 1.0;
        self.sustain_active = false;
        self.portamento_active = false;
        self.lfo_enabled = false;
        self.lfo_depth = 0.0;
        self.modulation = 0;
    }

    /// Advances the channel LFO one sample and returns its pitch ratio.
    pub fn lfo_ratio(&mut self, sample_rate: f32) -> f64 {
        if !self.lfo_enabled || self.lfo_depth <= 1e-4 {
            return 1.0;
        }
        self.lfo_phase += self.lfo_rate * std::f32::consts::TAU / sample_rate;
        if self.lfo_phase >= std::f32::consts::TAU {
            self.lfo_phase -= std::f32::consts::TAU;
        }
        let offset = self.lfo_phase.sin() * self.lfo_depth * self.lfo_sensitivity;
        2f64.powf(f64::from(offset) / 12.0)
    }
}

impl Default for ChannelState {
    fn default() -> ChannelState {
        ChannelState {
            program: 0,
            pitch_bend_factor: 1.0,
            pitch_mult: 12.0,
            volume: 127,
            expression: 127,
            pan: 64,
            reverb_depth: 0,
            sustain_active: false,
            portamento_active: false,
            portamento_time: 0,
            modulation: 0,
            breath_rate: 0,
            lfo_enabled: false,
            lfo_rate: 5.0,
            lfo_depth: 0.0,
            lfo_phase: 0.0,
            lfo_sensitivity: 0.0,
            last_note_pitch: -1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_preserves_setup_controllers() {
        let mut channel = ChannelState {
            program: 12,
            volume: 30,
            expression: 40,
            pan: 0,
            reverb_depth: 90,
            sustain_active: true,
            portamento_active: true,
            portamento_time: 55,
            modulation: 80,
            pitch_bend_factor: 1.5,
            pitch_mult: 2.0,
            ..ChannelState::default()
        };
        channel.reset_controllers();
        assert_eq!(channel.volume, 127);
        assert_eq!(channel.expression, 127);
        assert_eq!(channel.pan, 64);
        assert_eq!(channel.pitch_bend_factor, 1.0);
        assert!(!channel.sustain_active);
        assert!(!channel.portamento_active);
        assert_eq!(channel.modulation, 0);
        // Setup state survives.
        assert_eq!(channel.program, 12);
        assert_eq!(channel.reverb_depth, 90);
        assert_eq!(channel.portamento_time, 55);
        assert_eq!(channel.pitch_mult, 2.0);
    }

    #[test]
    fn test_lfo_neutral_when_disabled() {
        let mut channel = ChannelState {
            lfo_depth: 1.0,
            lfo_sensitivity: 1.0,
            ..ChannelState::default()
        };
        assert_eq!(channel.lfo_ratio(44100.0), 1.0);
        assert_eq!(channel.lfo_phase, 0.0);
    }

    #[test]
    fn test_lfo_oscillates_when_enabled() {
        let mut channel = ChannelState {
            lfo_enabled: true,
            lfo_depth: 1.0,
            lfo_sensitivity: 1.0,
            ..ChannelState::default()
        };
        let mut above = false;
        let mut below = false;
        // A full 5 Hz cycle at 44100 Hz.
        for _ in 0..8820 {
            let ratio = channel.lfo_ratio(44100.0);
            above |= ratio > 1.0;
            below |= ratio < 1.0;
        }
        assert!(above && below);
    }
}
