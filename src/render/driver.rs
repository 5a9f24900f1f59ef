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

//! The sequencing driver.
//!
//! Walks a [`Sequence`] event by event: the gap before each event is
//! converted from ticks to samples at the current tempo and rendered through
//! the mixer (with the reverb return mixed in), then the event is applied.
//! After the final event a processed tail lets envelopes and the reverb ring
//! out.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::seq::{EventKind, Sequence};
use crate::synth::{Synth, SAMPLE_RATE};

/// How often the progress callback fires, in events.
const PROGRESS_INTERVAL: usize = 100;

/// Rendering knobs. The defaults match the hardware mix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Process the reverb send and mix the return into the output.
    pub reverb: bool,
    /// Fraction of the reverb return summed into the dry mix.
    pub reverb_mix: f32,
    /// Seconds of processed tail appended after the last event.
    pub tail_seconds: f32,
}

impl Default for RenderOptions {
    fn default() -> RenderOptions {
        RenderOptions {
            reverb: true,
            reverb_mix: 0.5,
            tail_seconds: 2.0,
        }
    }
}

/// A finished stereo render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedAudio {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub sample_rate: u32,
}

impl RenderedAudio {
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Renders a sequence to a stereo buffer.
///
/// `progress` is invoked every [`PROGRESS_INTERVAL`] events with
/// `(events_done, events_total)`, and once more at the end with
/// `(total, total)`.
pub fn render_sequence(
    synth: &mut Synth,
    sequence: &Sequence,
    options: &RenderOptions,
    mut progress: Option<&mut dyn FnMut(usize, usize)>,
) -> RenderedAudio {
    synth.apply_channel_inits(&sequence.channel_inits);

    let mut bpm = if sequence.tempo_bpm <= 0.0 {
        120.0
    } else {
        sequence.tempo_bpm
    };
    let total = sequence.events.len();
    info!(
        events = total,
        ticks_per_quarter = sequence.ticks_per_quarter,
        bpm,
        "rendering sequence"
    );

    let mut left = Vec::new();
    let mut right = Vec::new();

    for (index, event) in sequence.events.iter().enumerate() {
        if index % PROGRESS_INTERVAL == 0 {
            if let Some(callback) = progress.as_mut() {
                callback(index, total);
            }
        }
        if event.kind == EventKind::EndOfTrack {
            break;
        }

        if event.delta > 0 {
            let seconds_per_tick = (60.0 / bpm) / f32::from(sequence.ticks_per_quarter);
            let samples_per_tick = seconds_per_tick * SAMPLE_RATE as f32;
            let num_samples = (event.delta as f32 * samples_per_tick) as usize;
            if num_samples > 0 {
                render_into(synth, num_samples, options, &mut left, &mut right);
            }
        }

        match event.kind {
            EventKind::NoteOn {
                channel,
                key,
                velocity,
            } => synth.note_on(usize::from(channel), key, velocity),
            EventKind::NoteOff { channel, key } => synth.note_off(usize::from(channel), key),
            EventKind::Controller {
                channel,
                controller,
                value,
            } => synth.control_change(usize::from(channel), controller, value),
            EventKind::ProgramChange { channel, program } => {
                synth.program_change(usize::from(channel), program);
            }
            EventKind::PitchBend { channel, value } => {
                synth.pitch_bend(usize::from(channel), value);
            }
            EventKind::Tempo { bpm: new_bpm } => bpm = new_bpm,
            EventKind::EndOfTrack => {}
        }
    }

    if let Some(callback) = progress.as_mut() {
        callback(total, total);
    }

    let tail_samples = (options.tail_seconds * SAMPLE_RATE as f32) as usize;
    if tail_samples > 0 {
        render_into(synth, tail_samples, options, &mut left, &mut right);
    }

    info!(samples = left.len(), "sequence rendered");
    RenderedAudio {
        left,
        right,
        sample_rate: SAMPLE_RATE,
    }
}

fn render_into(
    synth: &mut Synth,
    num_samples: usize,
    options: &RenderOptions,
    left: &mut Vec<f32>,
    right: &mut Vec<f32>,
) {
    let block = synth.render(num_samples);
    if options.reverb {
        let (wet_left, wet_right) = synth.reverb_mut().process(&block.wet_left, &block.wet_right);
        for i in 0..block.len() {
            left.push(block.dry_left[i] + wet_left[i] * options.reverb_mix);
            right.push(block.dry_right[i] + wet_right[i] * options.reverb_mix);
        }
    } else {
        left.extend_from_slice(&block.dry_left);
        right.extend_from_slice(&block.dry_right);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bank::{Bank, Program, ProgramKind, SampleBody, Tone, ToneFlags};
    use crate::seq::SeqEvent;

    // One looping ADPCM block decoding to a constant 28672; instant attack,
    // hold at full level, fast release.
    fn test_synth(tone_flags: u8) -> Synth {
        let mut body = vec![0x00u8, 0x07];
        body.extend_from_slice(&[0x77; 14]);
        let tone = Tone {
            adsr1: 0x00FF,
            flags: ToneFlags::new(tone_flags),
            ..Tone::default()
        };
        let program = Program {
            kind: ProgramKind::Split,
            tones: vec![tone],
            ..Program::default()
        };
        Synth::new(
            Arc::new(Bank::new(vec![Some(program)], Vec::new())),
            Arc::new(SampleBody::new(body)),
        )
    }

    fn note_sequence() -> Sequence {
        Sequence {
            events: vec![
                SeqEvent {
                    delta: 0,
                    kind: EventKind::NoteOn {
                        channel: 0,
                        key: 60,
                        velocity: 127,
                    },
                },
                SeqEvent {
                    delta: 96,
                    kind: EventKind::NoteOff {
                        channel: 0,
                        key: 60,
                    },
                },
                SeqEvent {
                    delta: 0,
                    kind: EventKind::EndOfTrack,
                },
            ],
            ..Sequence::default()
        }
    }

    #[test]
    fn test_render_length_is_deltas_plus_tail() {
        let mut synth = test_synth(0);
        let audio = render_sequence(
            &mut synth,
            &note_sequence(),
            &RenderOptions::default(),
            None,
        );
        // 96 ticks at 120 bpm, 480 tpq: (0.5 / 480) * 44100 * 96 = 4410,
        // plus two seconds of tail.
        let expected = 4410 + 2 * SAMPLE_RATE as usize;
        assert_eq!(audio.len(), expected);
        assert_eq!(audio.left.len(), audio.right.len());
        assert_eq!(audio.sample_rate, SAMPLE_RATE);
    }

    #[test]
    fn test_render_peak_amplitude() {
        let mut synth = test_synth(0);
        let audio = render_sequence(
            &mut synth,
            &note_sequence(),
            &RenderOptions {
                reverb: false,
                ..RenderOptions::default()
            },
            None,
        );
        // Constant sample 28672 at full envelope, center pan.
        let expected = (28672.0 / 32768.0) * (1.0 - 64.0 / 127.0f32).sqrt();
        let peak = audio.left.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!((peak - expected).abs() < 1e-3);
    }

    #[test]
    fn test_note_released_before_tail_ends() {
        let mut synth = test_synth(0);
        let audio = render_sequence(
            &mut synth,
            &note_sequence(),
            &RenderOptions {
                reverb: false,
                ..RenderOptions::default()
            },
            None,
        );
        // The release fires at the note-off; the last second must be silent.
        let last_second = &audio.left[audio.len() - SAMPLE_RATE as usize..];
        assert!(last_second.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_tempo_event_stretches_time() {
        let mut sequence = note_sequence();
        sequence.events.insert(
            0,
            SeqEvent {
                delta: 0,
                kind: EventKind::Tempo { bpm: 60.0 },
            },
        );
        let mut synth = test_synth(0);
        let audio = render_sequence(&mut synth, &sequence, &RenderOptions::default(), None);
        // Half the tempo doubles the samples per tick.
        assert_eq!(audio.len(), 8820 + 2 * SAMPLE_RATE as usize);
    }

    #[test]
    fn test_reverb_return_mixed_into_output() {
        let mut dry_synth = test_synth(ToneFlags::REVERB);
        let mut wet_synth = test_synth(ToneFlags::REVERB);
        let mut sequence = note_sequence();
        sequence.events.insert(
            0,
            SeqEvent {
                delta: 0,
                kind: EventKind::Controller {
                    channel: 0,
                    controller: 91,
                    value: 127,
                },
            },
        );
        let dry = render_sequence(
            &mut dry_synth,
            &sequence,
            &RenderOptions {
                reverb: false,
                ..RenderOptions::default()
            },
            None,
        );
        let wet = render_sequence(&mut wet_synth, &sequence, &RenderOptions::default(), None);
        assert_eq!(dry.len(), wet.len());
        assert!(dry != wet);
        // The reverb return rings past the voice release: the dry mix is
        // silent shortly into the tail, the wet mix is not.
        let release_point = 4500;
        assert!(dry.left[release_point..release_point + 8820]
            .iter()
            .all(|&s| s == 0.0));
        assert!(wet.left[release_point..release_point + 8820]
            .iter()
            .any(|&s| s != 0.0));
    }

    #[test]
    fn test_progress_callback_cadence() {
        let mut events = Vec::new();
        for _ in 0..250 {
            events.push(SeqEvent {
                delta: 0,
                kind: EventKind::Controller {
                    channel: 0,
                    controller: 7,
                    value: 100,
                },
            });
        }
        events.push(SeqEvent {
            delta: 0,
            kind: EventKind::EndOfTrack,
        });
        let sequence = Sequence {
            events,
            ..Sequence::default()
        };

        let mut reports = Vec::new();
        let mut callback = |done: usize, total: usize| reports.push((done, total));
        let mut synth = test_synth(0);
        render_sequence(
            &mut synth,
            &sequence,
            &RenderOptions {
                reverb: false,
                tail_seconds: 0.0,
                ..RenderOptions::default()
            },
            Some(&mut callback),
        );
        assert_eq!(reports, vec![(0, 251), (100, 251), (200, 251), (251, 251)]);
    }

    #[test]
    fn test_channel_inits_applied_before_events() {
        use crate::seq::ChannelInit;

        let mut synth = test_synth(0);
        let sequence = Sequence {
            channel_inits: vec![ChannelInit {
                channel: 0,
                program: 0,
                volume: 64,
                pan: 64,
                modulation: 0,
                pitch_bend: 64,
                vibrato_rate: 0,
            }],
            ..note_sequence()
        };
        let audio = render_sequence(
            &mut synth,
            &sequence,
            &RenderOptions {
                reverb: false,
                ..RenderOptions::default()
            },
            None,
        );
        let expected = (28672.0 / 32768.0) * (64.0 / 127.0) * (1.0 - 64.0 / 127.0f32).sqrt();
        let peak = audio.left.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!((peak - expected).abs() < 1e-3);
    }

    #[test]
    fn test_renders_are_deterministic() {
        let sequence = note_sequence();
        let mut first = test_synth(ToneFlags::REVERB);
        let mut second = test_synth(ToneFlags::REVERB);
        let a = render_sequence(&mut first, &sequence, &RenderOptions::default(), None);
        let b = render_sequence(&mut second, &sequence, &RenderOptions::default(), None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_sequence_renders_tail_only() {
        let mut synth = test_synth(0);
        let sequence = Sequence {
            events: vec![SeqEvent {
                delta: 0,
                kind: EventKind::EndOfTrack,
            }],
            ..Sequence::default()
        };
        let audio = render_sequence(&mut synth, &sequence, &RenderOptions::default(), None);
        assert_eq!(audio.len(), 2 * SAMPLE_RATE as usize);
        assert!(audio.left.iter().all(|&s| s == 0.0));
    }
}
