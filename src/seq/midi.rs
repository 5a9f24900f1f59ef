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

//! Adapter from Standard MIDI files to the common sequence representation.

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use tracing::debug;

use super::{EventKind, SeqEvent, Sequence, SequenceError};

/// Fallback division, also used for SMPTE-timed files, which the tick
/// conversion cannot represent faithfully.
const DEFAULT_TICKS_PER_QUARTER: u16 = 480;

/// Parses a Standard MIDI file into a [`Sequence`].
///
/// All tracks are merged by absolute time (stable, so simultaneous events
/// keep their track order), note-ons with velocity zero become note-offs and
/// pitch bends are reduced to their 7-bit MSB. A terminal
/// [`EventKind::EndOfTrack`] is always appended.
pub fn sequence_from_midi(bytes: &[u8]) -> Result<Sequence, SequenceError> {
    let smf = Smf::parse(bytes)?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(ticks) => {
            let ticks = ticks.as_int();
            if ticks == 0 {
                DEFAULT_TICKS_PER_QUARTER
            } else {
                ticks
            }
        }
        Timing::Timecode(..) => {
            debug!("SMPTE-timed MIDI file, approximating with metrical division");
            DEFAULT_TICKS_PER_QUARTER
        }
    };

    let mut absolute: Vec<(u32, EventKind)> = Vec::new();
    for track in &smf.tracks {
        let mut time = 0u32;
        for event in track {
            time = time.wrapping_add(event.delta.as_int());
            let kind = match event.kind {
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } => {
                            if vel.as_int() == 0 {
                                EventKind::NoteOff {
                                    channel,
                                    key: key.as_int(),
                                }
                            } else {
                                EventKind::NoteOn {
                                    channel,
                                    key: key.as_int(),
                                    velocity: vel.as_int(),
                                }
                            }
                        }
                        MidiMessage::NoteOff { key, .. } => EventKind::NoteOff {
                            channel,
                            key: key.as_int(),
                        },
                        MidiMessage::Controller { controller, value } => EventKind::Controller {
                            channel,
                            controller: controller.as_int(),
                            value: value.as_int(),
                        },
                        MidiMessage::ProgramChange { program } => EventKind::ProgramChange {
                            channel,
                            program: program.as_int(),
                        },
                        MidiMessage::PitchBend { bend } => EventKind::PitchBend {
                            channel,
                            value: (bend.0.as_int() >> 7) as u8,
                        },
                        _ => continue,
                    }
                }
                TrackEventKind::Meta(MetaMessage::Tempo(mpqn)) => EventKind::Tempo {
                    bpm: 60_000_000.0 / mpqn.as_int() as f32,
                },
                _ => continue,
            };
            absolute.push((time, kind));
        }
    }

    absolute.sort_by_key(|&(time, _)| time);

    let mut events = Vec::with_capacity(absolute.len() + 1);
    let mut previous = 0u32;
    for (time, kind) in absolute {
        events.push(SeqEvent {
            delta: time - previous,
            kind,
        });
        previous = time;
    }
    events.push(SeqEvent {
        delta: 0,
        kind: EventKind::EndOfTrack,
    });

    Ok(Sequence {
        events,
        ticks_per_quarter,
        channel_inits: Vec::new(),
        ..Sequence::default()
    })
}
