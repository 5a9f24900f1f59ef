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

//! The polyphonic voice mixer.
//!
//! [`Synth`] owns the sixteen channel slots, the list of sounding voices and
//! a decode cache keyed by sample offset. Events (note on/off, controllers,
//! program changes, pitch bend) mutate channel and voice state; [`Synth::render`]
//! advances every voice sample by sample and accumulates the dry stereo mix
//! plus the reverb send. The event path never fails: bad indices and missing
//! sample data degrade to silence.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::bank::{Bank, Program, ProgramKind, SampleSource, Tone};
use crate::seq::ChannelInit;

use super::adpcm::{self, DecodedSample};
use super::channel::ChannelState;
use super::envelope::{Adsr, AdsrRegisters, Phase};
use super::noise::NoiseGenerator;
use super::reverb::{Reverb, ReverbRegs};
use super::voice::{SampleId, Voice};

/// Output sample rate, fixed by the hardware.
pub const SAMPLE_RATE: u32 = 44100;
/// Number of performance channels.
pub const CHANNEL_COUNT: usize = 16;

/// Maximum vibrato depth in semitones at full modulation.
const MAX_VIBRATO_DEPTH: f32 = 0.5;
/// Per-voice reverb send attenuation (-3 dB).
const REVERB_SEND_LEVEL: f32 = 0.707;

fn clamp_pan(pan: i32) -> i32 {
    pan.clamp(0, 127)
}

/// One rendered block: dry stereo mix plus the stereo reverb send, all in
/// [-1, 1]-ish float samples (clipping happens at final output).
#[derive(Debug, Clone, Default)]
pub struct RenderBlock {
    pub dry_left: Vec<f32>,
    pub dry_right: Vec<f32>,
    pub wet_left: Vec<f32>,
    pub wet_right: Vec<f32>,
}

impl RenderBlock {
    fn silence(len: usize) -> RenderBlock {
        RenderBlock {
            dry_left: vec![0.0; len],
            dry_right: vec![0.0; len],
            wet_left: vec![0.0; len],
            wet_right: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.dry_left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dry_left.is_empty()
    }
}

/// Decoded samples, shared across all voices playing the same tone.
#[derive(Default)]
struct SampleCache {
    by_offset: HashMap<u32, SampleId>,
    decoded: Vec<DecodedSample>,
}

impl SampleCache {
    fn resolve(&mut self, offset: u32, source: &dyn SampleSource) -> SampleId {
        if let Some(&id) = self.by_offset.get(&offset) {
            return id;
        }
        let decoded = match source.sample_bytes(offset) {
            Some(bytes) => adpcm::decode(bytes),
            None => DecodedSample::default(),
        };
        if decoded.is_empty() {
            debug!(offset, "no sample data at offset, tone will be silent");
        }
        let id = SampleId(self.decoded.len());
        self.decoded.push(decoded);
        self.by_offset.insert(offset, id);
        id
    }

    fn get(&self, id: SampleId) -> &DecodedSample {
        &self.decoded[id.0]
    }
}

/// The synthesis engine for one performance.
pub struct Synth {
    bank: Arc<Bank>,
    source: Arc<dyn SampleSource + Send + Sync>,
    channels: [ChannelState; CHANNEL_COUNT],
    voices: Vec<Voice>,
    cache: SampleCache,
    noise: NoiseGenerator,
    reverb: Reverb,
}

impl Synth {
    pub fn new(bank: Arc<Bank>, source: Arc<dyn SampleSource + Send + Sync>) -> Synth {
        Synth {
            bank,
            source,
            channels: Default::default(),
            voices: Vec::new(),
            cache: SampleCache::default(),
            noise: NoiseGenerator::new(),
            reverb: Reverb::new(ReverbRegs::studio_large()),
        }
    }

    /// The reverb processor for the wet buffers this mixer produces.
    pub fn reverb_mut(&mut self) -> &mut Reverb {
        &mut self.reverb
    }

    pub fn channel(&self, channel: usize) -> Option<&ChannelState> {
        self.channels.get(channel)
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    /// Applies the per-channel initial state carried by a sequence header.
    pub fn apply_channel_inits(&mut self, inits: &[ChannelInit]) {
        for init in inits {
            let Some(channel) = self.channels.get_mut(usize::from(init.channel)) else {
                debug!(channel = init.channel, "channel init out of range, ignoring");
                continue;
            };
            channel.program = usize::from(init.program);
            channel.volume = init.volume;
            channel.pan = init.pan;
            channel.modulation = init.modulation;
            channel.breath_rate = init.vibrato_rate;
            channel.lfo_depth = f32::from(init.modulation) / 127.0;
        }
    }

    /// Starts a pitched note. Programs of kind [`ProgramKind::Sfx`] and
    /// noise tones never respond here; see [`Synth::trigger_tone`].
    pub fn note_on(&mut self, channel: usize, key: u8, velocity: u8) {
        if channel >= CHANNEL_COUNT {
            return;
        }
        let bank = Arc::clone(&self.bank);
        let Some(program) = bank.program(self.channels[channel].program) else {
            debug!(
                channel,
                program = self.channels[channel].program,
                "note on for empty program slot, ignoring"
            );
            return;
        };
        if program.kind == ProgramKind::Sfx {
            return;
        }

        self.channels[channel].lfo_phase = 0.0;

        let mut tones = Vec::new();
        for tone in &program.tones {
            if tone.contains(key) {
                tones.push(tone);
                if program.kind != ProgramKind::Layered {
                    break;
                }
            }
        }
        if tones.is_empty() {
            debug!(channel, key, "no tone covers key, ignoring note");
            return;
        }

        for tone in tones {
            if tone.flags.noise() {
                continue;
            }
            self.start_voice(&bank, program, tone, channel, key, velocity);
        }
    }

    /// Starts a specific tone of a specific program directly, keyed at its
    /// root. This is the trigger path for percussion and SFX programs,
    /// including noise-mode tones.
    pub fn trigger_tone(
        &mut self,
        channel: usize,
        program_index: usize,
        tone_index: usize,
        velocity: u8,
    ) {
        if channel >= CHANNEL_COUNT {
            return;
        }
        let bank = Arc::clone(&self.bank);
        let Some(program) = bank.program(program_index) else {
            debug!(program = program_index, "trigger for empty program slot");
            return;
        };
        let Some(tone) = program.tones.get(tone_index) else {
            debug!(
                program = program_index,
                tone = tone_index,
                "trigger for missing tone"
            );
            return;
        };
        let key = if tone.root_key > 0 { tone.root_key } else { 60 };
        self.start_voice(&bank, program, tone, channel, key, velocity);
    }

    fn start_voice(
        &mut self,
        bank: &Bank,
        program: &Program,
        tone: &Tone,
        channel: usize,
        key: u8,
        velocity: u8,
    ) {
        let channel_state = &mut self.channels[channel];
        if tone.flags.use_program_pitch() {
            if program.pitch_mult != 0 {
                channel_state.pitch_mult = f64::from(program.pitch_mult);
            }
        } else if tone.pitch_mult != 0 {
            channel_state.pitch_mult = f64::from(tone.pitch_mult);
        }
        channel_state.lfo_sensitivity = (channel_state.pitch_mult / 128.0) as f32;

        let sample = self.cache.resolve(tone.sample_offset, self.source.as_ref());
        if self.cache.get(sample).is_empty() && !tone.flags.noise() {
            return;
        }

        let root = if tone.root_key > 0 {
            f64::from(tone.root_key)
        } else {
            60.0
        };
        let fine = f64::from(tone.fine_tune) / 20.0;
        let note_base_pitch = 2f64.powf((f64::from(key) - (root - fine)) / 12.0);

        let mut adsr = Adsr::new(AdsrRegisters::from_pair(tone.adsr1, tone.adsr2));
        adsr.key_on();

        let mut voice = Voice {
            sample,
            position: 0.0,
            note_base_pitch,
            base_pitch_mult: 1.0,
            target_pitch_mult: 1.0,
            portamento_step: 1.0,
            sliding: false,
            base_volume: (f32::from(tone.volume) / 127.0)
                * (f32::from(program.volume) / 127.0)
                * (f32::from(velocity) / 127.0),
            tone_pan: clamp_pan(i32::from(tone.pan) + i32::from(program.pan) - 64),
            channel,
            key,
            active: true,
            reverb_send: tone.flags.reverb(),
            release_pending: false,
            noise_mode: tone.flags.noise(),
            adsr,
            vibrato: Default::default(),
            vibrato_enabled: false,
            vibrato_rate: 0.0,
            vibrato_depth_rate: 0.0,
        };

        let channel_state = &mut self.channels[channel];
        if channel_state.portamento_active && channel_state.last_note_pitch > 0.0 {
            voice.base_pitch_mult = channel_state.last_note_pitch / note_base_pitch;
            voice.sliding = true;
            let slide_seconds = 0.01 + f32::from(channel_state.portamento_time) / 127.0;
            let slide_samples = (slide_seconds * SAMPLE_RATE as f32).max(1.0);
            voice.portamento_step = (voice.target_pitch_mult / voice.base_pitch_mult)
                .powf(1.0 / f64::from(slide_samples));
        }
        channel_state.last_note_pitch = note_base_pitch * voice.target_pitch_mult;

        if tone.flags.use_modulation() {
            let depth = (f32::from(channel_state.modulation) / 127.0) * MAX_VIBRATO_DEPTH;
            let breath_index = if tone.flags.use_program_breath() {
                program.breath_index
            } else {
                tone.breath_index
            };
            let depth_curve: &[u8] = if breath_index != 0xFF && breath_index != 0x7F {
                bank.breath_script(usize::from(breath_index)).unwrap_or(&[])
            } else {
                &[]
            };
            voice.vibrato.set_depth(depth);
            voice.vibrato.init(&[], depth_curve);
            voice.vibrato_enabled = voice.vibrato.is_active() && depth > 0.0;
            if voice.vibrato_enabled {
                let rate_controller = if channel_state.breath_rate > 0 {
                    channel_state.breath_rate
                } else {
                    64
                };
                let rate_hz = 0.5 + f64::from(f32::from(rate_controller) / 127.0) * 9.5;
                let shape_len = voice.vibrato.shape_len();
                let depth_len = if voice.vibrato.depth_len() == 0 {
                    shape_len
                } else {
                    voice.vibrato.depth_len()
                };
                voice.vibrato_rate = shape_len as f64 * rate_hz / f64::from(SAMPLE_RATE);
                voice.vibrato_depth_rate = depth_len as f64 * rate_hz / f64::from(SAMPLE_RATE);
            }
        }

        debug!(
            channel,
            key,
            velocity,
            noise = voice.noise_mode,
            reverb = voice.reverb_send,
            "voice on"
        );
        self.voices.push(voice);
    }

    /// Releases the voices sounding `key` on `channel`. With the sustain
    /// pedal down the release is deferred until the pedal lifts.
    pub fn note_off(&mut self, channel: usize, key: u8) {
        if channel >= CHANNEL_COUNT {
            return;
        }
        let sustained = self.channels[channel].sustain_active;
        for voice in self
            .voices
            .iter_mut()
            .filter(|v| v.channel == channel && v.key == key)
        {
            if sustained {
                voice.release_pending = true;
            } else {
                voice.adsr.key_off();
            }
        }
    }

    pub fn program_change(&mut self, channel: usize, program: u8) {
        if channel >= CHANNEL_COUNT {
            return;
        }
        self.channels[channel].program = usize::from(program);
    }

    /// Applies a pitch bend in MSB units (0-127, 64 center). The bend range
    /// in semitones is the channel's current pitch multiplier.
    pub fn pitch_bend(&mut self, channel: usize, value: u8) {
        if channel >= CHANNEL_COUNT {
            return;
        }
        let channel_state = &mut self.channels[channel];
        channel_state.pitch_bend_factor =
            2f64.powf((f64::from(value) - 64.0) / 64.0 * channel_state.pitch_mult / 12.0);
    }

    pub fn control_change(&mut self, channel: usize, controller: u8, value: u8) {
        if channel >= CHANNEL_COUNT {
            return;
        }
        let channel_state = &mut self.channels[channel];
        match controller {
            // Modulation wheel; also drives the channel LFO depth.
            1 => {
                channel_state.modulation = value;
                channel_state.lfo_depth = f32::from(value) / 127.0;
            }
            // Portamento time.
            5 => channel_state.portamento_time = value,
            // Channel volume.
            7 => channel_state.volume = value,
            // Pan.
            10 => channel_state.pan = value,
            // Expression.
            11 => channel_state.expression = value,
            // Sustain pedal; lifting it fires any deferred releases.
            64 => {
                channel_state.sustain_active = value >= 64;
                if !channel_state.sustain_active {
                    for voice in self
                        .voices
                        .iter_mut()
                        .filter(|v| v.channel == channel && v.release_pending)
                    {
                        voice.release_pending = false;
                        voice.adsr.key_off();
                    }
                }
            }
            // Portamento switch.
            65 => channel_state.portamento_active = value >= 64,
            // Reverb send depth.
            91 => channel_state.reverb_depth = value,
            // Reset all controllers.
            121 => channel_state.reset_controllers(),
            _ => debug!(channel, controller, value, "unhandled controller"),
        }
    }

    /// Renders `num_samples` output samples, advancing every sounding voice.
    pub fn render(&mut self, num_samples: usize) -> RenderBlock {
        let mut block = RenderBlock::silence(num_samples);
        self.voices.retain(|v| v.active);

        let Synth {
            channels,
            voices,
            cache,
            noise,
            ..
        } = self;

        for i in 0..num_samples {
            let mut lfo_ratios = [1.0f64; CHANNEL_COUNT];
            for (ratio, channel) in lfo_ratios.iter_mut().zip(channels.iter_mut()) {
                *ratio = channel.lfo_ratio(SAMPLE_RATE as f32);
            }

            for voice in voices.iter_mut() {
                if !voice.active {
                    continue;
                }
                let channel = &channels[voice.channel];

                let envelope_level = voice.adsr.tick();
                if voice.adsr.phase() == Phase::Off {
                    voice.active = false;
                    continue;
                }

                if voice.sliding {
                    voice.base_pitch_mult *= voice.portamento_step;
                    let overshot = (voice.portamento_step > 1.0
                        && voice.base_pitch_mult >= voice.target_pitch_mult)
                        || (voice.portamento_step < 1.0
                            && voice.base_pitch_mult <= voice.target_pitch_mult);
                    if overshot {
                        voice.base_pitch_mult = voice.target_pitch_mult;
                        voice.sliding = false;
                    }
                }

                let mut vibrato_offset = 0.0f32;
                if voice.vibrato_enabled {
                    let depth_step = if voice.vibrato_depth_rate > 0.0 {
                        voice.vibrato_depth_rate
                    } else {
                        voice.vibrato_rate
                    };
                    voice.vibrato.tick(voice.vibrato_rate, depth_step);
                    vibrato_offset = voice.vibrato.pitch_offset();
                }
                let mut vibrato_factor = 2f64.powf(f64::from(vibrato_offset) / 12.0);
                if !vibrato_factor.is_finite() {
                    vibrato_factor = 1.0;
                }

                let mut pitch = voice.note_base_pitch
                    * voice.base_pitch_mult
                    * vibrato_factor
                    * channel.pitch_bend_factor
                    * lfo_ratios[voice.channel];
                if pitch < 0.0 {
                    pitch = 0.0;
                }

                let sample_value: f32 = if voice.noise_mode {
                    voice.position += pitch;
                    if voice.position >= 1.0 {
                        voice.position -= 1.0;
                    }
                    f32::from(noise.next())
                } else {
                    let data = cache.get(voice.sample);
                    let looped = data.looping && data.loop_end > data.loop_start;
                    let index = voice.position as usize;
                    let frac = voice.position - index as f64;
                    let first = i32::from(data.pcm.get(index).copied().unwrap_or(0));
                    let next_index = if looped && index + 1 >= data.loop_end {
                        data.loop_start + (index + 1 - data.loop_end)
                    } else {
                        index + 1
                    };
                    let second = i32::from(data.pcm.get(next_index).copied().unwrap_or(0));
                    let value = (f64::from(first) + f64::from(second - first) * frac) as f32;

                    voice.position += pitch;
                    if looped {
                        let loop_len = (data.loop_end - data.loop_start) as f64;
                        while voice.position >= data.loop_end as f64 {
                            voice.position -= loop_len;
                        }
                    } else if voice.position >= data.pcm.len() as f64 {
                        voice.active = false;
                        continue;
                    }
                    value
                };

                let amplitude = (sample_value / 32768.0)
                    * (f32::from(envelope_level) / 32767.0)
                    * voice.base_volume
                    * (f32::from(channel.volume) / 127.0)
                    * (f32::from(channel.expression) / 127.0);
                let pan =
                    clamp_pan(voice.tone_pan + (i32::from(channel.pan) - 64)) as f32 / 127.0;
                let mut left = amplitude * (1.0 - pan).sqrt();
                let mut right = amplitude * pan.sqrt();
                if left.is_nan() {
                    left = 0.0;
                }
                if right.is_nan() {
                    right = 0.0;
                }
                block.dry_left[i] += left;
                block.dry_right[i] += right;

                if voice.reverb_send {
                    let mut send = amplitude
                        * (f32::from(channel.reverb_depth) / 127.0)
                        * REVERB_SEND_LEVEL;
                    if send.is_nan() {
                        send = 0.0;
                    }
                    block.wet_left[i] += send;
                    block.wet_right[i] += send;
                }
            }
        }

        block
    }
}
