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

//! The hardware ADSR envelope.
//!
//! Envelope behavior is driven entirely by a 32-bit register pair packed the
//! way the sound processor packs it; [`AdsrRegisters`] gives the fields
//! names. [`Adsr`] runs the attack/decay/sustain/release state machine over
//! a shared rate/step engine ([`VolumeEnvelope`]) whose shift-and-counter
//! arithmetic matches the hardware, including the exponential pseudo-curves
//! and the slowdown above level 0x6000 on exponential attacks.

/// The packed envelope register pair: `(adsr2 << 16) | adsr1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdsrRegisters(u32);

impl AdsrRegisters {
    pub fn new(raw: u32) -> AdsrRegisters {
        AdsrRegisters(raw)
    }

    /// Builds the register value from the two 16-bit halves as they appear
    /// in bank tone data.
    pub fn from_pair(adsr1: u16, adsr2: u16) -> AdsrRegisters {
        AdsrRegisters((u32::from(adsr2) << 16) | u32::from(adsr1))
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    fn bits(self, low: u32, count: u32) -> u32 {
        (self.0 >> low) & ((1 << count) - 1)
    }

    pub fn sustain_level(self) -> u32 {
        self.bits(0, 4)
    }

    pub fn decay_shift(self) -> u32 {
        self.bits(4, 4)
    }

    pub fn attack_step(self) -> u32 {
        self.bits(8, 2)
    }

    pub fn attack_shift(self) -> u32 {
        self.bits(10, 5)
    }

    pub fn attack_exponential(self) -> bool {
        self.bits(15, 1) != 0
    }

    pub fn release_shift(self) -> u32 {
        self.bits(16, 5)
    }

    pub fn release_exponential(self) -> bool {
        self.bits(21, 1) != 0
    }

    pub fn sustain_step(self) -> u32 {
        self.bits(22, 2)
    }

    pub fn sustain_shift(self) -> u32 {
        self.bits(24, 5)
    }

    pub fn sustain_decreasing(self) -> bool {
        self.bits(30, 1) != 0
    }

    pub fn sustain_exponential(self) -> bool {
        self.bits(31, 1) != 0
    }

    /// Attack rate on the shared 7-bit rate scale.
    pub fn attack_rate(self) -> u8 {
        ((self.attack_shift() << 2) | self.attack_step()) as u8
    }

    /// Decay rate; decay has no step field, the low two bits are zero.
    pub fn decay_rate(self) -> u8 {
        (self.decay_shift() << 2) as u8
    }

    pub fn sustain_rate(self) -> u8 {
        ((self.sustain_shift() << 2) | self.sustain_step()) as u8
    }

    /// Release rate; like decay the low two bits are zero.
    pub fn release_rate(self) -> u8 {
        (self.release_shift() << 2) as u8
    }
}

/// The rate/step engine shared by every envelope phase.
///
/// A 7-bit rate selects either a widened step (fast rates) or a slowed tick
/// counter (slow rates); a tick only moves the level when the counter
/// carries into bit 15.
#[derive(Debug, Clone, Default)]
struct VolumeEnvelope {
    counter: u32,
    counter_increment: u16,
    step: i16,
    rate: u8,
    decreasing: bool,
    exponential: bool,
    phase_invert: bool,
}

impl VolumeEnvelope {
    fn reset(
        &mut self,
        rate: u8,
        rate_mask: u8,
        decreasing: bool,
        exponential: bool,
        invert: bool,
    ) {
        self.rate = rate;
        self.decreasing = decreasing;
        self.exponential = exponential;
        self.phase_invert = invert && !(decreasing && exponential);
        self.counter = 0;
        self.counter_increment = 0x8000;

        let base_step = 7 - i16::from(rate & 3);
        self.step = if (decreasing ^ invert) || (decreasing && exponential) {
            !base_step
        } else {
            base_step
        };

        if rate < 44 {
            self.step <<= 11 - (rate >> 2);
        } else if rate >= 48 {
            let shift = (rate >> 2) - 11;
            self.counter_increment = if shift < 16 { 0x8000 >> shift } else { 0 };
            if (rate & rate_mask) != rate_mask {
                self.counter_increment = self.counter_increment.max(1);
            }
        }
    }

    fn tick(&mut self, level: &mut i16) {
        let mut increment = u32::from(self.counter_increment);
        let mut step = i32::from(self.step);

        if self.exponential {
            if self.decreasing {
                step = (step * i32::from(*level)) >> 15;
            } else if *level >= 0x6000 {
                // The hardware slows exponential attacks near the top.
                if self.rate < 40 {
                    step >>= 2;
                } else if self.rate >= 44 {
                    increment >>= 2;
                } else {
                    step >>= 1;
                    increment >>= 1;
                }
            }
        }

        self.counter = self.counter.wrapping_add(increment);
        if self.counter & 0x8000 == 0 {
            return;
        }
        self.counter = 0;

        let next = i32::from(*level) + step;
        *level = if !self.decreasing {
            next.clamp(-32768, 32767) as i16
        } else if self.phase_invert {
            next.clamp(-32768, 0) as i16
        } else {
            next.max(0) as i16
        };
    }
}

/// The envelope phase. `Off` means the voice is done and may be retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Off,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// The four-phase envelope state machine for one voice.
#[derive(Debug, Clone)]
pub struct Adsr {
    regs: AdsrRegisters,
    phase: Phase,
    level: i16,
    target: i16,
    envelope: VolumeEnvelope,
}

impl Adsr {
    pub fn new(regs: AdsrRegisters) -> Adsr {
        Adsr {
            regs,
            phase: Phase::Off,
            level: 0,
            target: 0,
            envelope: VolumeEnvelope::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn level(&self) -> i16 {
        self.level
    }

    /// Restarts the envelope from silence into the attack phase.
    pub fn key_on(&mut self) {
        self.level = 0;
        self.enter(Phase::Attack);
    }

    /// Moves a sounding envelope into release. No effect on an envelope that
    /// is already releasing or off.
    pub fn key_off(&mut self) {
        if matches!(self.phase, Phase::Off | Phase::Release) {
            return;
        }
        self.enter(Phase::Release);
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        let regs = self.regs;
        match phase {
            Phase::Off => {
                self.target = 0;
                self.envelope.reset(0, 0, false, false, false);
            }
            Phase::Attack => {
                self.target = 32767;
                self.envelope
                    .reset(regs.attack_rate(), 0x7F, false, regs.attack_exponential(), false);
            }
            Phase::Decay => {
                self.target = ((regs.sustain_level() + 1) * 0x800).min(32767) as i16;
                self.envelope.reset(regs.decay_rate(), 0x1F << 2, true, true, false);
            }
            Phase::Sustain => {
                self.target = 0;
                self.envelope.reset(
                    regs.sustain_rate(),
                    0x7F,
                    regs.sustain_decreasing(),
                    regs.sustain_exponential(),
                    false,
                );
            }
            Phase::Release => {
                self.target = 0;
                self.envelope.reset(
                    regs.release_rate(),
                    0x1F << 2,
                    true,
                    regs.release_exponential(),
                    false,
                );
            }
        }
    }

    /// Advances the envelope by one output sample and returns the level.
    ///
    /// Sustain never advances on its own; every other phase moves on once
    /// the level crosses its target (in the direction of travel).
    pub fn tick(&mut self) -> i16 {
        if self.phase == Phase::Off {
            return 0;
        }

        if self.envelope.counter_increment > 0 {
            let mut level = self.level;
            self.envelope.tick(&mut level);
            self.level = level;
        }

        if self.phase != Phase::Sustain {
            let reached = if self.envelope.decreasing {
                self.level <= self.target
            } else {
                self.level >= self.target
            };
            if reached {
                let next = match self.phase {
                    Phase::Attack => Phase::Decay,
                    Phase::Decay => Phase::Sustain,
                    _ => Phase::Off,
                };
                self.enter(next);
            }
        }

        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Attack rate 0, sustain level 15, slow decay: three ticks of attack,
    // then the decay target (32767) is already met and sustain holds there.
    fn fast_regs() -> AdsrRegisters {
        AdsrRegisters::from_pair(0x00FF, 0x0000)
    }

    #[test]
    fn test_register_fields() {
        let regs = AdsrRegisters::new(0xFFFF_FFFF);
        assert_eq!(regs.sustain_level(), 15);
        assert_eq!(regs.decay_shift(), 15);
        assert_eq!(regs.attack_step(), 3);
        assert_eq!(regs.attack_shift(), 31);
        assert!(regs.attack_exponential());
        assert_eq!(regs.release_shift(), 31);
        assert!(regs.release_exponential());
        assert_eq!(regs.sustain_step(), 3);
        assert_eq!(regs.sustain_shift(), 31);
        assert!(regs.sustain_decreasing());
        assert!(regs.sustain_exponential());
        assert_eq!(regs.attack_rate(), 0x7F);
        assert_eq!(regs.decay_rate(), 0x3C);
        assert_eq!(regs.sustain_rate(), 0x7F);
        assert_eq!(regs.release_rate(), 0x7C);
    }

    #[test]
    fn test_register_pair_packing() {
        let regs = AdsrRegisters::from_pair(0x1234, 0xABCD);
        assert_eq!(regs.raw(), 0xABCD_1234);
    }

    #[test]
    fn test_attack_rises_monotonically_to_full() {
        let mut adsr = Adsr::new(fast_regs());
        adsr.key_on();
        assert_eq!(adsr.phase(), Phase::Attack);

        let mut previous = 0i16;
        for _ in 0..16 {
            let level = adsr.tick();
            assert!(level >= previous);
            previous = level;
        }
        assert_eq!(previous, 32767);
        assert_eq!(adsr.phase(), Phase::Sustain);
    }

    #[test]
    fn test_sustain_holds_until_key_off() {
        let mut adsr = Adsr::new(fast_regs());
        adsr.key_on();
        for _ in 0..16 {
            adsr.tick();
        }
        assert_eq!(adsr.phase(), Phase::Sustain);
        for _ in 0..1000 {
            assert_eq!(adsr.tick(), 32767);
            assert_eq!(adsr.phase(), Phase::Sustain);
        }
    }

    #[test]
    fn test_decay_falls_to_sustain_level() {
        // Sustain level 0 gives a decay target of 0x800.
        let mut adsr = Adsr::new(AdsrRegisters::from_pair(0x0000, 0x0000));
        adsr.key_on();
        let mut last = 0;
        for _ in 0..64 {
            last = adsr.tick();
            if adsr.phase() == Phase::Sustain {
                break;
            }
        }
        assert_eq!(adsr.phase(), Phase::Sustain);
        assert!(last <= 0x800);
    }

    #[test]
    fn test_key_off_releases_to_off() {
        let mut adsr = Adsr::new(fast_regs());
        adsr.key_on();
        for _ in 0..16 {
            adsr.tick();
        }

        adsr.key_off();
        assert_eq!(adsr.phase(), Phase::Release);

        let mut previous = adsr.level();
        for _ in 0..64 {
            let level = adsr.tick();
            assert!(level <= previous);
            previous = level;
            if adsr.phase() == Phase::Off {
                break;
            }
        }
        assert_eq!(adsr.phase(), Phase::Off);
        assert_eq!(adsr.tick(), 0);
    }

    #[test]
    fn test_key_off_during_attack() {
        let mut adsr = Adsr::new(fast_regs());
        adsr.key_on();
        adsr.tick();
        adsr.key_off();
        assert_eq!(adsr.phase(), Phase::Release);
    }

    #[test]
    fn test_key_off_when_off_is_ignored() {
        let mut adsr = Adsr::new(fast_regs());
        adsr.key_off();
        assert_eq!(adsr.phase(), Phase::Off);
        assert_eq!(adsr.tick(), 0);
    }

    #[test]
    fn test_slow_rate_freezes_envelope() {
        // Rates of 108 and above shift the counter increment to zero with a
        // full rate mask, so the envelope never moves.
        let mut envelope = VolumeEnvelope::default();
        envelope.reset(0x7F, 0x7F, false, false, false);
        assert_eq!(envelope.counter_increment, 0);

        let mut adsr = Adsr::new(AdsrRegisters::from_pair(0x7FFF, 0x0000));
        adsr.key_on();
        for _ in 0..1000 {
            assert_eq!(adsr.tick(), 0);
            assert_eq!(adsr.phase(), Phase::Attack);
        }
    }
}
