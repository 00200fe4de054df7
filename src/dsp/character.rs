//! Pitch shifter coloration.
//!
//! Classic hardware pitch shifters each had a sound of their own. The
//! vocoder itself is clean, so this module wraps it with a pre stage
//! (before analysis) and a post stage (after resynthesis) that imitate
//! four flavors:
//!
//! | Mode | Pre | Post |
//! |---|---|---|
//! | BBD | clock bleed, gentle tanh | lowpass |
//! | Harmonizer | bit reduction above 50 % character | presence lift |
//! | Varispeed | tape-style tanh warmth, slow wobble | lowpass blend |
//! | Hybrid | mild tanh, wobble | soft limiter |
//!
//! Each mode keeps its own filter state inside its enum variant, and a mode
//! switch builds a fresh variant, so no history leaks between modes.

use nih_plug::prelude::Enum;

use super::filter::OnePoleFilter;

/// Below this character amount the stages are bypassed.
const BYPASS_THRESHOLD: f32 = 0.01;

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PitchMode {
    /// Bucket-brigade delay chip.
    #[name = "BBD"]
    Bbd,
    /// Early digital harmonizer with a low-resolution converter.
    #[name = "Harmonizer"]
    Harmonizer,
    /// Tape machine with variable capstan speed.
    Varispeed,
    #[default]
    Hybrid,
}

/// Per-channel state of the active coloration.
#[derive(Debug, Clone)]
pub enum PitchCharacter {
    Bbd {
        clock: u32,
        lowpass: OnePoleFilter,
    },
    Harmonizer {
        presence: OnePoleFilter,
    },
    Varispeed {
        clock: u32,
        lowpass: OnePoleFilter,
    },
    Hybrid {
        clock: u32,
    },
}

impl Default for PitchCharacter {
    fn default() -> Self {
        Self::new(PitchMode::default())
    }
}

impl PitchCharacter {
    pub fn new(mode: PitchMode) -> Self {
        match mode {
            PitchMode::Bbd => Self::Bbd {
                clock: 0,
                lowpass: OnePoleFilter::new(),
            },
            PitchMode::Harmonizer => Self::Harmonizer {
                presence: OnePoleFilter::with_smoothing(0.95),
            },
            PitchMode::Varispeed => Self::Varispeed {
                clock: 0,
                lowpass: OnePoleFilter::with_smoothing(0.8),
            },
            PitchMode::Hybrid => Self::Hybrid { clock: 0 },
        }
    }

    pub fn mode(&self) -> PitchMode {
        match self {
            Self::Bbd { .. } => PitchMode::Bbd,
            Self::Harmonizer { .. } => PitchMode::Harmonizer,
            Self::Varispeed { .. } => PitchMode::Varispeed,
            Self::Hybrid { .. } => PitchMode::Hybrid,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.mode());
    }

    /// Coloration applied before the analysis window.
    pub fn pre(&mut self, x: f32, amount: f32) -> f32 {
        if amount < BYPASS_THRESHOLD {
            return x;
        }

        match self {
            Self::Bbd { clock, .. } => {
                let t = tick(clock);
                let x = x + (t * 0.1).sin() * 0.001 * amount;
                x * (1.0 - 0.1 * amount) + (1.5 * x).tanh() * 0.1 * amount
            }
            Self::Harmonizer { .. } => {
                if amount > 0.5 {
                    let bits = 16.0 - 4.0 * amount;
                    let levels = 2.0_f32.powf(bits - 1.0);
                    (x * levels).round() / levels
                } else {
                    x
                }
            }
            Self::Varispeed { clock, .. } => {
                let t = tick(clock);
                let drive = 1.0 + amount;
                (x * drive).tanh() / drive + (t * 0.01).sin() * amount * 0.005
            }
            Self::Hybrid { clock } => {
                let t = tick(clock);
                let drive = 1.0 + 0.3 * amount;
                (x * drive).tanh() / drive + (t * 0.05).sin() * 0.002 * amount
            }
        }
    }

    /// Coloration applied to the resynthesized signal.
    pub fn post(&mut self, x: f32, amount: f32) -> f32 {
        if amount < BYPASS_THRESHOLD {
            return x;
        }

        match self {
            Self::Bbd { lowpass, .. } => {
                lowpass.set_smoothing(1.0 - 0.3 * amount);
                lowpass.process(x)
            }
            Self::Harmonizer { presence } => {
                let smoothed = presence.process(x);
                x + (x - smoothed) * amount * 0.1
            }
            Self::Varispeed { lowpass, .. } => {
                let smoothed = lowpass.process(x);
                x * (1.0 - 0.3 * amount) + smoothed * 0.3 * amount
            }
            Self::Hybrid { .. } => (0.9 * x).tanh() * 1.1,
        }
    }
}

/// Advance a per-channel sample clock, returning the pre-increment value
/// as an `f32` phase. Wraps well before `f32` loses integer precision.
#[inline]
fn tick(clock: &mut u32) -> f32 {
    let t = *clock as f32;
    *clock = (*clock + 1) % (1 << 20);
    t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_character_is_bypassed() {
        for mode in [
            PitchMode::Bbd,
            PitchMode::Harmonizer,
            PitchMode::Varispeed,
            PitchMode::Hybrid,
        ] {
            let mut c = PitchCharacter::new(mode);
            for x in [0.0, 0.3, -0.9] {
                assert_eq!(c.pre(x, 0.0), x);
                assert_eq!(c.post(x, 0.005), x);
            }
        }
    }

    #[test]
    fn test_mode_round_trips() {
        for mode in [
            PitchMode::Bbd,
            PitchMode::Harmonizer,
            PitchMode::Varispeed,
            PitchMode::Hybrid,
        ] {
            assert_eq!(PitchCharacter::new(mode).mode(), mode);
        }
    }

    #[test]
    fn test_harmonizer_quantizes_at_high_character() {
        let mut c = PitchCharacter::new(PitchMode::Harmonizer);
        // 16 - 4 = 12 bits: steps of 1/2048.
        let y = c.pre(0.1234567, 1.0);
        let steps = y * 2048.0;
        assert!((steps - steps.round()).abs() < 1e-3, "{y} is not on the grid");

        // Below half character the converter is clean.
        assert_eq!(c.pre(0.1234567, 0.4), 0.1234567);
    }

    #[test]
    fn test_colorations_stay_bounded() {
        for mode in [
            PitchMode::Bbd,
            PitchMode::Harmonizer,
            PitchMode::Varispeed,
            PitchMode::Hybrid,
        ] {
            let mut c = PitchCharacter::new(mode);
            for n in 0..10_000 {
                let x = (n as f32 * 0.03).sin();
                let converted = c.pre(x, 1.0);
                let y = c.post(converted, 1.0);
                assert!(y.is_finite() && y.abs() < 1.5, "{mode:?}: {y}");
            }
        }
    }

    #[test]
    fn test_reset_clears_filter_state() {
        let mut c = PitchCharacter::new(PitchMode::Bbd);
        for _ in 0..100 {
            c.post(1.0, 1.0);
        }
        c.reset();
        // Fresh BBD lowpass with smoothing 0.7 starts from silence.
        let y = c.post(1.0, 1.0);
        assert!((y - 0.7).abs() < 1e-6, "got {y}");
    }
}
