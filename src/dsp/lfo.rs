//! Wow and flutter oscillators.
//!
//! Wow is the slow (sub-5 Hz) pitch drift of an eccentric capstan or reel;
//! flutter is the faster (1-15 Hz) jitter of the transport. Both are
//! modeled as a phase accumulator driving one of three shapes.

use std::f32::consts::TAU;

use nih_plug::prelude::Enum;
use rand::Rng;

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    #[default]
    Sine,
    Triangle,
    /// A new random target every cycle, glided to linearly.
    #[name = "Random Walk"]
    RandomWalk,
}

impl Waveform {
    /// Evaluate a deterministic shape at `phase` in `[0, 1)`.
    ///
    /// `RandomWalk` has no closed form and evaluates to 0; the oscillator
    /// tracks its state separately.
    #[inline]
    pub fn evaluate(&self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (phase * TAU).sin(),
            Waveform::Triangle => 2.0 * (2.0 * (phase - (phase + 0.5).floor())).abs() - 1.0,
            Waveform::RandomWalk => 0.0,
        }
    }
}

/// A free-running modulation oscillator with output in `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct ModulationLfo {
    waveform: Waveform,
    rate_hz: f32,
    phase: f32,
    walk_from: f32,
    walk_to: f32,
}

impl ModulationLfo {
    pub fn new(waveform: Waveform, rate_hz: f32) -> Self {
        Self {
            waveform,
            rate_hz: rate_hz.max(0.0),
            phase: 0.0,
            walk_from: 0.0,
            walk_to: 0.0,
        }
    }

    pub fn set_rate(&mut self, rate_hz: f32) {
        self.rate_hz = rate_hz.max(0.0);
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.walk_from = 0.0;
        self.walk_to = 0.0;
    }

    /// Output at the current phase, then advance by one sample.
    pub fn tick<R: Rng>(&mut self, sample_rate: f32, rng: &mut R) -> f32 {
        let value = match self.waveform {
            Waveform::RandomWalk => self.walk_from + (self.walk_to - self.walk_from) * self.phase,
            shape => shape.evaluate(self.phase),
        };

        self.phase += self.rate_hz / sample_rate.max(1.0);
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
            self.walk_from = self.walk_to;
            self.walk_to = rng.gen_range(-1.0..=1.0);
        }

        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_shapes() {
        assert_abs_diff_eq!(Waveform::Sine.evaluate(0.0), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(Waveform::Sine.evaluate(0.25), 1.0, epsilon = 1e-6);

        assert_abs_diff_eq!(Waveform::Triangle.evaluate(0.0), -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(Waveform::Triangle.evaluate(0.25), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(Waveform::Triangle.evaluate(0.5), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(Waveform::Triangle.evaluate(0.75), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_sine_completes_one_cycle_per_period() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut lfo = ModulationLfo::new(Waveform::Sine, 2.0);
        let sr = 1000.0;

        let first = lfo.tick(sr, &mut rng);
        for _ in 1..500 {
            lfo.tick(sr, &mut rng);
        }
        // 500 samples at 2 Hz / 1 kHz is exactly one cycle.
        let again = lfo.tick(sr, &mut rng);
        assert_abs_diff_eq!(first, again, epsilon = 1e-3);
    }

    #[test]
    fn test_random_walk_stays_in_range_and_moves() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut lfo = ModulationLfo::new(Waveform::RandomWalk, 50.0);

        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for _ in 0..48000 {
            let v = lfo.tick(48000.0, &mut rng);
            assert!((-1.0..=1.0).contains(&v));
            min = min.min(v);
            max = max.max(v);
        }
        assert!(max - min > 0.5, "random walk barely moved: {min}..{max}");
    }
}
