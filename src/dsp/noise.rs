//! # Tape Noise
//!
//! Magnetic tape is never silent. Four sources are mixed here:
//!
//! - **Hiss**: pink (1/f) noise, from the random magnetization of the
//!   oxide particles.
//! - **Hum**: mains interference at 50 or 60 Hz, with its 2nd and 3rd
//!   harmonics.
//! - **Artifacts**: sparse clicks from splices and oxide flakes, at most
//!   one per second.
//! - **Rumble**: a 1.7 Hz wobble from the transport.
//!
//! The amount control is squared before use, so the bottom half of its
//! travel stays almost silent, and the final sum is hard-limited to
//! ±0.01 (-40 dBFS).

use std::f32::consts::TAU;

use rand::Rng;

/// Hard ceiling for the mixed noise.
pub const NOISE_CEILING: f32 = 0.01;

const RUMBLE_HZ: f32 = 1.7;

/// Paul Kellet's "refined" pink noise filter.
///
/// Seven one-pole sections with staggered poles sum to an approximately
/// -3 dB/octave slope over the audio band.
#[derive(Debug, Clone, Default)]
pub struct PinkNoise {
    b: [f32; 7],
}

impl PinkNoise {
    pub fn new() -> Self {
        Self::default()
    }

    /// Color one white noise sample in `[-1, 1]`.
    pub fn process(&mut self, white: f32) -> f32 {
        let b = &mut self.b;
        b[0] = 0.99886 * b[0] + white * 0.055_517_9;
        b[1] = 0.99332 * b[1] + white * 0.075_075_9;
        b[2] = 0.96900 * b[2] + white * 0.153_852;
        b[3] = 0.86650 * b[3] + white * 0.310_485_6;
        b[4] = 0.55000 * b[4] + white * 0.532_952_2;
        b[5] = -0.7616 * b[5] - white * 0.016_898;
        let pink = b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + white * 0.5362;
        b[6] = white * 0.115_926;
        // Roughly unity peak level.
        pink * 0.11
    }

    pub fn reset(&mut self) {
        self.b = [0.0; 7];
    }
}

/// Per-channel tape noise generator.
#[derive(Debug, Clone)]
pub struct TapeNoise {
    pink: PinkNoise,
    hum_phase: f32,
    rumble_phase: f32,
    samples_since_artifact: u32,
}

impl Default for TapeNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl TapeNoise {
    pub fn new() -> Self {
        Self {
            pink: PinkNoise::new(),
            hum_phase: 0.0,
            rumble_phase: 0.0,
            samples_since_artifact: 0,
        }
    }

    pub fn reset(&mut self) {
        self.pink.reset();
        self.hum_phase = 0.0;
        self.rumble_phase = 0.0;
        self.samples_since_artifact = 0;
    }

    /// Produce one noise sample for `amount` in `[0, 1]`.
    ///
    /// Returns exactly `0.0` when the scaled level is negligible. The
    /// oscillators keep running either way so hum phase is continuous.
    pub fn next<R: Rng>(&mut self, amount: f32, hum_hz: f32, sample_rate: f32, rng: &mut R) -> f32 {
        let sample_rate = sample_rate.max(1.0);

        self.hum_phase = wrap_phase(self.hum_phase + hum_hz / sample_rate);
        self.rumble_phase = wrap_phase(self.rumble_phase + RUMBLE_HZ / sample_rate);
        self.samples_since_artifact = self.samples_since_artifact.saturating_add(1);

        let level = amount.clamp(0.0, 1.0).powi(2) * 0.08;
        if level < 1e-4 {
            return 0.0;
        }

        let hiss = self.pink.process(rng.gen_range(-1.0..=1.0)) * level;

        let theta = TAU * self.hum_phase;
        let hum = (theta.sin() + 0.5 * (2.0 * theta).sin() + 0.25 * (3.0 * theta).sin())
            * level
            * 0.1;

        let mut artifact = 0.0;
        if self.samples_since_artifact as f32 > sample_rate && rng.gen::<f32>() < level * 0.1 {
            artifact = rng.gen_range(-1.0..=1.0) * level * 0.3;
            self.samples_since_artifact = 0;
        }

        let rumble = (TAU * self.rumble_phase).sin() * level * 0.05;

        (hiss + hum + artifact + rumble).clamp(-NOISE_CEILING, NOISE_CEILING)
    }
}

#[inline]
fn wrap_phase(phase: f32) -> f32 {
    phase - phase.floor()
}
