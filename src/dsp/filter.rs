//! # Filters
//!
//! Two filter families live here:
//!
//! - [`OnePoleFilter`]: the simplest IIR lowpass, used for the small
//!   "warmth" smoothers scattered through the tape and pitch character
//!   stages.
//! - [`Biquad`]: a second-order section with three responses (lowpass,
//!   peaking and high shelf). The tape emulation uses it for the
//!   pre/de-emphasis pair, the head bump and the high-frequency rolloff.
//!
//! ## The One-Pole Equation
//!
//! ```text
//! y[n] = (1 - a) * x[n] + a * y[n-1]
//! ```
//!
//! `a = 0` passes the input through; `a → 1` freezes the output. Every
//! stage that uses one is specified as "move `k` of the way toward the
//! input each sample", so the coefficient is set as `a = 1 - k`.
//!
//! ## The Biquad
//!
//! Coefficients follow the bilinear-transform designs from Zölzer's
//! *DAFX*, parameterized by a normalized frequency `f = freq / sample_rate`,
//! a quality factor `Q`, and a linear gain `V`:
//!
//! ```text
//! K = tan(π f)
//! ```
//!
//! Processing uses Transposed Direct Form II, which keeps two state
//! variables per instance and behaves well in single precision.
//!
//! Two properties matter to the tape chain:
//!
//! - A peaking filter with `V = 1` is an exact identity.
//! - A high shelf with gain `V` followed by the same shelf with gain
//!   `1 / V` cancels out, so de-emphasis undoes pre-emphasis.

use std::f64::consts::{PI, SQRT_2};

/// A one-pole (6 dB/octave) lowpass filter.
#[derive(Debug, Clone)]
pub struct OnePoleFilter {
    /// Feedback coefficient. `0.0` = passthrough, close to `1.0` = heavy
    /// smoothing.
    coefficient: f32,

    /// The previous output sample, the filter's only state.
    prev_output: f32,
}

impl Default for OnePoleFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl OnePoleFilter {
    /// Create a new filter initialized to passthrough.
    pub fn new() -> Self {
        Self {
            coefficient: 0.0,
            prev_output: 0.0,
        }
    }

    /// Create a smoother that moves `amount` of the way from its previous
    /// output toward the input every sample.
    pub fn with_smoothing(amount: f32) -> Self {
        let mut filter = Self::new();
        filter.set_smoothing(amount);
        filter
    }

    /// Set the per-sample approach rate directly (`0.0` freezes, `1.0`
    /// passes the input through).
    pub fn set_smoothing(&mut self, amount: f32) {
        self.coefficient = 1.0 - amount.clamp(0.0, 1.0);
    }

    /// Process one sample through the filter.
    pub fn process(&mut self, input: f32) -> f32 {
        let output = (1.0 - self.coefficient) * input + self.coefficient * self.prev_output;
        self.prev_output = output;
        output
    }

    /// Reset the filter memory to silence.
    pub fn reset(&mut self) {
        self.prev_output = 0.0;
    }
}

/// The response shapes a [`Biquad`] can be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadType {
    Lowpass,
    /// Peaking ("bell") EQ. `V > 1` boosts, `V < 1` cuts.
    Peak,
    /// High shelf. `V > 1` boosts the highs, `V < 1` cuts them.
    HighShelf,
}

/// A second-order IIR section with per-instance state.
///
/// One instance filters one channel. Stereo processing needs two.
#[derive(Debug, Clone)]
pub struct Biquad {
    kind: BiquadType,
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new(BiquadType::Peak)
    }
}

impl Biquad {
    /// Create a filter of the given type in its identity configuration.
    pub fn new(kind: BiquadType) -> Self {
        Self {
            kind,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    pub fn kind(&self) -> BiquadType {
        self.kind
    }

    /// Recompute coefficients.
    ///
    /// * `normalized_freq` - `freq_hz / sample_rate`, clamped to `(0, 0.49]`
    /// * `q` - quality factor (ignored by the shelf design)
    /// * `gain` - linear gain `V` (ignored by the lowpass design)
    ///
    /// Filter state is kept, so coefficients can be swept while audio
    /// is running.
    pub fn set_parameters(&mut self, kind: BiquadType, normalized_freq: f32, q: f32, gain: f32) {
        self.kind = kind;

        let f = f64::from(normalized_freq).clamp(1e-6, 0.49);
        let q = f64::from(q).max(1e-3);
        let v = f64::from(gain).max(1e-6);
        let k = (PI * f).tan();
        let k2 = k * k;

        let (b0, b1, b2, a1, a2) = match kind {
            BiquadType::Lowpass => {
                let norm = 1.0 / (1.0 + k / q + k2);
                let b0 = k2 * norm;
                (b0, 2.0 * b0, b0, 2.0 * (k2 - 1.0) * norm, (1.0 - k / q + k2) * norm)
            }
            BiquadType::Peak => {
                if v >= 1.0 {
                    let norm = 1.0 / (1.0 + k / q + k2);
                    let b1 = 2.0 * (k2 - 1.0) * norm;
                    (
                        (1.0 + v / q * k + k2) * norm,
                        b1,
                        (1.0 - v / q * k + k2) * norm,
                        b1,
                        (1.0 - k / q + k2) * norm,
                    )
                } else {
                    let norm = 1.0 / (1.0 + k / (v * q) + k2);
                    let b1 = 2.0 * (k2 - 1.0) * norm;
                    (
                        (1.0 + k / q + k2) * norm,
                        b1,
                        (1.0 - k / q + k2) * norm,
                        b1,
                        (1.0 - k / (v * q) + k2) * norm,
                    )
                }
            }
            BiquadType::HighShelf => {
                let sqrt_2v = (2.0 * v).sqrt();
                if v >= 1.0 {
                    let norm = 1.0 / (1.0 + SQRT_2 * k + k2);
                    (
                        (v + sqrt_2v * k + k2) * norm,
                        2.0 * (k2 - v) * norm,
                        (v - sqrt_2v * k + k2) * norm,
                        2.0 * (k2 - 1.0) * norm,
                        (1.0 - SQRT_2 * k + k2) * norm,
                    )
                } else {
                    let inv_v = 1.0 / v;
                    let sqrt_2_inv_v = (2.0 * inv_v).sqrt();
                    let norm = 1.0 / (inv_v + sqrt_2_inv_v * k + k2);
                    (
                        (1.0 + SQRT_2 * k + k2) * norm,
                        2.0 * (k2 - 1.0) * norm,
                        (1.0 - SQRT_2 * k + k2) * norm,
                        2.0 * (k2 - inv_v) * norm,
                        (inv_v - sqrt_2_inv_v * k + k2) * norm,
                    )
                }
            }
        };

        self.b0 = b0 as f32;
        self.b1 = b1 as f32;
        self.b2 = b2 as f32;
        self.a1 = a1 as f32;
        self.a2 = a2 as f32;
    }

    /// Process one sample (Transposed Direct Form II).
    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    /// Clear the filter history.
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
