//! # Phase Vocoder Pitch Shifter
//!
//! Shifts pitch without changing duration by working on overlapping
//! short-time spectra (STFT frames):
//!
//! ```text
//!            every HOP samples, per channel
//!  input ─► [ring N] ─► × analysis window ─► FFT ─► (magnitude, phase)
//!                                                        │
//!                        measure true frequency per bin ◄┘
//!                                     │
//!                   move bin i to bin i·ratio, advance its
//!                   synthesis phase by (true increment · ratio)
//!                                     │
//!  output ◄─ read & clear ◄─ overlap-add ◄─ × synthesis window ◄─ IFFT
//! ```
//!
//! ## Measuring the true frequency
//!
//! A bin's phase advances by `2π · bin · HOP / N` per hop if the partial
//! sits exactly on the bin center. The measured advance minus that
//! expected advance, wrapped into `[-π, π)`, is the deviation; adding it
//! back gives the partial's actual per-hop phase increment. Multiplying
//! that increment by the pitch ratio is what moves the partial.
//!
//! ## Gain staging
//!
//! Both windows are a periodic Hann scaled so that, at 4× overlap, the
//! product of the two windows sums to `HOP` at every sample. The inverse
//! FFT (unnormalized in `rustfft`) is scaled by `1 / (N · HOP)`, so a
//! ratio of exactly 1.0 reconstructs the input.
//!
//! ## Latency
//!
//! Each frame covers the last `N` input samples and is written into the
//! output ring starting at the slot that is read *now*, so the oldest
//! sample of the frame comes out immediately and the newest comes out
//! `N - 1` samples later. The first sample of input therefore appears
//! `N - 1` samples after it went in.
//!
//! ## Real-time safety
//!
//! Everything is allocated in [`PitchShifter::new`]: rings, windows, the
//! FFT plans and their scratch buffers. [`process`](PitchShifter::process)
//! only touches preallocated memory.

use std::f32::consts::TAU;
use std::f64::consts::{PI as PI64, TAU as TAU64};
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::character::{PitchCharacter, PitchMode};

/// STFT frame length.
pub const FFT_SIZE: usize = 2048;

/// Distance between frames (4× overlap).
pub const HOP_SIZE: usize = FFT_SIZE / 4;

const NUM_BINS: usize = FFT_SIZE / 2 + 1;
const NYQUIST_BIN: usize = FFT_SIZE / 2;

/// Per-channel analysis and synthesis state.
struct ChannelState {
    input_ring: Vec<f32>,
    output_ring: Vec<f32>,
    /// Ring slot of the current sample, shared by both rings.
    pos: usize,
    samples_until_frame: usize,

    /// Measured phase per bin in the previous frame.
    last_phase: Vec<f64>,
    /// Running output phase per bin.
    synth_phase: Vec<f64>,

    base_ratio: f32,
    ratio: f32,
    drift_phase: f32,
    character: PitchCharacter,
}

impl ChannelState {
    fn new(mode: PitchMode) -> Self {
        Self {
            input_ring: vec![0.0; FFT_SIZE],
            output_ring: vec![0.0; FFT_SIZE],
            pos: 0,
            samples_until_frame: HOP_SIZE,
            last_phase: vec![0.0; NUM_BINS],
            synth_phase: vec![0.0; NUM_BINS],
            base_ratio: 1.0,
            ratio: 1.0,
            drift_phase: 0.0,
            character: PitchCharacter::new(mode),
        }
    }

    fn reset(&mut self) {
        self.input_ring.fill(0.0);
        self.output_ring.fill(0.0);
        self.pos = 0;
        self.samples_until_frame = HOP_SIZE;
        self.last_phase.fill(0.0);
        self.synth_phase.fill(0.0);
        self.ratio = self.base_ratio;
        self.drift_phase = 0.0;
        self.character.reset();
    }
}

/// Stereo STFT phase-vocoder pitch shifter.
pub struct PitchShifter {
    sample_rate: f32,
    channels: [ChannelState; 2],

    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,

    analysis_window: Vec<f32>,
    synthesis_window: Vec<f32>,

    // Per-frame work arrays, shared because channels run one at a time.
    magnitudes: Vec<f32>,
    increments: Vec<f64>,
    target_magnitudes: Vec<f32>,
    target_increments: Vec<f64>,
    strongest: Vec<f32>,

    drift_amount: f32,
    drift_rate: f32,
    mode: PitchMode,
    character_amount: f32,
}

impl PitchShifter {
    pub fn new(sample_rate: f32) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(FFT_SIZE);
        let inverse = planner.plan_fft_inverse(FFT_SIZE);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        let (analysis_window, synthesis_window) = normalized_windows();
        let mode = PitchMode::default();

        Self {
            sample_rate: sample_rate.max(1.0),
            channels: [ChannelState::new(mode), ChannelState::new(mode)],
            forward,
            inverse,
            spectrum: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            analysis_window,
            synthesis_window,
            magnitudes: vec![0.0; NUM_BINS],
            increments: vec![0.0; NUM_BINS],
            target_magnitudes: vec![0.0; NUM_BINS],
            target_increments: vec![0.0; NUM_BINS],
            strongest: vec![0.0; NUM_BINS],
            drift_amount: 0.0,
            drift_rate: 0.5,
            mode,
            character_amount: 0.0,
        }
    }

    /// Adopt a new sample rate. Only the drift LFO depends on it; the
    /// frame state is cleared because buffered audio belongs to the old
    /// rate.
    pub fn configure(&mut self, sample_rate: f32) {
        let sample_rate = sample_rate.max(1.0);
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
    }

    /// Shift both channels by `cents` (`ratio = 2^(cents / 1200)`).
    pub fn set_pitch_shift_cents(&mut self, cents: f32) {
        for channel in 0..self.channels.len() {
            self.set_channel_pitch_cents(channel, cents);
        }
    }

    pub fn set_pitch_shift_semitones(&mut self, semitones: f32) {
        self.set_pitch_shift_cents(semitones * 100.0);
    }

    /// Shift one channel. Out-of-range channels are ignored.
    pub fn set_channel_pitch_cents(&mut self, channel: usize, cents: f32) {
        if let Some(state) = self.channels.get_mut(channel) {
            state.base_ratio = cents_to_ratio(cents);
        }
    }

    /// Slow sinusoidal detune. `amount` is the peak deviation in percent
    /// of the ratio, `rate_hz` the LFO speed.
    pub fn set_detune_drift(&mut self, amount: f32, rate_hz: f32) {
        self.drift_amount = amount.max(0.0);
        self.drift_rate = rate_hz.max(0.0);
    }

    pub fn set_pitch_mode(&mut self, mode: PitchMode) {
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        for channel in &mut self.channels {
            channel.character = PitchCharacter::new(mode);
        }
    }

    pub fn pitch_mode(&self) -> PitchMode {
        self.mode
    }

    /// Intensity of the mode coloration, `[0, 1]`.
    pub fn set_character(&mut self, amount: f32) {
        self.character_amount = amount.clamp(0.0, 1.0);
    }

    /// Effective ratio (including drift) most recently used by `channel`.
    pub fn pitch_ratio(&self, channel: usize) -> f32 {
        self.channels
            .get(channel)
            .map_or(1.0, |state| state.ratio)
    }

    /// Samples between an input sample and its resynthesized output.
    pub const fn latency_samples(&self) -> usize {
        FFT_SIZE - 1
    }

    /// `Σ analysis[i] · synthesis[i]` over one sample position in each
    /// of the overlapping frames. Equals `HOP_SIZE` when normalized.
    pub fn window_overlap_sum(&self) -> f32 {
        (0..FFT_SIZE / HOP_SIZE)
            .map(|k| self.analysis_window[k * HOP_SIZE] * self.synthesis_window[k * HOP_SIZE])
            .sum()
    }

    /// Process one sample of `channel` (0 = left, 1 = right).
    pub fn process(&mut self, input: f32, channel: usize) -> f32 {
        let channel = channel.min(1);
        let amount = self.character_amount;
        let sample_rate = self.sample_rate;
        let (drift_amount, drift_rate) = (self.drift_amount, self.drift_rate);

        let state = &mut self.channels[channel];
        let colored = state.character.pre(input, amount);

        state.drift_phase += drift_rate / sample_rate;
        state.drift_phase -= state.drift_phase.floor();
        state.ratio =
            state.base_ratio * (1.0 + (TAU * state.drift_phase).sin() * drift_amount * 0.01);

        state.input_ring[state.pos] = colored;
        state.samples_until_frame -= 1;
        let frame_due = state.samples_until_frame == 0;
        if frame_due {
            state.samples_until_frame = HOP_SIZE;
        }

        if frame_due {
            self.run_frame(channel);
        }

        let state = &mut self.channels[channel];
        let out = std::mem::take(&mut state.output_ring[state.pos]);
        state.pos = (state.pos + 1) % FFT_SIZE;

        state.character.post(out, amount)
    }

    /// Analyze the last `FFT_SIZE` samples of `channel`, remap, and
    /// overlap-add the resynthesized frame.
    fn run_frame(&mut self, channel: usize) {
        let state = &mut self.channels[channel];
        let ratio = f64::from(state.ratio);

        // Oldest sample first.
        for (i, bin) in self.spectrum.iter_mut().enumerate() {
            let idx = (state.pos + 1 + i) % FFT_SIZE;
            *bin = Complex::new(state.input_ring[idx] * self.analysis_window[i], 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        for k in 0..NUM_BINS {
            let bin = self.spectrum[k];
            self.magnitudes[k] = bin.norm();
            let phase = f64::from(bin.im).atan2(f64::from(bin.re));

            let expected = TAU64 * (k * HOP_SIZE) as f64 / FFT_SIZE as f64;
            let deviation = wrap_phase(phase - state.last_phase[k] - expected);
            state.last_phase[k] = phase;
            self.increments[k] = expected + deviation;
        }

        // Pass A: spread each source bin over its two nearest targets.
        self.target_magnitudes.fill(0.0);
        self.target_increments.fill(0.0);
        self.strongest.fill(0.0);
        for k in 0..NUM_BINS {
            let position = k as f64 * ratio;
            let lower = position.floor() as usize;
            if lower > NYQUIST_BIN {
                break;
            }
            let frac = (position - lower as f64) as f32;
            let magnitude = self.magnitudes[k];
            let increment = self.increments[k] * ratio;

            let mut contribute = |target: usize, weight: f32| {
                let share = magnitude * weight;
                self.target_magnitudes[target] += share;
                if share > self.strongest[target] {
                    self.strongest[target] = share;
                    self.target_increments[target] = increment;
                }
            };

            contribute(lower, 1.0 - frac);
            if frac > 0.0 && lower < NYQUIST_BIN {
                contribute(lower + 1, frac);
            }
        }

        // Pass B: advance synthesis phases and rebuild the spectrum.
        for j in 0..NUM_BINS {
            let phase = wrap_phase(state.synth_phase[j] + self.target_increments[j]);
            state.synth_phase[j] = phase;
            let (sin, cos) = phase.sin_cos();
            let magnitude = self.target_magnitudes[j];
            self.spectrum[j] = Complex::new(magnitude * cos as f32, magnitude * sin as f32);
        }
        self.spectrum[0].im = 0.0;
        self.spectrum[NYQUIST_BIN].im = 0.0;
        for j in 1..NYQUIST_BIN {
            self.spectrum[FFT_SIZE - j] = self.spectrum[j].conj();
        }

        self.inverse
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let scale = 1.0 / (FFT_SIZE * HOP_SIZE) as f32;
        for (i, bin) in self.spectrum.iter().enumerate() {
            let idx = (state.pos + i) % FFT_SIZE;
            state.output_ring[idx] += bin.re * self.synthesis_window[i] * scale;
        }
    }
}

/// `2^(cents / 1200)`.
#[inline]
pub fn cents_to_ratio(cents: f32) -> f32 {
    (cents / 1200.0).exp2()
}

/// Wrap a phase into `[-π, π)`.
#[inline]
fn wrap_phase(phase: f64) -> f64 {
    phase - TAU64 * ((phase + PI64) / TAU64).floor()
}

/// Periodic Hann windows, each scaled by `sqrt(HOP / S)` where `S` is the
/// overlapped sum of the squared Hann window.
fn normalized_windows() -> (Vec<f32>, Vec<f32>) {
    let hann: Vec<f32> = (0..FFT_SIZE)
        .map(|i| 0.5 - 0.5 * (TAU * i as f32 / FFT_SIZE as f32).cos())
        .collect();

    let overlap_sum: f32 = (0..FFT_SIZE / HOP_SIZE)
        .map(|k| hann[k * HOP_SIZE] * hann[k * HOP_SIZE])
        .sum();
    let gain = (HOP_SIZE as f32 / overlap_sum).sqrt();

    let window: Vec<f32> = hann.iter().map(|w| w * gain).collect();
    (window.clone(), window)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Frequency (Hz) of the strongest FFT bin of `signal`, Hann windowed.
    pub(crate) fn dominant_frequency(signal: &[f32], sample_rate: f32) -> f32 {
        let n = signal.len();
        let mut buf: Vec<Complex<f32>> = signal
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let w = 0.5 - 0.5 * (TAU * i as f32 / n as f32).cos();
                Complex::new(x * w, 0.0)
            })
            .collect();
        FftPlanner::new().plan_fft_forward(n).process(&mut buf);

        let peak = buf[1..n / 2]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .map_or(0, |(i, _)| i + 1);
        peak as f32 * sample_rate / n as f32
    }

    fn sine(freq: f32, sample_rate: f32, n: usize) -> f32 {
        (TAU * freq * n as f32 / sample_rate).sin()
    }

    #[test]
    fn test_window_overlap_sums_to_hop() {
        let shifter = PitchShifter::new(44100.0);
        assert_abs_diff_eq!(shifter.window_overlap_sum(), HOP_SIZE as f32, epsilon = 1e-2);
    }

    #[test]
    fn test_windows_overlap_evenly_everywhere() {
        let shifter = PitchShifter::new(44100.0);
        for offset in [1, 100, 300, 511] {
            let sum: f32 = (0..4)
                .map(|k| {
                    let i = offset + k * HOP_SIZE;
                    shifter.analysis_window[i] * shifter.synthesis_window[i]
                })
                .sum();
            assert_abs_diff_eq!(sum, HOP_SIZE as f32, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_latency() {
        let shifter = PitchShifter::new(48000.0);
        assert_eq!(shifter.latency_samples(), FFT_SIZE - 1);
    }

    #[test]
    fn test_cents_to_ratio() {
        assert_abs_diff_eq!(cents_to_ratio(0.0), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(cents_to_ratio(1200.0), 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(cents_to_ratio(-1200.0), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(cents_to_ratio(700.0), 1.498_307, epsilon = 1e-5);
    }

    /// At ratio 1.0 the vocoder reproduces the input, delayed by its
    /// latency.
    #[test]
    fn test_unity_ratio_reconstructs_input() {
        let sr = 44100.0;
        let mut shifter = PitchShifter::new(sr);
        let latency = shifter.latency_samples();

        let input: Vec<f32> = (0..sr as usize / 2)
            .map(|n| 0.5 * sine(440.0, sr, n) + 0.2 * sine(1234.0, sr, n))
            .collect();
        let output: Vec<f32> = input.iter().map(|&x| shifter.process(x, 0)).collect();

        for n in (latency + FFT_SIZE)..output.len() {
            let expected = input[n - latency];
            assert!(
                (output[n] - expected).abs() < 0.05,
                "sample {n}: expected {expected}, got {}",
                output[n]
            );
        }
    }

    /// Silence in, silence out, for any ratio.
    #[test]
    fn test_silence_stays_silent() {
        let mut shifter = PitchShifter::new(44100.0);
        shifter.set_pitch_shift_cents(700.0);
        for _ in 0..10_000 {
            assert_eq!(shifter.process(0.0, 0), 0.0);
            assert_eq!(shifter.process(0.0, 1), 0.0);
        }
    }

    #[test]
    fn test_octave_up_doubles_frequency() {
        let sr = 44100.0;
        let mut shifter = PitchShifter::new(sr);
        shifter.set_pitch_shift_cents(1200.0);

        let output: Vec<f32> = (0..sr as usize)
            .map(|n| shifter.process(0.5 * sine(1000.0, sr, n), 0))
            .collect();

        let tail = &output[output.len() - 16384..];
        let freq = dominant_frequency(tail, sr);
        assert!((freq - 2000.0).abs() < 100.0, "dominant frequency {freq} Hz");
    }

    #[test]
    fn test_octave_down_on_right_channel_only() {
        let sr = 48000.0;
        let mut shifter = PitchShifter::new(sr);
        shifter.set_channel_pitch_cents(1, -1200.0);

        let mut left = Vec::new();
        let mut right = Vec::new();
        for n in 0..sr as usize {
            let x = 0.5 * sine(1200.0, sr, n);
            left.push(shifter.process(x, 0));
            right.push(shifter.process(x, 1));
        }

        let l = dominant_frequency(&left[left.len() - 16384..], sr);
        let r = dominant_frequency(&right[right.len() - 16384..], sr);
        assert!((l - 1200.0).abs() < 60.0, "left {l} Hz");
        assert!((r - 600.0).abs() < 30.0, "right {r} Hz");
    }

    #[test]
    fn test_drift_modulates_ratio() {
        let mut shifter = PitchShifter::new(1000.0);
        shifter.set_detune_drift(10.0, 1.0);

        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for _ in 0..1000 {
            shifter.process(0.0, 0);
            let r = shifter.pitch_ratio(0);
            min = min.min(r);
            max = max.max(r);
        }
        assert!(max > 1.09 && max <= 1.1 + 1e-5, "max ratio {max}");
        assert!(min < 0.91 && min >= 0.9 - 1e-5, "min ratio {min}");
    }

    #[test]
    fn test_reset_clears_pending_output() {
        let mut shifter = PitchShifter::new(44100.0);
        for n in 0..5000 {
            shifter.process(sine(500.0, 44100.0, n), 0);
        }
        shifter.reset();
        for _ in 0..5000 {
            assert_eq!(shifter.process(0.0, 0), 0.0);
        }
    }

    #[test]
    fn test_mode_switch_keeps_audio_finite() {
        let mut shifter = PitchShifter::new(44100.0);
        shifter.set_character(1.0);
        shifter.set_pitch_shift_cents(-500.0);
        for (i, mode) in [PitchMode::Bbd, PitchMode::Harmonizer, PitchMode::Varispeed]
            .into_iter()
            .enumerate()
        {
            shifter.set_pitch_mode(mode);
            assert_eq!(shifter.pitch_mode(), mode);
            for n in 0..4096 {
                let y = shifter.process(0.8 * sine(330.0, 44100.0, n + i * 4096), 0);
                assert!(y.is_finite() && y.abs() < 4.0);
            }
        }
    }
}
