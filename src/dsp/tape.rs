//! # Tape Delay Emulation
//!
//! A model of a multi-head tape echo, applied to the already-delayed
//! signal coming out of the main delay line. Per sample and per channel:
//!
//! ```text
//! in ─► pre-emphasis ─► saturation ─► [record] ══ loop ══ heads 1..4 ─► mix
//!        (HF shelf +6dB)                         ▲ speed = wow & flutter
//!                                                                       │
//! out ◄─ limiter ◄─ decorrelation ◄─ + noise ◄─ instability ◄─ aging ◄─ EQ
//!                                                       (bump, rolloff, de-emphasis)
//! ```
//!
//! Each stage checks its result with `is_finite` and falls back to a safe
//! signal rather than letting a NaN escape into the feedback network.
//!
//! The wow/flutter oscillators are shared by both channels: channel 0
//! advances them and caches the resulting speed factor, channel 1 reuses
//! it, so the two sides of the tape always move together.
//!
//! The decorrelation and the soft limiter are fixed output stages. With
//! every other stage at its neutral setting (zero depths and saturation,
//! bump gain 1, rolloff wide open, no aging, instability or noise) the
//! single-head machine is a pure head delay followed by those two.

use std::f32::consts::{PI, TAU};

use nih_plug::prelude::Enum;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::filter::{Biquad, BiquadType, OnePoleFilter};
use super::lfo::{ModulationLfo, Waveform};
use super::noise::TapeNoise;
use super::tape_loop::{TapeLoop, MAX_HEADS};

/// Longest head spacing any configuration uses, with room to spare.
const HEAD_MAX_DELAY_MS: f32 = 500.0;

const DEFAULT_SEED: u64 = 0x7A9E_DE1A;

const EMPHASIS_HZ: f32 = 2000.0;
const EMPHASIS_Q: f32 = 0.7;
const EMPHASIS_GAIN: f32 = 2.0;

/// At this rolloff frequency the lowpass is taken out of the path.
pub const ROLLOFF_OPEN_HZ: f32 = 20_000.0;

/// Phase offset of channel 1 in the stereo decorrelation LFO.
const DECORRELATION_OFFSET: f32 = 0.25;
const DECORRELATION_RATE: f32 = 3.17;

/// Playback head layouts, after the classic multi-head echo machines.
#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeadConfiguration {
    #[default]
    #[name = "Single Head"]
    Single,
    #[name = "Dual Head"]
    Dual,
    #[name = "Triple Head"]
    Triple,
    #[name = "Quad Head"]
    Quad,
}

impl HeadConfiguration {
    /// Map a host selector index (0-3) to a layout, clamping out-of-range
    /// values to the nearest end.
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Single,
            1 => Self::Dual,
            2 => Self::Triple,
            _ => Self::Quad,
        }
    }

    /// Head spacing in milliseconds.
    pub fn head_delays_ms(&self) -> &'static [f32] {
        match self {
            Self::Single => &[120.0],
            Self::Dual => &[100.0, 170.0],
            Self::Triple => &[80.0, 140.0, 200.0],
            Self::Quad => &[70.0, 120.0, 180.0, 250.0],
        }
    }

    /// Per-head speed offsets. Later heads see slightly more modulation,
    /// as tape stretch accumulates along the path.
    fn speed_offsets(&self) -> &'static [f32] {
        match self {
            Self::Single => &[1.0],
            Self::Dual => &[1.0, 1.03],
            Self::Triple => &[1.0, 1.02, 1.05],
            Self::Quad => &[1.0, 1.015, 1.03, 1.045],
        }
    }
}

/// Everything one side of the tape path owns.
#[derive(Debug, Clone)]
struct TapeChannel {
    tape: TapeLoop,

    pre_emphasis: Biquad,
    de_emphasis: Biquad,
    bump: Biquad,
    rolloff: Biquad,

    triple_warmth: OnePoleFilter,
    quad_lowpass: OnePoleFilter,
    quad_warmth: OnePoleFilter,
    aging_lowpass: OnePoleFilter,

    instability_phase: f32,
    /// Speed wobble from the instability stage, applied on the next read.
    instability_speed: f32,

    noise: TapeNoise,
}

impl TapeChannel {
    fn new(sample_rate: f32) -> Self {
        Self {
            tape: TapeLoop::new(sample_rate, HEAD_MAX_DELAY_MS),
            pre_emphasis: Biquad::new(BiquadType::HighShelf),
            de_emphasis: Biquad::new(BiquadType::HighShelf),
            bump: Biquad::new(BiquadType::Peak),
            rolloff: Biquad::new(BiquadType::Lowpass),
            triple_warmth: OnePoleFilter::with_smoothing(0.85),
            quad_lowpass: OnePoleFilter::with_smoothing(0.75),
            quad_warmth: OnePoleFilter::with_smoothing(0.9),
            aging_lowpass: OnePoleFilter::new(),
            instability_phase: 0.0,
            instability_speed: 1.0,
            noise: TapeNoise::new(),
        }
    }

    fn configure(&mut self, sample_rate: f32) {
        self.tape.configure(sample_rate);
    }

    fn reset(&mut self) {
        self.tape.reset();
        self.pre_emphasis.reset();
        self.de_emphasis.reset();
        self.bump.reset();
        self.rolloff.reset();
        self.triple_warmth.reset();
        self.quad_lowpass.reset();
        self.quad_warmth.reset();
        self.aging_lowpass.reset();
        self.instability_phase = 0.0;
        self.instability_speed = 1.0;
        self.noise.reset();
    }

    fn apply_configuration(&mut self, config: HeadConfiguration) {
        let delays = config.head_delays_ms();
        for head in 0..MAX_HEADS {
            match delays.get(head) {
                Some(&ms) => self.tape.set_head_delay(head, ms),
                None => self.tape.disable_head(head),
            }
        }
    }

    /// Record `x` once and mix the active playback heads.
    ///
    /// With the single-head layout the result is just the one head, so at
    /// `speed == 1.0` it is `x` delayed by exactly the head spacing.
    fn heads(&mut self, x: f32, speed: f32, config: HeadConfiguration, channel: usize) -> f32 {
        self.tape.record(x);

        let mut h = [0.0_f32; MAX_HEADS];
        for (head, (out, offset)) in h.iter_mut().zip(config.speed_offsets()).enumerate() {
            *out = self.tape.playback(head, speed * offset);
        }

        match config {
            HeadConfiguration::Single => h[0],
            HeadConfiguration::Dual => {
                // Head 1 leans left, head 2 leans right.
                let panned = if channel == 0 {
                    h[0] * 0.8 + h[1] * 0.4
                } else {
                    h[0] * 0.4 + h[1] * 0.8
                };
                panned * 0.8 + (h[0] - h[1]) * 0.2
            }
            HeadConfiguration::Triple => {
                let crosstalk = (h[0] * h[1] + h[1] * h[2]) * 0.05;
                let out = h[0] * 0.5 + h[1] * 0.3 + h[2] * 0.2 + crosstalk;
                out + self.triple_warmth.process(out) * 0.1
            }
            HeadConfiguration::Quad => {
                let intermod = (h[0] * h[2] - h[1] * h[3]) * 0.03;
                let out = h[0] * 0.4 + h[1] * 0.25 + h[2] * 0.2 + h[3] * 0.15 + intermod;
                let lowpassed = self.quad_lowpass.process(out);
                let warm = self.quad_warmth.process(out);
                let blended = lowpassed * 0.7 + (out + warm * 0.08) * 0.3;
                (blended * 1.1).tanh() / 1.1
            }
        }
    }
}

/// Stereo tape echo emulation.
pub struct TapeDelayProcessor {
    sample_rate: f32,
    enabled: bool,
    channels: [TapeChannel; 2],

    wow: ModulationLfo,
    flutter: ModulationLfo,
    wow_depth: f32,
    flutter_depth: f32,
    /// Speed factor computed by channel 0 for the current frame.
    modulation: f32,

    saturation: f32,
    bump_freq: f32,
    bump_gain: f32,
    bump_q: f32,
    rolloff_freq: f32,
    rolloff_q: f32,
    aging: f32,
    instability: f32,
    noise_enabled: bool,
    noise_amount: f32,
    hum_hz: f32,
    head_config: HeadConfiguration,

    rng: ChaCha8Rng,
}

impl TapeDelayProcessor {
    pub fn new(sample_rate: f32) -> Self {
        let sample_rate = sample_rate.max(1.0);
        let mut tape = Self {
            sample_rate,
            enabled: false,
            channels: [TapeChannel::new(sample_rate), TapeChannel::new(sample_rate)],
            wow: ModulationLfo::new(Waveform::Sine, 0.3),
            flutter: ModulationLfo::new(Waveform::Sine, 2.7),
            wow_depth: 0.1,
            flutter_depth: 0.05,
            modulation: 1.0,
            saturation: 0.5,
            bump_freq: 90.0,
            bump_gain: 1.5,
            bump_q: 1.2,
            rolloff_freq: 10_000.0,
            rolloff_q: 0.7,
            aging: 0.0,
            instability: 0.0,
            noise_enabled: false,
            noise_amount: 0.01,
            hum_hz: 60.0,
            head_config: HeadConfiguration::Single,
            rng: ChaCha8Rng::seed_from_u64(DEFAULT_SEED),
        };
        tape.update_emphasis();
        tape.update_bump();
        tape.update_rolloff();
        tape.set_head_configuration(HeadConfiguration::Single);
        tape
    }

    /// Adopt a new sample rate: reallocate tape and recompute filters.
    pub fn configure(&mut self, sample_rate: f32) {
        let sample_rate = sample_rate.max(1.0);
        if sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        for channel in &mut self.channels {
            channel.configure(sample_rate);
        }
        self.update_emphasis();
        self.update_bump();
        self.update_rolloff();
        self.reset();
    }

    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
        self.wow.reset();
        self.flutter.reset();
        self.modulation = 1.0;
    }

    /// Reseed the noise, jitter and dropout generator.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    pub fn set_tape_mode(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Configure both speed oscillators. Rates are clamped to 0.1-5 Hz
    /// (wow) and 1-15 Hz (flutter), depths to `[0, 1]`.
    pub fn set_wow_flutter(
        &mut self,
        wow_rate: f32,
        wow_depth: f32,
        flutter_rate: f32,
        flutter_depth: f32,
        wow_waveform: Waveform,
        flutter_waveform: Waveform,
    ) {
        self.wow.set_rate(wow_rate.clamp(0.1, 5.0));
        self.wow.set_waveform(wow_waveform);
        self.wow_depth = wow_depth.clamp(0.0, 1.0);

        self.flutter.set_rate(flutter_rate.clamp(1.0, 15.0));
        self.flutter.set_waveform(flutter_waveform);
        self.flutter_depth = flutter_depth.clamp(0.0, 1.0);
    }

    pub fn set_saturation(&mut self, amount: f32) {
        self.saturation = amount.clamp(0.0, 1.0);
    }

    /// Head bump: a low-frequency resonance from the playback head gap.
    /// `gain` is linear.
    pub fn set_head_bump(&mut self, freq_hz: f32, gain: f32, q: f32) {
        self.bump_freq = freq_hz.clamp(30.0, 250.0);
        self.bump_gain = gain.clamp(0.25, 4.0);
        self.bump_q = q.clamp(0.1, 10.0);
        self.update_bump();
    }

    /// High-frequency loss of the tape and heads. At
    /// [`ROLLOFF_OPEN_HZ`] the lowpass is bypassed.
    pub fn set_rolloff(&mut self, freq_hz: f32, resonance: f32) {
        self.rolloff_freq = freq_hz.clamp(1000.0, 20_000.0);
        self.rolloff_q = resonance.clamp(0.1, 4.0);
        self.update_rolloff();
    }

    pub fn rolloff_resonance(&self) -> f32 {
        self.rolloff_q
    }

    pub fn set_aging(&mut self, amount: f32) {
        self.aging = amount.clamp(0.0, 1.0);
    }

    pub fn set_instability(&mut self, amount: f32) {
        self.instability = amount.clamp(0.0, 1.0);
    }

    pub fn set_head_configuration(&mut self, config: HeadConfiguration) {
        self.head_config = config;
        for channel in &mut self.channels {
            channel.apply_configuration(config);
        }
    }

    pub fn head_configuration(&self) -> HeadConfiguration {
        self.head_config
    }

    pub fn set_noise_parameters(&mut self, enabled: bool, amount: f32) {
        self.noise_enabled = enabled;
        self.noise_amount = amount.clamp(0.0, 1.0);
    }

    /// Mains frequency for the hum component (50 or 60 Hz regions).
    pub fn set_hum_frequency(&mut self, hz: f32) {
        self.hum_hz = hz.clamp(40.0, 70.0);
    }

    /// The tape speed factor of the current frame.
    pub fn modulation(&self) -> f32 {
        self.modulation
    }

    /// Process one sample of `channel` (0 = left, 1 = right).
    ///
    /// Identity while tape mode is off. Non-finite input yields silence.
    pub fn process(&mut self, input: f32, channel: usize) -> f32 {
        if !self.enabled {
            return input;
        }
        if !input.is_finite() {
            return 0.0;
        }
        let ch = channel.min(1);

        let emphasized = finite_or(self.channels[ch].pre_emphasis.process(input), input);

        if ch == 0 {
            self.modulation = self.next_modulation();
        }

        let saturated = finite_or(saturate(emphasized, self.saturation), input * 0.5);

        let speed = self.modulation * self.channels[ch].instability_speed;
        let config = self.head_config;
        let tape = &mut self.channels[ch];
        let delayed = finite_or(tape.heads(saturated, speed, config, ch), 0.0);

        let bumped = tape.bump.process(delayed);
        // Keeps running while bypassed.
        let rolled = tape.rolloff.process(bumped);
        let rolled = if self.rolloff_freq >= ROLLOFF_OPEN_HZ {
            bumped
        } else {
            rolled
        };
        let equalized = finite_or(tape.de_emphasis.process(rolled), delayed);

        let aged = finite_or(self.age(equalized, ch), equalized);
        let unstable = finite_or(self.destabilize(aged, ch), aged);

        let noisy = if self.noise_enabled {
            let (amount, hum, sr) = (self.noise_amount, self.hum_hz, self.sample_rate);
            unstable + self.channels[ch].noise.next(amount, hum, sr, &mut self.rng)
        } else {
            unstable
        };

        finite_or(soft_limit(self.decorrelate(noisy, ch)), input * 0.7)
    }

    /// Slight level movement that differs between the channels, following
    /// the wow and flutter phases.
    fn decorrelate(&self, x: f32, ch: usize) -> f32 {
        let offset = if ch == 0 { 0.0 } else { DECORRELATION_OFFSET };
        let phase = self.wow.phase() + 0.7 * self.flutter.phase() + offset;
        x * (1.0 + (phase * TAU * DECORRELATION_RATE).sin() * 0.02)
    }

    /// Advance wow and flutter by one frame and combine them into a speed
    /// factor in `[0.8, 1.2]`.
    fn next_modulation(&mut self) -> f32 {
        let wow = self.wow.tick(self.sample_rate, &mut self.rng);
        let flutter = self.flutter.tick(self.sample_rate, &mut self.rng);

        let (wd, fd) = (self.wow_depth, self.flutter_depth);
        if wd < 0.001 && fd < 0.001 {
            return 1.0;
        }

        let jitter = self.rng.gen_range(-0.05..=0.05) * (wd + fd);
        (1.0 + wow * wd + flutter * fd + jitter).clamp(0.8, 1.2)
    }

    /// Worn oxide: dulled highs, wobble, compression and the odd dropout.
    fn age(&mut self, x: f32, ch: usize) -> f32 {
        let a = self.aging;
        if a <= 0.001 {
            return x;
        }
        let a2 = a * a;

        let lowpass = &mut self.channels[ch].aging_lowpass;
        lowpass.set_smoothing((1.0 - a2 * 0.7).max(0.1));
        let dulled = lowpass.process(x);

        let wobble = 1.0 + (self.wow.phase() * 13.7).sin() * a * 0.1;
        let mut worn = (dulled * wobble * (1.0 + 0.5 * a)).tanh();
        if a > 0.3 && self.rng.gen::<f32>() < a * 0.0005 {
            worn *= 0.5;
        }

        let wet = 0.8 * a;
        x * (1.0 - wet) + worn * wet
    }

    /// Transport instability: slow level and speed drift plus dropouts.
    fn destabilize(&mut self, x: f32, ch: usize) -> f32 {
        let i = self.instability;
        let tape = &mut self.channels[ch];
        if i <= 0.001 {
            tape.instability_speed = 1.0;
            return x;
        }
        let s = i * i;

        let step = s * 0.005 + self.rng.gen_range(-0.0005..=0.0005);
        tape.instability_phase += step;
        tape.instability_phase -= tape.instability_phase.floor();
        let phase = tape.instability_phase;

        tape.instability_speed = 1.0 + (phase * 7.3 * PI).sin() * s * 0.01;

        let mut y = x * (1.0 + (phase * TAU).sin() * s * 0.05);
        if self.rng.gen::<f32>() < s * 0.0002 {
            y *= 0.7;
        }
        if i > 0.7 && self.rng.gen::<f32>() < i * 0.0001 {
            y *= 0.3;
        }
        y
    }

    fn update_emphasis(&mut self) {
        let f = EMPHASIS_HZ / self.sample_rate;
        for channel in &mut self.channels {
            channel
                .pre_emphasis
                .set_parameters(BiquadType::HighShelf, f, EMPHASIS_Q, EMPHASIS_GAIN);
            channel
                .de_emphasis
                .set_parameters(BiquadType::HighShelf, f, EMPHASIS_Q, 1.0 / EMPHASIS_GAIN);
        }
    }

    fn update_bump(&mut self) {
        let f = self.bump_freq / self.sample_rate;
        for channel in &mut self.channels {
            channel
                .bump
                .set_parameters(BiquadType::Peak, f, self.bump_q, self.bump_gain);
        }
    }

    fn update_rolloff(&mut self) {
        let f = self.rolloff_freq.min(self.sample_rate * 0.45) / self.sample_rate;
        for channel in &mut self.channels {
            channel
                .rolloff
                .set_parameters(BiquadType::Lowpass, f, self.rolloff_q, 1.0);
        }
    }
}

/// Tape saturation: a tanh curve blended in by `amount`.
#[inline]
fn saturate(x: f32, amount: f32) -> f32 {
    if amount < 0.001 {
        return x;
    }
    let drive = 1.0 + 5.0 * amount;
    x * (1.0 - amount) + (x * drive).tanh() * amount
}

#[inline]
fn soft_limit(x: f32) -> f32 {
    (0.8 * x).tanh() / 0.8
}

#[inline]
fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
