//! # Signal Router
//!
//! Wires the components into the full effect, one stereo frame at a time:
//!
//! ```text
//!            ┌──────────────────────────── × (1 - mix) ─────────────────┐
//!            │                                                          │
//! in ─► gain ┴► PitchShifter ─► DelayLine ─► TapeDelayProcessor ─ × mix ┴► × out gain ─► soft clip
//!                   ▲                ▲  │
//!      quantized    │    other side's│  │ tanh-limited tap, one frame late
//!      cents ───────┘    tap ────────┘  └──────────────► (cross-feedback)
//! ```
//!
//! Cross-feedback reads the *previous* frame's delayed tap of the opposite
//! channel, so the coupling is causal and independent of channel order.
//! Delay time, feedback and mix are set per channel.
//! The external tuning authority is polled every [`AUTHORITY_POLL_INTERVAL`]
//! frames, never per sample.

use nih_plug::prelude::Enum;

use crate::dsp::delay_line::{DelayLine, DEFAULT_MAX_DELAY_MS};
use crate::dsp::pitch_shifter::PitchShifter;
use crate::dsp::tape::TapeDelayProcessor;
use crate::tuning::TuningQuantizer;

/// Frames between two tuning authority polls.
pub const AUTHORITY_POLL_INTERVAL: u32 = 1024;

/// Scale applied to the cross-feedback amount before injection.
const CROSS_FEEDBACK_GAIN: f32 = 0.2;

/// Note values for tempo-synced delay times.
#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Subdivision {
    #[name = "1/1"]
    Whole,
    #[name = "1/2"]
    Half,
    #[default]
    #[name = "1/4"]
    Quarter,
    #[name = "1/8"]
    Eighth,
    #[name = "1/8T"]
    EighthTriplet,
    #[name = "1/16"]
    Sixteenth,
}

impl Subdivision {
    /// Length as a fraction of a whole note.
    pub fn fraction(&self) -> f32 {
        match self {
            Self::Whole => 1.0,
            Self::Half => 0.5,
            Self::Quarter => 0.25,
            Self::Eighth => 0.125,
            Self::EighthTriplet => 0.125 / 1.5,
            Self::Sixteenth => 0.0625,
        }
    }

    /// Duration in milliseconds at `bpm` quarter notes per minute,
    /// clamped to the delay line's range.
    pub fn delay_ms(&self, bpm: f32) -> f32 {
        let bpm = if bpm.is_finite() && bpm > 0.0 { bpm } else { 120.0 };
        let whole_note_ms = 60_000.0 / bpm * 4.0;
        (whole_note_ms * self.fraction()).clamp(1.0, DEFAULT_MAX_DELAY_MS)
    }
}

/// The complete stereo effect.
pub struct SignalRouter {
    sample_rate: f32,
    pitch_shifter: PitchShifter,
    delays: [DelayLine; 2],
    tape: TapeDelayProcessor,
    quantizer: TuningQuantizer,

    input_gain: f32,
    output_gain: f32,
    mix: [f32; 2],

    pitch_cents: f32,
    detune_cents: [f32; 2],
    drift_cents: f32,
    quantize: bool,
    quantize_morph: f32,
    channel_cents: [f32; 2],

    cross_feedback: f32,
    /// Limited delayed taps from the previous frame.
    cross_state: [f32; 2],
    wet: [f32; 2],

    frames_until_poll: u32,
}

impl SignalRouter {
    pub fn new(sample_rate: f32) -> Self {
        let mut delays = [DelayLine::new(sample_rate), DelayLine::new(sample_rate)];
        for delay in &mut delays {
            // The router does its own dry/wet mixing.
            delay.set_dry_wet(1.0);
            delay.set_delay_time(500.0);
            delay.set_feedback(0.4);
        }

        Self {
            sample_rate: sample_rate.max(1.0),
            pitch_shifter: PitchShifter::new(sample_rate),
            delays,
            tape: TapeDelayProcessor::new(sample_rate),
            quantizer: TuningQuantizer::new(),
            input_gain: 1.0,
            output_gain: 1.0,
            mix: [0.5; 2],
            pitch_cents: 0.0,
            detune_cents: [0.0; 2],
            drift_cents: 0.0,
            quantize: false,
            quantize_morph: 1.0,
            channel_cents: [0.0; 2],
            cross_feedback: 0.0,
            cross_state: [0.0; 2],
            wet: [0.0; 2],
            frames_until_poll: AUTHORITY_POLL_INTERVAL,
        }
    }

    /// Propagate a sample rate to every component. Idempotent.
    ///
    /// A new rate clears the buffers, and with them the cross-feedback
    /// state and last wet frame.
    pub fn configure(&mut self, sample_rate: f32) {
        let sample_rate = sample_rate.max(1.0);
        self.pitch_shifter.configure(sample_rate);
        for delay in &mut self.delays {
            delay.configure(sample_rate);
        }
        self.tape.configure(sample_rate);

        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.cross_state = [0.0; 2];
            self.wet = [0.0; 2];
        }
    }

    pub fn reset(&mut self) {
        self.pitch_shifter.reset();
        for delay in &mut self.delays {
            delay.reset();
        }
        self.tape.reset();
        self.cross_state = [0.0; 2];
        self.wet = [0.0; 2];
        self.frames_until_poll = AUTHORITY_POLL_INTERVAL;
    }

    pub fn latency_samples(&self) -> usize {
        self.pitch_shifter.latency_samples()
    }

    pub fn pitch_shifter_mut(&mut self) -> &mut PitchShifter {
        &mut self.pitch_shifter
    }

    pub fn tape_mut(&mut self) -> &mut TapeDelayProcessor {
        &mut self.tape
    }

    pub fn quantizer(&self) -> &TuningQuantizer {
        &self.quantizer
    }

    pub fn quantizer_mut(&mut self) -> &mut TuningQuantizer {
        &mut self.quantizer
    }

    /// `[0, 2]`, linear.
    pub fn set_input_gain(&mut self, gain: f32) {
        self.input_gain = gain.clamp(0.0, 2.0);
    }

    /// `[0, 2]`, linear.
    pub fn set_output_gain(&mut self, gain: f32) {
        self.output_gain = gain.clamp(0.0, 2.0);
    }

    /// Balance between a channel's pitched dry signal and its delayed wet
    /// signal. Out-of-range channels are ignored.
    pub fn set_mix(&mut self, channel: usize, mix: f32) {
        if let Some(slot) = self.mix.get_mut(channel) {
            *slot = mix.clamp(0.0, 1.0);
        }
    }

    /// Base pitch shift, `[-1200, 1200]` cents.
    pub fn set_pitch_cents(&mut self, cents: f32) {
        self.pitch_cents = cents.clamp(-1200.0, 1200.0);
    }

    /// Per-channel detune, `[-50, 50]` cents each.
    pub fn set_detune(&mut self, left_cents: f32, right_cents: f32) {
        self.detune_cents = [left_cents.clamp(-50.0, 50.0), right_cents.clamp(-50.0, 50.0)];
    }

    /// Stereo detune drift, `[0, 25]` cents. Spreads the channels apart
    /// and drives the pitch shifter's slow detune LFO.
    pub fn set_drift(&mut self, cents: f32) {
        self.drift_cents = cents.clamp(0.0, 25.0);
        self.pitch_shifter
            .set_detune_drift(self.drift_cents * 0.01, 0.1 + self.drift_cents * 0.01);
    }

    pub fn set_quantize(&mut self, enabled: bool) {
        self.quantize = enabled;
    }

    /// How far the base pitch is pulled onto the scale, `[0, 1]`.
    pub fn set_quantize_morph(&mut self, amount: f32) {
        self.quantize_morph = amount.clamp(0.0, 1.0);
    }

    /// `[0, 1]`.
    pub fn set_cross_feedback(&mut self, amount: f32) {
        self.cross_feedback = amount.clamp(0.0, 1.0);
    }

    pub fn set_delay_time(&mut self, channel: usize, ms: f32) {
        if let Some(delay) = self.delays.get_mut(channel) {
            delay.set_delay_time(ms);
        }
    }

    /// Set a channel's delay to a note value at the given tempo.
    pub fn set_tempo_synced_delay(&mut self, channel: usize, bpm: f32, subdivision: Subdivision) {
        self.set_delay_time(channel, subdivision.delay_ms(bpm));
    }

    pub fn delay_time_ms(&self, channel: usize) -> f32 {
        self.delays.get(channel).map_or(0.0, DelayLine::delay_time_ms)
    }

    pub fn set_feedback(&mut self, channel: usize, feedback: f32) {
        if let Some(delay) = self.delays.get_mut(channel) {
            delay.set_feedback(feedback);
        }
    }

    pub fn feedback(&self, channel: usize) -> f32 {
        self.delays.get(channel).map_or(0.0, DelayLine::feedback)
    }

    /// Pitch offset (cents) each channel was shifted by in the last frame.
    pub fn channel_pitch_cents(&self, channel: usize) -> f32 {
        self.channel_cents.get(channel).copied().unwrap_or(0.0)
    }

    /// The tape output of the last frame, before dry/wet mixing.
    pub fn wet_output(&self, channel: usize) -> f32 {
        self.wet.get(channel).copied().unwrap_or(0.0)
    }

    /// The last frame's wet signal as a separate output: output gain
    /// applied and soft clipped like the main output, without the dry part.
    pub fn wet_send(&self, channel: usize) -> f32 {
        soft_clip(self.wet_output(channel) * self.output_gain)
    }

    /// Process one stereo frame.
    pub fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        self.frames_until_poll -= 1;
        if self.frames_until_poll == 0 {
            self.frames_until_poll = AUTHORITY_POLL_INTERVAL;
            self.quantizer.poll_authority();
        }

        self.update_pitch();

        let inputs = [sanitize(left) * self.input_gain, sanitize(right) * self.input_gain];
        let cross_amount = self.cross_feedback * CROSS_FEEDBACK_GAIN;

        let mut pitched = [0.0; 2];
        let mut delayed = [0.0; 2];
        for ch in 0..2 {
            pitched[ch] = sanitize(self.pitch_shifter.process(inputs[ch], ch));

            let external = self.cross_state[1 - ch] * cross_amount;
            let tap = self.delays[ch].process(pitched[ch], external);
            delayed[ch] = if tap.is_finite() {
                tap
            } else {
                self.delays[ch].reset();
                0.0
            };
        }

        // Update after both channels have read last frame's state.
        for ch in 0..2 {
            self.cross_state[ch] = (delayed[ch] * 0.8).tanh() / 0.8;
        }

        let mut out = [0.0; 2];
        for ch in 0..2 {
            self.wet[ch] = self.tape.process(delayed[ch], ch);
            let mix = self.mix[ch];
            let mixed = (pitched[ch] * (1.0 - mix) + self.wet[ch] * mix) * self.output_gain;
            out[ch] = soft_clip(mixed);
        }

        (out[0], out[1])
    }

    /// Resolve per-channel cents and hand them to the pitch shifter.
    fn update_pitch(&mut self) {
        let mut base = self.pitch_cents;
        if self.quantize {
            let raw = f64::from(base);
            let quantized = self.quantizer.quantize(raw);
            base = TuningQuantizer::morph(raw, quantized, f64::from(self.quantize_morph)) as f32;
        }

        self.channel_cents = [
            base + self.detune_cents[0] + self.drift_cents,
            base + self.detune_cents[1] - self.drift_cents * 0.5,
        ];
        for (ch, &cents) in self.channel_cents.iter().enumerate() {
            self.pitch_shifter.set_channel_pitch_cents(ch, cents);
        }
    }
}

#[inline]
fn soft_clip(x: f32) -> f32 {
    (0.7 * x).tanh() / 0.7
}

#[inline]
fn sanitize(x: f32) -> f32 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}
