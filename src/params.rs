//! # Plugin Parameters
//!
//! Parameters are the knobs and switches the user sees in the DAW. Each
//! parameter has:
//!
//! - A **unique string ID** (`#[id = "..."]`) that the host uses to
//!   save and recall presets. Once published, never change these IDs
//!   or existing presets will break.
//! - A **human-readable name** shown in the DAW's UI.
//! - A **range** (min, max, and optional skew) and a **default value**.
//! - Optional **smoothing** to prevent audible clicks when values change.
//!
//! Continuous controls that feed the audio path directly (gains, mix,
//! pitch, delay time) are smoothed. Controls that only reconfigure a
//! component (filter corners, waveforms, head layout) are read once per
//! buffer and left unsmoothed.
//!
//! The parameters are grouped with `#[nested(group = "...")]` the way a
//! hardware panel would be: the main section, one delay section per side,
//! pitch, tuning and tape. The two delay sections share one struct and get
//! distinct IDs through `id_prefix`.

use nih_plug::prelude::*;

use crate::dsp::character::PitchMode;
use crate::dsp::lfo::Waveform;
use crate::dsp::tape::HeadConfiguration;
use crate::router::Subdivision;
use crate::tuning::Temperament;

/// Every parameter of the Loveless Drift plugin.
#[derive(Params)]
pub struct DriftParams {
    /// Gains and cross-feedback.
    #[nested(group = "Main")]
    pub main: MainParams,

    #[nested(id_prefix = "l", group = "Left Delay")]
    pub left: DelayChannelParams,

    #[nested(id_prefix = "r", group = "Right Delay")]
    pub right: DelayChannelParams,

    #[nested(group = "Pitch")]
    pub pitch: PitchParams,

    #[nested(group = "Tuning")]
    pub tuning: TuningParams,

    #[nested(group = "Tape")]
    pub tape: TapeParams,
}

#[derive(Params)]
pub struct MainParams {
    /// **Input**: linear gain before the pitch shifter, 0-200%.
    #[id = "in"]
    pub input_gain: FloatParam,

    /// **Output**: linear gain after the dry/wet mix, 0-200%.
    #[id = "out"]
    pub output_gain: FloatParam,

    /// **Cross Feedback**: how much of each side's repeats is sent into the
    /// other side's delay line. Ping-pong at high settings.
    #[id = "xfdbk"]
    pub cross_feedback: FloatParam,
}

/// One side's delay line.
#[derive(Params)]
pub struct DelayChannelParams {
    /// **Delay Time**: used while tempo sync is off.
    ///
    /// Skewed toward the low end: 10→50 ms is a bigger perceptual step
    /// than 1900→2000 ms.
    #[id = "delay"]
    pub delay_time: FloatParam,

    /// **Sync**: derive the delay time from the host tempo.
    #[id = "sync"]
    pub tempo_sync: BoolParam,

    /// **Division**: note value of the synced delay.
    #[id = "div"]
    pub subdivision: EnumParam<Subdivision>,

    /// **Feedback**: how much of each repeat is fed back, up to 100%.
    #[id = "fdbk"]
    pub feedback: FloatParam,

    /// **Mix**: pitched dry signal versus delayed wet signal.
    #[id = "mix"]
    pub mix: FloatParam,
}

#[derive(Params)]
pub struct PitchParams {
    /// **Pitch**: shift of the whole wet path in cents, ±1 octave.
    #[id = "pitch"]
    pub pitch_cents: FloatParam,

    #[id = "dtl"]
    pub detune_left: FloatParam,

    #[id = "dtr"]
    pub detune_right: FloatParam,

    /// **Drift**: spreads left and right apart and lets both wander
    /// slowly around their target pitch.
    #[id = "drift"]
    pub drift: FloatParam,

    /// **Mode**: which vintage pitch shifter to imitate.
    #[id = "mode"]
    pub mode: EnumParam<PitchMode>,

    /// **Character**: how strongly the mode colors the sound.
    #[id = "char"]
    pub character: FloatParam,
}

#[derive(Params)]
pub struct TuningParams {
    /// **Quantize**: snap the pitch to the active scale.
    #[id = "quant"]
    pub quantize: BoolParam,

    /// **Morph**: 0% keeps the raw pitch, 100% snaps fully.
    #[id = "morph"]
    pub morph: FloatParam,

    #[id = "temper"]
    pub temperament: EnumParam<Temperament>,

    /// **Follow Tuning Master**: defer to a connected tuning authority.
    #[id = "mts"]
    pub use_authority: BoolParam,
}

#[derive(Params)]
pub struct TapeParams {
    /// **Tape**: engage the tape machine on the wet path.
    #[id = "tape"]
    pub enabled: BoolParam,

    #[id = "heads"]
    pub heads: EnumParam<HeadConfiguration>,

    #[id = "wowrt"]
    pub wow_rate: FloatParam,

    #[id = "wowdp"]
    pub wow_depth: FloatParam,

    #[id = "wowwf"]
    pub wow_waveform: EnumParam<Waveform>,

    #[id = "flrt"]
    pub flutter_rate: FloatParam,

    #[id = "fldp"]
    pub flutter_depth: FloatParam,

    #[id = "flwf"]
    pub flutter_waveform: EnumParam<Waveform>,

    #[id = "sat"]
    pub saturation: FloatParam,

    /// **Head Bump**: frequency of the low-end resonance.
    #[id = "bumpf"]
    pub bump_freq: FloatParam,

    /// **Bump Gain**: linear gain of the resonance.
    #[id = "bumpg"]
    pub bump_gain: FloatParam,

    /// **Rolloff**: corner of the high-frequency loss. At 20 kHz the
    /// rolloff is out of the path.
    #[id = "rolloff"]
    pub rolloff_freq: FloatParam,

    #[id = "rolloffq"]
    pub rolloff_resonance: FloatParam,

    #[id = "age"]
    pub aging: FloatParam,

    #[id = "instab"]
    pub instability: FloatParam,

    #[id = "noise"]
    pub noise: BoolParam,

    #[id = "noiseamt"]
    pub noise_amount: FloatParam,

    /// **Hum**: 50 Hz or 60 Hz mains regions, or anything in between.
    #[id = "hum"]
    pub hum_freq: FloatParam,
}

impl Default for DriftParams {
    fn default() -> Self {
        Self {
            main: MainParams::default(),
            left: DelayChannelParams::new("Left"),
            right: DelayChannelParams::new("Right"),
            pitch: PitchParams::default(),
            tuning: TuningParams::default(),
            tape: TapeParams::default(),
        }
    }
}

/// A `[0, max]` control displayed as a percentage.
fn percentage(name: &str, default: f32, max: f32, smoothing_ms: f32) -> FloatParam {
    FloatParam::new(name, default, FloatRange::Linear { min: 0.0, max })
        .with_unit("%")
        .with_smoother(SmoothingStyle::Linear(smoothing_ms))
        .with_value_to_string(formatters::v2s_f32_percentage(1))
        .with_string_to_value(formatters::s2v_f32_percentage())
}

impl Default for MainParams {
    fn default() -> Self {
        Self {
            input_gain: percentage("Input", 1.0, 2.0, 20.0),
            output_gain: percentage("Output", 1.0, 2.0, 20.0),
            cross_feedback: percentage("Cross Feedback", 0.0, 1.0, 20.0),
        }
    }
}

impl DelayChannelParams {
    /// `side` prefixes every display name ("Left Delay Time").
    fn new(side: &str) -> Self {
        Self {
            delay_time: FloatParam::new(
                format!("{side} Delay Time"),
                500.0,
                FloatRange::Skewed {
                    min: 1.0,
                    max: 2000.0,
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_unit(" ms")
            // The read head moves gradually instead of jumping, which
            // gives the classic pitch-bending sweep.
            .with_smoother(SmoothingStyle::Linear(50.0))
            .with_step_size(0.1),

            tempo_sync: BoolParam::new(format!("{side} Sync"), false),
            subdivision: EnumParam::new(format!("{side} Division"), Subdivision::Quarter),

            feedback: percentage(&format!("{side} Feedback"), 0.4, 1.0, 20.0),
            mix: percentage(&format!("{side} Mix"), 0.5, 1.0, 20.0),
        }
    }
}

impl Default for PitchParams {
    fn default() -> Self {
        let detune = |name: &str| {
            FloatParam::new(
                name,
                0.0,
                FloatRange::Linear {
                    min: -50.0,
                    max: 50.0,
                },
            )
            .with_unit(" ct")
            .with_smoother(SmoothingStyle::Linear(30.0))
            .with_step_size(0.1)
        };

        Self {
            pitch_cents: FloatParam::new(
                "Pitch",
                0.0,
                FloatRange::Linear {
                    min: -1200.0,
                    max: 1200.0,
                },
            )
            .with_unit(" ct")
            .with_smoother(SmoothingStyle::Linear(30.0))
            .with_step_size(1.0),

            detune_left: detune("Detune L"),
            detune_right: detune("Detune R"),

            drift: FloatParam::new("Drift", 0.0, FloatRange::Linear { min: 0.0, max: 25.0 })
                .with_unit(" ct")
                .with_smoother(SmoothingStyle::Linear(50.0))
                .with_step_size(0.1),

            mode: EnumParam::new("Mode", PitchMode::Hybrid),
            character: percentage("Character", 0.5, 1.0, 20.0),
        }
    }
}

impl Default for TuningParams {
    fn default() -> Self {
        Self {
            quantize: BoolParam::new("Quantize", false),
            morph: percentage("Morph", 1.0, 1.0, 30.0),
            temperament: EnumParam::new("Temperament", Temperament::Equal12),
            use_authority: BoolParam::new("Follow Tuning Master", false),
        }
    }
}

impl Default for TapeParams {
    fn default() -> Self {
        let rate = |name: &str, default: f32, min: f32, max: f32| {
            FloatParam::new(
                name,
                default,
                FloatRange::Skewed {
                    min,
                    max,
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_unit(" Hz")
            .with_step_size(0.01)
        };
        let amount = |name: &str, default: f32| {
            FloatParam::new(name, default, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_unit("%")
                .with_value_to_string(formatters::v2s_f32_percentage(1))
                .with_string_to_value(formatters::s2v_f32_percentage())
        };

        Self {
            enabled: BoolParam::new("Tape", false),
            heads: EnumParam::new("Heads", HeadConfiguration::Single),

            wow_rate: rate("Wow Rate", 0.3, 0.1, 5.0),
            wow_depth: amount("Wow Depth", 0.1),
            wow_waveform: EnumParam::new("Wow Shape", Waveform::Sine),
            flutter_rate: rate("Flutter Rate", 2.7, 1.0, 15.0),
            flutter_depth: amount("Flutter Depth", 0.05),
            flutter_waveform: EnumParam::new("Flutter Shape", Waveform::Sine),

            saturation: amount("Saturation", 0.5),

            bump_freq: rate("Head Bump", 90.0, 30.0, 250.0).with_step_size(1.0),
            bump_gain: FloatParam::new(
                "Bump Gain",
                1.5,
                FloatRange::Skewed {
                    min: 0.25,
                    max: 4.0,
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_value_to_string(formatters::v2s_f32_gain_to_db(1))
            .with_string_to_value(formatters::s2v_f32_gain_to_db()),
            rolloff_freq: FloatParam::new(
                "Rolloff",
                10_000.0,
                FloatRange::Skewed {
                    min: 1000.0,
                    max: 20_000.0,
                    // Frequency perception is roughly logarithmic.
                    factor: FloatRange::skew_factor(-2.0),
                },
            )
            .with_unit(" Hz")
            .with_step_size(1.0),
            rolloff_resonance: FloatParam::new(
                "Rolloff Resonance",
                0.7,
                FloatRange::Linear { min: 0.1, max: 4.0 },
            )
            .with_step_size(0.01),

            aging: amount("Aging", 0.0),
            instability: amount("Instability", 0.0),

            noise: BoolParam::new("Noise", false),
            noise_amount: amount("Noise Amount", 0.01),
            hum_freq: FloatParam::new("Hum", 60.0, FloatRange::Linear { min: 40.0, max: 70.0 })
                .with_unit(" Hz")
                .with_step_size(1.0),
        }
    }
}
