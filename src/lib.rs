//! # Loveless Drift: A Pitch-Shifting Tape Echo (AU/VST3/CLAP)
//!
//! A stereo pitch-shifting delay built with
//! [nih-plug](https://github.com/robbert-vdh/nih-plug). Outputs Audio Unit
//! (AUv2), VST3 and CLAP formats from a single codebase.
//!
//! ## Signal Flow
//!
//! ```text
//! Input ─► gain ─┬─► [Pitch Shifter] ──────────────────────── × (1 - mix) ──┐
//!                │   (phase vocoder,                                        │
//!                │    quantized to a scale)                                 │
//!                │          │                                               │
//!                │          ▼                                               │
//!                │   [Delay Line L/R] ◄─── cross-feedback ───┐              │
//!                │          │                                │              │
//!                │          ├────────────────────────────────┘              │
//!                │          ▼                                               │
//!                │   [Tape Machine] ──┬──────────────────────── × mix ─────(+)─► gain ─► soft clip ─► Output
//!                                     └─► gain ─► soft clip ─► Wet (aux output)
//! ```
//!
//! Each side has its own delay time, tempo sync, feedback and mix. The
//! stereo layout carries a second stereo output with the wet signal alone.
//!
//! All of the audio work lives in [`router::SignalRouter`]; this file maps
//! host parameters onto it and handles the plugin lifecycle.
//!
//! ## Modules
//!
//! - [`dsp`]: filters, delay line, tape machine and the pitch shifter.
//! - [`tuning`]: temperaments, Scala files and pitch quantization.
//! - [`router`]: the complete stereo signal path.
//! - [`error`]: error types.

pub mod dsp;
pub mod error;
mod params;
pub mod router;
pub mod tuning;

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;

use nih_plug::prelude::*;
use params::DriftParams;
use router::SignalRouter;
use tuning::{Scale, Temperament, TuningAuthority};

/// Tail length cap, in seconds.
const MAX_TAIL_SECONDS: f32 = 30.0;

/// The head bump resonance isn't exposed; this is the vintage machine's.
const HEAD_BUMP_Q: f32 = 1.2;

/// The plugin: parameters plus the audio-thread state.
///
/// Parameters are shared with the host through an `Arc` and can be read
/// from any thread. The router is owned exclusively by the audio thread.
pub struct LovelessDrift {
    params: Arc<DriftParams>,

    sample_rate: f32,

    router: SignalRouter,

    /// Prebuilt scales for every temperament, indexed by
    /// `Temperament::to_index`. The active temperament's slot is empty
    /// because its scale lives in the quantizer; switching swaps them so
    /// the audio thread never allocates.
    scale_bank: Vec<Scale>,

    /// The temperament currently installed, or `None` while a Scala file
    /// overrides the selector.
    active_temperament: Option<Temperament>,

    /// A Scala file that overrides the temperament selector, loaded in
    /// `initialize`.
    scale_file: Option<PathBuf>,
}

impl Default for LovelessDrift {
    fn default() -> Self {
        Self {
            params: Arc::new(DriftParams::default()),
            // Placeholder until the host reports the real rate.
            sample_rate: 44100.0,
            router: SignalRouter::new(44100.0),
            scale_bank: Vec::new(),
            active_temperament: None,
            scale_file: None,
        }
    }
}

impl LovelessDrift {
    /// A plugin instance that defers to `authority` when the "Follow
    /// Tuning Master" switch is on.
    pub fn with_tuning_authority(authority: Box<dyn TuningAuthority>) -> Self {
        let mut plugin = Self::default();
        plugin.router.quantizer_mut().set_tuning_authority(authority);
        plugin
    }

    /// Use the scale from a Scala `.scl` file instead of the temperament
    /// selector. If the file can't be loaded the selector stays in charge.
    pub fn with_scale_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.scale_file = Some(path.into());
        self
    }

    /// Install either the Scala file or the selected temperament.
    fn load_tuning(&mut self) {
        self.scale_bank = Temperament::ALL.iter().map(Temperament::scale).collect();
        self.active_temperament = None;

        if let Some(path) = &self.scale_file {
            if self.router.quantizer_mut().load_scale_file(path) {
                return;
            }
        }

        let temperament = self.params.tuning.temperament.value();
        self.swap_temperament(temperament);
    }

    /// Move `temperament`'s scale from the bank into the quantizer and the
    /// previously active one back into the bank.
    fn swap_temperament(&mut self, temperament: Temperament) {
        let Some(incoming) = self.scale_bank.get_mut(temperament.to_index()) else {
            return;
        };
        let incoming = std::mem::take(incoming);
        let outgoing = self.router.quantizer_mut().replace_scale(incoming);

        if let Some(previous) = self.active_temperament {
            if let Some(slot) = self.scale_bank.get_mut(previous.to_index()) {
                *slot = outgoing;
            }
        }
        self.active_temperament = Some(temperament);
    }

    /// Apply the controls that reconfigure components rather than feed the
    /// audio path. Called once per buffer.
    fn apply_block_parameters(&mut self) {
        let params = self.params.clone();
        let (pitch, tuning, tape) = (&params.pitch, &params.tuning, &params.tape);

        self.router.pitch_shifter_mut().set_pitch_mode(pitch.mode.value());

        self.router.set_quantize(tuning.quantize.value());
        self.router
            .quantizer_mut()
            .set_authority_enabled(tuning.use_authority.value());

        let temperament = tuning.temperament.value();
        if self
            .active_temperament
            .is_some_and(|active| active != temperament)
        {
            self.swap_temperament(temperament);
        }

        let t = self.router.tape_mut();
        t.set_tape_mode(tape.enabled.value());
        t.set_head_configuration(tape.heads.value());
        t.set_wow_flutter(
            tape.wow_rate.value(),
            tape.wow_depth.value(),
            tape.flutter_rate.value(),
            tape.flutter_depth.value(),
            tape.wow_waveform.value(),
            tape.flutter_waveform.value(),
        );
        t.set_saturation(tape.saturation.value());
        t.set_head_bump(tape.bump_freq.value(), tape.bump_gain.value(), HEAD_BUMP_Q);
        t.set_rolloff(tape.rolloff_freq.value(), tape.rolloff_resonance.value());
        t.set_aging(tape.aging.value());
        t.set_instability(tape.instability.value());
        t.set_noise_parameters(tape.noise.value(), tape.noise_amount.value());
        t.set_hum_frequency(tape.hum_freq.value());
    }

    /// Samples until the repeats have decayed to -60 dB.
    fn tail_samples(&self, delay_ms: f32, feedback: f32, cross_feedback: f32) -> u32 {
        let delay_samples = delay_ms * self.sample_rate / 1000.0;
        let loop_gain = (feedback + cross_feedback * 0.2).min(0.999);

        let repeats = if loop_gain > 0.001 {
            -3.0 / loop_gain.log10() // log10(0.001) = -3
        } else {
            1.0
        };
        let tail = repeats * delay_samples + self.router.latency_samples() as f32;
        tail.min(MAX_TAIL_SECONDS * self.sample_rate) as u32
    }
}

impl Plugin for LovelessDrift {
    const NAME: &'static str = "Loveless Drift";
    const VENDOR: &'static str = "Loveless Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "steve.loveless@gmail.com";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // Stereo first, with the wet-only output; mono feeds the same signal
    // to both sides of the router and keeps the left output.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[new_nonzero_u32(2)],
            names: PortNames {
                aux_outputs: &["Wet"],
                ..PortNames::const_default()
            },
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    const SAMPLE_ACCURATE_AUTOMATION: bool = true;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    /// Allocate everything for the host's sample rate, load the tuning
    /// and report the pitch shifter's latency.
    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        context: &mut impl InitContext<Self>,
    ) -> bool {
        self.sample_rate = buffer_config.sample_rate;
        self.router.configure(self.sample_rate);
        self.load_tuning();

        let latency = self.router.latency_samples() as u32;
        context.set_latency_samples(latency);

        nih_log!(
            "Initialized at {} Hz, {} samples latency, tuning '{}'",
            self.sample_rate,
            latency,
            self.router.quantizer().description()
        );
        true
    }

    /// Clear every buffer so stale echoes don't bleed into the next
    /// playback.
    fn reset(&mut self) {
        self.router.reset();
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        self.apply_block_parameters();

        let tempo = context.transport().tempo.unwrap_or(120.0) as f32;
        let params = self.params.clone();
        let sides = [&params.left, &params.right];
        let tempo_sync = sides.map(|side| side.tempo_sync.value());
        let subdivision = sides.map(|side| side.subdivision.value());

        let mut cross_feedback = params.main.cross_feedback.value();

        // Absent in the mono layout or when the host leaves it unconnected.
        let mut wet_port = aux.outputs.first_mut().map(|port| port.as_slice());

        for (n, mut channel_samples) in buffer.iter_samples().enumerate() {
            let main = &params.main;
            let pitch = &params.pitch;

            self.router.set_input_gain(main.input_gain.smoothed.next());
            self.router.set_output_gain(main.output_gain.smoothed.next());

            cross_feedback = main.cross_feedback.smoothed.next();
            self.router.set_cross_feedback(cross_feedback);

            for (ch, side) in sides.iter().enumerate() {
                self.router.set_mix(ch, side.mix.smoothed.next());
                self.router.set_feedback(ch, side.feedback.smoothed.next());

                let free_delay_ms = side.delay_time.smoothed.next();
                if tempo_sync[ch] {
                    self.router.set_tempo_synced_delay(ch, tempo, subdivision[ch]);
                } else {
                    self.router.set_delay_time(ch, free_delay_ms);
                }
            }

            self.router.set_pitch_cents(pitch.pitch_cents.smoothed.next());
            self.router.set_detune(
                pitch.detune_left.smoothed.next(),
                pitch.detune_right.smoothed.next(),
            );
            self.router.set_drift(pitch.drift.smoothed.next());
            self.router
                .pitch_shifter_mut()
                .set_character(pitch.character.smoothed.next());
            self.router
                .set_quantize_morph(params.tuning.morph.smoothed.next());

            // A mono buffer only has the left slot; duplicate it.
            let mut frame = [0.0_f32; 2];
            for (slot, sample) in frame.iter_mut().zip(channel_samples.iter_mut()) {
                *slot = *sample;
            }
            if channel_samples.len() < 2 {
                frame[1] = frame[0];
            }

            let (out_left, out_right) = self.router.process_frame(frame[0], frame[1]);

            for (sample, out) in channel_samples.iter_mut().zip([out_left, out_right]) {
                *sample = out;
            }

            if let Some(wet) = wet_port.as_deref_mut() {
                for (ch, channel) in wet.iter_mut().enumerate() {
                    if let Some(sample) = channel.get_mut(n) {
                        *sample = self.router.wet_send(ch);
                    }
                }
            }
        }

        let tail = (0..2)
            .map(|ch| {
                self.tail_samples(
                    self.router.delay_time_ms(ch),
                    self.router.feedback(ch),
                    cross_feedback,
                )
            })
            .max()
            .unwrap_or(0);
        ProcessStatus::Tail(tail)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Plugin format trait implementations
// ─────────────────────────────────────────────────────────────────────

impl ClapPlugin for LovelessDrift {
    const CLAP_ID: &'static str = "com.loveless-audio.loveless-drift-v1";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("A pitch-shifting stereo delay with tape machine and microtonal tuning");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Delay,
        ClapFeature::PitchShifter,
    ];
}

impl Vst3Plugin for LovelessDrift {
    const VST3_CLASS_ID: [u8; 16] = *b"LvlssDrift__v001";

    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] = &[
        Vst3SubCategory::Fx,
        Vst3SubCategory::Delay,
        Vst3SubCategory::PitchShift,
    ];
}

// ─────────────────────────────────────────────────────────────────────
// Export macros
// ─────────────────────────────────────────────────────────────────────
//
// nih_export_clap! exports the `clap_entry` symbol for CLAP hosts.
// nih_export_vst3! exports `GetPluginFactory` for VST3 hosts.
// clap_wrapper wraps the CLAP entry point as an AUv2 component so Logic
// Pro can load it.

nih_export_clap!(LovelessDrift);
nih_export_vst3!(LovelessDrift);

clap_wrapper::export_auv2!();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperament_swaps_keep_the_bank_intact() {
        let mut plugin = LovelessDrift::default();
        plugin.load_tuning();
        assert_eq!(plugin.active_temperament, Some(Temperament::Equal12));

        let sequence = [
            Temperament::Edo19,
            Temperament::Just,
            Temperament::Equal12,
            Temperament::Edo19,
        ];
        for temperament in sequence {
            plugin.swap_temperament(temperament);
            assert_eq!(plugin.router.quantizer().scale(), &temperament.scale());
        }

        for temperament in Temperament::ALL {
            if temperament != Temperament::Edo19 {
                assert_eq!(
                    plugin.scale_bank[temperament.to_index()],
                    temperament.scale(),
                    "{temperament:?}"
                );
            }
        }
    }

    #[test]
    fn test_scale_file_overrides_temperament() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fifths.scl");
        std::fs::write(&path, "Fifths\n2\n3/2\n2/1\n").unwrap();

        let mut plugin = LovelessDrift::default().with_scale_file(&path);
        plugin.load_tuning();
        assert_eq!(plugin.active_temperament, None);
        assert_eq!(plugin.router.quantizer().description(), "Fifths");

        let mut fallback = LovelessDrift::default().with_scale_file(dir.path().join("nope.scl"));
        fallback.load_tuning();
        assert_eq!(fallback.active_temperament, Some(Temperament::Equal12));
    }

    #[test]
    fn test_stereo_layout_has_wet_output() {
        let stereo = &LovelessDrift::AUDIO_IO_LAYOUTS[0];
        assert_eq!(stereo.aux_output_ports, &[new_nonzero_u32(2)]);
        assert_eq!(stereo.names.aux_outputs, &["Wet"]);

        let mono = &LovelessDrift::AUDIO_IO_LAYOUTS[1];
        assert!(mono.aux_output_ports.is_empty());
    }

    #[test]
    fn test_block_parameters_reach_the_tape() {
        let mut plugin = LovelessDrift::default();
        plugin.apply_block_parameters();

        let tape = &plugin.params.tape;
        let expected = tape.rolloff_resonance.value();
        assert_eq!(plugin.router.tape_mut().rolloff_resonance(), expected);
        assert_eq!(expected, 0.7);
    }

    #[test]
    fn test_each_side_has_its_own_controls() {
        let plugin = LovelessDrift::default();
        let ids: Vec<String> = plugin
            .params
            .param_map()
            .into_iter()
            .map(|(id, _, _)| id)
            .collect();
        for side in ["l", "r"] {
            for param in ["delay", "sync", "div", "fdbk", "mix"] {
                let id = format!("{side}_{param}");
                assert!(ids.contains(&id), "missing {id}");
            }
        }
        assert!(ids.iter().any(|id| id == "rolloffq"));
    }

    #[test]
    fn test_tail_covers_latency_and_repeats() {
        let plugin = LovelessDrift::default();
        let latency = plugin.router.latency_samples() as u32;
        assert_eq!(plugin.tail_samples(500.0, 0.0, 0.0), 22050 + latency);

        let long = plugin.tail_samples(500.0, 0.5, 0.0);
        assert!(long > 9 * 22050, "{long}");

        let capped = plugin.tail_samples(2000.0, 1.0, 1.0);
        assert_eq!(capped, (MAX_TAIL_SECONDS * 44100.0) as u32);
    }
}
