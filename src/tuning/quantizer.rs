//! # Pitch Quantizer
//!
//! Snaps a pitch offset in cents to the nearest degree of the active
//! scale, in any octave:
//!
//! ```text
//! remainder = ((cents mod 1200) + 1200) mod 1200     // always in [0, 1200)
//! octave    = (cents - remainder) / 1200
//! result    = octave * 1200 + nearest(remainder, {0} ∪ degrees)
//! ```
//!
//! Because the scale is closed by 1200, a remainder just below the octave
//! can snap *up* into the next octave. Quantizing a quantized value
//! returns it unchanged, and shifting the input by an octave shifts the
//! output by exactly an octave.
//!
//! When an external [`TuningAuthority`] is enabled and connected it takes
//! over: the offset is read as a MIDI note around middle C and corrected
//! by the authority's retuning for that note.

use std::path::Path;

use nih_plug::{nih_log, nih_warn};

use super::authority::{NoTuningAuthority, TuningAuthority};
use super::scala::{self, Scale};
use super::temperament::Temperament;
use crate::error::Result;

/// The MIDI note that a pitch offset of 0 cents is anchored to.
const AUTHORITY_REFERENCE_NOTE: f64 = 60.0;

pub struct TuningQuantizer {
    scale: Scale,
    authority: Box<dyn TuningAuthority>,
    authority_enabled: bool,
    /// Connection state as of the last poll.
    authority_connected: bool,
}

impl Default for TuningQuantizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TuningQuantizer {
    /// A quantizer using 12-TET and no tuning authority.
    pub fn new() -> Self {
        Self {
            scale: Temperament::Equal12.scale(),
            authority: Box::new(NoTuningAuthority),
            authority_enabled: false,
            authority_connected: false,
        }
    }

    /// Load a Scala file, keeping the current scale if anything goes wrong.
    ///
    /// Returns whether the new scale was installed. Failures are logged.
    pub fn load_scale_file(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match self.try_load_scale_file(path) {
            Ok(()) => {
                nih_log!(
                    "Loaded scale '{}' ({} notes) from {}",
                    self.scale.description(),
                    self.scale.degrees().len(),
                    path.display()
                );
                true
            }
            Err(err) => {
                nih_warn!("Failed to load scale from {}: {err}", path.display());
                false
            }
        }
    }

    /// Like [`load_scale_file`](Self::load_scale_file) but reports the
    /// parse error.
    pub fn try_load_scale_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let scale = scala::load_file(path)?;
        self.set_scale(scale);
        Ok(())
    }

    /// Replace the active scale wholesale.
    pub fn set_scale(&mut self, scale: Scale) {
        self.scale = scale;
    }

    /// Install `scale` and hand back the previous one. Allocation free, so
    /// it is safe to call on the audio thread.
    pub fn replace_scale(&mut self, scale: Scale) -> Scale {
        std::mem::replace(&mut self.scale, scale)
    }

    pub fn set_temperament(&mut self, temperament: Temperament) {
        self.scale = temperament.scale();
    }

    /// Back to 12-TET.
    pub fn set_default_scale(&mut self) {
        self.set_temperament(Temperament::Equal12);
    }

    pub fn scale(&self) -> &Scale {
        &self.scale
    }

    /// Description of the active tuning: the authority's scale name while
    /// it is in control, the scale file's description otherwise.
    pub fn description(&self) -> String {
        if self.authority_active() {
            self.authority.scale_name()
        } else {
            self.scale.description().to_string()
        }
    }

    /// Install an external tuning authority. Its connection state is
    /// sampled immediately and then on every [`poll_authority`](Self::poll_authority).
    pub fn set_tuning_authority(&mut self, authority: Box<dyn TuningAuthority>) {
        self.authority = authority;
        self.authority_connected = self.authority.is_connected();
    }

    pub fn set_authority_enabled(&mut self, enabled: bool) {
        self.authority_enabled = enabled;
    }

    /// Refresh the cached connection state. Returns `true` if it changed.
    ///
    /// Meant to be called at a low control rate, never per sample.
    pub fn poll_authority(&mut self) -> bool {
        let connected = self.authority.is_connected();
        let changed = connected != self.authority_connected;
        self.authority_connected = connected;
        changed
    }

    /// Whether quantization is currently delegated to the authority.
    pub fn authority_active(&self) -> bool {
        self.authority_enabled && self.authority_connected
    }

    /// Quantize a pitch offset in cents.
    pub fn quantize(&self, cents: f64) -> f64 {
        if self.authority_active() {
            let note = AUTHORITY_REFERENCE_NOTE + cents / 100.0;
            return cents + self.authority.retuning_in_semitones(note) * 100.0;
        }

        let remainder = cents.rem_euclid(1200.0);
        let octave = ((cents - remainder) / 1200.0).round();

        let mut nearest = 0.0;
        let mut nearest_distance = remainder;
        for &degree in self.scale.degrees() {
            let distance = (remainder - degree).abs();
            if distance < nearest_distance {
                nearest = degree;
                nearest_distance = distance;
            }
        }

        octave * 1200.0 + nearest
    }

    /// Crossfade between a raw and a quantized pitch. `amount` 0 keeps the
    /// raw pitch, 1 snaps fully.
    pub fn morph(raw: f64, quantized: f64, amount: f64) -> f64 {
        let amount = amount.clamp(0.0, 1.0);
        raw * (1.0 - amount) + quantized * amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// An authority that retunes everything by a fixed amount and can be
    /// unplugged from the test.
    struct FixedAuthority {
        connected: Arc<AtomicBool>,
        semitones: f64,
    }

    impl TuningAuthority for FixedAuthority {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::Relaxed)
        }

        fn retuning_in_semitones(&self, _midi_note: f64) -> f64 {
            self.semitones
        }

        fn scale_name(&self) -> String {
            "Session Tuning".to_string()
        }
    }

    #[test]
    fn test_default_is_12_tet() {
        let q = TuningQuantizer::new();
        assert_eq!(q.description(), "12-Tone Equal Temperament");
        assert_abs_diff_eq!(q.quantize(0.0), 0.0);
        assert_abs_diff_eq!(q.quantize(149.0), 100.0);
        assert_abs_diff_eq!(q.quantize(151.0), 200.0);
        assert_abs_diff_eq!(q.quantize(-149.0), -100.0);
        assert_abs_diff_eq!(q.quantize(1190.0), 1200.0);
        assert_abs_diff_eq!(q.quantize(-1190.0), -1200.0);
        assert_abs_diff_eq!(q.quantize(-10.0), 0.0);
    }

    #[test]
    fn test_quantize_to_just_intonation() {
        let mut q = TuningQuantizer::new();
        q.set_temperament(Temperament::Just);
        assert_abs_diff_eq!(q.quantize(700.0), 701.955, epsilon = 1e-3);
        assert_abs_diff_eq!(q.quantize(-500.0), -498.045, epsilon = 1e-3);
    }

    #[test]
    fn test_malformed_file_keeps_previous_scale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.scl");
        std::fs::write(&path, "A broken scale\n5\n100.0\nnot-a-pitch\n").unwrap();

        let mut q = TuningQuantizer::new();
        q.set_temperament(Temperament::Pythagorean);
        let before = q.scale().clone();

        assert!(!q.load_scale_file(&path));
        assert_eq!(q.description(), "Pythagorean Tuning");
        assert_eq!(q.scale(), &before);

        assert!(!q.load_scale_file(dir.path().join("missing.scl")));
        assert_eq!(q.scale(), &before);
    }

    #[test]
    fn test_loaded_file_replaces_scale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tritone.scl");
        std::fs::write(&path, "! tritone\nTritone only\n2\n600.0\n2/1\n").unwrap();

        let mut q = TuningQuantizer::new();
        assert!(q.load_scale_file(&path));
        assert_eq!(q.description(), "Tritone only");
        assert_abs_diff_eq!(q.quantize(250.0), 0.0);
        assert_abs_diff_eq!(q.quantize(350.0), 600.0);

        q.set_default_scale();
        assert_eq!(q.description(), "12-Tone Equal Temperament");
    }

    #[test]
    fn test_replace_scale_returns_previous() {
        let mut q = TuningQuantizer::new();
        let old = q.replace_scale(Temperament::Equal24.scale());
        assert_eq!(old, Temperament::Equal12.scale());
        assert_abs_diff_eq!(q.quantize(149.0), 150.0);
    }

    #[test]
    fn test_morph() {
        assert_abs_diff_eq!(TuningQuantizer::morph(130.0, 100.0, 0.0), 130.0);
        assert_abs_diff_eq!(TuningQuantizer::morph(130.0, 100.0, 1.0), 100.0);
        assert_abs_diff_eq!(TuningQuantizer::morph(130.0, 100.0, 0.5), 115.0);
        assert_abs_diff_eq!(TuningQuantizer::morph(130.0, 100.0, 7.0), 100.0);
    }

    #[test]
    fn test_authority_takes_over_only_when_enabled_and_connected() {
        let connected = Arc::new(AtomicBool::new(false));
        let mut q = TuningQuantizer::new();
        q.set_tuning_authority(Box::new(FixedAuthority {
            connected: connected.clone(),
            semitones: 0.25,
        }));

        // Disconnected: scale quantization.
        q.set_authority_enabled(true);
        assert!(!q.authority_active());
        assert_abs_diff_eq!(q.quantize(130.0), 100.0);

        // Connection is only noticed at poll time.
        connected.store(true, Ordering::Relaxed);
        assert!(!q.authority_active());
        assert!(q.poll_authority());
        assert!(!q.poll_authority());
        assert!(q.authority_active());
        assert_abs_diff_eq!(q.quantize(130.0), 155.0, epsilon = 1e-9);
        assert_eq!(q.description(), "Session Tuning");

        // Disabled: back to the scale even while connected.
        q.set_authority_enabled(false);
        assert_abs_diff_eq!(q.quantize(130.0), 100.0);
    }

    proptest! {
        #[test]
        fn quantize_is_idempotent(cents in -4800.0f64..4800.0, index in 0usize..11) {
            let mut q = TuningQuantizer::new();
            q.set_temperament(Temperament::ALL[index]);
            let once = q.quantize(cents);
            let twice = q.quantize(once);
            prop_assert!((once - twice).abs() < 1e-6, "{cents}: {once} vs {twice}");
        }

        #[test]
        fn quantize_is_octave_symmetric(cents in -4800.0f64..4800.0, index in 0usize..11) {
            let mut q = TuningQuantizer::new();
            q.set_temperament(Temperament::ALL[index]);
            let base = q.quantize(cents);
            let up = q.quantize(cents + 1200.0);
            prop_assert!((up - (base + 1200.0)).abs() < 1e-6, "{cents}: {base} vs {up}");
        }

        #[test]
        fn quantize_stays_within_half_the_largest_step(cents in -2400.0f64..2400.0) {
            let q = TuningQuantizer::new();
            prop_assert!((q.quantize(cents) - cents).abs() <= 50.0 + 1e-9);
        }
    }
}
