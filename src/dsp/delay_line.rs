//! # Feedback Delay Line
//!
//! A delay line stores audio samples and plays them back after a given
//! time. This one is a complete feedback echo: it owns its ring buffer,
//! the delay time, the feedback amount and the dry/wet balance, and it
//! accepts an *external* feedback signal so two channels can be
//! cross-coupled by the router.
//!
//! ## How a Ring Buffer Works
//!
//! A `Vec<f32>` acts as a circular tape loop and an integer index as the
//! write head. For every sample we:
//!
//! 1. Read the delayed sample from `write_pos - delay_samples`, wrapping
//!    around the end of the buffer.
//! 2. Write `input + feedback * delayed + external` at `write_pos`.
//! 3. Advance `write_pos` by one, wrapping back to 0.
//!
//! ## Linear Interpolation
//!
//! Delay times rarely land on whole samples (100 ms at 44.1 kHz is 4410
//! samples, but 100.01 ms is 4410.441), so reads blend two neighbors:
//!
//! ```text
//! result = sample_a * (1 - frac) + sample_b * frac
//! ```
//!
//! The read offset is never below one sample, so the interpolation never
//! touches the slot that is about to be written.

/// Longest delay the line allocates for, in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: f32 = 2000.0;

/// Default delay time in milliseconds.
pub const DEFAULT_DELAY_MS: f32 = 100.0;

/// Feedback may exceed unity slightly, for self-oscillating repeats.
pub const MAX_FEEDBACK: f32 = 1.1;

/// An interpolating feedback delay line with dry/wet mixing.
///
/// The buffer is allocated in [`configure`](Self::configure), never on the
/// audio path. Changing the delay time only moves the read position.
#[derive(Debug, Clone)]
pub struct DelayLine {
    /// The circular buffer storing audio samples.
    buffer: Vec<f32>,

    /// Where the next incoming sample will be stored.
    write_pos: usize,

    /// Cached `buffer.len()`.
    buffer_len: usize,

    sample_rate: f32,
    max_delay_ms: f32,

    delay_ms: f32,

    /// `delay_ms` converted to (fractional) samples, at least 1.0.
    delay_samples: f32,

    feedback: f32,
    dry_wet: f32,

    /// The delayed tap produced by the most recent `process` call.
    last_wet: f32,
}

impl Default for DelayLine {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl DelayLine {
    /// Create a delay line for the given sample rate with the default
    /// 2 second capacity.
    pub fn new(sample_rate: f32) -> Self {
        Self::with_max_delay_ms(sample_rate, DEFAULT_MAX_DELAY_MS)
    }

    /// Create a delay line with a custom capacity.
    pub fn with_max_delay_ms(sample_rate: f32, max_delay_ms: f32) -> Self {
        let mut line = Self {
            buffer: Vec::new(),
            write_pos: 0,
            buffer_len: 0,
            sample_rate: 0.0,
            max_delay_ms: max_delay_ms.max(1.0),
            delay_ms: DEFAULT_DELAY_MS,
            delay_samples: 1.0,
            feedback: 0.5,
            dry_wet: 0.5,
            last_wet: 0.0,
        };
        line.configure(sample_rate);
        line
    }

    /// Allocate the buffer for `sample_rate`.
    ///
    /// ```text
    /// capacity = ceil(max_delay_ms / 1000 * sample_rate) + 2
    /// ```
    ///
    /// Calling this again with the same rate is a no-op; a different rate
    /// reallocates and clears everything.
    pub fn configure(&mut self, sample_rate: f32) {
        let sample_rate = sample_rate.max(1.0);
        if sample_rate == self.sample_rate && self.buffer_len > 0 {
            return;
        }

        self.sample_rate = sample_rate;
        self.buffer_len = (self.max_delay_ms / 1000.0 * sample_rate).ceil() as usize + 2;
        self.buffer = vec![0.0; self.buffer_len];
        self.write_pos = 0;
        self.last_wet = 0.0;
        self.update_delay_samples();
    }

    /// Clear the buffer to silence and rewind the write position.
    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.last_wet = 0.0;
    }

    /// Set the delay time, clamped to `[1 ms, max_delay_ms]`.
    pub fn set_delay_time(&mut self, delay_ms: f32) {
        self.delay_ms = delay_ms.clamp(1.0, self.max_delay_ms);
        self.update_delay_samples();
    }

    /// Set the feedback amount, clamped to `[0, 1.1]`.
    pub fn set_feedback(&mut self, feedback: f32) {
        self.feedback = feedback.clamp(0.0, MAX_FEEDBACK);
    }

    /// Set the dry/wet balance, clamped to `[0, 1]`.
    pub fn set_dry_wet(&mut self, mix: f32) {
        self.dry_wet = mix.clamp(0.0, 1.0);
    }

    pub fn delay_time_ms(&self) -> f32 {
        self.delay_ms
    }

    pub fn delay_samples(&self) -> f32 {
        self.delay_samples
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    pub fn dry_wet(&self) -> f32 {
        self.dry_wet
    }

    pub fn max_delay_ms(&self) -> f32 {
        self.max_delay_ms
    }

    /// Process one sample.
    ///
    /// `external_feedback` is added to the signal fed back into the line,
    /// so another channel's output can be injected (cross-feedback).
    ///
    /// Returns `input * (1 - mix) + delayed * mix`.
    pub fn process(&mut self, input: f32, external_feedback: f32) -> f32 {
        let delayed = self.read(self.delay_samples);
        let feedback_signal = self.feedback * delayed + external_feedback;

        self.write(input + feedback_signal);
        self.advance();
        self.last_wet = delayed;

        input * (1.0 - self.dry_wet) + delayed * self.dry_wet
    }

    /// The tap that the next `process` call will read.
    pub fn delayed_signal(&self) -> f32 {
        self.read(self.delay_samples)
    }

    /// The tap produced by the most recent `process` call.
    pub fn wet_signal(&self) -> f32 {
        self.last_wet
    }

    /// Write a sample at the current write position without advancing.
    fn write(&mut self, sample: f32) {
        if let Some(slot) = self.buffer.get_mut(self.write_pos) {
            *slot = sample;
        }
    }

    /// Read `delay_samples` behind the write position with linear
    /// interpolation.
    ///
    /// ```text
    /// read_index = (write_pos + buffer_len - N) % buffer_len
    /// ```
    fn read(&self, delay_samples: f32) -> f32 {
        if self.buffer_len < 3 {
            return 0.0;
        }

        let delay_clamped = delay_samples.clamp(1.0, (self.buffer_len - 2) as f32);
        let delay_int = delay_clamped as usize;
        let delay_frac = delay_clamped - delay_int as f32;

        let index_a = (self.write_pos + self.buffer_len - delay_int) % self.buffer_len;
        let index_b = (self.write_pos + self.buffer_len - delay_int - 1) % self.buffer_len;

        self.buffer[index_a] * (1.0 - delay_frac) + self.buffer[index_b] * delay_frac
    }

    fn advance(&mut self) {
        self.write_pos = (self.write_pos + 1) % self.buffer_len.max(1);
    }

    fn update_delay_samples(&mut self) {
        self.delay_samples = (self.delay_ms * self.sample_rate / 1000.0).max(1.0);
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn wet_only(sample_rate: f32, delay_ms: f32) -> DelayLine {
        let mut dl = DelayLine::new(sample_rate);
        dl.set_delay_time(delay_ms);
        dl.set_feedback(0.0);
        dl.set_dry_wet(1.0);
        dl
    }

    /// With no feedback and a fully wet mix, the output is the input
    /// shifted by exactly `delay_ms * sample_rate / 1000` samples.
    #[test]
    fn test_exact_integer_delay() {
        // 10 ms at 48 kHz = 480 samples.
        let mut dl = wet_only(48000.0, 10.0);
        let input: Vec<f32> = (0..2000).map(|i| ((i * 37) % 101) as f32 / 101.0 - 0.5).collect();

        for (n, &x) in input.iter().enumerate() {
            let y = dl.process(x, 0.0);
            let expected = if n >= 480 { input[n - 480] } else { 0.0 };
            assert!(
                (y - expected).abs() < 1e-4,
                "sample {n}: expected {expected}, got {y}"
            );
        }
    }

    #[test]
    fn test_buffer_size_follows_sample_rate() {
        let dl = DelayLine::new(44100.0);
        assert_eq!(dl.buffer_len, 88200 + 2);

        let dl = DelayLine::with_max_delay_ms(48000.0, 500.0);
        assert_eq!(dl.buffer_len, 24000 + 2);
    }

    #[test]
    fn test_setters_clamp() {
        let mut dl = DelayLine::new(44100.0);

        dl.set_delay_time(0.0);
        assert_eq!(dl.delay_time_ms(), 1.0);
        dl.set_delay_time(5000.0);
        assert_eq!(dl.delay_time_ms(), 2000.0);

        dl.set_feedback(-1.0);
        assert_eq!(dl.feedback(), 0.0);
        dl.set_feedback(3.0);
        assert_eq!(dl.feedback(), MAX_FEEDBACK);

        dl.set_dry_wet(1.5);
        assert_eq!(dl.dry_wet(), 1.0);
        dl.set_dry_wet(-0.5);
        assert_eq!(dl.dry_wet(), 0.0);
    }

    /// Fractional delays blend the two neighboring samples.
    #[test]
    fn test_fractional_delay_interpolates() {
        let mut dl = DelayLine::new(1000.0);
        // 1 ms at 1 kHz = 1 sample; 2.5 ms = 2.5 samples.
        dl.set_delay_time(2.5);
        dl.set_feedback(0.0);
        dl.set_dry_wet(1.0);

        dl.process(0.0, 0.0);
        dl.process(1.0, 0.0);
        dl.process(0.0, 0.0);
        // Now the line holds [0, 1, 0] and 2.5 samples back is
        // halfway between the 1.0 and the first 0.0.
        let y = dl.process(0.0, 0.0);
        assert!((y - 0.5).abs() < 1e-6, "Expected 0.5, got {y}");
    }

    /// An impulse with unity feedback recirculates forever without growing.
    #[test]
    fn test_unity_feedback_stays_bounded() {
        let mut dl = DelayLine::new(44100.0);
        dl.set_delay_time(5.0);
        dl.set_feedback(1.0);
        dl.set_dry_wet(1.0);

        let mut peak = 0.0_f32;
        for n in 0..100_000 {
            let x = if n == 0 { 1.0 } else { 0.0 };
            let y = dl.process(x, 0.0);
            assert!(y.is_finite());
            peak = peak.max(y.abs());
        }
        assert!(peak <= 1.0 + 1e-5, "impulse grew to {peak}");
    }

    /// A continuous sine with 0.9 feedback settles below 1 / (1 - 0.9).
    #[test]
    fn test_feedback_bounded_with_continuous_input() {
        let mut dl = DelayLine::new(44100.0);
        dl.set_delay_time(10.0);
        dl.set_feedback(0.9);
        dl.set_dry_wet(0.5);

        for n in 0..100_000 {
            let x = (n as f32 * 0.05).sin();
            let y = dl.process(x, 0.0);
            assert!(y.is_finite() && y.abs() <= 10.0, "sample {n} = {y}");
        }
    }

    /// External feedback is written into the line alongside the input.
    #[test]
    fn test_external_feedback_is_recorded() {
        let mut dl = wet_only(1000.0, 3.0);
        dl.process(0.0, 0.25);
        dl.process(0.0, 0.0);
        dl.process(0.0, 0.0);
        assert!((dl.delayed_signal() - 0.25).abs() < 1e-6);

        let y = dl.process(0.0, 0.0);
        assert!((y - 0.25).abs() < 1e-6);
        assert!((dl.wet_signal() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_dry_mix_passes_input() {
        let mut dl = DelayLine::new(44100.0);
        dl.set_dry_wet(0.0);
        for x in [0.3, -0.7, 1.0] {
            assert_eq!(dl.process(x, 0.0), x);
        }
    }

    #[test]
    fn test_reset_silences_line() {
        let mut dl = wet_only(1000.0, 2.0);
        dl.process(1.0, 0.0);
        dl.reset();
        for _ in 0..10 {
            assert_eq!(dl.process(0.0, 0.0), 0.0);
        }
    }

    /// Reconfiguring at a new rate clears and resizes; the same rate is
    /// a no-op that keeps the buffered audio.
    #[test]
    fn test_configure_only_reallocates_on_rate_change() {
        let mut dl = wet_only(1000.0, 2.0);
        dl.process(1.0, 0.0);

        dl.configure(1000.0);
        assert_eq!(dl.process(0.0, 0.0), 0.0);
        assert!((dl.delayed_signal() - 1.0).abs() < 1e-6);
        let y = dl.process(0.0, 0.0);
        assert!((y - 1.0).abs() < 1e-6, "buffer was cleared: {y}");

        dl.configure(2000.0);
        assert_eq!(dl.buffer_len, 4000 + 2);
        assert!((dl.delay_samples() - 4.0).abs() < 1e-6);
        assert_eq!(dl.process(0.0, 0.0), 0.0);
    }
}
