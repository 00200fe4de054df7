//! # Tape Loop
//!
//! A tape echo records onto a moving loop and plays it back through one
//! or more heads spaced along the tape path. [`TapeLoop`] is one channel's
//! loop: a single record head writes into a ring buffer once per sample,
//! and up to [`MAX_HEADS`] playback heads read from it at their own
//! distance behind the record head, expressed as a delay time.
//!
//! Playback speed wobble (wow and flutter) is applied at read time by
//! stretching the delay: `delay_samples = delay_ms * speed * sr / 1000`.

/// Maximum number of playback heads on one loop.
pub const MAX_HEADS: usize = 4;

/// Extra capacity over `max_delay_ms`, so a head modulated to +20 % and
/// given a +4.5 % speed offset still reads recorded tape.
const MODULATION_HEADROOM: f32 = 1.3;

/// One channel's tape: one record head, several playback heads.
#[derive(Debug, Clone)]
pub struct TapeLoop {
    buffer: Vec<f32>,
    write_pos: usize,
    buffer_len: usize,
    sample_rate: f32,
    max_delay_ms: f32,

    /// Distance of each playback head from the record head in
    /// milliseconds. `0.0` means the head is disabled and never read.
    head_delays_ms: [f32; MAX_HEADS],
}

impl TapeLoop {
    pub fn new(sample_rate: f32, max_delay_ms: f32) -> Self {
        let mut tape = Self {
            buffer: Vec::new(),
            write_pos: 0,
            buffer_len: 0,
            sample_rate: 0.0,
            max_delay_ms: max_delay_ms.max(1.0),
            head_delays_ms: [0.0; MAX_HEADS],
        };
        tape.configure(sample_rate);
        tape
    }

    /// Allocate tape for `sample_rate`. A repeated call with the same rate
    /// keeps the recording.
    pub fn configure(&mut self, sample_rate: f32) {
        let sample_rate = sample_rate.max(1.0);
        if sample_rate == self.sample_rate && self.buffer_len > 0 {
            return;
        }

        self.sample_rate = sample_rate;
        self.buffer_len =
            (self.max_delay_ms * MODULATION_HEADROOM / 1000.0 * sample_rate).ceil() as usize + 4;
        self.buffer = vec![0.0; self.buffer_len];
        self.write_pos = 0;
    }

    /// Erase the tape. Head positions are kept.
    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }

    /// Position playback head `head`, clamped to `[1 ms, max_delay_ms]`.
    /// Out-of-range heads are ignored.
    pub fn set_head_delay(&mut self, head: usize, delay_ms: f32) {
        if let Some(slot) = self.head_delays_ms.get_mut(head) {
            *slot = delay_ms.clamp(1.0, self.max_delay_ms);
        }
    }

    /// Take a playback head out of the tape path.
    pub fn disable_head(&mut self, head: usize) {
        if let Some(slot) = self.head_delays_ms.get_mut(head) {
            *slot = 0.0;
        }
    }

    pub fn is_head_enabled(&self, head: usize) -> bool {
        self.head_delay_ms(head) > 0.0
    }

    pub fn head_delay_ms(&self, head: usize) -> f32 {
        self.head_delays_ms.get(head).copied().unwrap_or(0.0)
    }

    /// Record one sample and advance the tape.
    pub fn record(&mut self, sample: f32) {
        if let Some(slot) = self.buffer.get_mut(self.write_pos) {
            *slot = sample;
        }
        self.write_pos = (self.write_pos + 1) % self.buffer_len.max(1);
    }

    /// Read playback head `head` at the given speed factor (`1.0` =
    /// nominal).
    ///
    /// Must be called after [`record`](Self::record) for the current
    /// sample: a delay of `d` samples then returns the sample recorded
    /// `d` calls ago. Disabled heads return silence.
    pub fn playback(&self, head: usize, speed: f32) -> f32 {
        let delay_ms = self.head_delay_ms(head);
        if delay_ms <= 0.0 || self.buffer_len < 4 {
            return 0.0;
        }

        let delay_samples = (delay_ms * speed * self.sample_rate / 1000.0)
            .clamp(1.0, (self.buffer_len - 3) as f32);
        let delay_int = delay_samples as usize;
        let frac = delay_samples - delay_int as f32;

        // The newest sample sits at write_pos - 1.
        let newest = self.write_pos + self.buffer_len - 1;
        let index_a = (newest - delay_int) % self.buffer_len;
        let index_b = (newest - delay_int - 1) % self.buffer_len;

        self.buffer[index_a] * (1.0 - frac) + self.buffer[index_b] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_loop_has_no_heads() {
        let tape = TapeLoop::new(44100.0, 500.0);
        for head in 0..MAX_HEADS {
            assert!(!tape.is_head_enabled(head));
            assert_eq!(tape.playback(head, 1.0), 0.0);
        }
    }

    #[test]
    fn test_set_head_delay_clamps_and_enables() {
        let mut tape = TapeLoop::new(44100.0, 500.0);
        tape.set_head_delay(1, 0.0);
        assert_eq!(tape.head_delay_ms(1), 1.0);
        assert!(tape.is_head_enabled(1));

        tape.set_head_delay(1, 800.0);
        assert_eq!(tape.head_delay_ms(1), 500.0);

        tape.disable_head(1);
        assert!(!tape.is_head_enabled(1));

        // Heads past the end don't exist.
        tape.set_head_delay(MAX_HEADS, 100.0);
        assert!(!tape.is_head_enabled(MAX_HEADS));
    }

    /// At nominal speed a head returns exactly what was recorded
    /// `delay_ms` ago.
    #[test]
    fn test_playback_is_exact_at_nominal_speed() {
        let mut tape = TapeLoop::new(1000.0, 100.0);
        tape.set_head_delay(0, 5.0);

        let input: Vec<f32> = (0..50).map(|i| i as f32 * 0.01).collect();
        for (n, &x) in input.iter().enumerate() {
            tape.record(x);
            let y = tape.playback(0, 1.0);
            let expected = if n >= 5 { input[n - 5] } else { 0.0 };
            assert!((y - expected).abs() < 1e-6, "sample {n}: {y} vs {expected}");
        }
    }

    /// Every head reads the same recording at its own distance.
    #[test]
    fn test_heads_share_one_recording() {
        let mut tape = TapeLoop::new(1000.0, 100.0);
        tape.set_head_delay(0, 3.0);
        tape.set_head_delay(1, 7.0);
        tape.set_head_delay(3, 12.0);
        for i in 0..30 {
            tape.record(i as f32);
        }

        // Newest is 29.
        assert_eq!(tape.playback(0, 1.0), 26.0);
        assert_eq!(tape.playback(1, 1.0), 22.0);
        assert_eq!(tape.playback(2, 1.0), 0.0);
        assert_eq!(tape.playback(3, 1.0), 17.0);
    }

    /// Slowing the tape stretches the delay, blending neighbors.
    #[test]
    fn test_speed_changes_delay() {
        let mut tape = TapeLoop::new(1000.0, 100.0);
        tape.set_head_delay(0, 4.0);
        for i in 0..20 {
            tape.record(i as f32);
        }
        // Newest is 19. 4 samples back = 15, 5 samples back = 14.
        assert!((tape.playback(0, 1.0) - 15.0).abs() < 1e-5);
        assert!((tape.playback(0, 1.25) - 14.0).abs() < 1e-5);
        assert!((tape.playback(0, 1.125) - 14.5).abs() < 1e-5);
    }

    #[test]
    fn test_reset_erases_tape_but_keeps_heads() {
        let mut tape = TapeLoop::new(1000.0, 100.0);
        tape.set_head_delay(0, 2.0);
        for _ in 0..10 {
            tape.record(1.0);
        }
        tape.reset();
        tape.record(0.0);
        assert_eq!(tape.playback(0, 1.0), 0.0);
        assert_eq!(tape.head_delay_ms(0), 2.0);
    }
}
