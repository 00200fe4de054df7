//! # DSP (Digital Signal Processing) Primitives
//!
//! The building blocks of the effect, leaf first:
//!
//! - **`filter`**: one-pole smoothers and biquad EQ sections.
//! - **`delay_line`**: the interpolating feedback delay at the heart of
//!   the echo.
//! - **`lfo`**: wow and flutter oscillators.
//! - **`noise`**: pink hiss, hum, rumble and dropouts of a tape machine.
//! - **`tape_loop`**: one channel's tape with its record and playback heads.
//! - **`tape`**: the full tape echo chain built from the above.
//! - **`character`**: the hardware flavors wrapped around the pitch shifter.
//! - **`pitch_shifter`**: the STFT phase vocoder.

pub mod character;
pub mod delay_line;
pub mod filter;
pub mod lfo;
pub mod noise;
pub mod pitch_shifter;
pub mod tape;
pub mod tape_loop;
