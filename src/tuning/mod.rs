//! # Microtonal Tuning
//!
//! - **`temperament`**: built-in tunings (equal divisions plus historical
//!   twelve-note temperaments).
//! - **`scala`**: the `.scl` file format and the [`Scale`] model.
//! - **`authority`**: the injected interface to an external tuning master.
//! - **`quantizer`**: snapping pitch offsets to the active scale.
//!
//! All tuning math is in cents (1200 per octave) and `f64`, since scale
//! degrees like 53-EDO steps are only a few cents apart.

pub mod authority;
pub mod quantizer;
pub mod scala;
pub mod temperament;

pub use authority::{NoTuningAuthority, TuningAuthority};
pub use quantizer::TuningQuantizer;
pub use scala::Scale;
pub use temperament::Temperament;
