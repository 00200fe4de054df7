//! External tuning authorities.
//!
//! A tuning authority is another process (a "tuning master") that decides
//! how every MIDI note should be retuned, so several instruments and
//! effects in a session share one tuning. The engine only needs three
//! questions answered, so the connection is an injected trait object: a
//! host wires in its own client, and the default answers "not connected".

/// A source of session-wide retuning.
pub trait TuningAuthority: Send {
    /// Whether a tuning master is currently reachable.
    fn is_connected(&self) -> bool;

    /// Deviation from 12-TET, in semitones, for a (fractional) MIDI note.
    fn retuning_in_semitones(&self, midi_note: f64) -> f64;

    /// Human-readable name of the authority's current scale.
    fn scale_name(&self) -> String;
}

/// The default authority: never connected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTuningAuthority;

impl TuningAuthority for NoTuningAuthority {
    fn is_connected(&self) -> bool {
        false
    }

    fn retuning_in_semitones(&self, _midi_note: f64) -> f64 {
        0.0
    }

    fn scale_name(&self) -> String {
        String::new()
    }
}
