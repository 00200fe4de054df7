//! Built-in temperaments.
//!
//! Equal divisions are generated from their step count. The historical
//! twelve-note temperaments are tabulated in cents from C.

use nih_plug::prelude::Enum;

use super::scala::{ratio_to_cents, Scale};

/// Built-in tunings, in host selector order.
#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Temperament {
    #[default]
    #[name = "12-TET"]
    Equal12,
    #[name = "24-TET"]
    Equal24,
    #[name = "31-EDO"]
    Edo31,
    #[name = "Just Intonation"]
    Just,
    #[name = "Pythagorean"]
    Pythagorean,
    #[name = "Quarter-Comma Meantone"]
    Meantone,
    #[name = "Werckmeister III"]
    Werckmeister3,
    #[name = "19-EDO"]
    Edo19,
    #[name = "22-EDO"]
    Edo22,
    #[name = "53-EDO"]
    Edo53,
    #[name = "72-EDO"]
    Edo72,
}

/// 5-limit just intonation, as frequency ratios from the tonic.
const JUST_RATIOS: [(u32, u32); 11] = [
    (16, 15),
    (9, 8),
    (6, 5),
    (5, 4),
    (4, 3),
    (45, 32),
    (3, 2),
    (8, 5),
    (5, 3),
    (9, 5),
    (15, 8),
];

/// Pythagorean tuning: stacked pure fifths.
const PYTHAGOREAN_RATIOS: [(u32, u32); 11] = [
    (256, 243),
    (9, 8),
    (32, 27),
    (81, 64),
    (4, 3),
    (729, 512),
    (3, 2),
    (128, 81),
    (27, 16),
    (16, 9),
    (243, 128),
];

/// Quarter-comma meantone (pure major thirds).
const MEANTONE_CENTS: [f64; 11] = [
    76.049, 193.157, 310.265, 386.314, 503.422, 579.471, 696.578, 772.627, 889.735, 1006.843,
    1082.892,
];

/// Werckmeister III well temperament.
const WERCKMEISTER_III_CENTS: [f64; 11] = [
    90.225, 192.180, 294.135, 390.225, 498.045, 588.270, 696.090, 792.180, 888.270, 996.090,
    1092.180,
];

impl Temperament {
    pub const ALL: [Temperament; 11] = [
        Temperament::Equal12,
        Temperament::Equal24,
        Temperament::Edo31,
        Temperament::Just,
        Temperament::Pythagorean,
        Temperament::Meantone,
        Temperament::Werckmeister3,
        Temperament::Edo19,
        Temperament::Edo22,
        Temperament::Edo53,
        Temperament::Edo72,
    ];

    /// Look up a temperament by selector index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Equal12 => "12-Tone Equal Temperament",
            Self::Equal24 => "24-Tone Equal Temperament (Quarter Tones)",
            Self::Edo31 => "31 Equal Divisions of the Octave",
            Self::Just => "5-Limit Just Intonation",
            Self::Pythagorean => "Pythagorean Tuning",
            Self::Meantone => "Quarter-Comma Meantone",
            Self::Werckmeister3 => "Werckmeister III Well Temperament",
            Self::Edo19 => "19 Equal Divisions of the Octave",
            Self::Edo22 => "22 Equal Divisions of the Octave",
            Self::Edo53 => "53 Equal Divisions of the Octave",
            Self::Edo72 => "72 Equal Divisions of the Octave",
        }
    }

    pub fn scale(&self) -> Scale {
        let description = self.description();
        match self {
            Self::Equal12 => Scale::equal_division(description, 12),
            Self::Equal24 => Scale::equal_division(description, 24),
            Self::Edo31 => Scale::equal_division(description, 31),
            Self::Edo19 => Scale::equal_division(description, 19),
            Self::Edo22 => Scale::equal_division(description, 22),
            Self::Edo53 => Scale::equal_division(description, 53),
            Self::Edo72 => Scale::equal_division(description, 72),
            Self::Just => Scale::new(description, ratios_to_cents(&JUST_RATIOS)),
            Self::Pythagorean => Scale::new(description, ratios_to_cents(&PYTHAGOREAN_RATIOS)),
            Self::Meantone => Scale::new(description, MEANTONE_CENTS),
            Self::Werckmeister3 => Scale::new(description, WERCKMEISTER_III_CENTS),
        }
    }
}

fn ratios_to_cents(ratios: &[(u32, u32)]) -> impl Iterator<Item = f64> + '_ {
    ratios
        .iter()
        .map(|&(n, d)| ratio_to_cents(f64::from(n) / f64::from(d)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_every_temperament_is_closed_by_the_octave() {
        for t in Temperament::ALL {
            let scale = t.scale();
            let degrees = scale.degrees();
            assert_eq!(*degrees.last().unwrap(), 1200.0, "{t:?}");
            assert!(degrees.windows(2).all(|w| w[0] < w[1]), "{t:?} not ascending");
        }
    }

    #[test]
    fn test_degree_counts() {
        let counts: Vec<usize> = Temperament::ALL
            .iter()
            .map(|t| t.scale().degrees().len())
            .collect();
        assert_eq!(counts, [12, 24, 31, 12, 12, 12, 12, 19, 22, 53, 72]);
    }

    #[test]
    fn test_just_fifth_is_pure() {
        let scale = Temperament::Just.scale();
        assert_abs_diff_eq!(scale.degrees()[6], 701.955, epsilon = 1e-3);
        assert_abs_diff_eq!(scale.degrees()[3], 386.314, epsilon = 1e-3);
    }

    #[test]
    fn test_pythagorean_third_is_wide() {
        let scale = Temperament::Pythagorean.scale();
        assert_abs_diff_eq!(scale.degrees()[3], 407.820, epsilon = 1e-3);
    }

    #[test]
    fn test_selector_index() {
        assert_eq!(Temperament::from_index(0), Some(Temperament::Equal12));
        assert_eq!(Temperament::from_index(6), Some(Temperament::Werckmeister3));
        assert_eq!(Temperament::from_index(10), Some(Temperament::Edo72));
        assert_eq!(Temperament::from_index(11), None);
    }
}
