//! # Scala Scale Files
//!
//! The Scala `.scl` format is the de facto interchange format for
//! microtonal scales:
//!
//! ```text
//! ! meantone.scl
//! !
//! 1/4-comma meantone scale
//!  12
//! !
//!  76.04900
//!  193.15686
//!  ...
//!  2/1
//! ```
//!
//! - Lines starting with `!` are comments. Blank lines are skipped too.
//! - The first remaining line is a free-text description.
//! - The second is the number of notes that follow.
//! - Each note is the first whitespace-separated token of its line;
//!   anything after it is a label and ignored. A token containing `.` is
//!   in cents, `a/b` is a frequency ratio, and a bare integer `n` is the
//!   ratio `n/1`.
//!
//! The unison (0 cents) is implicit and never listed.

use std::fs;
use std::path::Path;

use crate::error::{Result, ScalaError};

const OCTAVE_CENTS: f64 = 1200.0;

/// A scale as a sorted list of degrees in cents, closed by the octave.
///
/// The `Default` scale is empty and only serves as a placeholder.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scale {
    description: String,
    degrees: Vec<f64>,
}

impl Scale {
    /// Build a scale from arbitrary degrees.
    ///
    /// Degrees are sorted; anything outside `(0, 1200]` or non-finite is
    /// dropped, and the 1200 cent octave is appended if it isn't already
    /// the last degree.
    pub fn new(description: impl Into<String>, degrees: impl IntoIterator<Item = f64>) -> Self {
        let mut degrees: Vec<f64> = degrees
            .into_iter()
            .filter(|d| d.is_finite() && *d > 0.0 && *d <= OCTAVE_CENTS + 1e-9)
            .map(|d| d.min(OCTAVE_CENTS))
            .collect();
        degrees.sort_by(f64::total_cmp);
        degrees.dedup_by(|a, b| (*a - *b).abs() < 1e-9);

        if degrees.last().map_or(true, |&last| last < OCTAVE_CENTS) {
            degrees.push(OCTAVE_CENTS);
        }

        Self {
            description: description.into(),
            degrees,
        }
    }

    /// `steps`-tone equal division of the octave.
    pub fn equal_division(description: impl Into<String>, steps: u32) -> Self {
        let steps = steps.max(1);
        let step = OCTAVE_CENTS / f64::from(steps);
        Self::new(description, (1..=steps).map(|i| f64::from(i) * step))
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Ascending degrees in cents, ending with 1200.
    pub fn degrees(&self) -> &[f64] {
        &self.degrees
    }
}

/// Read and parse a `.scl` file.
pub fn load_file(path: impl AsRef<Path>) -> Result<Scale> {
    let text = fs::read_to_string(path)?;
    parse(&text)
}

/// Parse the text of a `.scl` file.
pub fn parse(text: &str) -> Result<Scale> {
    // (1-based line number, trimmed content)
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('!'));

    let (_, description) = lines.next().ok_or(ScalaError::MissingDescription)?;

    let (_, count_line) = lines.next().ok_or(ScalaError::MissingCount)?;
    let count_token = first_token(count_line);
    let count: usize = count_token
        .parse()
        .map_err(|_| ScalaError::InvalidCount(count_token.to_string()))?;
    if count == 0 {
        return Err(ScalaError::EmptyScale);
    }

    let mut degrees = Vec::with_capacity(count);
    for (line_no, line) in lines.take(count) {
        degrees.push(parse_pitch(first_token(line), line_no)?);
    }
    if degrees.len() < count {
        return Err(ScalaError::Truncated {
            expected: count,
            found: degrees.len(),
        });
    }

    Ok(Scale::new(description, degrees))
}

fn first_token(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

/// Convert one pitch token to cents.
fn parse_pitch(token: &str, line: usize) -> Result<f64> {
    let invalid = || ScalaError::InvalidPitch {
        line,
        value: token.to_string(),
    };

    if token.contains('.') {
        return token.parse::<f64>().map_err(|_| invalid());
    }

    let (numerator, denominator) = match token.split_once('/') {
        Some((n, d)) => (n, d),
        None => (token, "1"),
    };
    let numerator: f64 = numerator
        .parse::<i64>()
        .map_err(|_| invalid())? as f64;
    let denominator: f64 = denominator
        .parse::<i64>()
        .map_err(|_| invalid())? as f64;

    if numerator <= 0.0 || denominator <= 0.0 {
        return Err(ScalaError::NonPositiveRatio {
            line,
            value: token.to_string(),
        });
    }

    Ok(ratio_to_cents(numerator / denominator))
}

/// `1200 · log2(ratio)`.
pub fn ratio_to_cents(ratio: f64) -> f64 {
    OCTAVE_CENTS * ratio.log2()
}
