//! Error types for loading external tuning data.
//!
//! Audio processing never fails: out-of-range values are clamped and
//! numeric hazards fall back to safe signals. The only fallible input is a
//! Scala scale file.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScalaError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("scale file has no description line")]
    MissingDescription,

    #[error("scale file has no note count")]
    MissingCount,

    #[error("invalid note count `{0}`")]
    InvalidCount(String),

    #[error("scale declares zero notes")]
    EmptyScale,

    #[error("line {line}: invalid pitch `{value}`")]
    InvalidPitch { line: usize, value: String },

    #[error("line {line}: ratio `{value}` is not positive")]
    NonPositiveRatio { line: usize, value: String },

    #[error("expected {expected} notes, found {found}")]
    Truncated { expected: usize, found: usize },
}

pub type Result<T> = std::result::Result<T, ScalaError>;
