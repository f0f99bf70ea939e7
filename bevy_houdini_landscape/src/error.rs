//! Error types for heightfield conversion and landscape materialization.

use crate::source::PartKey;
use thiserror::Error;

/// Result alias used by every public operation of this crate.
pub type Result<T> = std::result::Result<T, LandscapeError>;

/// Errors that can occur while reading, converting or committing a heightfield tile.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LandscapeError {
    /// The primary height volume or a required attribute is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// A volume does not have the shape a heightfield requires.
    #[error("invalid shape for part {part:?}: {reason}")]
    InvalidShape {
        /// Part whose shape was rejected.
        part: PartKey,
        /// What was wrong with it.
        reason: String,
    },

    /// A value range collapsed to a single value where a spread is required.
    #[error("degenerate range for {name}: min == max == {value}")]
    DegenerateRange {
        /// Volume or layer name.
        name: String,
        /// The collapsed value.
        value: f32,
    },

    /// A query against the geometry source failed.
    #[error("geometry source query failed for part {part:?}: {message}")]
    Source {
        /// Part the query was about.
        part: PartKey,
        /// Message reported by the source.
        message: String,
    },

    /// The destination landscape host rejected a call.
    #[error("landscape host call failed: {0}")]
    Host(String),

    /// A precondition on the caller's input does not hold.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl LandscapeError {
    /// Stable reason code, suitable for matching in callers and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            LandscapeError::NotFound(_) => "not_found",
            LandscapeError::InvalidShape { .. } => "invalid_shape",
            LandscapeError::DegenerateRange { .. } => "degenerate_range",
            LandscapeError::Source { .. } => "source_failure",
            LandscapeError::Host(_) => "host_failure",
            LandscapeError::InvalidInput(_) => "invalid_input",
        }
    }

    pub(crate) fn shape(part: PartKey, reason: impl Into<String>) -> Self {
        LandscapeError::InvalidShape {
            part,
            reason: reason.into(),
        }
    }
}
