//! Errors surfaced by the query pipeline.

use std::{fmt, io};

use crate::rpn::ExpressionError;

/// Errors that can happen while building, resolving or querying a
/// [DataProcessor](crate::processor::DataProcessor).
///
/// Everything is surfaced synchronously and nothing is retried internally;
/// after a failed `process_data` the processor's results are unreliable and
/// callers should discard it.
#[derive(Debug)]
pub enum RrdError {
    /// Time window with `t_start >= t_end`.
    InvalidRange { t_start: i64, t_end: i64 },
    /// A pixel grid needs at least two pixels.
    InvalidPixelCount(usize),
    /// Name lookup miss, including forward references between derived
    /// sources.
    UnknownSource(Box<str>),
    /// Query before resolution, or a resolution that never populated the
    /// source.
    DataUnavailable(Box<str>),
    UnsupportedConsolFun(Box<str>),
    /// Reconfiguration after the first `process_data` call.
    AlreadyProcessed,
    Expression(ExpressionError),
    Storage(io::Error),
}

impl fmt::Display for RrdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRange { t_start, t_end } => {
                write!(f, "invalid time range [{t_start}, {t_end}]")
            }
            Self::InvalidPixelCount(count) => write!(f, "invalid pixel count {count}"),
            Self::UnknownSource(name) => write!(f, "unknown source '{name}'"),
            Self::DataUnavailable(name) => write!(f, "no data available for '{name}'"),
            Self::UnsupportedConsolFun(name) => {
                write!(f, "unsupported consolidation function '{name}'")
            }
            Self::AlreadyProcessed => {
                write!(f, "data already processed, reconfiguration not allowed")
            }
            Self::Expression(e) => write!(f, "expression error: {e}"),
            Self::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for RrdError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Expression(e) => Some(e),
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ExpressionError> for RrdError {
    fn from(value: ExpressionError) -> Self {
        Self::Expression(value)
    }
}

impl From<io::Error> for RrdError {
    fn from(value: io::Error) -> Self {
        Self::Storage(value)
    }
}
