//! Consolidation functions.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::RrdError;

/// How a series is reduced to a single value, both inside archives and when
/// consolidating a resampled series after the fact.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsolFun {
    Average,
    Min,
    Max,
    Last,
    First,
    Total,
}

impl ConsolFun {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Average => "AVERAGE",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Last => "LAST",
            Self::First => "FIRST",
            Self::Total => "TOTAL",
        }
    }
}

impl TryFrom<&str> for ConsolFun {
    type Error = RrdError;

    fn try_from(value: &str) -> Result<Self, RrdError> {
        match value.to_ascii_uppercase().as_str() {
            "AVERAGE" => Ok(Self::Average),
            "MIN" => Ok(Self::Min),
            "MAX" => Ok(Self::Max),
            "LAST" => Ok(Self::Last),
            "FIRST" => Ok(Self::First),
            "TOTAL" => Ok(Self::Total),
            _ => Err(RrdError::UnsupportedConsolFun(value.into())),
        }
    }
}

impl FromStr for ConsolFun {
    type Err = RrdError;

    fn from_str(value: &str) -> Result<Self, RrdError> {
        Self::try_from(value)
    }
}

impl fmt::Display for ConsolFun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[test]
fn consol_fun_names() {
    assert_eq!(ConsolFun::try_from("average").unwrap(), ConsolFun::Average);
    assert_eq!(ConsolFun::try_from("MAX").unwrap(), ConsolFun::Max);
    assert_eq!(ConsolFun::Total.as_str(), "TOTAL");
    assert!(matches!(
        ConsolFun::try_from("MEDIAN"),
        Err(RrdError::UnsupportedConsolFun(_))
    ));
}
