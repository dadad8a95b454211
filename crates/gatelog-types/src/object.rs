use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Store-assigned version token for one revision of an object.
///
/// Every successful write produces a new generation. A conditional write
/// names the generation it read; the store rejects it if the object has
/// moved on since. Generations are always non-zero: "the object must not
/// exist" is expressed separately, never as a zero generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Generation(u64);

impl Generation {
    /// Create a generation from a raw non-zero value.
    pub fn new(value: u64) -> Result<Self, TypeError> {
        if value == 0 {
            return Err(TypeError::InvalidGeneration("0".into()));
        }
        Ok(Self(value))
    }

    /// The first generation a fresh in-process store hands out.
    pub const fn first() -> Self {
        Self(1)
    }

    /// The generation following this one.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Generation({})", self.0)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Generation {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<u64>()
            .map_err(|_| TypeError::InvalidGeneration(s.to_string()))?;
        Self::new(value)
    }
}

impl TryFrom<u64> for Generation {
    type Error = TypeError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Generation> for u64 {
    fn from(g: Generation) -> Self {
        g.0
    }
}

/// Join an optional namespace prefix and a file name into an object name.
///
/// Leading slashes are stripped from both parts, so `"/docs"` + `"/a.txt"`
/// yields `"docs/a.txt"`. An empty prefix leaves the name untouched.
pub fn join_prefix(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_start_matches('/').trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}
