//! Resource limits attached to a job.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static BYTE_SIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s*([kKmMgGtT]?)(?:[iI]?[bB])?\s*$").expect("byte size pattern is valid")
});

/// A memory ceiling in bytes. Zero means unbounded.
///
/// Parses `"500M"`, `"1G"`, `"512K"`, `"2GiB"` or a plain byte count.
/// Suffixes are binary multiples, so `"1K"` is 1024 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(u64);

impl ByteSize {
    /// No ceiling.
    pub const UNBOUNDED: Self = Self(0);

    /// Creates a limit from a byte count.
    #[must_use]
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Creates a limit from mebibytes.
    #[must_use]
    pub const fn from_mib(mib: u64) -> Self {
        Self(mib * 1024 * 1024)
    }

    /// The limit in bytes.
    #[must_use]
    pub const fn bytes(self) -> u64 {
        self.0
    }

    /// True when no ceiling is enforced.
    #[must_use]
    pub const fn is_unbounded(self) -> bool {
        self.0 == 0
    }

    /// True when `observed` exceeds a bounded ceiling.
    #[must_use]
    pub const fn is_exceeded_by(self, observed: u64) -> bool {
        !self.is_unbounded() && observed > self.0
    }
}

/// The input was not a recognised size.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid byte size `{0}`")]
pub struct ByteSizeError(pub String);

impl FromStr for ByteSize {
    type Err = ByteSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = BYTE_SIZE
            .captures(s)
            .ok_or_else(|| ByteSizeError(s.to_string()))?;
        let value: u64 = caps[1].parse().map_err(|_| ByteSizeError(s.to_string()))?;
        let shift = match caps[2].to_ascii_uppercase().as_str() {
            "" => 0,
            "K" => 10,
            "M" => 20,
            "G" => 30,
            _ => 40,
        };
        value
            .checked_mul(1u64 << shift)
            .map(Self)
            .ok_or_else(|| ByteSizeError(s.to_string()))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(u32, &str); 4] = [(40, "T"), (30, "G"), (20, "M"), (10, "K")];
        if self.0 == 0 {
            return write!(f, "0");
        }
        for (shift, unit) in UNITS {
            let scale = 1u64 << shift;
            if self.0 % scale == 0 {
                return write!(f, "{}{}", self.0 / scale, unit);
            }
        }
        write!(f, "{}", self.0)
    }
}

impl Serialize for ByteSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bytes(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bytes(bytes) => Ok(Self(bytes)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}
