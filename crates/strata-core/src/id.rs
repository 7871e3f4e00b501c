//! Opaque platform identifiers

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An opaque 64-bit platform identifier
///
/// The platform encodes identifiers as 16-digit lower-hex strings on the
/// wire; zero means "absent" (a resource that has not been realized yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PlatformId(pub u64);

impl PlatformId {
    /// The absent identifier
    pub const ZERO: PlatformId = PlatformId(0);

    /// Check whether this identifier refers to a realized resource
    pub fn is_set(&self) -> bool {
        self.0 != 0
    }

    /// Generate a fresh non-zero identifier
    pub fn random() -> Self {
        loop {
            let id = rand::random::<u64>();
            if id != 0 {
                return PlatformId(id);
            }
        }
    }

    /// Last `n` hex digits of the wire form, used for collision suffixes
    pub fn hex_suffix(&self, n: usize) -> String {
        let hex = format!("{:016x}", self.0);
        hex[hex.len().saturating_sub(n)..].to_string()
    }
}

impl std::fmt::Display for PlatformId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl std::str::FromStr for PlatformId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(format!("platform id must be 16 hex digits, got '{}'", s));
        }
        u64::from_str_radix(s, 16)
            .map(PlatformId)
            .map_err(|_| format!("invalid platform id '{}'", s))
    }
}

impl From<u64> for PlatformId {
    fn from(raw: u64) -> Self {
        PlatformId(raw)
    }
}

impl Serialize for PlatformId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PlatformId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
