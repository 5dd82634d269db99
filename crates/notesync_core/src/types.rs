//! Identity types shared across the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of the user that owns a data domain.
///
/// Owners never see each other's entities or change logs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Creates an owner ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex form used for on-disk file names.
    #[must_use]
    pub fn to_file_stem(&self) -> String {
        self.0.bytes().map(|b| format!("{b:02x}")).collect()
    }

    /// Parses a file stem produced by [`Self::to_file_stem`].
    #[must_use]
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        if stem.is_empty() || stem.len() % 2 != 0 {
            return None;
        }
        let bytes = (0..stem.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(stem.get(i..i + 2)?, 16).ok())
            .collect::<Option<Vec<u8>>>()?;
        String::from_utf8(bytes).ok().map(Self)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of the device or CRUD surface that originated a change.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Creates a client ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_file_stem_roundtrip() {
        let owner = OwnerId::new("user@example.com");
        let stem = owner.to_file_stem();
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(OwnerId::from_file_stem(&stem), Some(owner));
    }

    #[test]
    fn owner_file_stem_rejects_garbage() {
        assert_eq!(OwnerId::from_file_stem(""), None);
        assert_eq!(OwnerId::from_file_stem("abc"), None);
        assert_eq!(OwnerId::from_file_stem("zz"), None);
    }

    #[test]
    fn blank_client() {
        assert!(ClientId::new("  ").is_blank());
        assert!(!ClientId::new("laptop").is_blank());
    }

    #[test]
    fn clock_moves_forward() {
        assert!(now_millis() > 1_600_000_000_000);
    }
}
