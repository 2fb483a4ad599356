//! Protocol versioning for Herald.
//!
//! Subscribers announce their version in the subscribe request; the
//! publisher refuses requests from a different major version.

use serde::{Deserialize, Serialize};

/// Protocol version spoken by this build.
pub const PROTOCOL_VERSION: Version = Version { major: 1, minor: 0 };

/// Protocol version information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Incremented on wire-incompatible changes.
    pub major: u8,
    /// Incremented on additive changes.
    pub minor: u8,
}

impl Version {
    /// Create a new version.
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Whether a peer speaking `other` can be served by this version.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Version) -> bool {
        self.major == other.major
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

impl Default for Version {
    fn default() -> Self {
        PROTOCOL_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_bumps_stay_compatible() {
        let current = Version::new(1, 0);
        assert!(current.is_compatible_with(&Version::new(1, 7)));
        assert!(!current.is_compatible_with(&Version::new(2, 0)));
        assert!(!current.is_compatible_with(&Version::new(0, 9)));
    }

    #[test]
    fn test_version_display() {
        assert_eq!(PROTOCOL_VERSION.to_string(), "v1.0");
    }
}
