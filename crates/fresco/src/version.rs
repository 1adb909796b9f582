//! Shared-library versions and the requirement forms bundles declare.
//!
//! Versions travel through registry JSON as plain strings (`"18.2.0"`,
//! `"^17.0"`, `"*"`), so both types round-trip through `String` for serde.

use serde::{Deserialize, Serialize};

// --- Version ---

/// Semantic version triple. Missing minor/patch parts parse as 0, so
/// `"18"` and `"18.0.0"` are the same version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

/// Error returned when a version or requirement string does not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    Empty,
    Malformed(String),
}

impl std::fmt::Display for VersionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionError::Empty => write!(f, "empty version string"),
            VersionError::Malformed(text) => write!(f, "malformed version: '{text}'"),
        }
    }
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VersionError::Empty);
        }
        let mut parts = text.split('.');
        let component = |part: Option<&str>| -> Result<u64, VersionError> {
            match part {
                None => Ok(0),
                Some(digits) => digits
                    .parse()
                    .map_err(|_| VersionError::Malformed(text.to_owned())),
            }
        };
        let major = component(parts.next())?;
        let minor = component(parts.next())?;
        let patch = component(parts.next())?;
        if parts.next().is_some() {
            return Err(VersionError::Malformed(text.to_owned()));
        }
        Ok(Self::new(major, minor, patch))
    }

    /// Caret compatibility: no change to the leftmost non-zero component,
    /// and not older than `required`.
    pub fn caret_compatible(&self, required: &Version) -> bool {
        if self < required {
            return false;
        }
        if required.major > 0 {
            self.major == required.major
        } else if required.minor > 0 {
            self.major == 0 && self.minor == required.minor
        } else {
            self == required
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl std::str::FromStr for Version {
    type Err = VersionError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::parse(&text)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

// --- VersionReq ---

/// Requirement a bundle declares against a shared library.
///
/// Forms: `*` (anything goes; what `requiredVersion: false` configs mean),
/// `^1.2.3` (caret compatibility, also the meaning of a bare `1.2.3`),
/// `=1.2.3` (exact).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VersionReq {
    Any,
    Compatible(Version),
    Exact(Version),
}

impl Default for VersionReq {
    fn default() -> Self {
        Self::Any
    }
}

impl VersionReq {
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let text = text.trim();
        if text.is_empty() || text == "*" {
            return Ok(Self::Any);
        }
        if let Some(rest) = text.strip_prefix('^') {
            return Ok(Self::Compatible(Version::parse(rest)?));
        }
        if let Some(rest) = text.strip_prefix('=') {
            return Ok(Self::Exact(Version::parse(rest)?));
        }
        Ok(Self::Compatible(Version::parse(text)?))
    }

    pub fn matches(&self, version: &Version) -> bool {
        match self {
            VersionReq::Any => true,
            VersionReq::Compatible(required) => version.caret_compatible(required),
            VersionReq::Exact(required) => version == required,
        }
    }
}

impl std::fmt::Display for VersionReq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionReq::Any => write!(f, "*"),
            VersionReq::Compatible(version) => write!(f, "^{version}"),
            VersionReq::Exact(version) => write!(f, "={version}"),
        }
    }
}

impl TryFrom<String> for VersionReq {
    type Error = VersionError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::parse(&text)
    }
}

impl From<VersionReq> for String {
    fn from(requirement: VersionReq) -> Self {
        requirement.to_string()
    }
}
