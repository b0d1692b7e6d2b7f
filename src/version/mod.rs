//! Server version handling for db-lookout.
//!
//! Parses the server's semantic version and resolves it per host, caching
//! the result for a configurable window.

mod resolver;

pub use resolver::VersionResolver;

use crate::error::{LookoutError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed server version such as `24.3.1.2672`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
    /// The string as reported by the server.
    pub raw: String,
}

impl ServerVersion {
    /// Parses a dotted version string.
    ///
    /// Missing components default to 0 and anything after the numeric prefix
    /// (e.g. `-lts`, `.altinitystable`) is ignored. At least a major number is required.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let numeric_end = trimmed
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(trimmed.len());

        let mut parts = trimmed[..numeric_end]
            .split('.')
            .take_while(|p| !p.is_empty())
            .map(|p| p.parse::<u32>());

        let mut next = || -> Result<Option<u32>> {
            parts
                .next()
                .transpose()
                .map_err(|e| LookoutError::query(format!("Unrecognized server version '{raw}': {e}")))
        };

        let major = next()?
            .ok_or_else(|| LookoutError::query(format!("Unrecognized server version '{raw}'")))?;
        let minor = next()?.unwrap_or(0);
        let patch = next()?.unwrap_or(0);
        let build = next()?.unwrap_or(0);

        Ok(Self {
            major,
            minor,
            patch,
            build,
            raw: trimmed.to_string(),
        })
    }

    /// Returns true if this version is at or above `min`, comparing major and minor only.
    pub fn at_least(&self, min: &ServerVersion) -> bool {
        (self.major, self.minor) >= (min.major, min.minor)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.raw.is_empty() {
            write!(f, "{}.{}.{}.{}", self.major, self.minor, self.patch, self.build)
        } else {
            f.write_str(&self.raw)
        }
    }
}

impl std::str::FromStr for ServerVersion {
    type Err = LookoutError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_version() {
        let v = ServerVersion::parse("24.3.1.2672").unwrap();
        assert_eq!((v.major, v.minor, v.patch, v.build), (24, 3, 1, 2672));
        assert_eq!(v.raw, "24.3.1.2672");
    }

    #[test]
    fn test_parse_short_version() {
        let v = ServerVersion::parse("23.8").unwrap();
        assert_eq!((v.major, v.minor, v.patch, v.build), (23, 8, 0, 0));
    }

    #[test]
    fn test_parse_ignores_suffix() {
        let v = ServerVersion::parse("23.8.16.40-lts").unwrap();
        assert_eq!((v.major, v.minor), (23, 8));
        let v = ServerVersion::parse("22.3.15.34.altinitystable").unwrap();
        assert_eq!(v.build, 34);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ServerVersion::parse("").is_err());
        assert!(ServerVersion::parse("latest").is_err());
    }

    #[test]
    fn test_at_least_ignores_patch_and_build() {
        let v = ServerVersion::parse("24.1.0.1").unwrap();
        assert!(v.at_least(&ServerVersion::parse("24.1.9.9").unwrap()));
        assert!(v.at_least(&ServerVersion::parse("23.12").unwrap()));
        assert!(!v.at_least(&ServerVersion::parse("24.2").unwrap()));
    }

    #[test]
    fn test_display_uses_raw() {
        let v: ServerVersion = "24.3.1.2672".parse().unwrap();
        assert_eq!(v.to_string(), "24.3.1.2672");
    }
}
