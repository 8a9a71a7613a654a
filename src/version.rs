use std::fmt;

use semver::Version;

use crate::error::Error;

/// A database schema version: a semver triple under a mandatory `v`
/// prefix. Example: `v0.0.1`.
///
/// `v0.0.0` is the pre-initialization sentinel: it never names a real
/// release, only the synthetic starting point of an empty database.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionId(Version);

impl VersionId {
    /// The pre-initialization sentinel, `v0.0.0`.
    pub fn zero() -> Self {
        VersionId(Version::new(0, 0, 0))
    }

    /// Parses `v<major>.<minor>.<patch>`. The leading `v` is mandatory.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let Some(rest) = input.strip_prefix('v') else {
            return Err(Error::Config(
                "the database version must start with 'v'".to_string(),
            ));
        };
        let version = Version::parse(rest)
            .map_err(|_| Error::Config(format!("Malformed version: {input}")))?;
        Ok(VersionId(version))
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let v = VersionId::parse("v0.1.2").unwrap();
        assert_eq!(v.to_string(), "v0.1.2");
    }

    #[test]
    fn orders_by_semver() {
        let a = VersionId::parse("v0.0.3").unwrap();
        let b = VersionId::parse("v0.0.10").unwrap();
        let c = VersionId::parse("v1.0.0").unwrap();
        assert!(a < b);
        assert!(b < c);
        assert!(VersionId::zero() < a);
    }

    #[test]
    fn rejects_missing_prefix() {
        let err = VersionId::parse("0.0.1").unwrap_err();
        assert_eq!(err.to_string(), "the database version must start with 'v'");
    }

    #[test]
    fn rejects_malformed_remainder() {
        let err = VersionId::parse("v0.x").unwrap_err();
        assert_eq!(err.to_string(), "Malformed version: v0.x");
    }

    #[test]
    fn zero_is_the_sentinel() {
        assert_eq!(VersionId::zero(), VersionId::parse("v0.0.0").unwrap());
    }
}
