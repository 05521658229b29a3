// src/packages/nvra.rs

//! Package identifier (NVRA) parsing
//!
//! Installed-package listings and dependency reports name packages with
//! packed identifiers such as `bash-5.1.8-6.el9.x86_64`. This module splits
//! them into name, version, release, epoch and architecture.
//!
//! Accepted epoch placements:
//! - `E:N-V-R.A` (yum/dnf style)
//! - `N-V-R.A:E` and `N-V-R.A.rpm:E`
//! - `N-E:V-R.A` (epoch inside the version segment)
//!
//! The epoch disambiguation prefers whichever side of a single `:` has no
//! `-`. That is a heuristic; identifiers carrying two colons are rejected.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Architecture token marking a source package
pub const SOURCE_ARCH: &str = "src";

/// A parsed package identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageIdentifier {
    pub name: String,
    pub version: String,
    pub release: String,
    /// Numeric epoch text, when the identifier carried one
    pub epoch: Option<String>,
    pub arch: Option<String>,
    pub is_source: bool,
    /// Storage location from an `@location` suffix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl PackageIdentifier {
    /// Parse a `name-version-release.arch[.rpm]` identifier
    pub fn parse(identifier: &str) -> Result<Self> {
        parse_nvra(identifier)
    }

    /// Parse a `name-version-release` identifier without architecture
    pub fn parse_nvr(identifier: &str) -> Result<Self> {
        parse_nvr(identifier)
    }

    /// Version with optional epoch and release (`E:V-R`)
    pub fn evr(&self) -> String {
        match &self.epoch {
            Some(epoch) => format!("{}:{}-{}", epoch, self.version, self.release),
            None => format!("{}-{}", self.version, self.release),
        }
    }

    /// Epoch as an integer, zero when absent
    pub fn epoch_number(&self) -> u64 {
        self.epoch
            .as_deref()
            .and_then(|e| e.parse().ok())
            .unwrap_or(0)
    }
}

impl fmt::Display for PackageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.name, self.version, self.release)?;
        if let Some(ref arch) = self.arch {
            write!(f, ".{}", arch)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for PackageIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_nvra(s)
    }
}

fn invalid(what: &str, identifier: &str) -> Error {
    Error::InvalidIdentifier(format!("{} in '{}'", what, identifier))
}

/// Drop any storage path in front of the identifier
fn strip_path(identifier: &str) -> &str {
    match identifier.rsplit_once('/') {
        Some((_, tail)) => tail,
        None => identifier,
    }
}

/// Split an identifier into its `N-V-R` part and epoch
///
/// Returns an empty epoch when none is present or when the colon sits inside
/// the version segment (`N-E:V-R`), which is resolved after the NVR split.
fn split_epoch(nvre: &str) -> Result<(&str, &str)> {
    let Some((left, right)) = nvre.split_once(':') else {
        return Ok((nvre, ""));
    };

    if right.contains(':') {
        return Err(invalid("more than one ':'", nvre));
    }

    if right.contains('-') {
        if left.contains('-') {
            // N-E:V-R
            Ok((nvre, ""))
        } else {
            // E:N-V-R
            Ok((right, left))
        }
    } else {
        Ok((left, right))
    }
}

fn check_epoch(epoch: &str, identifier: &str) -> Result<()> {
    epoch
        .parse::<u64>()
        .map(|_| ())
        .map_err(|_| invalid(&format!("invalid epoch '{}'", epoch), identifier))
}

/// Split a bare `N-V-R` (epoch already removed) on its last two dashes
fn split_triple(nvr: &str, epoch: &str, identifier: &str) -> Result<PackageIdentifier> {
    let mut parts = nvr.rsplitn(3, '-');
    let (Some(release), Some(version), Some(name)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid("expected name-version-release", identifier));
    };

    let mut epoch = epoch;
    let mut version = version;
    if epoch.is_empty() {
        if let Some((e, v)) = version.split_once(':') {
            epoch = e;
            version = v;
        }
    }

    if name.is_empty() || version.is_empty() || release.is_empty() {
        return Err(invalid("empty name, version or release", identifier));
    }

    let epoch = if epoch.is_empty() {
        None
    } else {
        check_epoch(epoch, identifier)?;
        Some(epoch.to_string())
    };

    Ok(PackageIdentifier {
        name: name.to_string(),
        version: version.to_string(),
        release: release.to_string(),
        epoch,
        arch: None,
        is_source: false,
        location: None,
    })
}

/// Parse `N-V-R`, `E:N-V-R`, `N-V-R:E` or `N-E:V-R`
pub fn parse_nvr(identifier: &str) -> Result<PackageIdentifier> {
    let nvre = strip_path(identifier);
    let (nvr, epoch) = split_epoch(nvre)?;
    split_triple(nvr, epoch, identifier)
}

/// Parse `N-V-R.A[.rpm]` with any of the accepted epoch placements and an
/// optional `@location` suffix
pub fn parse_nvra(identifier: &str) -> Result<PackageIdentifier> {
    // Location first: it may itself contain path separators
    let (packed, location) = match identifier.split_once('@') {
        Some((packed, location)) => (packed, Some(location.to_string())),
        None => (identifier, None),
    };
    let mut nvra = strip_path(packed);

    // Twice, so both N-V-R.A.rpm:E and N-V-R.A:E.rpm are handled
    let mut epoch = "";
    for _ in 0..2 {
        if let Some(without_suffix) = nvra.strip_suffix(".rpm") {
            nvra = without_suffix;
        } else {
            let (rest, found) = split_epoch(nvra)?;
            nvra = rest;
            if !found.is_empty() {
                epoch = found;
            }
        }
    }

    let Some((nvr, arch)) = nvra.rsplit_once('.') else {
        return Err(invalid("missing architecture", identifier));
    };
    if arch.is_empty() || arch.contains('-') {
        return Err(invalid(&format!("invalid architecture '{}'", arch), identifier));
    }

    let mut parsed = split_triple(nvr, epoch, identifier)?;
    parsed.arch = Some(arch.to_string());
    parsed.is_source = arch == SOURCE_ARCH;
    parsed.location = location;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_nvra() {
        let p = PackageIdentifier::parse("foo-1.2.3-4.el7.x86_64").unwrap();
        assert_eq!(p.name, "foo");
        assert_eq!(p.version, "1.2.3");
        assert_eq!(p.release, "4.el7");
        assert_eq!(p.arch.as_deref(), Some("x86_64"));
        assert_eq!(p.epoch, None);
        assert!(!p.is_source);
        assert_eq!(p.location, None);
    }

    #[test]
    fn test_parse_leading_epoch_source_rpm() {
        let p = PackageIdentifier::parse("1:foo-1.2.3-4.el7.src.rpm").unwrap();
        assert_eq!(p.name, "foo");
        assert_eq!(p.version, "1.2.3");
        assert_eq!(p.release, "4.el7");
        assert_eq!(p.epoch.as_deref(), Some("1"));
        assert_eq!(p.arch.as_deref(), Some("src"));
        assert!(p.is_source);
    }

    #[test]
    fn test_parse_trailing_epoch() {
        let p = PackageIdentifier::parse("foo-1.0-1.noarch:3").unwrap();
        assert_eq!(p.epoch.as_deref(), Some("3"));
        assert_eq!(p.arch.as_deref(), Some("noarch"));

        let p = PackageIdentifier::parse("foo-1.0-1.noarch.rpm:3").unwrap();
        assert_eq!(p.epoch.as_deref(), Some("3"));
        assert_eq!(p.name, "foo");

        let p = PackageIdentifier::parse("foo-1.0-1.noarch:3.rpm").unwrap();
        assert_eq!(p.epoch.as_deref(), Some("3"));
        assert_eq!(p.release, "1");
    }

    #[test]
    fn test_parse_epoch_in_version_segment() {
        let p = PackageIdentifier::parse("perl-Pod-Simple-1:3.28-4.el7.noarch").unwrap();
        assert_eq!(p.name, "perl-Pod-Simple");
        assert_eq!(p.epoch.as_deref(), Some("1"));
        assert_eq!(p.version, "3.28");
        assert_eq!(p.release, "4.el7");
    }

    #[test]
    fn test_parse_path_and_location() {
        let p = PackageIdentifier::parse("/mnt/koji/packages/bash-5.1-2.fc36.x86_64.rpm@repo1")
            .unwrap();
        assert_eq!(p.name, "bash");
        assert_eq!(p.version, "5.1");
        assert_eq!(p.release, "2.fc36");
        assert_eq!(p.location.as_deref(), Some("repo1"));
    }

    #[test]
    fn test_two_colons_rejected() {
        let err = PackageIdentifier::parse("1:foo-1:2-3.x86_64").unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
    }

    #[test]
    fn test_non_numeric_epoch_rejected() {
        assert!(matches!(
            PackageIdentifier::parse("x:foo-1.0-1.x86_64"),
            Err(Error::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_missing_arch_rejected() {
        assert!(PackageIdentifier::parse("gpg-pubkey-fd431d51-4ae0493b").is_err());
    }

    #[test]
    fn test_dash_in_arch_rejected() {
        assert!(PackageIdentifier::parse("foo-1.0-1.el7-x86_64").is_err());
    }

    #[test]
    fn test_too_few_parts_rejected() {
        assert!(PackageIdentifier::parse("foo-1.x86_64").is_err());
        assert!(PackageIdentifier::parse_nvr("foo").is_err());
    }

    #[test]
    fn test_parse_nvr_without_arch() {
        let p = PackageIdentifier::parse_nvr("2:openssl-libs-3.0.1-43.el9").unwrap();
        assert_eq!(p.name, "openssl-libs");
        assert_eq!(p.epoch.as_deref(), Some("2"));
        assert_eq!(p.arch, None);
        assert_eq!(p.evr(), "2:3.0.1-43.el9");
        assert_eq!(p.epoch_number(), 2);
    }

    #[test]
    fn test_round_trip_unambiguous() {
        for identifier in [
            "bash-5.1.8-6.el9.x86_64",
            "python3-pip-wheel-21.2.3-6.el9.noarch",
            "glibc-langpack-en-2.34-40.el9.aarch64",
            "libstdc++-11.3.1-2.1.el9.x86_64",
        ] {
            let parsed = PackageIdentifier::parse(identifier).unwrap();
            assert_eq!(parsed.to_string(), identifier);
        }
    }
}
