// src/buildlog/pip3.rs

//! pip install output parser
//!
//! Two kinds of lines matter:
//!
//! - `Collecting attrs==19.1.0 (from pytest)`: one requirement, optionally
//!   naming the requirement that pulled it in
//! - `Successfully installed attrs-19.1.0 six-1.16.0`: the final summary,
//!   used only to cross-check what was collected

use super::{HandlerResult, LogHandler};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{info, warn};

static COLLECTING_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^Collecting ([+a-zA-Z_\-.():/0-9>=<;"~!@,\[\]]+) \(from ([a-zA-Z_\-.():/0-9>=<~!,\[\] ]+)\)$"#,
    )
    .unwrap()
});

static COLLECTING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^Collecting ([+a-zA-Z_\-.():/0-9>=<;"~!@,\[\]]+)$"#).unwrap()
});

const INSTALLED_PREFIX: &str = "Successfully installed ";

/// Version used for VCS requirements without an explicit ref
const DEFAULT_GIT_REF: &str = "master";

/// PEP 440 comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionSpecifier {
    #[serde(rename = "~=")]
    Compatible,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "===")]
    Arbitrary,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "<=")]
    LessEqual,
    #[serde(rename = ">=")]
    GreaterEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
}

impl VersionSpecifier {
    /// Operators in the order they are tried when splitting a requirement
    pub const SEARCH_ORDER: [VersionSpecifier; 8] = [
        Self::Compatible,
        Self::NotEqual,
        Self::Arbitrary,
        Self::Equal,
        Self::LessEqual,
        Self::GreaterEqual,
        Self::Greater,
        Self::Less,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compatible => "~=",
            Self::NotEqual => "!=",
            Self::Arbitrary => "===",
            Self::Equal => "==",
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::Greater => ">",
            Self::Less => "<",
        }
    }
}

impl std::fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed requirement string such as `attrs>=19.1.0`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipPackage {
    pub package: String,
    pub version_specifier: Option<VersionSpecifier>,
    pub version: Option<String>,
}

impl PipPackage {
    /// Split a requirement into name, operator and version
    ///
    /// The first operator in [`VersionSpecifier::SEARCH_ORDER`] that splits
    /// the string (at its last occurrence) into two non-empty parts wins. A
    /// string with no operator is a bare name.
    pub fn parse(specifier: &str) -> Self {
        if specifier.starts_with("git+") {
            warn!(
                "Detected installing a Python package from a git repository: {:?}",
                specifier
            );
            return match specifier.rsplit_once('@') {
                Some((package, git_ref)) => Self {
                    package: package.to_string(),
                    version_specifier: None,
                    version: Some(git_ref.to_string()),
                },
                None => Self {
                    package: specifier.to_string(),
                    version_specifier: None,
                    version: Some(DEFAULT_GIT_REF.to_string()),
                },
            };
        }

        for op in VersionSpecifier::SEARCH_ORDER {
            if let Some((package, version)) = specifier.rsplit_once(op.as_str()) {
                if !package.is_empty() && !version.is_empty() {
                    return Self {
                        package: package.to_string(),
                        version_specifier: Some(op),
                        version: Some(version.to_string()),
                    };
                }
            }
        }

        Self {
            package: specifier.to_string(),
            version_specifier: None,
            version: None,
        }
    }
}

/// One `Collecting` line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipRequirement {
    #[serde(flatten)]
    pub requirement: PipPackage,
    /// Requirement that pulled this one in, if pip reported it
    pub from: Option<PipPackage>,
}

/// Handler for pip3 build output
#[derive(Debug, Clone, Copy, Default)]
pub struct Pip3Handler;

impl Pip3Handler {
    pub fn parse(&self, input: &str) -> Vec<PipRequirement> {
        let mut result = Vec::new();

        for line in input.lines() {
            let line = line.trim_end_matches('\r');

            if let Some(caps) = COLLECTING_FROM_RE.captures(line) {
                result.push(PipRequirement {
                    requirement: PipPackage::parse(&caps[1]),
                    from: Some(PipPackage::parse(&caps[2])),
                });
            } else if let Some(caps) = COLLECTING_RE.captures(line) {
                result.push(PipRequirement {
                    requirement: PipPackage::parse(&caps[1]),
                    from: None,
                });
            } else if let Some(installed) = line.strip_prefix(INSTALLED_PREFIX) {
                for entry in installed.split_whitespace() {
                    match entry.rsplit_once('-') {
                        Some((name, version)) => check_entry(&result, name, version),
                        None => warn!("Unable to parse installed package entry {:?}", entry),
                    }
                }
            }
        }

        result
    }
}

/// Cross-check collected requirements against an installed `name-version`
///
/// Only logs; collected records are never changed.
fn check_entry(result: &[PipRequirement], name: &str, version: &str) {
    let matched: Vec<&PipPackage> = result
        .iter()
        .map(|r| &r.requirement)
        .filter(|r| r.package == name)
        .collect();

    if matched.len() > 1 {
        let versions: Vec<Option<&str>> = matched.iter().map(|r| r.version.as_deref()).collect();
        warn!(
            "Package {:?} was installed multiple times in versions {:?}",
            name, versions
        );
    }

    if !matched.iter().any(|r| r.version.as_deref() == Some(version)) {
        let specifiers: Vec<(Option<&str>, Option<&str>)> = matched
            .iter()
            .map(|r| {
                (
                    r.version_specifier.as_ref().map(VersionSpecifier::as_str),
                    r.version.as_deref(),
                )
            })
            .collect();
        info!(
            "Installation of Python package {:?} using pip with version specifiers {:?} installed version {}",
            name, specifiers, version
        );
    }
}

impl LogHandler for Pip3Handler {
    fn run(&self, input: &str) -> HandlerResult {
        HandlerResult::Pip3(self.parse(input))
    }
}
