// src/packages/dpkg_query.rs

//! Query installed dpkg packages inside a rootfs
//!
//! This module runs the host's `dpkg-query` with `--admindir` pointed at the
//! rootfs database and parses its listing and status blocks.

use crate::error::Result;
use crate::process::{TimeBudget, ToolCommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Status column value of a fully installed package
pub const INSTALLED_MARKER: &str = "ii";

/// dpkg database directory relative to a root
const ADMIN_DIR: &str = "var/lib/dpkg";

/// Wide enough that `dpkg-query -l` never truncates columns
const LISTING_COLUMNS: &str = "512";

/// A package listed as installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledDpkgInfo {
    pub name: String,
    pub version: String,
    pub arch: String,
}

/// One entry of a dependency field such as `libc6 (>= 2.34)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DpkgRequirement {
    pub name: String,
    pub version: Option<String>,
}

/// Relationship fields of one installed package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpkgRelations {
    pub name: String,
    pub version: String,
    pub arch: String,
    #[serde(rename = "pre-depends")]
    pub pre_depends: Vec<DpkgRequirement>,
    pub depends: Vec<DpkgRequirement>,
    pub replaces: Vec<DpkgRequirement>,
}

fn admin_dir(root: &Path) -> PathBuf {
    root.join(ADMIN_DIR)
}

/// Check whether the rootfs carries a dpkg status database
pub fn has_dpkg_database(root: &Path) -> bool {
    admin_dir(root).join("status").is_file()
}

fn admindir_arg(root: &Path) -> String {
    format!("--admindir={}", admin_dir(root).display())
}

/// List all packages in `root` whose status is installed
pub fn list_installed_packages(
    dpkg_query: &str,
    root: &Path,
    budget: &TimeBudget,
) -> Result<Vec<InstalledDpkgInfo>> {
    debug!("Querying installed dpkg packages in {}", root.display());

    let output = ToolCommand::new(dpkg_query)
        .arg(admindir_arg(root))
        .arg("-l")
        .env("COLUMNS", LISTING_COLUMNS)
        .budget(budget)
        .run()?;

    let packages = parse_listing(&output);
    debug!("Found {} installed dpkg packages", packages.len());
    Ok(packages)
}

/// Parse `dpkg-query -l` output
///
/// Header and separator lines are skipped because their first column is
/// never the installed marker.
pub fn parse_listing(output: &str) -> Vec<InstalledDpkgInfo> {
    let mut packages = Vec::new();

    for line in output.lines() {
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.first() != Some(&INSTALLED_MARKER) {
            continue;
        }
        if columns.len() < 4 {
            warn!("Skipping malformed dpkg-query output line: {}", line);
            continue;
        }

        packages.push(InstalledDpkgInfo {
            name: columns[1].to_string(),
            version: columns[2].to_string(),
            arch: columns[3].to_string(),
        });
    }

    packages
}

/// Query relationship fields for the given packages in one invocation
pub fn query_relations(
    dpkg_query: &str,
    root: &Path,
    names: &[String],
    budget: &TimeBudget,
) -> Result<Vec<DpkgRelations>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    debug!("Querying dpkg relations for {} packages", names.len());

    let output = ToolCommand::new(dpkg_query)
        .arg(admindir_arg(root))
        .arg("-s")
        .args(names)
        .budget(budget)
        .run()?;

    Ok(parse_status_blocks(&output))
}

/// Parse blank-line separated `dpkg-query -s` blocks
pub fn parse_status_blocks(output: &str) -> Vec<DpkgRelations> {
    let mut result = Vec::new();
    let mut current = DpkgRelations::default();

    for line in output.lines() {
        if line.trim().is_empty() {
            if !current.name.is_empty() {
                result.push(std::mem::take(&mut current));
            }
            continue;
        }

        // Continuation lines belong to multi-line fields we do not read
        if line.starts_with(' ') || line.starts_with('\t') {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key {
            "Package" => current.name = value.to_string(),
            "Version" => current.version = value.to_string(),
            "Architecture" => current.arch = value.to_string(),
            "Pre-Depends" => current.pre_depends = parse_relation_field(value),
            "Depends" => current.depends = parse_relation_field(value),
            "Replaces" => current.replaces = parse_relation_field(value),
            _ => {}
        }
    }

    if !current.name.is_empty() {
        result.push(current);
    }

    result
}

/// Parse a comma-separated relation list
///
/// Alternatives (`a | b`) contribute each alternative as its own entry.
pub fn parse_relation_field(value: &str) -> Vec<DpkgRequirement> {
    value
        .split(',')
        .flat_map(|dep| dep.split('|'))
        .filter_map(parse_requirement)
        .collect()
}

fn parse_requirement(token: &str) -> Option<DpkgRequirement> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    match token.split_once('(') {
        Some((name, rest)) => Some(DpkgRequirement {
            name: name.trim().to_string(),
            version: Some(rest.trim_end_matches(')').trim().to_string()),
        }),
        None => Some(DpkgRequirement {
            name: token.to_string(),
            version: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listing() {
        let out = "\
Desired=Unknown/Install/Remove/Purge/Hold
| Status=Not/Inst/Conf-files/Unpacked/halF-conf/Half-inst/trig-aWait/Trig-pend
|/ Err?=(none)/Reinst-required (Status,Err: uppercase=bad)
||/ Name           Version         Architecture Description
+++-==============-===============-============-=================================
ii  adduser        3.118           all          add and remove users and groups
rc  oldpkg         1.0             amd64        removed package
ii  libc6:amd64    2.36-9          amd64        GNU C Library: Shared libraries
";
        let packages = parse_listing(out);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "adduser");
        assert_eq!(packages[0].version, "3.118");
        assert_eq!(packages[0].arch, "all");
        assert_eq!(packages[1].name, "libc6:amd64");
    }

    #[test]
    fn test_parse_relation_field() {
        let deps = parse_relation_field("libc6 (>= 2.34), debconf (>= 0.5) | debconf-2.0, passwd");
        assert_eq!(
            deps,
            vec![
                DpkgRequirement { name: "libc6".into(), version: Some(">= 2.34".into()) },
                DpkgRequirement { name: "debconf".into(), version: Some(">= 0.5".into()) },
                DpkgRequirement { name: "debconf-2.0".into(), version: None },
                DpkgRequirement { name: "passwd".into(), version: None },
            ]
        );
        assert!(parse_relation_field("").is_empty());
    }

    #[test]
    fn test_parse_status_blocks() {
        let out = "\
Package: bash
Status: install ok installed
Architecture: amd64
Version: 5.2.15-2
Pre-Depends: libc6 (>= 2.36), libtinfo6 (>= 6)
Depends: base-files (>= 2.1.12), debianutils (>= 5.6-0.1)
Replaces: bash-completion (<< 20060301-0)
Description: GNU Bourne Again SHell
 Bash is an sh-compatible command language interpreter.
 Depends: not a field

Package: zlib1g
Architecture: amd64
Version: 1:1.2.13.dfsg-1
Depends: libc6 (>= 2.14)
";
        let blocks = parse_status_blocks(out);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].name, "bash");
        assert_eq!(blocks[0].pre_depends.len(), 2);
        assert_eq!(blocks[0].depends.len(), 2);
        assert_eq!(blocks[0].replaces[0].name, "bash-completion");
        assert_eq!(blocks[1].version, "1:1.2.13.dfsg-1");
        assert!(blocks[1].pre_depends.is_empty());
    }

    #[test]
    fn test_has_dpkg_database() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!has_dpkg_database(dir.path()));
        std::fs::create_dir_all(dir.path().join("var/lib/dpkg")).unwrap();
        std::fs::write(dir.path().join("var/lib/dpkg/status"), "").unwrap();
        assert!(has_dpkg_database(dir.path()));
    }
}
