// src/analyzer/mod.rs

//! Filesystem analyzer
//!
//! Runs a fixed set of read-only inspections against a rootfs and collects
//! their findings into one [`AnalyzerResult`]:
//!
//! | Key | Source |
//! |-----|--------|
//! | `rpm` | `rpm -qa --root` |
//! | `rpm-dependencies` | `repoquery --deplist --installed --installroot` |
//! | `deb` | `dpkg-query -l` against the rootfs admin dir |
//! | `deb-dependencies` | `dpkg-query -s` against the rootfs admin dir |
//! | `python-files` | walk of `*.py` files |
//! | `python-packages` | walk of dist-info/egg-info metadata |
//!
//! Inspections are independent. A missing database, a missing host tool or
//! a failing command only empties that inspection's key; the one failure
//! that aborts the analysis is a timeout.

pub mod merge;
pub mod python;

pub use merge::IncrementalMerger;
pub use python::{PackageDigests, PythonFile, PythonPackage};

use crate::error::Result;
use crate::packages::nvra::PackageIdentifier;
use crate::packages::{DpkgRelations, DpkgRequirement, InstalledDpkgInfo, dpkg_query, rpm_query};
use crate::process::TimeBudget;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Host binaries used by the inspections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerTools {
    pub rpm: String,
    pub repoquery: String,
    pub dpkg_query: String,
}

impl Default for AnalyzerTools {
    fn default() -> Self {
        Self {
            rpm: "rpm".to_string(),
            repoquery: "repoquery".to_string(),
            dpkg_query: "dpkg-query".to_string(),
        }
    }
}

/// An installed RPM package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpmPackage {
    /// Identifier exactly as reported by `rpm -qa`
    pub package_identifier: String,
    /// Parsed fields, absent when the identifier does not parse
    #[serde(flatten)]
    pub parsed: Option<PackageIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
}

impl RpmPackage {
    pub fn new(identifier: &str) -> Self {
        let parsed = match PackageIdentifier::parse(identifier) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Unable to parse RPM identifier {:?}: {}", identifier, e);
                None
            }
        };
        Self {
            package_identifier: identifier.to_string(),
            parsed,
            layer: None,
        }
    }
}

/// An installed Debian package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebPackage {
    pub name: String,
    pub version: String,
    pub arch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
}

/// Relationship fields of a Debian package, merged across layers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DebDependencies {
    #[serde(rename = "pre-depends")]
    pub pre_depends: BTreeSet<DpkgRequirement>,
    pub depends: BTreeSet<DpkgRequirement>,
    pub replaces: BTreeSet<DpkgRequirement>,
}

impl DebDependencies {
    fn union(&mut self, other: DebDependencies) {
        self.pre_depends.extend(other.pre_depends);
        self.depends.extend(other.depends);
        self.replaces.extend(other.replaces);
    }
}

impl From<DpkgRelations> for DebDependencies {
    fn from(relations: DpkgRelations) -> Self {
        Self {
            pre_depends: relations.pre_depends.into_iter().collect(),
            depends: relations.depends.into_iter().collect(),
            replaces: relations.replaces.into_iter().collect(),
        }
    }
}

/// Findings of every inspection, keyed by inspection name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalyzerResult {
    pub rpm: Vec<RpmPackage>,
    #[serde(rename = "rpm-dependencies")]
    pub rpm_dependencies: BTreeMap<String, BTreeSet<String>>,
    pub deb: Vec<DebPackage>,
    #[serde(rename = "deb-dependencies")]
    pub deb_dependencies: BTreeMap<String, DebDependencies>,
    #[serde(rename = "python-files")]
    pub python_files: Vec<PythonFile>,
    #[serde(rename = "python-packages")]
    pub python_packages: Vec<PythonPackage>,
    /// Layer digests in image order, empty outside the image path
    pub layers: Vec<String>,
}

/// Normalize an RPM identifier so `rpm` and `repoquery` spellings agree
///
/// `repoquery` prints an explicit zero epoch (`bash-0:5.1-1.x86_64`) that
/// `rpm -qa` leaves out.
pub fn normalize_rpm_identifier(identifier: &str) -> String {
    match PackageIdentifier::parse(identifier) {
        Ok(parsed) => parsed.to_string(),
        Err(e) => {
            warn!("Keeping unparsable RPM identifier {:?} as is: {}", identifier, e);
            identifier.to_string()
        }
    }
}

/// Turn a soft inspection failure into an empty contribution
fn soft<T: Default>(inspection: &str, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_timeout() => Err(e),
        Err(e) => {
            warn!("Inspection {} failed, it contributes no results: {}", inspection, e);
            Ok(T::default())
        }
    }
}

/// Runs the inspection battery against a rootfs
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    tools: AnalyzerTools,
}

impl Analyzer {
    pub fn new(tools: AnalyzerTools) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &AnalyzerTools {
        &self.tools
    }

    /// Run every inspection against `root`
    ///
    /// Each external command gets whatever is left of `budget`.
    pub fn analyze(&self, root: &Path, budget: &TimeBudget) -> Result<AnalyzerResult> {
        info!("Analyzing rootfs {}", root.display());

        // One listing feeds both deb keys
        let installed_deb = soft("deb", self.deb_installed(root, budget))?;

        let result = AnalyzerResult {
            rpm: soft("rpm", self.rpm_packages(root, budget))?,
            rpm_dependencies: soft("rpm-dependencies", self.rpm_dependencies(root, budget))?,
            deb: deb_packages(&installed_deb),
            deb_dependencies: soft(
                "deb-dependencies",
                self.deb_dependencies(root, &installed_deb, budget),
            )?,
            python_files: python::python_files(root),
            python_packages: python::python_packages(root),
            layers: Vec::new(),
        };

        debug!(
            "Analysis found {} rpm, {} deb, {} Python packages and {} Python files",
            result.rpm.len(),
            result.deb.len(),
            result.python_packages.len(),
            result.python_files.len()
        );
        Ok(result)
    }

    fn rpm_packages(&self, root: &Path, budget: &TimeBudget) -> Result<Vec<RpmPackage>> {
        if !rpm_query::has_rpm_database(root) {
            debug!("No RPM database in {}", root.display());
            return Ok(Vec::new());
        }
        let identifiers = rpm_query::list_installed_packages(&self.tools.rpm, root, budget)?;
        Ok(identifiers.iter().map(|id| RpmPackage::new(id)).collect())
    }

    fn rpm_dependencies(
        &self,
        root: &Path,
        budget: &TimeBudget,
    ) -> Result<BTreeMap<String, BTreeSet<String>>> {
        if !rpm_query::has_rpm_database(root) {
            return Ok(BTreeMap::new());
        }
        let deplist = rpm_query::query_dependencies(&self.tools.repoquery, root, budget)?;

        let mut result: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (package, deps) in deplist {
            result
                .entry(normalize_rpm_identifier(&package))
                .or_default()
                .extend(deps);
        }
        Ok(result)
    }

    fn deb_installed(&self, root: &Path, budget: &TimeBudget) -> Result<Vec<InstalledDpkgInfo>> {
        if !dpkg_query::has_dpkg_database(root) {
            debug!("No dpkg database in {}", root.display());
            return Ok(Vec::new());
        }
        dpkg_query::list_installed_packages(&self.tools.dpkg_query, root, budget)
    }

    fn deb_dependencies(
        &self,
        root: &Path,
        installed: &[InstalledDpkgInfo],
        budget: &TimeBudget,
    ) -> Result<BTreeMap<String, DebDependencies>> {
        let names: Vec<String> = installed.iter().map(|info| info.name.clone()).collect();
        let blocks = dpkg_query::query_relations(&self.tools.dpkg_query, root, &names, budget)?;

        let mut result: BTreeMap<String, DebDependencies> = BTreeMap::new();
        for block in blocks {
            let name = block.name.clone();
            result.entry(name).or_default().union(block.into());
        }
        Ok(result)
    }
}

fn deb_packages(installed: &[InstalledDpkgInfo]) -> Vec<DebPackage> {
    installed
        .iter()
        .map(|info| DebPackage {
            name: info.name.clone(),
            version: info.version.clone(),
            arch: info.arch.clone(),
            layer: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_normalize_rpm_identifier() {
        assert_eq!(
            normalize_rpm_identifier("bash-0:5.1.8-6.el9.x86_64"),
            "bash-5.1.8-6.el9.x86_64"
        );
        assert_eq!(normalize_rpm_identifier("not-an-rpm"), "not-an-rpm");
    }

    #[test]
    fn test_soft_failure_is_empty() {
        let value: Vec<String> = soft("rpm", Err(Error::ToolNotFound("rpm".into()))).unwrap();
        assert!(value.is_empty());

        let err = soft::<Vec<String>>(
            "rpm",
            Err(Error::TimeoutExpired {
                command: "rpm -qa".into(),
                seconds: 1,
            }),
        )
        .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_rpm_package_serialization() {
        let json = serde_json::to_value(RpmPackage::new("foo-1.2.3-4.el7.x86_64")).unwrap();
        assert_eq!(json["package_identifier"], "foo-1.2.3-4.el7.x86_64");
        assert_eq!(json["name"], "foo");
        assert_eq!(json["arch"], "x86_64");
        assert!(json.get("layer").is_none());
    }

    #[test]
    fn test_empty_rootfs_yields_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let result = Analyzer::default()
            .analyze(dir.path(), &TimeBudget::unlimited())
            .unwrap();
        assert_eq!(result, AnalyzerResult::default());

        let json = serde_json::to_value(&result).unwrap();
        for key in [
            "rpm",
            "rpm-dependencies",
            "deb",
            "deb-dependencies",
            "python-files",
            "python-packages",
            "layers",
        ] {
            assert!(json.get(key).is_some(), "missing key {}", key);
        }
    }

    #[test]
    fn test_missing_tool_degrades() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("var/lib/rpm")).unwrap();
        let tools = AnalyzerTools {
            rpm: "definitely-not-rpm-7d1e".into(),
            repoquery: "definitely-not-repoquery-7d1e".into(),
            ..AnalyzerTools::default()
        };
        let result = Analyzer::new(tools)
            .analyze(dir.path(), &TimeBudget::unlimited())
            .unwrap();
        assert!(result.rpm.is_empty());
        assert!(result.rpm_dependencies.is_empty());
    }
}
