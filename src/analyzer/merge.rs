// src/analyzer/merge.rs

//! Layer-by-layer result merging
//!
//! When an image is analyzed after each applied layer, every run sees the
//! composited filesystem so far and reports everything again. The merger
//! keeps only records it has not seen in an earlier layer and tags them with
//! the layer that introduced them.
//!
//! Identity per key:
//!
//! - `rpm`: the full package identifier
//! - `deb`: name and version
//! - `python-files`: path and content digest
//! - `python-packages`: name, version and metadata digest
//!
//! Dependency maps are merged as a union per package.

use super::AnalyzerResult;
use std::collections::HashSet;
use tracing::debug;

/// Accumulates per-layer analyzer results
#[derive(Debug, Default)]
pub struct IncrementalMerger {
    result: AnalyzerResult,
    seen_rpm: HashSet<String>,
    seen_deb: HashSet<(String, String)>,
    seen_python_files: HashSet<(String, String)>,
    seen_python_packages: HashSet<(String, String, String)>,
}

impl IncrementalMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the analysis of the rootfs after `layer` was applied
    pub fn merge(&mut self, layer: &str, output: AnalyzerResult) {
        let before = self.record_count();
        let tag = Some(layer.to_string());

        for mut package in output.rpm {
            if self.seen_rpm.insert(package.package_identifier.clone()) {
                package.layer = tag.clone();
                self.result.rpm.push(package);
            }
        }

        for (package, deps) in output.rpm_dependencies {
            self.result
                .rpm_dependencies
                .entry(package)
                .or_default()
                .extend(deps);
        }

        for mut package in output.deb {
            if self
                .seen_deb
                .insert((package.name.clone(), package.version.clone()))
            {
                package.layer = tag.clone();
                self.result.deb.push(package);
            }
        }

        for (package, deps) in output.deb_dependencies {
            self.result
                .deb_dependencies
                .entry(package)
                .or_default()
                .union(deps);
        }

        for mut file in output.python_files {
            if self
                .seen_python_files
                .insert((file.filepath.clone(), file.sha256.clone()))
            {
                file.layer = tag.clone();
                self.result.python_files.push(file);
            }
        }

        for mut package in output.python_packages {
            let key = (
                package.name.clone(),
                package.version.clone(),
                package.digests.manifest.clone(),
            );
            if self.seen_python_packages.insert(key) {
                package.layer = tag.clone();
                self.result.python_packages.push(package);
            }
        }

        self.result.layers.push(layer.to_string());
        debug!(
            "Layer {} introduced {} new records",
            layer,
            self.record_count() - before
        );
    }

    fn record_count(&self) -> usize {
        self.result.rpm.len()
            + self.result.deb.len()
            + self.result.python_files.len()
            + self.result.python_packages.len()
    }

    /// Current accumulated result
    pub fn result(&self) -> &AnalyzerResult {
        &self.result
    }

    pub fn finish(self) -> AnalyzerResult {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{DebPackage, PackageDigests, PythonPackage, RpmPackage};
    use std::collections::BTreeSet;

    fn rpm_output(ids: &[&str]) -> AnalyzerResult {
        AnalyzerResult {
            rpm: ids.iter().map(|id| RpmPackage::new(id)).collect(),
            ..AnalyzerResult::default()
        }
    }

    #[test]
    fn test_first_layer_wins() {
        let mut merger = IncrementalMerger::new();
        merger.merge("L1", rpm_output(&["bash-5.1.8-6.el9.x86_64"]));
        merger.merge(
            "L2",
            rpm_output(&["bash-5.1.8-6.el9.x86_64", "vim-9.0-1.el9.x86_64"]),
        );

        let result = merger.finish();
        assert_eq!(result.rpm.len(), 2);
        assert_eq!(result.rpm[0].package_identifier, "bash-5.1.8-6.el9.x86_64");
        assert_eq!(result.rpm[0].layer.as_deref(), Some("L1"));
        assert_eq!(result.rpm[1].layer.as_deref(), Some("L2"));
        assert_eq!(result.layers, vec!["L1", "L2"]);
    }

    #[test]
    fn test_new_version_is_new_record() {
        let mut merger = IncrementalMerger::new();
        let deb = |version: &str| AnalyzerResult {
            deb: vec![DebPackage {
                name: "libc6".into(),
                version: version.into(),
                arch: "amd64".into(),
                layer: None,
            }],
            ..AnalyzerResult::default()
        };
        merger.merge("L1", deb("2.36-9"));
        merger.merge("L2", deb("2.36-9"));
        merger.merge("L3", deb("2.36-10"));

        let result = merger.finish();
        assert_eq!(result.deb.len(), 2);
        assert_eq!(result.deb[1].layer.as_deref(), Some("L3"));
    }

    #[test]
    fn test_python_package_identity_includes_digest() {
        let package = |digest: &str| PythonPackage {
            name: "attrs".into(),
            version: "23.1.0".into(),
            path: "/usr/lib/python3/site-packages/attrs-23.1.0.dist-info/METADATA".into(),
            digests: PackageDigests {
                manifest: digest.into(),
            },
            layer: None,
        };
        let mut merger = IncrementalMerger::new();
        for (layer, digest) in [("L1", "aa"), ("L2", "aa"), ("L3", "bb")] {
            merger.merge(
                layer,
                AnalyzerResult {
                    python_packages: vec![package(digest)],
                    ..AnalyzerResult::default()
                },
            );
        }
        let result = merger.finish();
        assert_eq!(result.python_packages.len(), 2);
        assert_eq!(result.python_packages[0].layer.as_deref(), Some("L1"));
        assert_eq!(result.python_packages[1].layer.as_deref(), Some("L3"));
    }

    #[test]
    fn test_dependencies_union() {
        let deps = |items: &[&str]| {
            let mut output = AnalyzerResult::default();
            output.rpm_dependencies.insert(
                "bash-5.1.8-6.el9.x86_64".to_string(),
                items.iter().map(|s| s.to_string()).collect(),
            );
            output
        };
        let mut merger = IncrementalMerger::new();
        merger.merge("L1", deps(&["filesystem >= 3"]));
        merger.merge("L2", deps(&["filesystem >= 3", "glibc"]));

        let expected: BTreeSet<String> =
            ["filesystem >= 3", "glibc"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            merger.result().rpm_dependencies["bash-5.1.8-6.el9.x86_64"],
            expected
        );
    }
}
