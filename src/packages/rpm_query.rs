// src/packages/rpm_query.rs

//! Query installed RPM packages inside a rootfs
//!
//! Uses the host's `rpm` and `repoquery` binaries pointed at the rootfs with
//! `--root`/`--installroot`, so nothing inside the image is executed.

use crate::error::Result;
use crate::process::{TimeBudget, ToolCommand};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, warn};

/// Locations of the RPM database relative to a root
const RPMDB_DIRS: &[&str] = &["var/lib/rpm", "usr/lib/sysimage/rpm"];

/// Check whether the rootfs carries an RPM database
pub fn has_rpm_database(root: &Path) -> bool {
    RPMDB_DIRS.iter().any(|dir| root.join(dir).is_dir())
}

/// List identifiers of all packages installed in `root`
///
/// Output of `rpm -qa` is one identifier per line; empty lines are dropped.
pub fn list_installed_packages(rpm: &str, root: &Path, budget: &TimeBudget) -> Result<Vec<String>> {
    debug!("Querying installed RPM packages in {}", root.display());

    let output = ToolCommand::new(rpm)
        .arg("-qa")
        .arg("--root")
        .arg(root)
        .budget(budget)
        .run()?;

    let packages = parse_package_list(&output);
    debug!("Found {} installed RPM packages", packages.len());
    Ok(packages)
}

/// Split newline-separated package identifiers
pub fn parse_package_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Query the dependency list of every installed package in `root`
pub fn query_dependencies(
    repoquery: &str,
    root: &Path,
    budget: &TimeBudget,
) -> Result<BTreeMap<String, Vec<String>>> {
    debug!("Querying RPM dependencies in {}", root.display());

    let output = ToolCommand::new(repoquery)
        .args(["--deplist", "--installed", "--installroot"])
        .arg(root)
        .budget(budget)
        .run()?;

    Ok(parse_deplist(&output))
}

/// Parse the streamed `package:` / `dependency:` report
///
/// Lines other than those two (for example `provider:`) are ignored. A
/// package stated twice keeps accumulating dependencies. A dependency that
/// precedes any package line is dropped.
pub fn parse_deplist(output: &str) -> BTreeMap<String, Vec<String>> {
    let mut result: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(package) = line.strip_prefix("package: ") {
            let package = package.trim().to_string();
            if result.contains_key(&package) {
                warn!(
                    "Package {:?} was already stated in the repoquery output, dependencies will be appended",
                    package
                );
            } else {
                result.insert(package.clone(), Vec::new());
            }
            current = Some(package);
        } else if let Some(dependency) = line.strip_prefix("dependency: ") {
            match current.as_ref().and_then(|p| result.get_mut(p)) {
                Some(deps) => deps.push(dependency.trim().to_string()),
                None => error!(
                    "Stated dependency {:?} has no package associated (parser error?), this error is not fatal",
                    dependency
                ),
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_list_strips_trailing_line() {
        let out = "bash-5.1.8-6.el9.x86_64\nglibc-2.34-40.el9.x86_64\n";
        assert_eq!(
            parse_package_list(out),
            vec!["bash-5.1.8-6.el9.x86_64", "glibc-2.34-40.el9.x86_64"]
        );
        assert!(parse_package_list("").is_empty());
    }

    #[test]
    fn test_parse_deplist() {
        let out = "\
package: bash-5.1.8-6.el9.x86_64
  dependency: filesystem >= 3
   provider: filesystem-3.16-2.el9.x86_64
  dependency: libc.so.6(GLIBC_2.34)(64bit)
   provider: glibc-2.34-40.el9.x86_64

package: filesystem-3.16-2.el9.x86_64
  dependency: setup
";
        let deps = parse_deplist(out);
        assert_eq!(deps.len(), 2);
        assert_eq!(
            deps["bash-5.1.8-6.el9.x86_64"],
            vec!["filesystem >= 3", "libc.so.6(GLIBC_2.34)(64bit)"]
        );
        assert_eq!(deps["filesystem-3.16-2.el9.x86_64"], vec!["setup"]);
    }

    #[test]
    fn test_parse_deplist_orphan_dependency_and_repeat() {
        let out = "\
dependency: orphan
package: a-1-1.noarch
dependency: x
package: a-1-1.noarch
dependency: y
";
        let deps = parse_deplist(out);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps["a-1-1.noarch"], vec!["x", "y"]);
    }

    #[test]
    fn test_has_rpm_database() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!has_rpm_database(dir.path()));
        std::fs::create_dir_all(dir.path().join("var/lib/rpm")).unwrap();
        assert!(has_rpm_database(dir.path()));
    }
}
