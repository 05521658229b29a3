// src/analyzer/python.rs

//! Python content inspections
//!
//! Both inspections walk the rootfs natively instead of running anything
//! from inside the image:
//!
//! - every `*.py` file is hashed with SHA-256
//! - installed distributions are found through `*.dist-info/METADATA` and
//!   `*.egg-info/PKG-INFO` (or a bare `*.egg-info` file)
//!
//! Reported paths are absolute within the image, not on the host.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A Python source file found in the rootfs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PythonFile {
    pub filepath: String,
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
}

/// Digests of a distribution's metadata file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageDigests {
    pub manifest: String,
}

/// An installed Python distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PythonPackage {
    pub name: String,
    pub version: String,
    pub path: String,
    pub digests: PackageDigests,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
}

/// SHA-256 of a file as lowercase hex
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Path of `path` as seen from inside the image rooted at `root`
pub fn image_path(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => format!("/{}", rel.display()),
        Err(_) => path.display().to_string(),
    }
}

/// Regular files under `root`, symlinks are not followed
fn walk_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable path during walk: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
}

/// Hash every `*.py` file in the rootfs
pub fn python_files(root: &Path) -> Vec<PythonFile> {
    let mut result = Vec::new();

    for path in walk_files(root) {
        if path.extension().and_then(|e| e.to_str()) != Some("py") {
            continue;
        }
        match sha256_file(&path) {
            Ok(sha256) => result.push(PythonFile {
                filepath: image_path(root, &path),
                sha256,
                layer: None,
            }),
            Err(e) => warn!("Unable to hash {}: {}", path.display(), e),
        }
    }

    debug!("Found {} Python files", result.len());
    result
}

/// Whether `path` is a distribution metadata file
fn is_metadata_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let parent = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .unwrap_or("");

    match name {
        "METADATA" => parent.ends_with(".dist-info"),
        "PKG-INFO" => parent.ends_with(".egg-info"),
        _ => name.ends_with(".egg-info"),
    }
}

/// Read `Name` and `Version` from the header block of a metadata file
pub fn parse_metadata<R: BufRead>(reader: R) -> io::Result<Option<(String, String)>> {
    let mut name = None;
    let mut version = None;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Name:") {
            name.get_or_insert_with(|| value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("Version:") {
            version.get_or_insert_with(|| value.trim().to_string());
        }
        if name.is_some() && version.is_some() {
            break;
        }
    }

    Ok(name.zip(version))
}

/// Find installed distributions in the rootfs
pub fn python_packages(root: &Path) -> Vec<PythonPackage> {
    let mut result = Vec::new();

    for path in walk_files(root) {
        if !is_metadata_file(&path) {
            continue;
        }

        let parsed = File::open(&path).map(BufReader::new).and_then(parse_metadata);
        let (name, version) = match parsed {
            Ok(Some(fields)) => fields,
            Ok(None) => {
                debug!("No name and version in {}", path.display());
                continue;
            }
            Err(e) => {
                warn!("Unable to read {}: {}", path.display(), e);
                continue;
            }
        };

        match sha256_file(&path) {
            Ok(manifest) => result.push(PythonPackage {
                name,
                version,
                path: image_path(root, &path),
                digests: PackageDigests { manifest },
                layer: None,
            }),
            Err(e) => warn!("Unable to hash {}: {}", path.display(), e),
        }
    }

    debug!("Found {} installed Python distributions", result.len());
    result
}
