// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// One entry of a test layer
pub enum Entry {
    File(&'static str, &'static str),
    /// File with an explicit header mode
    FileMode(&'static str, &'static str, u32),
    Dir(&'static str),
    /// Directory with an explicit header mode
    DirMode(&'static str, u32),
    Symlink(&'static str, &'static str),
}

fn append(builder: &mut tar::Builder<Vec<u8>>, entry: &Entry) {
    let mut header = tar::Header::new_gnu();
    match entry {
        Entry::File(path, content) => append(builder, &Entry::FileMode(*path, *content, 0o644)),
        Entry::FileMode(path, content, mode) => {
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(*mode);
            header.set_size(content.len() as u64);
            header.set_cksum();
            builder
                .append_data(&mut header, path, content.as_bytes())
                .unwrap();
        }
        Entry::Dir(path) => append(builder, &Entry::DirMode(*path, 0o755)),
        Entry::DirMode(path, mode) => {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(*mode);
            header.set_size(0);
            header.set_cksum();
            builder
                .append_data(&mut header, path, std::io::empty())
                .unwrap();
        }
        Entry::Symlink(path, target) => {
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_mode(0o777);
            header.set_size(0);
            builder
                .append_link(&mut header, path, target)
                .unwrap();
        }
    }
}

/// Raw tar bytes for a list of entries
pub fn tar_bytes(entries: &[Entry]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for entry in entries {
        append(&mut builder, entry);
    }
    builder.into_inner().unwrap()
}

/// Gzip-compressed tar bytes for a list of entries
pub fn gzip_layer(entries: &[Entry]) -> Vec<u8> {
    use std::io::Write;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes(entries)).unwrap();
    encoder.finish().unwrap()
}

/// Write a schema 2 manifest listing `digests`
pub fn write_manifest_v2(image_dir: &Path, digests: &[&str]) {
    let layers: Vec<serde_json::Value> = digests
        .iter()
        .map(|hex| {
            serde_json::json!({
                "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                "size": 0,
                "digest": format!("sha256:{}", hex),
            })
        })
        .collect();
    let manifest = serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
        "layers": layers,
    });
    fs::write(image_dir.join("manifest.json"), manifest.to_string()).unwrap();
}

/// Write a schema 1 manifest listing `digests`
pub fn write_manifest_v1(image_dir: &Path, digests: &[&str]) {
    let layers: Vec<serde_json::Value> = digests
        .iter()
        .map(|hex| serde_json::json!({"blobSum": format!("sha256:{}", hex)}))
        .collect();
    let manifest = serde_json::json!({"schemaVersion": 1, "fsLayers": layers});
    fs::write(image_dir.join("manifest.json"), manifest.to_string()).unwrap();
}

/// Create an image directory with gzip layers named by their digests
///
/// Returns (TempDir, image_dir) - keep the TempDir alive to prevent cleanup.
pub fn setup_image(layers: &[(&str, Vec<Entry>)]) -> (TempDir, PathBuf) {
    let temp_dir = tempfile::tempdir().unwrap();
    let image_dir = temp_dir.path().join("image");
    fs::create_dir(&image_dir).unwrap();

    for (digest, entries) in layers {
        fs::write(image_dir.join(format!("{}.tar", digest)), gzip_layer(entries)).unwrap();
    }
    let digests: Vec<&str> = layers.iter().map(|(digest, _)| *digest).collect();
    write_manifest_v2(&image_dir, &digests);

    (temp_dir, image_dir)
}

/// Permission bits of a path, symlinks not followed
pub fn mode_of(path: &Path) -> u32 {
    fs::symlink_metadata(path).unwrap().permissions().mode() & 0o7777
}

/// Entries left in a directory
pub fn entries_in(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

/// Write an executable shell script standing in for a host tool
pub fn fake_tool(dir: &Path, name: &str, script: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

/// Sample yum output with one installed package
pub fn yum_log() -> String {
    let rule = "=".repeat(80);
    format!(
        "Resolving Dependencies\n\
         {rule}\n \
         Package          Arch        Version             Repository             Size\n\
         {rule}\n\
         Installing:\n \
         bash             x86_64      4.2.46-34.el7       base                  1.0 M\n\
         \n\
         Transaction Summary\n\
         {rule}\n\
         Install  1 Package\n"
    )
}
