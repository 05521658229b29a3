// src/image/layer.rs

//! Layer blob extraction
//!
//! A layer is a tar archive, usually gzip compressed, applied on top of the
//! rootfs built so far. File attributes are not restored: every extracted
//! directory ends up `0755` and every file `0644` (`0755` if any execute bit
//! was set), so read-only directories shipped by an image never block later
//! entries or cleanup. When an entry cannot be written because something
//! already sits at its path, the existing entry is removed and extraction is
//! retried once. Entries that still fail are logged and skipped.
//!
//! Whiteout markers record deletions made by the layer:
//!
//! - `.wh.NAME` removes `NAME` from the same directory
//! - `.wh..wh..opq` empties the directory it sits in
//!
//! Whiteouts only affect what lower layers left behind, so they are applied
//! before any entry of the layer is extracted. The markers themselves are
//! never written to the rootfs. A whiteout is only applied when the path it
//! names resolves inside the rootfs; symlinks left by lower layers are
//! followed during that check, not during removal.

use crate::error::Result;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Prefix of whiteout marker file names
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// Marker that makes its directory opaque
pub const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Mode given to every extracted directory
const DIR_MODE: u32 = 0o755;

/// Mode given to extracted files without execute bits
const FILE_MODE: u32 = 0o644;

/// Mode given to extracted files with any execute bit
const EXEC_MODE: u32 = 0o755;

/// Counters for one applied layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerStats {
    pub extracted: usize,
    pub replaced: usize,
    pub failed: usize,
    pub whiteouts: usize,
}

#[derive(Debug, PartialEq, Eq)]
enum Whiteout {
    /// Remove a single path
    Remove(PathBuf),
    /// Remove every child of a directory
    Opaque(PathBuf),
}

/// Open a layer blob as a tar stream, decompressing gzip when present
fn open_archive(blob: &Path) -> Result<tar::Archive<Box<dyn Read>>> {
    let mut file = File::open(blob)?;
    let mut magic = [0u8; 2];
    let read = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    let reader: Box<dyn Read> = if read == GZIP_MAGIC.len() && magic == GZIP_MAGIC {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        debug!("Layer {} is not gzip compressed, reading as plain tar", blob.display());
        Box::new(BufReader::new(file))
    };

    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(false);
    archive.set_preserve_mtime(false);
    archive.set_unpack_xattrs(false);
    archive.set_overwrite(false);
    Ok(archive)
}

/// Archive path relative to the rootfs, `None` if it would escape it
fn safe_relative(path: &Path) -> Option<PathBuf> {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => result.push(part),
            Component::RootDir | Component::CurDir => {}
            _ => return None,
        }
    }
    if result.as_os_str().is_empty() {
        None
    } else {
        Some(result)
    }
}

/// Whether an archive path is a whiteout marker of any kind
fn is_marker(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with(WHITEOUT_PREFIX))
}

/// Classify an archive path as a whiteout marker
///
/// Markers whose target is not a plain sibling name (`.wh..`, `.wh...`)
/// yield `None`.
fn whiteout_for(path: &Path) -> Option<Whiteout> {
    let name = path.file_name()?.to_str()?;
    if !name.starts_with(WHITEOUT_PREFIX) {
        return None;
    }
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

    if name == OPAQUE_WHITEOUT {
        Some(Whiteout::Opaque(parent))
    } else {
        let target = &name[WHITEOUT_PREFIX.len()..];
        if target.is_empty() || target == "." || target == ".." || target.contains('/') {
            return None;
        }
        Some(Whiteout::Remove(parent.join(target)))
    }
}

/// Remove a file, symlink or directory tree; a missing path is fine
pub fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Resolve `path` and require it to stay under `root`
///
/// `root` must already be canonical. A path that does not exist resolves
/// to `None`.
fn resolve_inside(root: &Path, path: &Path) -> io::Result<Option<PathBuf>> {
    let resolved = match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if resolved.starts_with(root) {
        Ok(Some(resolved))
    } else {
        Err(io::Error::other(format!(
            "{} resolves to {} outside of the rootfs",
            path.display(),
            resolved.display()
        )))
    }
}

fn apply_whiteout(target_dir: &Path, whiteout: &Whiteout) -> io::Result<()> {
    let root = fs::canonicalize(target_dir)?;
    match whiteout {
        Whiteout::Remove(rel) => {
            let (Some(parent), Some(name)) = (rel.parent(), rel.file_name()) else {
                return Ok(());
            };
            let Some(dir) = resolve_inside(&root, &target_dir.join(parent))? else {
                return Ok(());
            };
            debug!("Whiteout removes {}", rel.display());
            // The last component itself is never followed
            remove_path(&dir.join(name))
        }
        Whiteout::Opaque(rel) => {
            let Some(dir) = resolve_inside(&root, &target_dir.join(rel))? else {
                return Ok(());
            };
            debug!("Opaque whiteout clears {}", dir.display());
            if !dir.is_dir() {
                return Ok(());
            }
            for child in fs::read_dir(&dir)? {
                remove_path(&child?.path())?;
            }
            Ok(())
        }
    }
}

/// Collect whiteout markers of a layer
///
/// Needs its own pass over the blob: tar order is arbitrary, and an opaque
/// marker may come after entries the same layer adds to that directory.
fn collect_whiteouts(blob: &Path, stats: &mut LayerStats) -> Result<Vec<Whiteout>> {
    let mut archive = open_archive(blob)?;
    let mut whiteouts = Vec::new();

    for entry in archive.entries()? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Stopped reading layer {}: {}", blob.display(), e);
                break;
            }
        };
        let Ok(path) = entry.path() else { continue };
        let Some(rel) = safe_relative(&path) else { continue };
        if !is_marker(&rel) {
            continue;
        }
        match whiteout_for(&rel) {
            Some(whiteout) => whiteouts.push(whiteout),
            None => {
                warn!("Ignoring malformed whiteout marker {}", rel.display());
                stats.failed += 1;
            }
        }
    }

    Ok(whiteouts)
}

/// Apply one layer blob on top of `target_dir`
///
/// Only a blob that cannot be opened at all is an error. Problems with
/// individual entries are counted in the returned stats.
pub fn apply_layer_blob(blob: &Path, target_dir: &Path) -> Result<LayerStats> {
    let mut stats = LayerStats::default();

    for whiteout in collect_whiteouts(blob, &mut stats)? {
        match apply_whiteout(target_dir, &whiteout) {
            Ok(()) => stats.whiteouts += 1,
            Err(e) => {
                warn!("Failed to apply whiteout {:?}: {}", whiteout, e);
                stats.failed += 1;
            }
        }
    }

    let mut archive = open_archive(blob)?;
    for entry in archive.entries()? {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Stopped reading layer {}: {}", blob.display(), e);
                stats.failed += 1;
                break;
            }
        };

        let path = match entry.path() {
            Ok(path) => path.into_owned(),
            Err(e) => {
                warn!("Skipping entry with unreadable path: {}", e);
                stats.failed += 1;
                continue;
            }
        };
        let Some(rel) = safe_relative(&path) else {
            if path.components().any(|c| c == Component::ParentDir) {
                warn!("Skipping entry outside of the rootfs: {}", path.display());
                stats.failed += 1;
            }
            continue;
        };
        if is_marker(&rel) {
            continue;
        }

        unpack_with_retry(&mut entry, &rel, target_dir, &mut stats);
    }

    debug!(
        "Layer {} applied: {} extracted, {} replaced, {} failed, {} whiteouts",
        blob.display(),
        stats.extracted,
        stats.replaced,
        stats.failed,
        stats.whiteouts
    );
    Ok(stats)
}

/// Give an extracted path the fixed mode for its type
///
/// Symlinks are left alone; their mode is meaningless and changing it would
/// follow the link.
fn reset_mode(dest: &Path, header_mode: u32) -> io::Result<()> {
    let metadata = fs::symlink_metadata(dest)?;
    let mode = if metadata.is_dir() {
        DIR_MODE
    } else if metadata.is_file() {
        if header_mode & 0o111 != 0 {
            EXEC_MODE
        } else {
            FILE_MODE
        }
    } else {
        return Ok(());
    };
    fs::set_permissions(dest, fs::Permissions::from_mode(mode))
}

fn unpack_with_retry<R: Read>(
    entry: &mut tar::Entry<'_, R>,
    rel: &Path,
    target_dir: &Path,
    stats: &mut LayerStats,
) {
    let header_mode = entry.header().mode().unwrap_or(FILE_MODE);
    let dest = target_dir.join(rel);

    let first_error = match entry.unpack_in(target_dir) {
        Ok(true) => {
            stats.extracted += 1;
            finish_entry(&dest, header_mode);
            return;
        }
        Ok(false) => {
            warn!("Skipping entry outside of the rootfs: {}", rel.display());
            stats.failed += 1;
            return;
        }
        Err(e) => e,
    };

    if fs::symlink_metadata(&dest).is_err() {
        warn!("Failed to extract {}: {}", rel.display(), first_error);
        stats.failed += 1;
        return;
    }

    debug!("Replacing existing {}", rel.display());
    if let Err(e) = remove_path(&dest) {
        warn!("Failed to remove existing {}: {}", dest.display(), e);
        stats.failed += 1;
        return;
    }

    match entry.unpack_in(target_dir) {
        Ok(true) => {
            stats.replaced += 1;
            finish_entry(&dest, header_mode);
        }
        Ok(false) => {
            warn!("Skipping entry outside of the rootfs: {}", rel.display());
            stats.failed += 1;
        }
        Err(e) => {
            warn!("Failed to extract {} after removing the old entry: {}", rel.display(), e);
            stats.failed += 1;
        }
    }
}

fn finish_entry(dest: &Path, header_mode: u32) {
    if let Err(e) = reset_mode(dest, header_mode) {
        warn!("Failed to reset mode of {}: {}", dest.display(), e);
    }
}
