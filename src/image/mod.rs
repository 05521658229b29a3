// src/image/mod.rs

//! Container image rootfs reconstruction
//!
//! A downloaded image directory holds `manifest.json` and one blob per
//! layer, named by the hex part of the layer digest (optionally with a
//! `.tar` suffix). [`RootfsBuilder`] applies the layers in manifest order so
//! that later layers win over earlier ones at the same path.
//!
//! The builder can run the whole image at once ([`RootfsBuilder::build`]) or
//! layer by layer ([`RootfsBuilder::prepare`] then [`RootfsBuilder::apply`])
//! when each intermediate state needs to be inspected.

pub mod download;
pub mod layer;
pub mod manifest;

pub use download::{DownloadOptions, download_image};
pub use layer::LayerStats;
pub use manifest::{MANIFEST_FILE, Manifest, SchemaVersion};

use crate::error::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One layer of an image
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Layer {
    /// Hex part of the layer digest
    pub digest: String,
    /// Position in the manifest layer list
    pub order: usize,
}

/// Locate the blob of a layer inside an image directory
pub fn find_blob(image_dir: &Path, digest: &str) -> Result<PathBuf> {
    let candidates = [
        image_dir.join(digest),
        image_dir.join(format!("{}.tar", digest)),
    ];
    candidates
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| {
            Error::InvalidImage(format!(
                "No blob for layer {} found in {}",
                digest,
                image_dir.display()
            ))
        })
}

/// Builds a rootfs directory from a downloaded image
#[derive(Debug, Clone)]
pub struct RootfsBuilder {
    image_dir: PathBuf,
    target_dir: PathBuf,
}

impl RootfsBuilder {
    pub fn new(image_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            image_dir: image_dir.into(),
            target_dir: target_dir.into(),
        }
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Create the target directory and read the layer list
    pub fn prepare(&self) -> Result<Vec<Layer>> {
        fs::create_dir_all(&self.target_dir)?;

        let manifest = Manifest::load(&self.image_dir)?;
        let layers = manifest
            .digests
            .iter()
            .enumerate()
            .map(|(order, digest)| Layer {
                digest: manifest::digest_hex(digest).to_string(),
                order,
            })
            .collect();
        Ok(layers)
    }

    /// Extract one layer on top of the current target directory
    pub fn apply(&self, layer: &Layer) -> Result<LayerStats> {
        debug!("Extracting layer {:?}", layer.digest);
        let blob = find_blob(&self.image_dir, &layer.digest)?;
        layer::apply_layer_blob(&blob, &self.target_dir)
    }

    /// Extract every layer in manifest order
    pub fn build(&self) -> Result<Vec<Layer>> {
        let layers = self.prepare()?;
        info!(
            "Constructing rootfs from {} layers in {}",
            layers.len(),
            self.target_dir.display()
        );
        for layer in &layers {
            self.apply(layer)?;
        }
        Ok(layers)
    }
}

/// Build a rootfs in `target_dir` from the image in `image_dir`
pub fn build_rootfs(image_dir: &Path, target_dir: &Path) -> Result<Vec<Layer>> {
    RootfsBuilder::new(image_dir, target_dir).build()
}
