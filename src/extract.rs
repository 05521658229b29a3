// src/extract.rs

//! Extraction entry points
//!
//! - [`extract_buildlog`] runs the registered log handlers over build output
//! - [`extract_image`] reconstructs an image rootfs and analyzes it, either
//!   once on the final filesystem or after every layer
//!
//! Image extraction works inside a temporary directory that is removed on
//! every exit path, including timeouts.

use crate::analyzer::{Analyzer, AnalyzerResult, IncrementalMerger};
use crate::buildlog::{HandlerRegistry, HandlerReport};
use crate::config::ExtractConfig;
use crate::error::Result;
use crate::image::{RootfsBuilder, download_image};
use crate::process::TimeBudget;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub use crate::buildlog::extract_buildlog;

/// Prefix of the per-run scratch directory
pub const SCRATCH_PREFIX: &str = "package-extract-";

/// Name of the rootfs directory inside the scratch directory
const ROOTFS_DIR: &str = "rootfs";

/// Name of the download directory inside the scratch directory
const IMAGE_DIR: &str = "image";

/// Where the image to analyze comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// An image already downloaded in the copy tool's `dir:` layout
    Directory(PathBuf),
    /// A registry reference to download first
    Reference(String),
}

/// Read a build log from disk and run every registered handler on it
pub fn extract_buildlog_file(path: &Path, registry: &HandlerRegistry) -> Result<Vec<HandlerReport>> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    info!(
        "Extracting packages from build log {} with handlers {:?}",
        path.display(),
        registry.handler_names()
    );
    Ok(extract_buildlog(&text, registry))
}

/// Extract the package inventory of a container image
pub fn extract_image(source: &ImageSource, config: &ExtractConfig) -> Result<AnalyzerResult> {
    let budget = TimeBudget::new(config.timeout());
    let config = ExtractConfig {
        tools: config.tools.resolved(),
        ..config.clone()
    };

    let mut scratch_builder = tempfile::Builder::new();
    scratch_builder.prefix(SCRATCH_PREFIX);
    let scratch = match &config.scratch_dir {
        Some(parent) => scratch_builder.tempdir_in(parent)?,
        None => scratch_builder.tempdir()?,
    };
    debug!("Working in {}", scratch.path().display());

    let image_dir = match source {
        ImageSource::Directory(dir) => dir.clone(),
        ImageSource::Reference(reference) => {
            let dir = scratch.path().join(IMAGE_DIR);
            download_image(
                &config.tools.skopeo,
                reference,
                &dir,
                &config.download_options(),
                &budget,
            )?;
            dir
        }
    };

    let builder = RootfsBuilder::new(image_dir, scratch.path().join(ROOTFS_DIR));
    let analyzer = Analyzer::new(config.analyzer_tools());

    if config.incremental {
        analyze_incrementally(&builder, &analyzer, &budget)
    } else {
        analyze_whole(&builder, &analyzer, &budget)
    }
}

/// Build the complete rootfs, then analyze it once
pub fn analyze_whole(
    builder: &RootfsBuilder,
    analyzer: &Analyzer,
    budget: &TimeBudget,
) -> Result<AnalyzerResult> {
    let layers = builder.build()?;
    let mut result = analyzer.analyze(builder.target_dir(), budget)?;
    result.layers = layers.into_iter().map(|layer| layer.digest).collect();
    Ok(result)
}

/// Analyze after each applied layer, attributing records to the first
/// layer they show up in
pub fn analyze_incrementally(
    builder: &RootfsBuilder,
    analyzer: &Analyzer,
    budget: &TimeBudget,
) -> Result<AnalyzerResult> {
    let layers = builder.prepare()?;
    let mut merger = IncrementalMerger::new();

    for layer in &layers {
        info!(
            "Analyzing layer {}/{}: {}",
            layer.order + 1,
            layers.len(),
            layer.digest
        );
        builder.apply(layer)?;
        let output = analyzer.analyze(builder.target_dir(), budget)?;
        merger.merge(&layer.digest, output);
    }

    Ok(merger.finish())
}
