// src/lib.rs

//! Package Extract
//!
//! Builds an inventory of installed software packages from two sources:
//!
//! - the text log of a container image build, parsed by per-package-manager
//!   handlers (`yum`, `pip3`, `dnf`)
//! - a layered container image, whose rootfs is reconstructed from its layer
//!   blobs and inspected with host tools and native filesystem walks
//!
//! # Architecture
//!
//! - `packages`: package identifier parsing and rpm/dpkg database queries
//! - `buildlog`: log handlers and the handler registry
//! - `image`: manifest reading, layer application, image download
//! - `analyzer`: inspection battery and layer-by-layer result merging
//! - `extract`: the two extraction entry points

pub mod analyzer;
pub mod buildlog;
pub mod config;
mod error;
pub mod extract;
pub mod image;
pub mod output;
pub mod packages;
pub mod process;

pub use analyzer::{Analyzer, AnalyzerResult, AnalyzerTools, IncrementalMerger};
pub use buildlog::{HandlerKind, HandlerRegistry, HandlerReport, HandlerResult, LogHandler};
pub use config::ExtractConfig;
pub use error::{Error, Result};
pub use extract::{ImageSource, extract_buildlog, extract_image};
pub use image::{Layer, RootfsBuilder, build_rootfs};
pub use packages::PackageIdentifier;
pub use process::TimeBudget;
