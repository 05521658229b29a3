// src/packages/mod.rs

//! Package identity and installed-package queries
//!
//! `nvra` parses packed identifiers; `rpm_query` and `dpkg_query` wrap the
//! host tools that read package databases inside a rootfs.

pub mod dpkg_query;
pub mod nvra;
pub mod rpm_query;

pub use dpkg_query::{DpkgRelations, DpkgRequirement, InstalledDpkgInfo};
pub use nvra::PackageIdentifier;
