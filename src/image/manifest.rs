// src/image/manifest.rs

//! Image manifest model
//!
//! Two manifest schemas are understood:
//!
//! - version 1 lists layers under `fsLayers`, each with a `blobSum`
//! - version 2 lists layers under `layers`, each with a `digest`
//!
//! Digests have the form `algorithm:hex`.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Manifest file name inside a downloaded image directory
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    schema_version: Option<serde_json::Value>,
    #[serde(default)]
    fs_layers: Vec<FsLayer>,
    #[serde(default)]
    layers: Vec<LayerDescriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FsLayer {
    blob_sum: String,
}

#[derive(Debug, Deserialize)]
struct LayerDescriptor {
    digest: String,
}

/// Recognized manifest schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    V1,
    V2,
}

/// Layer digests of an image in manifest order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub schema: SchemaVersion,
    pub digests: Vec<String>,
}

impl Manifest {
    /// Read `manifest.json` from an image directory
    pub fn load(image_dir: &Path) -> Result<Self> {
        let path = image_dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::InvalidImage(format!(
                "No {} file found in the downloaded image in {}: {}",
                MANIFEST_FILE,
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    /// Parse manifest JSON and select the layer list for its schema
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawManifest = serde_json::from_str(content)
            .map_err(|e| Error::InvalidImage(format!("Unreadable {}: {}", MANIFEST_FILE, e)))?;

        let version = raw.schema_version.as_ref().and_then(serde_json::Value::as_u64);
        let (schema, digests): (SchemaVersion, Vec<String>) = match version {
            Some(1) => (
                SchemaVersion::V1,
                raw.fs_layers.into_iter().map(|l| l.blob_sum).collect(),
            ),
            Some(2) => (
                SchemaVersion::V2,
                raw.layers.into_iter().map(|l| l.digest).collect(),
            ),
            _ => {
                let shown = raw
                    .schema_version
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "none".to_string());
                return Err(Error::NotSupported(format!(
                    "Invalid schema version in {} file: {} (supported are 1 and 2)",
                    MANIFEST_FILE, shown
                )));
            }
        };

        debug!("Manifest schema {:?} with {} layers", schema, digests.len());
        Ok(Self { schema, digests })
    }
}

/// Hex part of an `algorithm:hex` digest
pub fn digest_hex(digest: &str) -> &str {
    digest.split_once(':').map_or(digest, |(_, hex)| hex)
}
