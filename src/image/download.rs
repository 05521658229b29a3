// src/image/download.rs

//! Image retrieval through `skopeo`
//!
//! Registries are never contacted directly. `skopeo copy` writes the image
//! in its `dir:` layout, which is what [`super::RootfsBuilder`] reads.

use crate::error::Result;
use crate::process::{TimeBudget, ToolCommand};
use std::path::Path;
use tracing::{debug, info};

/// Options passed through to the copy tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Verify registry TLS certificates
    pub tls_verify: bool,
    /// `USER:PASSWORD` for the source registry
    pub credentials: Option<String>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            tls_verify: true,
            credentials: None,
        }
    }
}

fn copy_command(skopeo: &str, image: &str, dir: &Path, options: &DownloadOptions) -> ToolCommand {
    let mut cmd = ToolCommand::new(skopeo).arg("copy");
    if let Some(creds) = &options.credentials {
        cmd = cmd.secret_arg(format!("--src-creds={}", creds));
    }
    if !options.tls_verify {
        cmd = cmd.arg("--src-tls-verify=false");
    }
    cmd.arg(format!("docker://{}", image))
        .arg(format!("dir:{}", dir.display()))
}

/// Download `image` into `dir`
pub fn download_image(
    skopeo: &str,
    image: &str,
    dir: &Path,
    options: &DownloadOptions,
    budget: &TimeBudget,
) -> Result<()> {
    info!("Downloading image {}", image);
    let stdout = copy_command(skopeo, image, dir, options).budget(budget).run()?;
    debug!("skopeo stdout: {}", stdout);
    Ok(())
}
