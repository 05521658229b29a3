// src/config.rs

//! Extraction configuration
//!
//! Settings are layered, later sources overriding earlier ones:
//!
//! 1. built-in defaults
//! 2. a TOML file (`--config` or `PACKAGE_EXTRACT_CONFIG`)
//! 3. environment variables
//! 4. command line flags (applied by the CLI)
//!
//! ```toml
//! timeout_secs = 600
//! incremental = false
//! tls_verify = true
//! scratch_dir = "/var/tmp"
//!
//! [tools]
//! rpm = "/usr/bin/rpm"
//! repoquery = "repoquery"
//! dpkg_query = "dpkg-query"
//! skopeo = "skopeo"
//! ```

use crate::analyzer::AnalyzerTools;
use crate::error::{Error, Result};
use crate::image::DownloadOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "PACKAGE_EXTRACT_CONFIG";

/// Environment variable with the overall command timeout in seconds
pub const TIMEOUT_ENV: &str = "THOTH_ANALYZER_TIMEOUT";

/// Host tool paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub rpm: String,
    pub repoquery: String,
    pub dpkg_query: String,
    pub skopeo: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            rpm: "rpm".to_string(),
            repoquery: "repoquery".to_string(),
            dpkg_query: "dpkg-query".to_string(),
            skopeo: "skopeo".to_string(),
        }
    }
}

impl ToolPaths {
    /// Resolve bare tool names through `PATH` for clearer logs
    ///
    /// Names that cannot be resolved are left as they are; running them
    /// later fails with a "tool not found" that the analyzer tolerates.
    pub fn resolved(&self) -> Self {
        let resolve = |name: &str| match which::which(name) {
            Ok(path) => path.display().to_string(),
            Err(_) => {
                debug!("{} not found in PATH", name);
                name.to_string()
            }
        };
        Self {
            rpm: resolve(&self.rpm),
            repoquery: resolve(&self.repoquery),
            dpkg_query: resolve(&self.dpkg_query),
            skopeo: resolve(&self.skopeo),
        }
    }
}

/// Configuration of one extraction run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub tools: ToolPaths,
    /// Overall budget for external commands, unlimited when unset
    pub timeout_secs: Option<u64>,
    /// Analyze after every layer instead of once on the final rootfs
    pub incremental: bool,
    pub tls_verify: bool,
    /// `USER:PASSWORD` for the source registry
    pub registry_credentials: Option<String>,
    /// Parent of the per-run scratch directory, the system temp dir if unset
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            tools: ToolPaths::default(),
            timeout_secs: None,
            incremental: false,
            tls_verify: true,
            registry_credentials: None,
            scratch_dir: None,
        }
    }
}

impl ExtractConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml(&content)
    }

    /// Defaults, then the file (explicit or from the environment), then env
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let file = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let tools = [
            ("RPM_BIN", &mut self.tools.rpm),
            ("REPOQUERY_BIN", &mut self.tools.repoquery),
            ("DPKG_QUERY_BIN", &mut self.tools.dpkg_query),
            ("SKOPEO_BIN", &mut self.tools.skopeo),
        ];
        for (key, field) in tools {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *field = value;
            }
        }

        if let Some(value) = lookup(TIMEOUT_ENV).filter(|v| !v.is_empty()) {
            let secs = value.trim().parse::<u64>().map_err(|_| {
                Error::ConfigError(format!("{} must be a number of seconds, got {:?}", TIMEOUT_ENV, value))
            })?;
            self.timeout_secs = Some(secs);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn analyzer_tools(&self) -> AnalyzerTools {
        AnalyzerTools {
            rpm: self.tools.rpm.clone(),
            repoquery: self.tools.repoquery.clone(),
            dpkg_query: self.tools.dpkg_query.clone(),
        }
    }

    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            tls_verify: self.tls_verify,
            credentials: self.registry_credentials.clone(),
        }
    }
}
