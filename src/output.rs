// src/output.rs

//! Result document and its delivery
//!
//! Every run produces one JSON document:
//!
//! ```json
//! {"metadata": {"analyzer": ..., "analyzer_version": ..., "datetime": ...,
//!               "hostname": ..., "arguments": {...}},
//!  "result": ...}
//! ```
//!
//! The document goes to stdout, a file, or is POSTed to an HTTP endpoint.
//! Keys are emitted in sorted order.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Name reported in result metadata
pub const ANALYZER_NAME: &str = env!("CARGO_PKG_NAME");

/// Version reported in result metadata
pub const ANALYZER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Provenance of a result document
#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub analyzer: String,
    pub analyzer_version: String,
    pub datetime: DateTime<Utc>,
    pub hostname: String,
    /// Arguments of the invocation that produced the result
    pub arguments: serde_json::Value,
}

impl Metadata {
    pub fn new(arguments: serde_json::Value) -> Self {
        Self {
            analyzer: ANALYZER_NAME.to_string(),
            analyzer_version: ANALYZER_VERSION.to_string(),
            datetime: Utc::now(),
            hostname: hostname(),
            arguments,
        }
    }
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// A result with its metadata
#[derive(Debug, Clone, Serialize)]
pub struct Document<T: Serialize> {
    pub metadata: Metadata,
    pub result: T,
}

impl<T: Serialize> Document<T> {
    pub fn new(arguments: serde_json::Value, result: T) -> Self {
        Self {
            metadata: Metadata::new(arguments),
            result,
        }
    }

    /// Render as JSON with sorted keys
    pub fn render(&self, pretty: bool) -> Result<String> {
        // Going through Value sorts object keys
        let value = serde_json::to_value(self)?;
        let rendered = if pretty {
            serde_json::to_string_pretty(&value)?
        } else {
            serde_json::to_string(&value)?
        };
        Ok(rendered)
    }
}

/// Where a document is delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
    Http(String),
}

impl OutputTarget {
    /// `None` or `-` is stdout, an http(s) URL is a POST target, anything
    /// else is a file path
    pub fn parse(dest: Option<&str>) -> Self {
        match dest {
            None | Some("-") => Self::Stdout,
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                Self::Http(url.to_string())
            }
            Some(path) => Self::File(PathBuf::from(path)),
        }
    }
}

/// Deliver a document
pub fn write_document<T: Serialize>(
    document: &Document<T>,
    target: &OutputTarget,
    pretty: bool,
) -> Result<()> {
    match target {
        OutputTarget::Stdout => {
            let rendered = document.render(pretty)?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", rendered)?;
        }
        OutputTarget::File(path) => {
            let rendered = document.render(pretty)?;
            std::fs::write(path, format!("{}\n", rendered))?;
            info!("Results written to {}", path.display());
        }
        OutputTarget::Http(url) => {
            let value = serde_json::to_value(document)?;
            info!("Submitting results to {}", url);
            let response = reqwest::blocking::Client::new()
                .post(url)
                .json(&value)
                .send()
                .map_err(|e| Error::HttpError(format!("Failed to submit results to {}: {}", url, e)))?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::HttpError(format!(
                    "Submitting results to {} failed with status {}",
                    url, status
                )));
            }
            info!("Successfully submitted results to {}", url);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_target_parse() {
        assert_eq!(OutputTarget::parse(None), OutputTarget::Stdout);
        assert_eq!(OutputTarget::parse(Some("-")), OutputTarget::Stdout);
        assert_eq!(
            OutputTarget::parse(Some("https://example.com/api")),
            OutputTarget::Http("https://example.com/api".to_string())
        );
        assert_eq!(
            OutputTarget::parse(Some("out.json")),
            OutputTarget::File(PathBuf::from("out.json"))
        );
    }

    #[test]
    fn test_render_sorted_keys() {
        let document = Document::new(json!({"z": 1, "a": 2}), json!({"zeta": [], "alpha": {}}));
        let rendered = document.render(false).unwrap();
        assert!(rendered.starts_with("{\"metadata\":{\"analyzer\":"));
        assert!(rendered.find("\"alpha\"").unwrap() < rendered.find("\"zeta\"").unwrap());
        assert!(document.render(true).unwrap().contains("\n  \"metadata\""));
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        let document = Document::new(json!({}), vec!["bash"]);
        write_document(&document, &OutputTarget::File(path.clone()), true).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["result"], json!(["bash"]));
        assert_eq!(value["metadata"]["analyzer"], ANALYZER_NAME);
    }
}
