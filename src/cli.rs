// src/cli.rs
//! CLI definitions for package-extract
//!
//! This module contains the command-line interface definitions using clap.
//! The commands themselves are run from `main`.

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "package-extract")]
#[command(author = "Package Extract Contributors")]
#[command(version)]
#[command(about = "Extract installed packages from container build logs and images", long_about = None)]
pub struct Cli {
    /// Be verbose about what's going on
    #[arg(
        short,
        long,
        global = true,
        env = "THOTH_ANALYZER_DEBUG",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub verbose: bool,

    /// Do not use colors in log output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "PACKAGE_EXTRACT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where and how results are written
#[derive(Args, Debug, Clone, Serialize)]
pub struct OutputArgs {
    /// Output file, http(s) URL to POST results to, or - for stdout
    #[arg(short, long, default_value = "-")]
    pub output: String,

    /// Do not indent the JSON output
    #[arg(long)]
    pub no_pretty: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract installed packages from a build log
    ExtractBuildlog {
        /// Build log to analyze
        #[arg(short, long)]
        input_file: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Extract installed packages from a container image
    ExtractImage {
        /// Image reference, or an image directory with --from-dir
        #[arg(short, long)]
        image: String,

        /// Treat --image as an already downloaded image directory
        #[arg(long)]
        from_dir: bool,

        /// Timeout in seconds for all external commands together
        #[arg(short, long, env = "THOTH_ANALYZER_TIMEOUT")]
        timeout: Option<u64>,

        /// Analyze layer by layer and attribute packages to layers
        #[arg(long)]
        incremental: bool,

        /// Do not verify TLS certificates of the registry
        #[arg(long)]
        no_tls_verify: bool,

        /// Registry credentials as USER:PASSWORD
        #[arg(long, env = "THOTH_REGISTRY_CREDENTIALS", hide_env_values = true)]
        registry_credentials: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_env_bindings() {
        // build.rs mirrors these for the man page
        let cli = Cli::command();
        let env_of = |cmd: &clap::Command, id: &str| {
            cmd.get_arguments()
                .find(|arg| arg.get_id().as_str() == id)
                .and_then(|arg| arg.get_env())
                .map(|env| env.to_string_lossy().into_owned())
        };
        assert_eq!(env_of(&cli, "verbose").as_deref(), Some("THOTH_ANALYZER_DEBUG"));
        assert_eq!(env_of(&cli, "config").as_deref(), Some("PACKAGE_EXTRACT_CONFIG"));

        let image = cli.find_subcommand("extract-image").unwrap();
        assert_eq!(env_of(image, "timeout").as_deref(), Some("THOTH_ANALYZER_TIMEOUT"));
        assert_eq!(
            env_of(image, "registry_credentials").as_deref(),
            Some("THOTH_REGISTRY_CREDENTIALS")
        );
    }

    #[test]
    fn test_parse_extract_image() {
        let cli = Cli::try_parse_from([
            "package-extract",
            "-v",
            "extract-image",
            "--image",
            "/tmp/image",
            "--from-dir",
            "--incremental",
            "--no-pretty",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::ExtractImage {
                image,
                from_dir,
                incremental,
                output,
                ..
            } => {
                assert_eq!(image, "/tmp/image");
                assert!(from_dir);
                assert!(incremental);
                assert!(output.no_pretty);
                assert_eq!(output.output, "-");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
