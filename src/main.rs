// src/main.rs

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, OutputArgs};
use package_extract::buildlog::registry::global_registry;
use package_extract::config::ExtractConfig;
use package_extract::extract::{self, ImageSource};
use package_extract::output::{Document, OutputTarget, write_document};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn init_logging(verbose: bool, no_color: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_ansi(!no_color)
        .with_writer(std::io::stderr)
        .init();
}

fn emit<T: Serialize>(arguments: serde_json::Value, result: T, output: &OutputArgs) -> Result<()> {
    let document = Document::new(arguments, result);
    let target = OutputTarget::parse(Some(output.output.as_str()));
    write_document(&document, &target, !output.no_pretty)
        .with_context(|| format!("Failed to write results to {}", output.output))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.no_color);

    match cli.command {
        Commands::ExtractBuildlog { input_file, output } => {
            let registry = global_registry();
            let reports = extract::extract_buildlog_file(&input_file, &registry)
                .with_context(|| format!("Failed to read build log {}", input_file.display()))?;

            let arguments = json!({
                "input_file": input_file,
                "output": output,
            });
            emit(arguments, reports, &output)
        }
        Commands::ExtractImage {
            image,
            from_dir,
            timeout,
            incremental,
            no_tls_verify,
            registry_credentials,
            output,
        } => {
            let mut config = ExtractConfig::load(cli.config.as_deref())
                .context("Failed to load configuration")?;
            if timeout.is_some() {
                config.timeout_secs = timeout;
            }
            if incremental {
                config.incremental = true;
            }
            if no_tls_verify {
                config.tls_verify = false;
            }
            if registry_credentials.is_some() {
                config.registry_credentials = registry_credentials;
            }

            let source = if from_dir {
                ImageSource::Directory(PathBuf::from(&image))
            } else {
                ImageSource::Reference(image.clone())
            };

            info!("Extracting packages from image {}", image);
            let result = extract::extract_image(&source, &config)
                .with_context(|| format!("Failed to extract packages from image {}", image))?;

            let arguments = json!({
                "image": image,
                "from_dir": from_dir,
                "timeout": config.timeout_secs,
                "incremental": config.incremental,
                "tls_verify": config.tls_verify,
                "output": output,
            });
            emit(arguments, result, &output)
        }
    }
}
