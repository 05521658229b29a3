// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: result destination
fn output_arg() -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .value_name("DEST")
        .default_value("-")
        .help("Output file, http(s) URL to POST results to, or - for stdout")
}

/// Common argument: compact output
fn no_pretty_arg() -> Arg {
    Arg::new("no_pretty")
        .long("no-pretty")
        .action(ArgAction::SetTrue)
        .help("Do not indent the JSON output")
}

fn build_cli() -> Command {
    Command::new("package-extract")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Package Extract Contributors")
        .about("Extract installed packages from container build logs and images")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .env("THOTH_ANALYZER_DEBUG")
                .value_parser(clap::builder::BoolishValueParser::new())
                .help("Be verbose about what's going on"),
        )
        .arg(
            Arg::new("no_color")
                .long("no-color")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Do not use colors in log output"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("FILE")
                .env("PACKAGE_EXTRACT_CONFIG")
                .help("Configuration file (TOML)"),
        )
        .subcommand(
            Command::new("extract-buildlog")
                .about("Extract installed packages from a build log")
                .arg(
                    Arg::new("input_file")
                        .short('i')
                        .long("input-file")
                        .required(true)
                        .value_name("FILE")
                        .help("Build log to analyze"),
                )
                .arg(output_arg())
                .arg(no_pretty_arg()),
        )
        .subcommand(
            Command::new("extract-image")
                .about("Extract installed packages from a container image")
                .arg(
                    Arg::new("image")
                        .short('i')
                        .long("image")
                        .required(true)
                        .help("Image reference, or an image directory with --from-dir"),
                )
                .arg(
                    Arg::new("from_dir")
                        .long("from-dir")
                        .action(ArgAction::SetTrue)
                        .help("Treat --image as an already downloaded image directory"),
                )
                .arg(
                    Arg::new("timeout")
                        .short('t')
                        .long("timeout")
                        .value_name("SECS")
                        .env("THOTH_ANALYZER_TIMEOUT")
                        .value_parser(clap::value_parser!(u64))
                        .help("Timeout in seconds for all external commands together"),
                )
                .arg(
                    Arg::new("incremental")
                        .long("incremental")
                        .action(ArgAction::SetTrue)
                        .help("Analyze layer by layer and attribute packages to layers"),
                )
                .arg(
                    Arg::new("no_tls_verify")
                        .long("no-tls-verify")
                        .action(ArgAction::SetTrue)
                        .help("Do not verify TLS certificates of the registry"),
                )
                .arg(
                    Arg::new("registry_credentials")
                        .long("registry-credentials")
                        .value_name("USER:PASSWORD")
                        .env("THOTH_REGISTRY_CREDENTIALS")
                        .hide_env_values(true)
                        .help("Registry credentials as USER:PASSWORD"),
                )
                .arg(output_arg())
                .arg(no_pretty_arg()),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory - use CARGO_MANIFEST_DIR which is always set by cargo
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("package-extract.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
