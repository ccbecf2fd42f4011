// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: formula name or file
fn formula_arg() -> Arg {
    Arg::new("formula")
        .required(true)
        .help("Formula name or path to a formula file")
}

fn build_cli() -> Command {
    Command::new("formulary")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Formulary Contributors")
        .about("Build and install command-line tools from pinned formulas")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Show debug output"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Only show warnings and errors"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("PATH")
                .help("Configuration file (default: ~/.config/formulary/config.toml)"),
        )
        .arg(
            Arg::new("formula_dir")
                .long("formula-dir")
                .global(true)
                .value_name("DIR")
                .action(ArgAction::Append)
                .help("Additional directory of formula files (repeatable)"),
        )
        .subcommand(
            Command::new("install")
                .about("Fetch, verify, build and install one or more tools")
                .arg(formula_arg().num_args(1..))
                .arg(
                    Arg::new("head")
                        .long("head")
                        .action(ArgAction::SetTrue)
                        .help("Build the latest commit of the head branch instead of the release"),
                )
                .arg(
                    Arg::new("prefix")
                        .long("prefix")
                        .value_name("DIR")
                        .help("Install prefix (default: ~/.local)"),
                )
                .arg(
                    Arg::new("keep_scratch")
                        .long("keep-scratch")
                        .action(ArgAction::SetTrue)
                        .help("Keep the scratch directory for inspection"),
                )
                .arg(
                    Arg::new("skip_dependency_check")
                        .long("skip-dependency-check")
                        .action(ArgAction::SetTrue)
                        .help("Don't check build dependencies on PATH"),
                ),
        )
        .subcommand(
            Command::new("fetch")
                .about("Download and verify a release archive without building")
                .arg(formula_arg())
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .default_value(".")
                        .help("Directory to place the archive in"),
                ),
        )
        .subcommand(
            Command::new("digest")
                .about("Print the digest of a local file, for pinning a formula")
                .arg(Arg::new("file").required(true).help("File to hash"))
                .arg(
                    Arg::new("algorithm")
                        .short('a')
                        .long("algorithm")
                        .default_value("sha256")
                        .help("Hash algorithm (sha256 or sha512)"),
                ),
        )
        .subcommand(
            Command::new("info")
                .about("Show a formula")
                .arg(formula_arg()),
        )
        .subcommand(Command::new("list").about("List known formulas"))
        .subcommand(
            Command::new("check")
                .about("Validate a formula file")
                .arg(Arg::new("path").required(true).help("Path to the formula file")),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions for formulary itself")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "elvish", "powershell"])
                        .help("Shell type"),
                ),
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

    let man_path = man_dir.join("formulary.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
