//! Build script for pasv-cli.
//!
//! Generates the `pasv.1` man page into `OUT_DIR` with clap_mangen.
//!
//! The command structure is declared here rather than imported, since build
//! scripts cannot depend on the crate being built.

use clap::{Arg, Command};
use clap_mangen::Man;
use std::fs;
use std::path::PathBuf;

/// Build the CLI command structure for man page generation.
///
/// Keep in sync with src/cli.rs.
fn build_cli() -> Command {
    Command::new("pasv")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Reserve passive-port blocks and wait for test servers")
        .long_about(
            "Find blocks of consecutive free ports for test servers and wait until \
             those servers answer a protocol-level readiness probe",
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .help("Enable verbose output")
                .global(true)
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .help("Suppress non-essential output")
                .global(true)
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .help("Override the data directory location")
                .value_name("PATH")
                .global(true)
                .env("PASV_DATA_DIR"),
        )
        .subcommands(vec![
            Command::new("reserve")
                .about("Find a free block of consecutive ports")
                .long_about("Scan the configured window for a block of unbound ports and print it"),
            Command::new("scan")
                .about("Show bound ports and free runs in a window")
                .long_about("List the window as alternating free and bound runs"),
            Command::new("wait")
                .about("Wait until a service answers a readiness probe")
                .long_about(
                    "Probe an endpoint with an echo or FTP passive-transfer exchange until it \
                     succeeds or the attempt budget runs out",
                ),
            Command::new("run")
                .about("Run a command with a reserved block exported")
                .long_about(
                    "Reserve a block, export PASV_PORT_START, PASV_PORT_END and \
                     PASV_PORT_COUNT to a child command and pass through its exit code",
                ),
            Command::new("validate")
                .about("Validate a configuration file")
                .long_about("Check a pasv configuration file for errors"),
            Command::new("show-config")
                .about("Print the effective configuration")
                .long_about("Print the merged configuration with every default filled in"),
            Command::new("completions")
                .about("Generate shell completion scripts")
                .long_about("Generate shell completion scripts for bash, zsh, fish, or PowerShell"),
        ])
}

fn main() {
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).unwrap();

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).unwrap();

    fs::write(man_dir.join("pasv.1"), buffer).unwrap();

    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-changed=src/commands/");
}
