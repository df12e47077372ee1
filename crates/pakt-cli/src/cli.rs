//! CLI argument definitions for pakt.
//!
//! Uses `clap` derive macros to define the full command surface. Each command
//! corresponds to a handler in the [`super::commands`] module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "pakt",
    version,
    about = "Resolve and install package dependencies",
    long_about = "pakt resolves the requirements of a project against local package \
                  repositories, plans the installation in dependency order and hands \
                  each package to the installer responsible for its type."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve the requirements and print the install plan as JSON
    Resolve {
        /// Path to pakt.toml (defaults to the nearest one above the current directory)
        manifest: Option<PathBuf>,
        /// Leave out require-dev
        #[arg(long)]
        no_dev: bool,
    },

    /// Install the requirements, preferring versions from pakt.lock
    Install {
        /// Leave out require-dev
        #[arg(long)]
        no_dev: bool,
        /// Show what would happen without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Re-resolve ignoring pakt.lock and install the result
    Update {
        /// Only unlock these packages
        packages: Vec<String>,
        /// Leave out require-dev
        #[arg(long)]
        no_dev: bool,
        /// Show what would happen without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Display the dependency tree
    Tree {
        /// Maximum depth to display
        #[arg(short, long)]
        depth: Option<usize>,
        /// Leave out require-dev
        #[arg(long)]
        no_dev: bool,
    },

    /// Show why a package is installed
    Why {
        /// Package name, with or without its vendor prefix
        package: String,
    },

    /// Inspect and configure installer handlers
    Installer {
        #[command(subcommand)]
        action: InstallerAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum InstallerAction {
    /// Stop generic installers from handling a package type
    Disable {
        /// Installer type tag
        tag: String,
    },
    /// List the handler used for each installer type
    List,
}

pub fn parse() -> Cli {
    Cli::parse()
}
