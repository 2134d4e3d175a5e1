//! CLI commands and argument parsing.

pub mod options;
pub mod publish;
pub mod restore;

use clap::{Parser, Subcommand};

/// Modreg - restore and publish modules stored in OCI registries
#[derive(Parser)]
#[command(name = "modreg")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Compile a module and publish it to a registry
    Publish(publish::PublishArgs),

    /// Restore modules into the local cache
    Restore(restore::RestoreArgs),

    /// Print version information
    Version,
}
