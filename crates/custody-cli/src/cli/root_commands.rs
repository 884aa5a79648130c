use clap::{Args, Subcommand};

use crate::cli::subcommands::{EntryCommands, HoldCommands, RetentionCommands};

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Verify hash chains.
    Verify(VerifyArgs),
    /// Retention runs.
    Retention {
        #[command(subcommand)]
        action: RetentionCommands,
    },
    /// Legal holds.
    Hold {
        #[command(subcommand)]
        action: HoldCommands,
    },
    /// Read audit entries.
    Entry {
        #[command(subcommand)]
        action: EntryCommands,
    },
}

/// Arguments for `custody verify`.
#[derive(Clone, Debug, Args)]
pub struct VerifyArgs {
    /// Verify one tenant's chain.
    #[arg(
        long,
        conflicts_with_all = ["global", "all"],
        required_unless_present_any = ["global", "all"]
    )]
    pub tenant: Option<String>,
    /// Verify the global (tenant-less) chain.
    #[arg(long, conflicts_with = "all")]
    pub global: bool,
    /// Verify every chain in the store.
    #[arg(long)]
    pub all: bool,
    /// Stop a chain's walk after this many breaks.
    #[arg(long, default_value_t = 100)]
    pub max_breaks: usize,
}
