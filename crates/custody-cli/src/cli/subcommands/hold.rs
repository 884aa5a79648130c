use clap::{Args, Subcommand};

/// Legal hold commands.
#[derive(Clone, Debug, Subcommand)]
pub enum HoldCommands {
    /// Place a legal hold.
    Create(HoldCreateArgs),
    /// Release a legal hold.
    Release {
        id: String,
        #[arg(long)]
        by: String,
        #[arg(long)]
        reason: String,
    },
    /// List holds.
    List {
        /// Holds applying to this tenant, global holds included.
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long)]
        scope: Option<String>,
        /// Only holds that have not been released.
        #[arg(long)]
        active: bool,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show one hold.
    Show { id: String },
}

/// Arguments for `custody hold create`.
#[derive(Clone, Debug, Args)]
pub struct HoldCreateArgs {
    /// Hold one tenant's entries.
    #[arg(long, conflicts_with = "global", required_unless_present = "global")]
    pub tenant: Option<String>,
    /// Hold entries of every tenant.
    #[arg(long)]
    pub global: bool,
    #[arg(long)]
    pub scope: String,
    /// Earliest covered entry time (RFC 3339).
    #[arg(long)]
    pub from: Option<String>,
    /// Latest covered entry time (RFC 3339).
    #[arg(long)]
    pub to: Option<String>,
    #[arg(long)]
    pub investigation: String,
    #[arg(long)]
    pub reason: String,
    #[arg(long)]
    pub by: String,
}
