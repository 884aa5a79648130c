use clap::Subcommand;

/// Audit entry commands.
#[derive(Clone, Debug, Subcommand)]
pub enum EntryCommands {
    /// Show one entry by ID.
    Get { id: String },
    /// History of one resource, newest first.
    History {
        #[arg(long)]
        resource_type: String,
        #[arg(long)]
        resource_id: String,
        #[arg(long)]
        limit: Option<u32>,
    },
}
