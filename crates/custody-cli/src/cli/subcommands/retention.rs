use clap::Subcommand;

/// Retention commands.
#[derive(Clone, Debug, Subcommand)]
pub enum RetentionCommands {
    /// Purge entries past their scope's retention window.
    Run {
        /// Count what would be purged without deleting anything.
        #[arg(long)]
        dry_run: bool,
        /// Entries per transaction (defaults to retention.batch_size).
        #[arg(long)]
        batch_size: Option<u32>,
        /// Record the run as started by this user instead of the scheduler.
        #[arg(long)]
        actor: Option<String>,
    },
    /// List recent retention runs, newest first.
    History {
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show one retention run.
    Show { id: String },
}
