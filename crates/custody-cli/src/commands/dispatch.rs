use crate::cli::GlobalFlags;
use crate::cli::Commands;
use crate::commands;
use crate::context::AppContext;

/// Dispatch a parsed command to the corresponding handler module.
pub async fn dispatch(
    command: Commands,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match command {
        Commands::Verify(args) => commands::verify::handle(&args, ctx, flags).await,
        Commands::Retention { action } => commands::retention::handle(&action, ctx, flags).await,
        Commands::Hold { action } => commands::hold::handle(&action, ctx, flags).await,
        Commands::Entry { action } => commands::entry::handle(&action, ctx, flags).await,
    }
}
