use crate::cli::GlobalFlags;
use crate::cli::subcommands::EntryCommands;
use crate::commands::shared::limit::effective_limit;
use crate::context::AppContext;
use crate::output::output;

/// Handle `custody entry`.
pub async fn handle(
    action: &EntryCommands,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match action {
        EntryCommands::Get { id } => output(&ctx.service.get_entry(id).await?, flags.format),
        EntryCommands::History {
            resource_type,
            resource_id,
            limit,
        } => {
            let limit = effective_limit(*limit, flags.limit, 50);
            let entries = ctx
                .service
                .entries_for_resource(resource_type, resource_id, limit)
                .await?;
            output(&entries, flags.format)
        }
    }
}
