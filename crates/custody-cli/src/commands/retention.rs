use custody_config::RetentionConfig;
use custody_db::error::AuditError;
use custody_db::retention::RetentionRequest;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::RetentionCommands;
use crate::commands::shared::limit::effective_limit;
use crate::context::AppContext;
use crate::output::output;

/// Handle `custody retention`.
pub async fn handle(
    action: &RetentionCommands,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match action {
        RetentionCommands::Run {
            dry_run,
            batch_size,
            actor,
        } => {
            let request = build_request(
                *dry_run,
                *batch_size,
                actor.as_deref(),
                &ctx.service.config().retention,
            );
            run(request, ctx, flags).await
        }
        RetentionCommands::History { limit } => {
            let limit = effective_limit(*limit, flags.limit, 20);
            output(&ctx.service.list_purge_runs(limit).await?, flags.format)
        }
        RetentionCommands::Show { id } => {
            output(&ctx.service.get_purge_run(id).await?, flags.format)
        }
    }
}

async fn run(
    request: RetentionRequest,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match ctx.service.run_retention_with(request).await {
        Ok(run) => output(&run, flags.format),
        // The partial run is the operator's record of what did commit.
        Err(AuditError::RetentionPartialFailure { run, source }) => {
            output(&run, flags.format)?;
            Err(anyhow::anyhow!(
                "retention run {} stopped early: {source}",
                run.purge_id
            ))
        }
        Err(error) => Err(error.into()),
    }
}

fn build_request(
    dry_run: bool,
    batch_size: Option<u32>,
    actor: Option<&str>,
    config: &RetentionConfig,
) -> RetentionRequest {
    let batch_size = batch_size.unwrap_or(config.batch_size);
    let request = match actor {
        Some(user) => RetentionRequest::user(user, batch_size),
        None => RetentionRequest::system(&config.actor_id, batch_size),
    };
    request.dry_run(dry_run)
}
