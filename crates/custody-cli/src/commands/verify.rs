use anyhow::bail;
use custody_db::chain::ChainReport;
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::VerifyArgs;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct VerifyResponse {
    intact: bool,
    chains: Vec<ChainReport>,
}

/// Handle `custody verify`.
///
/// Prints every report, then fails if any chain is broken.
pub async fn handle(
    args: &VerifyArgs,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let targets = targets(args, ctx).await?;

    let mut chains = Vec::with_capacity(targets.len());
    for tenant in &targets {
        chains.push(
            ctx.service
                .verify_chain_report(tenant.as_deref(), args.max_breaks)
                .await?,
        );
    }

    let total = chains.len();
    let broken = chains.iter().filter(|report| !report.is_intact()).count();
    output(
        &VerifyResponse {
            intact: broken == 0,
            chains,
        },
        flags.format,
    )?;

    if broken > 0 {
        bail!("{broken} of {total} chain(s) failed verification");
    }
    Ok(())
}

async fn targets(args: &VerifyArgs, ctx: &AppContext) -> anyhow::Result<Vec<Option<String>>> {
    if args.all {
        let chains = ctx.service.list_chains().await?;
        return Ok(chains
            .iter()
            .map(|chain| chain.tenant_id().map(str::to_string))
            .collect());
    }
    if args.global {
        return Ok(vec![None]);
    }
    Ok(vec![args.tenant.clone()])
}
