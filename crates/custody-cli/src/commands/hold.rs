use custody_core::entities::NewHold;
use custody_core::enums::AuditScope;
use custody_db::repos::holds::HoldFilter;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::{HoldCommands, HoldCreateArgs};
use crate::commands::shared::limit::effective_limit;
use crate::commands::shared::parse::{parse_enum, parse_timestamp};
use crate::context::AppContext;
use crate::output::output;

/// Handle `custody hold`.
pub async fn handle(
    action: &HoldCommands,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match action {
        HoldCommands::Create(args) => {
            let hold = ctx.service.create_hold(new_hold(args)?).await?;
            output(&hold, flags.format)
        }
        HoldCommands::Release { id, by, reason } => {
            let hold = ctx.service.release_hold(id, by, reason).await?;
            output(&hold, flags.format)
        }
        HoldCommands::List {
            tenant,
            scope,
            active,
            limit,
        } => {
            let filter = HoldFilter {
                tenant_id: tenant.clone(),
                scope: scope
                    .as_deref()
                    .map(|value| parse_enum::<AuditScope>(value, "scope"))
                    .transpose()?,
                active_only: *active,
                limit: Some(effective_limit(*limit, flags.limit, 50)),
            };
            output(&ctx.service.list_holds(&filter).await?, flags.format)
        }
        HoldCommands::Show { id } => output(&ctx.service.get_hold(id).await?, flags.format),
    }
}

fn new_hold(args: &HoldCreateArgs) -> anyhow::Result<NewHold> {
    Ok(NewHold {
        tenant_id: if args.global { None } else { args.tenant.clone() },
        scope: parse_enum(&args.scope, "scope")?,
        applies_from: args
            .from
            .as_deref()
            .map(|raw| parse_timestamp(raw, "from"))
            .transpose()?,
        applies_to: args
            .to
            .as_deref()
            .map(|raw| parse_timestamp(raw, "to"))
            .transpose()?,
        investigation_id: args.investigation.clone(),
        reason: args.reason.clone(),
        created_by: args.by.clone(),
    })
}
