//! Plan command - Show what a sync would do

use clap::Args;

use ldap2nc_sync::SyncOptions;

use crate::commands::build_engine;
use crate::config::AppConfig;
use crate::error::CliResult;

#[derive(Args, Debug, Default)]
pub struct PlanArgs {
    /// Plan a full resync instead of an incremental run
    #[arg(long)]
    pub full_sync: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(config: &AppConfig, args: PlanArgs) -> CliResult<()> {
    let engine = build_engine(config)?;
    let plan = engine
        .plan(SyncOptions {
            full_sync: args.full_sync,
            dry_run: true,
        })
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Since {}", plan.watermark_used.to_rfc3339());
    for decision in &plan.decisions {
        println!(
            "{:<8} {:<32} {}",
            decision.kind.to_string().to_uppercase(),
            decision.id,
            decision.reason
        );
    }
    println!("{} decision(s)", plan.decisions.len());
    Ok(())
}
