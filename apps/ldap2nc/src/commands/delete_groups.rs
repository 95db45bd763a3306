//! Delete-groups command - Remove every configured group from Nextcloud

use clap::Args;

use crate::commands::build_engine;
use crate::config::AppConfig;
use crate::error::CliResult;

#[derive(Args, Debug, Default)]
pub struct DeleteGroupsArgs {
    /// Log the deletions without performing them
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(config: &AppConfig, args: DeleteGroupsArgs) -> CliResult<()> {
    let engine = build_engine(config)?;
    let deleted = engine.delete_configured_groups(args.dry_run).await?;
    if args.dry_run {
        println!("{deleted} group(s) would be deleted");
    } else {
        println!("{deleted} group(s) deleted");
    }
    Ok(())
}
