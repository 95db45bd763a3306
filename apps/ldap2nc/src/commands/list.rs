//! List command - Print platform users and groups

use clap::Args;
use serde::Serialize;

use ldap2nc_nextcloud::{NextcloudClient, NextcloudGroup};

use crate::config::AppConfig;
use crate::error::CliResult;

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ListOutput {
    users: Vec<String>,
    groups: Vec<NextcloudGroup>,
}

pub async fn execute(config: &AppConfig, args: ListArgs) -> CliResult<()> {
    let client = NextcloudClient::new(&config.nextcloud)?;
    let mut users = client.list_user_ids().await?;
    let mut groups = client.list_groups().await?;
    users.sort();
    groups.sort_by(|a, b| a.id.cmp(&b.id));

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&ListOutput { users, groups })?
        );
        return Ok(());
    }

    println!("Users ({}):", users.len());
    for user in &users {
        println!("  {user}");
    }
    println!("Groups ({}):", groups.len());
    for group in &groups {
        if group.displayname.is_empty() || group.displayname == group.id {
            println!("  {}", group.id);
        } else {
            println!("  {} ({})", group.id, group.displayname);
        }
    }
    Ok(())
}
