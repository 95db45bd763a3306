//! Sync command - Run one synchronization

use clap::Args;

use ldap2nc_sync::{RunReport, SyncOptions};

use crate::commands::build_engine;
use crate::config::AppConfig;
use crate::error::CliResult;

/// Arguments for the sync command
#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Ignore the stored watermark and extract every directory entry
    #[arg(long)]
    pub full_sync: bool,

    /// Log every change instead of applying it; the watermark is kept
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the sync command
pub async fn execute(config: &AppConfig, args: SyncArgs) -> CliResult<()> {
    let engine = build_engine(config)?;
    let report = engine
        .run(SyncOptions {
            full_sync: args.full_sync,
            dry_run: args.dry_run,
        })
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let mode = match (report.dry_run, report.full_sync) {
        (true, true) => "full sync, dry run",
        (true, false) => "incremental, dry run",
        (false, true) => "full sync",
        (false, false) => "incremental",
    };
    println!("Profile:    {}", report.profile);
    println!("Mode:       {mode}");
    println!("Since:      {}", report.watermark_used.to_rfc3339());
    match report.watermark_committed {
        Some(ts) => println!("Watermark:  {}", ts.to_rfc3339()),
        None => println!("Watermark:  unchanged"),
    }
    println!(
        "Entries:    {} of {} processed",
        report.statistics.entries_processed, report.statistics.entries_total
    );
    println!("Changes:    {}", report.statistics);
    println!("Duration:   {} ms", report.duration_ms);
}
