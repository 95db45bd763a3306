//! Test-transform command - Run the script over every entry without writing

use crate::commands::build_engine;
use crate::config::AppConfig;
use crate::error::CliResult;

pub async fn execute(config: &AppConfig) -> CliResult<()> {
    let engine = build_engine(config)?;
    let drafts = engine.preview_transform().await?;
    for draft in &drafts {
        println!("{}", serde_json::to_string(draft)?);
    }
    eprintln!("{} entr{} transformed", drafts.len(), if drafts.len() == 1 { "y" } else { "ies" });
    Ok(())
}
