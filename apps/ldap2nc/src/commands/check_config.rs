//! Check-config command - Validate configuration and script offline

use ldap2nc_sync::{EntryTransformer, RhaiTransformer, TransformOperation};

use crate::commands::build_mapper;
use crate::config::AppConfig;
use crate::error::CliResult;

pub fn execute(config: &AppConfig) -> CliResult<()> {
    let mapper = build_mapper(config);
    let transformer = RhaiTransformer::from_file(&config.sync.transformer_script, mapper.clone())?;

    println!("Directory:   {} ({})", config.ldap.url(), config.ldap.base_dn);
    println!("Nextcloud:   {}", config.nextcloud.base_url);
    println!("Profile:     {}", config.sync.profile);
    println!(
        "Script:      {} (test function: {})",
        config.sync.transformer_script.display(),
        if transformer.supports(TransformOperation::Test) { "yes" } else { "no" }
    );
    println!("Catalog:     {} group(s)", mapper.catalog_len());

    for group_id in &config.sync.protected_groups {
        if !mapper.contains_group(group_id) {
            println!("Note:        protected group '{group_id}' is not in the catalog");
        }
    }

    // Last loaded wins; reported only.
    let conflicts = mapper.conflicts();
    if conflicts.is_empty() {
        println!("Conflicts:   none");
    } else {
        println!("Conflicts:   {}", conflicts.len());
        for conflict in conflicts {
            println!("  {conflict}");
        }
    }
    Ok(())
}
