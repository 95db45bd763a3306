//! Subcommands and the wiring they share.

pub mod check_config;
pub mod delete_groups;
pub mod list;
pub mod plan;
pub mod sync;
pub mod test_transform;

use std::sync::Arc;

use ldap2nc_directory::LdapDirectory;
use ldap2nc_nextcloud::NextcloudClient;
use ldap2nc_sync::{AttributeMapper, FileWatermarkStore, RhaiTransformer, SyncEngine};

use crate::alert::GraceDelaySink;
use crate::config::AppConfig;
use crate::error::CliResult;

pub fn build_mapper(config: &AppConfig) -> Arc<AttributeMapper> {
    Arc::new(AttributeMapper::from_config(&config.attributes_map))
}

/// Build an engine wired to the configured directory and Nextcloud instance.
pub fn build_engine(config: &AppConfig) -> CliResult<SyncEngine> {
    let mapper = build_mapper(config);
    let transformer = RhaiTransformer::from_file(&config.sync.transformer_script, mapper.clone())?;
    let directory = LdapDirectory::new(config.ldap.clone())?;
    let client = NextcloudClient::new(&config.nextcloud)?;
    let watermarks = FileWatermarkStore::new(&config.sync.watermark_dir);

    let engine = SyncEngine::new(
        Arc::new(directory),
        Arc::new(client),
        Arc::new(transformer),
        mapper,
        Arc::new(watermarks),
        config.sync.clone(),
    )
    .with_alert_sink(Arc::new(GraceDelaySink::new(config.sync.abort_grace())));
    Ok(engine)
}
