//! Wiring of the concrete backends into a runnable pipeline

use std::sync::Arc;

use tracing::info;

use crate::blob::{FilesystemObjectStore, ObjectStoreClient};
use crate::config::{Config, ConfigError};
use crate::database::{RecordStoreClient, SqliteRecordStore};
use crate::error::AppError;
use crate::models::EntityCatalog;
use crate::sync::{
    EntitySyncWorkflow, HttpBulkFetcher, HttpClient, ImageSources, RetryPolicy, ScratchSpace,
    SyncOrchestrator,
};

/// Load the entity catalog
///
/// `path` overrides `catalog_path` from the configuration.
pub fn load_catalog(config: &Config, path: Option<&str>) -> Result<EntityCatalog, AppError> {
    let path = path
        .or(config.catalog_path.as_deref())
        .ok_or_else(|| ConfigError::InvalidValue("catalog_path is required".to_string()))?;

    let catalog = EntityCatalog::from_file(path)?;
    info!(path = %path, entities = catalog.len(), "Entity catalog loaded");
    Ok(catalog)
}

/// Build an orchestrator over the filesystem object store and SQLite record store
pub async fn build_orchestrator(
    config: &Config,
    catalog: EntityCatalog,
) -> Result<SyncOrchestrator, AppError> {
    let scratch = ScratchSpace::new(config.scratch_dir.as_deref());
    scratch.ensure()?;

    let http = Arc::new(HttpClient::new(config.http.clone())?);

    let object_store = FilesystemObjectStore::new_with_init(&config.object_store.base_path).await?;
    info!(path = %config.object_store.base_path, "Object store initialized");
    let objects = ObjectStoreClient::new(Arc::new(object_store), config.object_store.max_sessions);

    let record_store = SqliteRecordStore::new(&config.record_store.path).await?;
    info!(path = %config.record_store.path, "Record store initialized");
    let records = RecordStoreClient::new(
        Arc::new(record_store),
        config.record_store.collection.clone(),
        RetryPolicy::new(config.retry.clone()),
    );

    let images = ImageSources {
        flag_url_template: config.source.flag_url_template.clone(),
        map_url_template: config.source.map_url_template.clone(),
    };

    let fetcher = HttpBulkFetcher::new(
        Arc::clone(&http),
        config.source.dataset_url.clone(),
        scratch.clone(),
    );
    let workflow = EntitySyncWorkflow::new(
        records,
        objects,
        http,
        images,
        config.object_store.container.clone(),
        scratch,
    );

    Ok(SyncOrchestrator::new(
        Arc::new(fetcher),
        Arc::new(workflow),
        Arc::new(catalog),
    ))
}
