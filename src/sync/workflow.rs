//! Per-entity sync workflow
//!
//! One entity is synced by six sequential steps. The first failing step
//! aborts the rest for that entity only; whatever was already written stays
//! and is repaired by the next run.
//!
//! 1. Extract the entity's fragment from the bulk dataset
//! 2. Upload the fragment as `<key>.json` (overwrite)
//! 3. Delete every prior record of the entity's partition
//! 4. Insert the fragment as a new record
//! 5. Upload `<key>.gif` if absent
//! 6. Upload `<key>-map.gif` if absent

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::blob::{ObjectSession, ObjectStoreClient};
use crate::config::CODE_PLACEHOLDER;
use crate::database::RecordStoreClient;
use crate::error::{ObjectStoreError, WorkflowError};
use crate::models::{ArtifactKind, BulkDataset, Entity, SyncStep};

use super::http_client::HttpClient;
use super::scratch::ScratchSpace;

/// Syncs one entity from the bulk dataset
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntitySync: Send + Sync {
    /// Run the workflow, returning whether every step succeeded
    async fn sync(&self, entity: &Entity, dataset: &BulkDataset) -> bool;
}

/// Image source locations
#[derive(Debug, Clone)]
pub struct ImageSources {
    /// Flag image URL template containing `{code}`
    pub flag_url_template: String,
    /// Map image URL template containing `{code}`
    pub map_url_template: String,
}

impl ImageSources {
    /// URL of an image artifact for an entity
    pub fn url_for(&self, kind: ArtifactKind, entity: &Entity) -> Option<String> {
        let template = match kind {
            ArtifactKind::Flag => &self.flag_url_template,
            ArtifactKind::Map => &self.map_url_template,
            ArtifactKind::Json => return None,
        };
        Some(template.replace(CODE_PLACEHOLDER, &entity.resource_code.to_uppercase()))
    }
}

/// The six-step entity workflow
pub struct EntitySyncWorkflow {
    records: RecordStoreClient,
    objects: ObjectStoreClient,
    http: Arc<HttpClient>,
    images: ImageSources,
    container: String,
    scratch: ScratchSpace,
}

impl EntitySyncWorkflow {
    /// Create a workflow writing artifacts to `container`
    pub fn new(
        records: RecordStoreClient,
        objects: ObjectStoreClient,
        http: Arc<HttpClient>,
        images: ImageSources,
        container: impl Into<String>,
        scratch: ScratchSpace,
    ) -> Self {
        Self {
            records,
            objects,
            http,
            images,
            container: container.into(),
            scratch,
        }
    }

    /// Run all steps, stopping at the first failure
    pub async fn run(&self, entity: &Entity, dataset: &BulkDataset) -> Result<(), WorkflowError> {
        let fragment = extract(entity, dataset)?;

        let workdir = self
            .scratch
            .entity_dir(&entity.key)
            .map_err(|source| WorkflowError::Scratch {
                step: SyncStep::UploadJson,
                source,
            })?;

        self.upload_json(workdir.path(), entity, fragment).await?;

        self.records
            .delete_partition(entity.partition_key())
            .await
            .map_err(|source| WorkflowError::RecordStore {
                step: SyncStep::DeletePriorRecords,
                source,
            })?;

        self.records
            .insert(entity.partition_key(), fragment)
            .await
            .map_err(|source| WorkflowError::RecordStore {
                step: SyncStep::InsertRecord,
                source,
            })?;

        self.upload_image(workdir.path(), entity, ArtifactKind::Flag)
            .await?;
        self.upload_image(workdir.path(), entity, ArtifactKind::Map)
            .await?;

        if let Err(e) = workdir.close() {
            warn!(entity = %entity.key, error = %e, "Failed to remove entity scratch directory");
        }
        Ok(())
    }

    /// Open an object store session for one upload step
    ///
    /// Sessions are scoped to a single step so none is held across record
    /// store calls and their retry sleeps.
    async fn open_session(&self, step: SyncStep) -> Result<ObjectSession, WorkflowError> {
        self.objects
            .open()
            .await
            .map_err(|source| WorkflowError::ObjectStore { step, source })
    }

    async fn upload_json(
        &self,
        workdir: &Path,
        entity: &Entity,
        fragment: &Value,
    ) -> Result<(), WorkflowError> {
        let step = SyncStep::UploadJson;
        let bytes = serde_json::to_vec(fragment).map_err(|e| WorkflowError::InvalidFragment {
            key: entity.key.clone(),
            reason: e.to_string(),
        })?;

        let local = workdir.join(ArtifactKind::Json.blob_name(entity));
        let session = self.open_session(step).await?;
        let uploaded = self.stage_and_upload(&session, &local, &bytes, step).await;
        session.close();
        uploaded
    }

    /// Upload an image artifact, skipping it when present unless the kind overwrites
    async fn upload_image(
        &self,
        workdir: &Path,
        entity: &Entity,
        kind: ArtifactKind,
    ) -> Result<(), WorkflowError> {
        let step = match kind {
            ArtifactKind::Map => SyncStep::UploadMap,
            _ => SyncStep::UploadFlag,
        };
        let blob = kind.blob_name(entity);
        let session = self.open_session(step).await?;

        if !kind.overwrites() {
            let exists = session
                .exists(&self.container, &blob)
                .await
                .map_err(|source| WorkflowError::ObjectStore { step, source })?;
            if exists {
                debug!(entity = %entity.key, blob = %blob, "Image already present, skipping");
                return Ok(());
            }
        }

        let Some(url) = self.images.url_for(kind, entity) else {
            return Ok(());
        };
        let bytes = self
            .http
            .get(&url)
            .await
            .map_err(|source| WorkflowError::Fetch { step, source })?;

        let local = workdir.join(&blob);
        let uploaded = self.stage_and_upload(&session, &local, &bytes, step).await;
        session.close();
        uploaded
    }

    /// Write `bytes` to `local`, upload it, and discard the local copy
    async fn stage_and_upload(
        &self,
        session: &ObjectSession,
        local: &Path,
        bytes: &[u8],
        step: SyncStep,
    ) -> Result<(), WorkflowError> {
        tokio::fs::write(local, bytes)
            .await
            .map_err(|source| WorkflowError::Scratch { step, source })?;

        let uploaded = session.upload(&self.container, local).await;

        if let Err(e) = tokio::fs::remove_file(local).await {
            warn!(path = %local.display(), error = %e, "Failed to remove scratch file");
        }

        uploaded.map_err(|source: ObjectStoreError| WorkflowError::ObjectStore { step, source })
    }
}

#[async_trait]
impl EntitySync for EntitySyncWorkflow {
    async fn sync(&self, entity: &Entity, dataset: &BulkDataset) -> bool {
        match self.run(entity, dataset).await {
            Ok(()) => {
                info!(entity = %entity.key, "Entity synced");
                true
            }
            Err(err) => {
                warn!(
                    entity = %entity.key,
                    step = %err.step(),
                    error = %err,
                    "Entity sync failed"
                );
                false
            }
        }
    }
}

/// The entity's fragment, which must be a JSON object
fn extract<'a>(entity: &Entity, dataset: &'a BulkDataset) -> Result<&'a Value, WorkflowError> {
    let fragment = dataset
        .get(&entity.key)
        .ok_or_else(|| WorkflowError::MissingData(entity.key.clone()))?;

    if !fragment.is_object() {
        return Err(WorkflowError::InvalidFragment {
            key: entity.key.clone(),
            reason: "fragment is not a JSON object".to_string(),
        });
    }
    Ok(fragment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{FilesystemObjectStore, ObjectStore};
    use crate::config::{HttpConfig, RetryConfig};
    use crate::database::{RecordStore, SqliteRecordStore};
    use crate::error::StoreError;
    use crate::sync::retry::RetryPolicy;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        workflow: EntitySyncWorkflow,
        records: Arc<SqliteRecordStore>,
        blobs: FilesystemObjectStore,
        server: MockServer,
        _root: TempDir,
    }

    async fn fixture() -> Fixture {
        let root = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let records = Arc::new(SqliteRecordStore::in_memory().await.unwrap());
        let blobs = FilesystemObjectStore::new_with_init(root.path().join("blobs"))
            .await
            .unwrap();

        let workflow = EntitySyncWorkflow::new(
            RecordStoreClient::new(
                records.clone(),
                "Country",
                RetryPolicy::new(RetryConfig {
                    max_attempts: 3,
                    fallback_delay_ms: 0,
                }),
            ),
            ObjectStoreClient::new(Arc::new(blobs.clone()), 4),
            Arc::new(
                HttpClient::new(HttpConfig {
                    timeout_secs: 5,
                    min_interval_ms: 0,
                    max_concurrent: 4,
                    rate_limit_wait_secs: 1,
                })
                .unwrap(),
            ),
            ImageSources {
                flag_url_template: format!("{}/flags/{{code}}-flag.gif", server.uri()),
                map_url_template: format!("{}/maps/{{code}}-map.gif", server.uri()),
            },
            "data",
            ScratchSpace::in_dir(root.path().join("scratch")),
        );

        Fixture {
            workflow,
            records,
            blobs,
            server,
            _root: root,
        }
    }

    async fn mount_images(server: &MockServer, code: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/flags/{}-flag.gif", code)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"FLAG".to_vec()))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/maps/{}-map.gif", code)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"MAP".to_vec()))
            .mount(server)
            .await;
    }

    fn france() -> Entity {
        Entity::new("france", "France", "fr")
    }

    fn dataset() -> BulkDataset {
        BulkDataset::from_fragments([("france", json!({ "name": "France", "area": 643801 }))])
    }

    // Test 1: A well-formed entity syncs all artifacts and one record
    #[tokio::test]
    async fn test_sync_success() {
        let f = fixture().await;
        mount_images(&f.server, "FR").await;

        assert!(f.workflow.sync(&france(), &dataset()).await);

        let records = f.records.query_partition("Country", "France").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].body, json!({ "name": "France", "area": 643801 }));

        let json_blob = std::fs::read(f.blobs.blob_path("data", "france.json").unwrap()).unwrap();
        let stored: Value = serde_json::from_slice(&json_blob).unwrap();
        assert_eq!(stored["area"], 643801);
        assert_eq!(
            std::fs::read(f.blobs.blob_path("data", "france.gif").unwrap()).unwrap(),
            b"FLAG"
        );
        assert_eq!(
            std::fs::read(f.blobs.blob_path("data", "france-map.gif").unwrap()).unwrap(),
            b"MAP"
        );
    }

    // Test 2: Missing key fails at extract and touches nothing
    #[tokio::test]
    async fn test_missing_entity_fails_at_extract() {
        let f = fixture().await;
        let spain = Entity::new("spain", "Spain", "sp");

        let err = f.workflow.run(&spain, &dataset()).await.unwrap_err();

        assert_eq!(err.step(), SyncStep::Extract);
        assert!(matches!(err, WorkflowError::MissingData(key) if key == "spain"));
        assert!(!f.blobs.exists("data", "spain.json").await.unwrap());
        assert_eq!(f.records.count("Country").await.unwrap(), 0);
    }

    // Test 3: Non-object fragment is malformed
    #[tokio::test]
    async fn test_malformed_fragment() {
        let f = fixture().await;
        let dataset = BulkDataset::from_fragments([("france", json!("not an object"))]);

        let err = f.workflow.run(&france(), &dataset).await.unwrap_err();

        assert!(matches!(err, WorkflowError::InvalidFragment { .. }));
    }

    // Test 4: Existing images are never re-fetched
    #[tokio::test]
    async fn test_existing_images_skipped() {
        let f = fixture().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&f.server)
            .await;

        let scratch = TempDir::new().unwrap();
        for name in ["france.gif", "france-map.gif"] {
            let local = scratch.path().join(name);
            std::fs::write(&local, b"OLD").unwrap();
            f.blobs.upload("data", &local).await.unwrap();
        }

        assert!(f.workflow.sync(&france(), &dataset()).await);
        assert_eq!(
            std::fs::read(f.blobs.blob_path("data", "france.gif").unwrap()).unwrap(),
            b"OLD"
        );
    }

    // Test 5: Flag 404 fails the workflow after the record is written
    #[tokio::test]
    async fn test_flag_not_found_fails() {
        let f = fixture().await;
        Mock::given(method("GET"))
            .and(path("/flags/FR-flag.gif"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&f.server)
            .await;

        let err = f.workflow.run(&france(), &dataset()).await.unwrap_err();

        assert_eq!(err.step(), SyncStep::UploadFlag);
        assert_eq!(
            f.records.query_partition("Country", "France").await.unwrap().len(),
            1
        );
        assert!(!f.blobs.exists("data", "france.gif").await.unwrap());
        assert!(!f.blobs.exists("data", "france-map.gif").await.unwrap());
    }

    // Test 6: Map failure is reported at its own step
    #[tokio::test]
    async fn test_map_failure_step() {
        let f = fixture().await;
        Mock::given(method("GET"))
            .and(path("/flags/FR-flag.gif"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"FLAG".to_vec()))
            .mount(&f.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/maps/FR-map.gif"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&f.server)
            .await;

        let err = f.workflow.run(&france(), &dataset()).await.unwrap_err();

        assert_eq!(err.step(), SyncStep::UploadMap);
        assert!(f.blobs.exists("data", "france.gif").await.unwrap());
    }

    // Test 7: Second run replaces the record instead of adding one
    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let f = fixture().await;
        mount_images(&f.server, "FR").await;

        assert!(f.workflow.sync(&france(), &dataset()).await);
        assert!(f.workflow.sync(&france(), &dataset()).await);

        assert_eq!(
            f.records.query_partition("Country", "France").await.unwrap().len(),
            1
        );
    }

    // Test 8: Scratch directories do not outlive the workflow
    #[tokio::test]
    async fn test_scratch_cleaned_up() {
        let f = fixture().await;
        mount_images(&f.server, "FR").await;

        assert!(f.workflow.sync(&france(), &dataset()).await);

        let scratch_root = f._root.path().join("scratch");
        assert_eq!(std::fs::read_dir(scratch_root).unwrap().count(), 0);
    }

    // Test 9: Image URLs use the uppercased resource code
    #[test]
    fn test_image_urls() {
        let images = ImageSources {
            flag_url_template: "https://img/flags/{code}-flag.gif".to_string(),
            map_url_template: "https://img/maps/{code}-map.gif".to_string(),
        };
        let entity = Entity::new("korea_south", "Korea, South", "ks");

        assert_eq!(
            images.url_for(ArtifactKind::Flag, &entity).unwrap(),
            "https://img/flags/KS-flag.gif"
        );
        assert_eq!(
            images.url_for(ArtifactKind::Map, &entity).unwrap(),
            "https://img/maps/KS-map.gif"
        );
        assert_eq!(images.url_for(ArtifactKind::Json, &entity), None);
    }

    // Test 10: Insert conflict is a hard failure, not an update
    #[tokio::test]
    async fn test_insert_conflict_fails() {
        let f = fixture().await;

        let mut mock = crate::database::MockRecordStore::new();
        mock.expect_query_partition().returning(|_, _| Ok(vec![]));
        mock.expect_insert()
            .times(1)
            .returning(|_, _, _| Err(StoreError::Conflict("fr-doc".to_string())));
        mock.expect_delete().never();

        let workflow = EntitySyncWorkflow {
            records: RecordStoreClient::new(
                Arc::new(mock),
                "Country",
                RetryPolicy::new(RetryConfig {
                    max_attempts: 3,
                    fallback_delay_ms: 0,
                }),
            ),
            ..f.workflow
        };

        let err = workflow.run(&france(), &dataset()).await.unwrap_err();

        assert_eq!(err.step(), SyncStep::InsertRecord);
        assert!(matches!(
            err,
            WorkflowError::RecordStore {
                source: StoreError::Conflict(_),
                ..
            }
        ));
    }

    /// Record store whose inserts wait until `parties` inserts are in flight
    struct RendezvousStore {
        barrier: tokio::sync::Barrier,
    }

    #[async_trait]
    impl RecordStore for RendezvousStore {
        async fn query_partition(
            &self,
            _collection: &str,
            _partition_key: &str,
        ) -> Result<Vec<crate::models::StoredRecord>, StoreError> {
            Ok(vec![])
        }

        async fn delete(&self, _self_link: &str, _partition_key: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn insert(
            &self,
            collection: &str,
            partition_key: &str,
            body: &Value,
        ) -> Result<crate::models::StoredRecord, StoreError> {
            self.barrier.wait().await;
            Ok(crate::models::StoredRecord {
                id: partition_key.to_string(),
                self_link: crate::models::record::self_link(collection, partition_key),
                partition_key: partition_key.to_string(),
                body: body.clone(),
                created_at: chrono::Utc::now(),
            })
        }
    }

    // Test 11: Record store calls never hold an object store session
    #[tokio::test]
    async fn test_sessions_not_held_across_record_store_calls() {
        let f = fixture().await;
        mount_images(&f.server, "FR").await;
        mount_images(&f.server, "SP").await;

        let workflow = EntitySyncWorkflow {
            records: RecordStoreClient::new(
                Arc::new(RendezvousStore {
                    barrier: tokio::sync::Barrier::new(2),
                }),
                "Country",
                RetryPolicy::new(RetryConfig {
                    max_attempts: 1,
                    fallback_delay_ms: 0,
                }),
            ),
            objects: ObjectStoreClient::new(Arc::new(f.blobs.clone()), 1),
            ..f.workflow
        };
        let spain = Entity::new("spain", "Spain", "sp");
        let france = france();
        let dataset = BulkDataset::from_fragments([
            ("france", json!({ "name": "France" })),
            ("spain", json!({ "name": "Spain" })),
        ]);

        // With one session slot, both inserts only meet if neither holds it
        let (a, b) = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            tokio::join!(
                workflow.run(&france, &dataset),
                workflow.run(&spain, &dataset)
            )
        })
        .await
        .expect("workflows deadlocked on the session limit");

        assert!(a.is_ok(), "{:?}", a);
        assert!(b.is_ok(), "{:?}", b);
        assert_eq!(workflow.objects.open_sessions(), 0);
        assert!(f.blobs.exists("data", "spain-map.gif").await.unwrap());
    }
}
