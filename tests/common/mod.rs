//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use factbook_sync::blob::{FilesystemObjectStore, ObjectStore, ObjectStoreClient};
use factbook_sync::config::{HttpConfig, RetryConfig};
use factbook_sync::database::{RecordStore, RecordStoreClient, SqliteRecordStore};
use factbook_sync::error::StoreError;
use factbook_sync::models::{Entity, EntityCatalog, StoredRecord};
use factbook_sync::sync::{
    EntitySync, EntitySyncWorkflow, HttpBulkFetcher, HttpClient, ImageSources, RetryPolicy,
    ScratchSpace, SyncOrchestrator,
};

pub const COLLECTION: &str = "Country";
pub const CONTAINER: &str = "data";
pub const DATASET_PATH: &str = "/factbook.json";

/// Build a factbook document from `(key, fragment)` pairs
pub fn factbook(entries: &[(&str, Value)]) -> Value {
    let countries: serde_json::Map<String, Value> = entries
        .iter()
        .map(|(key, data)| (key.to_string(), json!({ "data": data })))
        .collect();
    json!({ "countries": countries })
}

/// France, Spain and Italy in that order
pub fn three_countries() -> Vec<Entity> {
    vec![
        Entity::new("france", "France", "fr"),
        Entity::new("spain", "Spain", "sp"),
        Entity::new("italy", "Italy", "it"),
    ]
}

/// Record store wrapper that injects insert failures
///
/// Delegates everything to an inner SQLite store. Inserts can be throttled
/// for the next N calls, or failed outright for chosen partitions.
pub struct FaultyRecordStore {
    inner: Arc<SqliteRecordStore>,
    failing_partitions: Mutex<HashSet<String>>,
    throttled_inserts: AtomicU32,
    insert_calls: AtomicU32,
}

impl FaultyRecordStore {
    pub fn new(inner: Arc<SqliteRecordStore>) -> Self {
        Self {
            inner,
            failing_partitions: Mutex::new(HashSet::new()),
            throttled_inserts: AtomicU32::new(0),
            insert_calls: AtomicU32::new(0),
        }
    }

    /// Fail every insert into `partition_key` with a backend error
    pub fn fail_inserts_for(&self, partition_key: &str) {
        self.failing_partitions
            .lock()
            .unwrap()
            .insert(partition_key.to_string());
    }

    /// Stop failing inserts into `partition_key`
    pub fn heal(&self, partition_key: &str) {
        self.failing_partitions.lock().unwrap().remove(partition_key);
    }

    /// Rate-limit the next `n` insert calls
    pub fn throttle_next_inserts(&self, n: u32) {
        self.throttled_inserts.store(n, Ordering::SeqCst);
    }

    pub fn insert_calls(&self) -> u32 {
        self.insert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for FaultyRecordStore {
    async fn query_partition(
        &self,
        collection: &str,
        partition_key: &str,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        self.inner.query_partition(collection, partition_key).await
    }

    async fn delete(&self, self_link: &str, partition_key: &str) -> Result<(), StoreError> {
        self.inner.delete(self_link, partition_key).await
    }

    async fn insert(
        &self,
        collection: &str,
        partition_key: &str,
        body: &Value,
    ) -> Result<StoredRecord, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);

        let throttled = self
            .throttled_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if throttled {
            return Err(StoreError::RateLimited {
                retry_after: Some(Duration::from_millis(1)),
            });
        }

        if self.failing_partitions.lock().unwrap().contains(partition_key) {
            return Err(StoreError::Backend("injected insert failure".to_string()));
        }

        self.inner.insert(collection, partition_key, body).await
    }
}

/// A complete pipeline over local backends and a mock HTTP source
pub struct Pipeline {
    pub server: MockServer,
    pub sqlite: Arc<SqliteRecordStore>,
    pub records: Arc<FaultyRecordStore>,
    pub blobs: FilesystemObjectStore,
    pub catalog: Arc<EntityCatalog>,
    pub fetcher: Arc<HttpBulkFetcher>,
    pub workflow: Arc<EntitySyncWorkflow>,
    pub scratch: PathBuf,
    _root: TempDir,
}

impl Pipeline {
    pub async fn start(entities: Vec<Entity>) -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        let server = MockServer::start().await;
        let scratch = root.path().join("scratch");

        let sqlite = Arc::new(
            SqliteRecordStore::in_memory()
                .await
                .expect("Failed to create record store"),
        );
        let records = Arc::new(FaultyRecordStore::new(Arc::clone(&sqlite)));
        let blobs = FilesystemObjectStore::new_with_init(root.path().join("blobs"))
            .await
            .expect("Failed to create object store");

        let http = Arc::new(
            HttpClient::new(HttpConfig {
                timeout_secs: 5,
                min_interval_ms: 0,
                max_concurrent: 8,
                rate_limit_wait_secs: 1,
            })
            .expect("Failed to create HTTP client"),
        );

        let fetcher = Arc::new(HttpBulkFetcher::new(
            Arc::clone(&http),
            format!("{}{}", server.uri(), DATASET_PATH),
            ScratchSpace::in_dir(&scratch),
        ));

        let workflow = Arc::new(EntitySyncWorkflow::new(
            RecordStoreClient::new(
                records.clone(),
                COLLECTION,
                RetryPolicy::new(RetryConfig {
                    max_attempts: 3,
                    fallback_delay_ms: 0,
                }),
            ),
            ObjectStoreClient::new(Arc::new(blobs.clone()), 4),
            http,
            ImageSources {
                flag_url_template: format!("{}/flags/{{code}}-flag.gif", server.uri()),
                map_url_template: format!("{}/maps/{{code}}-map.gif", server.uri()),
            },
            CONTAINER,
            ScratchSpace::in_dir(&scratch),
        ));

        Self {
            server,
            sqlite,
            records,
            blobs,
            catalog: Arc::new(EntityCatalog::new(entities).expect("Invalid test catalog")),
            fetcher,
            workflow,
            scratch,
            _root: root,
        }
    }

    /// Orchestrator over the real workflow
    pub fn orchestrator(&self) -> SyncOrchestrator {
        self.orchestrator_with(self.workflow.clone())
    }

    /// Orchestrator over a substitute workflow
    pub fn orchestrator_with(&self, workflow: Arc<dyn EntitySync>) -> SyncOrchestrator {
        SyncOrchestrator::new(self.fetcher.clone(), workflow, Arc::clone(&self.catalog))
    }

    pub async fn serve_dataset(&self, document: &Value) {
        Mock::given(method("GET"))
            .and(path(DATASET_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .mount(&self.server)
            .await;
    }

    pub async fn serve_dataset_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(DATASET_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Serve both images for an uppercased resource code
    ///
    /// `expected` bounds how often each image may be fetched; the mock
    /// server verifies it on drop.
    pub async fn serve_images(&self, code: &str, expected: Option<u64>) {
        for (route, body) in [
            (format!("/flags/{}-flag.gif", code), b"FLAG".to_vec()),
            (format!("/maps/{}-map.gif", code), b"MAP".to_vec()),
        ] {
            let mock = Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(body));
            match expected {
                Some(n) => mock.expect(n).mount(&self.server).await,
                None => mock.mount(&self.server).await,
            }
        }
    }

    pub async fn records_of(&self, partition_key: &str) -> Vec<StoredRecord> {
        self.sqlite
            .query_partition(COLLECTION, partition_key)
            .await
            .expect("Failed to query partition")
    }

    pub fn blob_path(&self, name: &str) -> PathBuf {
        self.blobs
            .blob_path(CONTAINER, name)
            .expect("Invalid blob name")
    }

    pub fn read_blob(&self, name: &str) -> Option<Vec<u8>> {
        std::fs::read(self.blob_path(name)).ok()
    }

    /// Place a blob in the object store directly
    pub async fn put_blob(&self, name: &str, contents: &[u8]) {
        let staging = TempDir::new().expect("Failed to create temp dir");
        let local = staging.path().join(name);
        std::fs::write(&local, contents).expect("Failed to stage blob");
        self.blobs
            .upload(CONTAINER, &local)
            .await
            .expect("Failed to upload blob");
    }

    /// Number of entries left in the scratch root
    pub fn scratch_entries(&self) -> usize {
        count_entries(&self.scratch)
    }
}

fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
