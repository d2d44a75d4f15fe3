//! Publishes Rancher cluster and project metadata into a ConfigMap.
//!
//! One pass fetches every cluster (and each cluster's projects) from the Rancher API,
//! renders them into the `clusters` and `projects` sections and upserts those into
//! the target document. A pass either publishes everything or nothing.

pub mod config;
pub mod document;
pub mod kube_store;
pub mod metrics_defs;
pub mod rancher;
pub mod snapshot;
pub mod store;
pub mod types;

#[cfg(test)]
mod testutils;

use config::{Config, ValidationError};
use document::Sections;
use kube_store::ConfigMapStore;
use metrics_defs::{PASS_DURATION, PASS_FAILURE, SNAPSHOT_CLUSTERS, SNAPSHOT_PROJECTS};
use rancher::{ClientError, FetchFailure, RancherClient};
use shared::retry::RetryPolicy;
use shared::{counter, gauge, histogram};
use snapshot::{EntityKind, EntitySource};
use std::sync::Arc;
use std::time::Instant;
use store::{DocumentStore, StoreError, UpsertOutcome};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(thiserror::Error, Debug)]
pub enum PassError {
    #[error("another pass is already in progress")]
    AlreadyRunning,
    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),
    #[error("could not create Rancher client: {0}")]
    Client(#[from] ClientError),
    #[error("failed to fetch from Rancher: {0}")]
    Fetch(#[from] FetchFailure),
    #[error("failed to publish document: {0}")]
    Store(#[from] StoreError),
}

impl PassError {
    fn stage(&self) -> &'static str {
        match self {
            PassError::AlreadyRunning => "lock",
            PassError::Config(_) | PassError::Client(_) => "setup",
            PassError::Fetch(_) => "fetch",
            PassError::Store(_) => "store",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PassReport {
    pub clusters: usize,
    pub projects: usize,
    pub outcome: UpsertOutcome,
}

#[derive(Clone)]
pub struct Collector {
    source: Arc<dyn EntitySource>,
    store: Arc<dyn DocumentStore>,
    document: config::Document,
    // Only one pass may run at a time within the process.
    update_lock: Arc<Semaphore>,
}

impl Collector {
    pub fn new(
        source: Arc<dyn EntitySource>,
        store: Arc<dyn DocumentStore>,
        document: config::Document,
    ) -> Self {
        Collector {
            source,
            store,
            document,
            update_lock: Arc::new(Semaphore::new(1)),
        }
    }

    /// Builds a collector talking to the configured Rancher server and to the
    /// Kubernetes cluster the process runs in.
    pub async fn from_config(config: &Config) -> Result<Self, PassError> {
        config.validate()?;

        // Both are checked by validate()
        let (Some(url), Some(token)) = (&config.rancher.url, &config.rancher.token) else {
            return Err(PassError::Config(ValidationError::MissingUrl));
        };

        let client = RancherClient::new(
            url,
            token,
            &config.rancher,
            RetryPolicy::from(&config.retry),
        )?;
        let store = ConfigMapStore::try_default().await?;

        Ok(Collector::new(
            Arc::new(client),
            Arc::new(store),
            config.document.clone(),
        ))
    }

    /// Runs one fetch, render and publish pass. Nothing is written unless every fetch
    /// succeeded.
    pub async fn run_pass(&self) -> Result<PassReport, PassError> {
        let start = Instant::now();
        let result = self.run_pass_inner().await;

        match &result {
            Ok(report) => {
                histogram!(PASS_DURATION).record(start.elapsed().as_secs_f64());
                tracing::info!(
                    clusters = report.clusters,
                    projects = report.projects,
                    outcome = ?report.outcome,
                    "Pass completed"
                );
            }
            Err(e) => {
                counter!(PASS_FAILURE, "stage" => e.stage()).increment(1);
                tracing::error!(error = %e, stage = e.stage(), "Pass failed");
            }
        }

        result
    }

    async fn run_pass_inner(&self) -> Result<PassReport, PassError> {
        let _permit = self.get_permit()?;

        let snapshot = snapshot::collect(self.source.as_ref()).await?;
        let clusters = snapshot.count(EntityKind::Cluster);
        let projects = snapshot.count(EntityKind::Project);

        let sections = Sections::compose(&snapshot);
        let (outcome, _) = store::upsert(
            self.store.as_ref(),
            &self.document.name,
            &self.document.namespace,
            &sections,
        )
        .await?;

        gauge!(SNAPSHOT_CLUSTERS).set(clusters as f64);
        gauge!(SNAPSHOT_PROJECTS).set(projects as f64);

        Ok(PassReport {
            clusters,
            projects,
            outcome,
        })
    }

    fn get_permit(&self) -> Result<OwnedSemaphorePermit, PassError> {
        self.update_lock
            .clone()
            .try_acquire_owned()
            .map_err(|_| PassError::AlreadyRunning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CLUSTERS_SECTION, PROJECTS_SECTION};
    use crate::store::Document;
    use crate::testutils::{MemoryStore, StaticSource, cluster, project};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn document_config() -> config::Document {
        config::Document::default()
    }

    async fn mount_rancher(mock_server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v3/clusters"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"data": [
                    {"id": "c-abc12", "name": "prod", "type": "cluster"},
                    {"id": "ng-1", "name": "workers", "type": "nodeGroup"}
                ]}"#,
            ))
            .expect(1)
            .mount(mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v3/projects"))
            .and(query_param("clusterId", "c-abc12"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"data": [
                    {"id": "c-abc12:p-xyz", "name": "Default", "clusterId": "c-abc12",
                     "annotations": {"env": "prod"}}
                ]}"#,
            ))
            .expect(1)
            .mount(mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v3/projects"))
            .and(query_param("clusterId", "ng-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data": []}"#))
            .expect(0)
            .mount(mock_server)
            .await;
    }

    fn rancher_client(mock_server: &MockServer) -> RancherClient {
        RancherClient::new(
            &Url::parse(&mock_server.uri()).unwrap(),
            "test-token",
            &config::Rancher::default(),
            RetryPolicy::new(2, Duration::from_millis(1)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_pass() {
        let mock_server = MockServer::start().await;
        mount_rancher(&mock_server).await;

        let store = Arc::new(MemoryStore::new());
        store.insert(Document {
            name: "rancher-data".into(),
            namespace: "kube-system".into(),
            data: BTreeMap::from([("foo".into(), "untouched".into())]),
            resource_version: None,
        });

        let collector = Collector::new(
            Arc::new(rancher_client(&mock_server)),
            store.clone(),
            document_config(),
        );

        let report = collector.run_pass().await.unwrap();
        assert_eq!(
            report,
            PassReport {
                clusters: 1,
                projects: 1,
                outcome: UpsertOutcome::Updated,
            }
        );

        let stored = store.document("rancher-data", "kube-system").unwrap();
        assert_eq!(stored.data["foo"], "untouched");
        assert_eq!(
            stored.data[CLUSTERS_SECTION],
            "c-abc12:\n  Cluster ID: c-abc12\n  Name: \"prod\"\n"
        );
        assert_eq!(
            stored.data[PROJECTS_SECTION],
            "c-abc12:p-xyz:\n  Project ID: c-abc12:p-xyz\n  Name: \"Default\"\n  Annotation1: \"env = prod\"\n"
        );
        assert!(!stored.data[CLUSTERS_SECTION].contains("ng-1"));
    }

    #[tokio::test]
    async fn test_first_pass_creates_document() {
        let source = StaticSource::new(vec![cluster("local", "local", "cluster")], vec![]);
        let store = Arc::new(MemoryStore::new());
        let collector = Collector::new(Arc::new(source), store.clone(), document_config());

        let report = collector.run_pass().await.unwrap();
        assert_eq!(report.outcome, UpsertOutcome::Created);

        let stored = store.document("rancher-data", "kube-system").unwrap();
        assert_eq!(stored.data.len(), 2);
        assert_eq!(stored.data[PROJECTS_SECTION], "");

        // Second pass updates the same document with identical content
        let report = collector.run_pass().await.unwrap();
        assert_eq!(report.outcome, UpsertOutcome::Updated);
        assert_eq!(store.document("rancher-data", "kube-system").unwrap().data, stored.data);
    }

    #[tokio::test]
    async fn test_fetch_failure_publishes_nothing() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v3/clusters"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&mock_server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let collector = Collector::new(
            Arc::new(rancher_client(&mock_server)),
            store.clone(),
            document_config(),
        );

        let err = collector.run_pass().await.unwrap_err();
        assert!(matches!(err, PassError::Fetch(ref e) if e.attempts == 3));
        assert!(store.document("rancher-data", "kube-system").is_none());
        assert_eq!(store.creates() + store.updates(), 0);
    }

    #[tokio::test]
    async fn test_project_failure_publishes_nothing() {
        let mut source = StaticSource::new(
            vec![
                cluster("c-1", "one", "cluster"),
                cluster("c-2", "two", "cluster"),
            ],
            vec![project("c-1:p-1", "Default", "c-1", &[])],
        );
        source.fail_projects_for("c-2", || shared::retry::RetriesExhausted {
            attempts: 6,
            last_error: rancher::FetchError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE),
        });

        let store = Arc::new(MemoryStore::new());
        let collector = Collector::new(Arc::new(source), store.clone(), document_config());

        assert!(matches!(
            collector.run_pass().await,
            Err(PassError::Fetch(_))
        ));
        assert_eq!(store.creates(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_surfaced() {
        let source = StaticSource::new(vec![cluster("local", "local", "cluster")], vec![]);
        let store = Arc::new(MemoryStore::new());
        store.fail_reads(503, "etcdserver: leader changed");

        let collector = Collector::new(Arc::new(source), store, document_config());

        let err = collector.run_pass().await.unwrap_err();
        assert!(matches!(
            err,
            PassError::Store(StoreError::Kube(kube::Error::Api(ref e))) if e.code == 503
        ));
        assert_eq!(err.stage(), "store");
    }

    #[tokio::test]
    async fn test_concurrent_pass_is_rejected() {
        let source = StaticSource::new(vec![], vec![]);
        let collector = Collector::new(
            Arc::new(source),
            Arc::new(MemoryStore::new()),
            document_config(),
        );

        let _held = collector.get_permit().unwrap();
        assert!(matches!(
            collector.run_pass().await,
            Err(PassError::AlreadyRunning)
        ));
    }

    #[tokio::test]
    async fn test_from_config_rejects_invalid_config() {
        let err = Collector::from_config(&Config::default()).await.err().unwrap();
        assert!(matches!(err, PassError::Config(ValidationError::MissingUrl)));
    }
}
