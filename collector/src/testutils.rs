use crate::rancher::FetchFailure;
use crate::snapshot::EntitySource;
use crate::store::{Document, DocumentStore, StoreError};
use crate::types::{Cluster, Project};
use async_trait::async_trait;
use kube::core::ErrorResponse;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

pub fn cluster(id: &str, name: &str, kind: &str) -> Cluster {
    Cluster {
        id: id.into(),
        name: name.into(),
        kind: kind.into(),
    }
}

pub fn project(id: &str, name: &str, cluster_id: &str, annotations: &[(&str, &str)]) -> Project {
    Project {
        id: id.into(),
        name: name.into(),
        cluster_id: cluster_id.into(),
        annotations: annotations
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

/// The error the Kubernetes client reports for a failed API call.
pub fn api_error(code: u16, message: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message: message.into(),
        reason: String::new(),
        code,
    })
}

type FailureFn = Box<dyn Fn() -> FetchFailure + Send + Sync>;

/// Entity source serving fixed clusters and projects, recording project queries.
pub struct StaticSource {
    clusters: Vec<Cluster>,
    projects: Vec<Project>,
    project_failures: HashMap<String, FailureFn>,
    project_queries: Mutex<Vec<String>>,
}

impl StaticSource {
    pub fn new(clusters: Vec<Cluster>, projects: Vec<Project>) -> Self {
        StaticSource {
            clusters,
            projects,
            project_failures: HashMap::new(),
            project_queries: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_projects_for(
        &mut self,
        cluster_id: &str,
        failure: impl Fn() -> FetchFailure + Send + Sync + 'static,
    ) {
        self.project_failures
            .insert(cluster_id.to_string(), Box::new(failure));
    }

    pub fn project_queries(&self) -> Vec<String> {
        self.project_queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl EntitySource for StaticSource {
    async fn clusters(&self) -> Result<Vec<Cluster>, FetchFailure> {
        Ok(self.clusters.clone())
    }

    async fn projects(&self, cluster_id: &str) -> Result<Vec<Project>, FetchFailure> {
        self.project_queries
            .lock()
            .unwrap()
            .push(cluster_id.to_string());

        if let Some(failure) = self.project_failures.get(cluster_id) {
            return Err(failure());
        }

        Ok(self
            .projects
            .iter()
            .filter(|p| p.cluster_id == cluster_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct MemoryStoreInner {
    documents: BTreeMap<(String, String), Document>,
    version: u64,
    creates: usize,
    updates: usize,
    read_failure: Option<(u16, String)>,
    bump_after_read: bool,
}

impl MemoryStoreInner {
    fn next_version(&mut self) -> Option<String> {
        self.version += 1;
        Some(self.version.to_string())
    }
}

/// In-memory document store with the same versioning rules as the Kubernetes API:
/// an update carrying a stale version is rejected as a conflict.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn insert(&self, mut document: Document) {
        let mut inner = self.inner.lock().unwrap();
        document.resource_version = inner.next_version();
        let key = (document.namespace.clone(), document.name.clone());
        inner.documents.insert(key, document);
    }

    pub fn document(&self, name: &str, namespace: &str) -> Option<Document> {
        let inner = self.inner.lock().unwrap();
        inner
            .documents
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn fail_reads(&self, code: u16, message: &str) {
        self.inner.lock().unwrap().read_failure = Some((code, message.to_string()));
    }

    /// Simulates a concurrent writer modifying the document right after each read.
    pub fn bump_version_after_read(&self) {
        self.inner.lock().unwrap().bump_after_read = true;
    }

    pub fn creates(&self) -> usize {
        self.inner.lock().unwrap().creates
    }

    pub fn updates(&self) -> usize {
        self.inner.lock().unwrap().updates
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, name: &str, namespace: &str) -> Result<Option<Document>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some((code, message)) = &inner.read_failure {
            return Err(StoreError::Kube(api_error(*code, message)));
        }

        let key = (namespace.to_string(), name.to_string());
        let found = inner.documents.get(&key).cloned();

        if found.is_some() && inner.bump_after_read {
            let version = inner.next_version();
            if let Some(stored) = inner.documents.get_mut(&key) {
                stored.resource_version = version;
            }
        }

        Ok(found)
    }

    async fn create(&self, document: &Document) -> Result<Document, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (document.namespace.clone(), document.name.clone());
        if inner.documents.contains_key(&key) {
            return Err(StoreError::Conflict {
                namespace: document.namespace.clone(),
                name: document.name.clone(),
            });
        }

        let mut created = document.clone();
        created.resource_version = inner.next_version();
        inner.documents.insert(key, created.clone());
        inner.creates += 1;
        Ok(created)
    }

    async fn update(&self, document: &Document) -> Result<Document, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (document.namespace.clone(), document.name.clone());

        let stored_version = match inner.documents.get(&key) {
            Some(stored) => stored.resource_version.clone(),
            None => {
                let message = format!("configmaps \"{}\" not found", document.name);
                return Err(StoreError::Kube(api_error(404, &message)));
            }
        };

        if document.resource_version.is_some() && document.resource_version != stored_version {
            return Err(StoreError::Conflict {
                namespace: document.namespace.clone(),
                name: document.name.clone(),
            });
        }

        let mut updated = document.clone();
        updated.resource_version = inner.next_version();
        inner.documents.insert(key, updated.clone());
        inner.updates += 1;
        Ok(updated)
    }
}
