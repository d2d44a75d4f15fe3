use crate::rancher::FetchFailure;
use crate::types::{Cluster, ClusterId, Project, ProjectId};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::collections::btree_map;

/// Where clusters and projects come from. Implemented by the Rancher client.
#[async_trait]
pub trait EntitySource: Send + Sync {
    async fn clusters(&self) -> Result<Vec<Cluster>, FetchFailure>;
    async fn projects(&self, cluster_id: &str) -> Result<Vec<Project>, FetchFailure>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Cluster,
    Project,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClusterEntry {
    pub id: ClusterId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProjectEntry {
    pub id: ProjectId,
    pub name: String,
    pub cluster_id: ClusterId,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Entry {
    Cluster(ClusterEntry),
    Project(ProjectEntry),
}

impl Entry {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entry::Cluster(_) => EntityKind::Cluster,
            Entry::Project(_) => EntityKind::Project,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Entry::Cluster(c) => &c.id,
            Entry::Project(p) => &p.id,
        }
    }

    /// One-line summary used in logs.
    pub fn description(&self) -> String {
        match self {
            Entry::Cluster(c) => format!("Cluster ID: {}, Name: {}", c.id, c.name),
            Entry::Project(p) => {
                let mut description = format!("Project ID: {}, Name: {}", p.id, p.name);
                for (key, value) in &p.annotations {
                    description.push_str(&format!(", Annotation: {key} = {value}"));
                }
                description
            }
        }
    }
}

impl From<&Cluster> for Entry {
    fn from(cluster: &Cluster) -> Self {
        Entry::Cluster(ClusterEntry {
            id: cluster.id.clone(),
            name: cluster.name.clone(),
        })
    }
}

impl From<&Project> for Entry {
    fn from(project: &Project) -> Self {
        Entry::Project(ProjectEntry {
            id: project.id.clone(),
            name: project.name.clone(),
            cluster_id: project.cluster_id.clone(),
            annotations: project.annotations.clone(),
        })
    }
}

/// Everything collected in one pass, keyed by kind and id. A cluster and a project
/// sharing a raw id are kept apart; within a kind the last insert wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    entries: BTreeMap<(EntityKind, String), Entry>,
}

impl Snapshot {
    pub fn new() -> Self {
        Snapshot::default()
    }

    /// Returns the entry that was replaced, if any.
    pub fn insert(&mut self, entry: Entry) -> Option<Entry> {
        let key = (entry.kind(), entry.id().to_string());
        self.entries.insert(key, entry)
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Option<&Entry> {
        self.entries.get(&(kind, id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, clusters first, each kind ordered by id.
    pub fn entries(&self) -> btree_map::Values<'_, (EntityKind, String), Entry> {
        self.entries.values()
    }

    pub fn clusters(&self) -> impl Iterator<Item = &ClusterEntry> {
        self.entries.values().filter_map(|entry| match entry {
            Entry::Cluster(c) => Some(c),
            Entry::Project(_) => None,
        })
    }

    pub fn projects(&self) -> impl Iterator<Item = &ProjectEntry> {
        self.entries.values().filter_map(|entry| match entry {
            Entry::Project(p) => Some(p),
            Entry::Cluster(_) => None,
        })
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.entries.keys().filter(|(k, _)| *k == kind).count()
    }
}

/// Fetches every genuine cluster and its projects into a fresh snapshot.
/// Entities with another `type` are skipped and never queried for projects.
/// Any fetch that exhausts its retries aborts the whole collection.
pub async fn collect(source: &dyn EntitySource) -> Result<Snapshot, FetchFailure> {
    let mut snapshot = Snapshot::new();

    for cluster in source.clusters().await? {
        if !cluster.is_cluster() {
            tracing::debug!(
                cluster_id = %cluster.id,
                kind = %cluster.kind,
                "Skipping non-cluster entity"
            );
            continue;
        }

        insert_traced(&mut snapshot, Entry::from(&cluster));

        for project in source.projects(&cluster.id).await? {
            insert_traced(&mut snapshot, Entry::from(&project));
        }
    }

    tracing::debug!(entries = snapshot.len(), "Snapshot collected");
    Ok(snapshot)
}

fn insert_traced(snapshot: &mut Snapshot, entry: Entry) {
    tracing::trace!(entry = %entry.description(), "Collected entity");
    snapshot.insert(entry);
}
