use crate::document::Sections;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// A named, namespaced record of text sections.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    pub name: String,
    pub namespace: String,
    pub data: BTreeMap<String, String>,
    /// Opaque version token from the store. Sent back on update so the store can
    /// reject a write based on a stale read.
    pub resource_version: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("document {namespace}/{name} was modified concurrently")]
    Conflict { namespace: String, name: String },
    #[error("access to document {namespace}/{name} denied: {message}")]
    Forbidden {
        namespace: String,
        name: String,
        message: String,
    },
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// `Ok(None)` when the document does not exist.
    async fn get(&self, name: &str, namespace: &str) -> Result<Option<Document>, StoreError>;
    async fn create(&self, document: &Document) -> Result<Document, StoreError>;
    async fn update(&self, document: &Document) -> Result<Document, StoreError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Writes the owned sections into the named document, creating it if needed.
/// Failures are returned as is, retrying is left to the caller.
pub async fn upsert(
    store: &dyn DocumentStore,
    name: &str,
    namespace: &str,
    sections: &Sections,
) -> Result<(UpsertOutcome, Document), StoreError> {
    match store.get(name, namespace).await? {
        None => {
            tracing::info!(namespace, name, "Document not found, creating");
            let document = Document {
                name: name.to_string(),
                namespace: namespace.to_string(),
                data: sections.to_data(),
                resource_version: None,
            };
            let created = store.create(&document).await?;
            tracing::info!(namespace, name, "Created document");
            Ok((UpsertOutcome::Created, created))
        }
        Some(mut document) => {
            tracing::info!(namespace, name, "Document found, updating");
            sections.apply_to(&mut document.data);
            let updated = store.update(&document).await?;
            tracing::info!(namespace, name, "Updated document");
            Ok((UpsertOutcome::Updated, updated))
        }
    }
}
