//! `DocumentStore` backed by Kubernetes ConfigMaps.

use crate::store::{Document, DocumentStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::Client;
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use serde_json::{Map, Value, json};

pub struct ConfigMapStore {
    client: Client,
}

impl ConfigMapStore {
    pub fn new(client: Client) -> Self {
        ConfigMapStore { client }
    }

    /// Uses the in-cluster service account, or the local kubeconfig outside a cluster.
    pub async fn try_default() -> Result<Self, StoreError> {
        let client = Client::try_default().await?;
        Ok(ConfigMapStore::new(client))
    }

    fn api(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl DocumentStore for ConfigMapStore {
    async fn get(&self, name: &str, namespace: &str) -> Result<Option<Document>, StoreError> {
        let config_map = self
            .api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_error(e, name, namespace))?;

        Ok(config_map.map(|cm| to_document(cm, namespace)))
    }

    async fn create(&self, document: &Document) -> Result<Document, StoreError> {
        let created = self
            .api(&document.namespace)
            .create(&PostParams::default(), &to_config_map(document))
            .await
            .map_err(|e| map_error(e, &document.name, &document.namespace))?;

        Ok(to_document(created, &document.namespace))
    }

    // A merge patch rather than a replace, so labels, annotations and binaryData
    // written by others survive. The resourceVersion makes the API server refuse
    // the patch if the ConfigMap changed since it was read.
    async fn update(&self, document: &Document) -> Result<Document, StoreError> {
        let patch = merge_patch(document);
        let updated = self
            .api(&document.namespace)
            .patch(&document.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_error(e, &document.name, &document.namespace))?;

        Ok(to_document(updated, &document.namespace))
    }
}

fn to_document(config_map: ConfigMap, namespace: &str) -> Document {
    Document {
        name: config_map.metadata.name.unwrap_or_default(),
        namespace: config_map
            .metadata
            .namespace
            .unwrap_or_else(|| namespace.to_string()),
        data: config_map.data.unwrap_or_default(),
        resource_version: config_map.metadata.resource_version,
    }
}

fn to_config_map(document: &Document) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(document.name.clone()),
            namespace: Some(document.namespace.clone()),
            ..Default::default()
        },
        data: Some(document.data.clone()),
        ..Default::default()
    }
}

fn merge_patch(document: &Document) -> Value {
    let mut metadata = Map::new();
    if let Some(version) = &document.resource_version {
        metadata.insert("resourceVersion".into(), Value::String(version.clone()));
    }

    json!({
        "metadata": metadata,
        "data": document.data,
    })
}

fn map_error(err: kube::Error, name: &str, namespace: &str) -> StoreError {
    match err {
        kube::Error::Api(response) if response.code == 409 => StoreError::Conflict {
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(response) if response.code == 403 => StoreError::Forbidden {
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: response.message,
        },
        err => StoreError::Kube(err),
    }
}
