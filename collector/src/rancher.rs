use crate::config::Rancher as RancherConfig;
use crate::metrics_defs::{RANCHER_FETCH_DURATION, RANCHER_FETCH_FAILURE};
use crate::snapshot::EntitySource;
use crate::types::{Cluster, Collection, Project};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use shared::retry::{RetriesExhausted, RetryPolicy};
use shared::{counter, histogram};
use std::time::Instant;
use url::Url;

/// Error of a single request. Every variant is retried.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("request to Rancher API failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status code from Rancher API: {0}")]
    Status(StatusCode),
    #[error("could not decode Rancher API response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    fn reason(&self) -> &'static str {
        match self {
            FetchError::Request(_) => "request",
            FetchError::Status(_) => "status",
            FetchError::Decode(_) => "decode",
        }
    }
}

pub type FetchFailure = RetriesExhausted<FetchError>;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("invalid Rancher URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("could not build HTTP client: {0}")]
    Builder(#[from] reqwest::Error),
}

pub struct RancherClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
}

impl RancherClient {
    pub fn new(
        server_url: &Url,
        token: &str,
        config: &RancherConfig,
        retry: RetryPolicy,
    ) -> Result<Self, ClientError> {
        let base_url = format!(
            "{}/{}",
            server_url.as_str().trim_end_matches('/'),
            config.api_version.trim_matches('/')
        );
        // Fail on construction rather than on every request
        Url::parse(&base_url)?;

        if config.accept_invalid_certs {
            tracing::warn!(
                url = %base_url,
                "TLS certificate verification is disabled for the Rancher API"
            );
        }

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(config.timeout())
            .build()?;

        Ok(RancherClient {
            client,
            base_url,
            token: token.to_string(),
            retry,
        })
    }

    pub async fn fetch_clusters(&self) -> Result<Vec<Cluster>, FetchFailure> {
        tracing::debug!("Fetching clusters");
        let url = format!("{}/clusters", self.base_url);

        let clusters: Vec<Cluster> = self
            .retry
            .retry(|| self.get_collection(&url, &[], "clusters"))
            .await?;

        tracing::info!("Fetched {} clusters from Rancher API", clusters.len());
        Ok(clusters)
    }

    pub async fn fetch_projects(&self, cluster_id: &str) -> Result<Vec<Project>, FetchFailure> {
        tracing::debug!(cluster_id, "Fetching projects");
        let url = format!("{}/projects", self.base_url);
        let query = [("clusterId", cluster_id)];

        let projects: Vec<Project> = self
            .retry
            .retry(|| self.get_collection(&url, &query, "projects"))
            .await?;

        tracing::info!(
            cluster_id,
            "Fetched {} projects from Rancher API",
            projects.len()
        );
        Ok(projects)
    }

    async fn get_collection<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        resource: &'static str,
    ) -> Result<Vec<T>, FetchError> {
        let start = Instant::now();
        let result = self.send_request(url, query).await;
        histogram!(RANCHER_FETCH_DURATION, "resource" => resource)
            .record(start.elapsed().as_secs_f64());

        if let Err(ref e) = result {
            counter!(RANCHER_FETCH_FAILURE, "resource" => resource, "reason" => e.reason())
                .increment(1);
        }

        result
    }

    async fn send_request<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, FetchError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.bytes().await?;
        let collection: Collection<T> = serde_json::from_slice(&body)?;

        Ok(collection.data)
    }
}

#[async_trait]
impl EntitySource for RancherClient {
    async fn clusters(&self) -> Result<Vec<Cluster>, FetchFailure> {
        self.fetch_clusters().await
    }

    async fn projects(&self, cluster_id: &str) -> Result<Vec<Project>, FetchFailure> {
        self.fetch_projects(cluster_id).await
    }
}
