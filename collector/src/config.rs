use serde::Deserialize;
use shared::retry::RetryPolicy;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Rancher server URL is not set")]
    MissingUrl,

    #[error("Rancher API token is not set")]
    MissingToken,

    #[error("Document name cannot be empty")]
    EmptyDocumentName,

    #[error("Document namespace cannot be empty")]
    EmptyNamespace,

    #[error("Request timeout cannot be 0")]
    InvalidTimeout,

    #[error("Rancher API version cannot be empty")]
    EmptyApiVersion,
}

fn default_api_version() -> String {
    "v3".into()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Connection settings for the Rancher API.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Rancher {
    /// Server URL without the API version, e.g. `https://rancher.internal`
    pub url: Option<Url>,
    pub token: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Skips TLS certificate verification. Only meant for internal endpoints with
    /// self-signed certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for Rancher {
    fn default() -> Self {
        Rancher {
            url: None,
            token: None,
            api_version: default_api_version(),
            accept_invalid_certs: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Rancher {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// The ConfigMap the snapshot is published to.
#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct Document {
    pub name: String,
    pub namespace: String,
}

impl Default for Document {
    fn default() -> Self {
        Document {
            name: "rancher-data".into(),
            namespace: "kube-system".into(),
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct Retry {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for Retry {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Retry {
            max_retries: policy.max_retries,
            base_delay_ms: policy.base_delay.as_millis() as u64,
        }
    }
}

impl From<&Retry> for RetryPolicy {
    fn from(retry: &Retry) -> Self {
        RetryPolicy::new(retry.max_retries, Duration::from_millis(retry.base_delay_ms))
    }
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub rancher: Rancher,
    #[serde(default)]
    pub document: Document,
    #[serde(default)]
    pub retry: Retry,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.rancher.url.is_none() {
            return Err(ValidationError::MissingUrl);
        }

        match self.rancher.token.as_deref() {
            None | Some("") => return Err(ValidationError::MissingToken),
            Some(_) => {}
        }

        if self.rancher.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }

        if self.rancher.api_version.trim_matches('/').is_empty() {
            return Err(ValidationError::EmptyApiVersion);
        }

        if self.document.name.is_empty() {
            return Err(ValidationError::EmptyDocumentName);
        }

        if self.document.namespace.is_empty() {
            return Err(ValidationError::EmptyNamespace);
        }

        Ok(())
    }
}
