use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Value of the `type` field that marks a genuine cluster. The clusters endpoint
/// also returns other node kinds which are not collected.
pub const CLUSTER_TYPE: &str = "cluster";

pub type ClusterId = String;
pub type ProjectId = String;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Cluster {
    pub id: ClusterId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl Cluster {
    pub fn is_cluster(&self) -> bool {
        self.kind == CLUSTER_TYPE
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cluster_id: ClusterId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub annotations: BTreeMap<String, String>,
}

// Rancher sends `"annotations": null` for projects that never had any.
fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// The `{"data": [...]}` envelope every Rancher collection endpoint returns.
#[derive(Deserialize)]
pub(crate) struct Collection<T> {
    pub data: Vec<T>,
}
