//! Metrics definitions for the collector.

use shared::metrics_defs::{MetricDef, MetricType};

pub const RANCHER_FETCH_DURATION: MetricDef = MetricDef {
    name: "rancher.fetch.duration",
    metric_type: MetricType::Histogram,
    description: "Time of a single Rancher API request in seconds, tagged by resource",
};

pub const RANCHER_FETCH_FAILURE: MetricDef = MetricDef {
    name: "rancher.fetch.failure",
    metric_type: MetricType::Counter,
    description: "Failed Rancher API requests, tagged by resource and reason",
};

pub const SNAPSHOT_CLUSTERS: MetricDef = MetricDef {
    name: "snapshot.clusters",
    metric_type: MetricType::Gauge,
    description: "Number of clusters in the last published snapshot",
};

pub const SNAPSHOT_PROJECTS: MetricDef = MetricDef {
    name: "snapshot.projects",
    metric_type: MetricType::Gauge,
    description: "Number of projects in the last published snapshot",
};

pub const PASS_DURATION: MetricDef = MetricDef {
    name: "pass.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete a collection pass in seconds",
};

pub const PASS_FAILURE: MetricDef = MetricDef {
    name: "pass.failure",
    metric_type: MetricType::Counter,
    description: "Collection passes that did not publish, tagged by stage",
};

pub const ALL_METRICS: &[MetricDef] = &[
    RANCHER_FETCH_DURATION,
    RANCHER_FETCH_FAILURE,
    SNAPSHOT_CLUSTERS,
    SNAPSHOT_PROJECTS,
    PASS_DURATION,
    PASS_FAILURE,
];
