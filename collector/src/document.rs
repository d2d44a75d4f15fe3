//! Renders a snapshot into the two ConfigMap sections read by the policy engine.
//!
//! The layout of each block (the `<id>:` header and the `Cluster ID`, `Project ID`,
//! `Name` and `AnnotationN` key lines) is what the consumer parses, so it must stay
//! stable. Every section is valid YAML: a mapping from entity id to its fields.

use crate::snapshot::{ClusterEntry, ProjectEntry, Snapshot};
use std::collections::BTreeMap;

pub const CLUSTERS_SECTION: &str = "clusters";
pub const PROJECTS_SECTION: &str = "projects";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sections {
    pub clusters: String,
    pub projects: String,
}

impl Sections {
    pub fn compose(snapshot: &Snapshot) -> Self {
        let mut sections = Sections::default();

        for cluster in snapshot.clusters() {
            render_cluster(&mut sections.clusters, cluster);
        }

        for project in snapshot.projects() {
            render_project(&mut sections.projects, project);
        }

        sections
    }

    /// Overwrites the owned sections in `data`. Other keys are left untouched.
    pub fn apply_to(&self, data: &mut BTreeMap<String, String>) {
        data.insert(CLUSTERS_SECTION.to_string(), self.clusters.clone());
        data.insert(PROJECTS_SECTION.to_string(), self.projects.clone());
    }

    pub fn to_data(&self) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();
        self.apply_to(&mut data);
        data
    }
}

fn render_cluster(out: &mut String, cluster: &ClusterEntry) {
    out.push_str(&format!("{}:\n", cluster.id));
    out.push_str(&format!("  Cluster ID: {}\n", cluster.id));
    out.push_str(&format!("  Name: {}\n", quote(&cluster.name)));
}

fn render_project(out: &mut String, project: &ProjectEntry) {
    out.push_str(&format!("{}:\n", project.id));
    out.push_str(&format!("  Project ID: {}\n", project.id));
    out.push_str(&format!("  Name: {}\n", quote(&project.name)));

    for (i, (key, value)) in project.annotations.iter().enumerate() {
        out.push_str(&format!(
            "  Annotation{}: {}\n",
            i + 1,
            quote(&format!("{key} = {value}"))
        ));
    }
}

/// Double-quoted scalar with backslashes, quotes, line breaks and every other
/// control character escaped.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            // Unicode line and paragraph separators end a line for YAML 1.1 parsers
            c if c.is_control() || c == '\u{2028}' || c == '\u{2029}' => {
                quoted.push_str(&format!("\\u{:04X}", c as u32))
            }
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
