//! Node identity resolution from alert metadata
//!
//! Alerts describe the affected host in many different ways depending on the
//! rule that fired. The resolver walks an ordered list of extractors and
//! returns the first non-empty answer, falling back to [`UNKNOWN_NODE`].

use tracing::debug;

use crate::models::Labels;

/// Identifier used when no source names the node
pub const UNKNOWN_NODE: &str = "unknown";

/// Pulls a candidate node identifier out of labels and annotations
pub type Extractor = fn(&Labels, &Labels) -> Option<String>;

/// Extractors in priority order, paired with a name for logging
pub const EXTRACTORS: &[(&str, Extractor)] = &[
    ("annotation:node", annotation_node),
    ("annotation:node_name", annotation_node_name),
    ("label:node", label_node),
    ("label:node_name", label_node_name),
    ("label:job", job_label),
    ("label:instance", instance_label),
];

/// Merge per-alert labels with the group's common labels.
///
/// Common labels win on key collision.
pub fn merge_labels(alert_labels: Option<&Labels>, common_labels: Option<&Labels>) -> Labels {
    let mut merged = Labels::new();
    if let Some(labels) = alert_labels {
        merged.extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if let Some(labels) = common_labels {
        merged.extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// Resolve the node identifier. Never fails and never returns an empty string.
pub fn resolve(labels: &Labels, annotations: &Labels) -> String {
    for (source, extract) in EXTRACTORS {
        if let Some(node) = extract(labels, annotations) {
            debug!(source = %source, node = %node, "Resolved node identity");
            return node;
        }
    }

    debug!("No node identity in alert metadata");
    UNKNOWN_NODE.to_string()
}

fn lookup(map: &Labels, key: &str) -> Option<String> {
    map.get(key).filter(|v| !v.is_empty()).cloned()
}

fn annotation_node(_labels: &Labels, annotations: &Labels) -> Option<String> {
    lookup(annotations, "node")
}

fn annotation_node_name(_labels: &Labels, annotations: &Labels) -> Option<String> {
    lookup(annotations, "node_name")
}

fn label_node(labels: &Labels, _annotations: &Labels) -> Option<String> {
    lookup(labels, "node")
}

fn label_node_name(labels: &Labels, _annotations: &Labels) -> Option<String> {
    lookup(labels, "node_name")
}

/// The job name itself, when it looks like a node exporter job
fn job_label(labels: &Labels, _annotations: &Labels) -> Option<String> {
    lookup(labels, "job").filter(|job| job.contains("node"))
}

/// `host:port` becomes `host`
fn instance_label(labels: &Labels, _annotations: &Labels) -> Option<String> {
    let instance = lookup(labels, "instance")?;
    let host = instance.split(':').next().unwrap_or_default();
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
