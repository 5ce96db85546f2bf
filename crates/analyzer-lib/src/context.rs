//! Analysis prompt assembly
//!
//! The prompt is a pure function of its inputs: no clock reads and no shared
//! state, so identical requests always render byte-identical text.

use crate::models::{
    AlertContext, AnalysisRequest, NodeSnapshot, WorkloadMap, WorkloadSnapshot,
    MAX_HISTORY_ENTRIES,
};

const HEADER: &str = "### Node monitoring anomaly detected ###\n\n";

const REQUEST_WITH_WORKLOADS: &str = "\
1. Judge whether the current state is outside the normal range
2. Compare against the historical trend and check for sudden changes
3. Identify the workload consuming the most resources and judge whether it is the root cause
4. Project the risk for the next hour
5. Recommend actions
";

const REQUEST_WITHOUT_WORKLOADS: &str = "\
1. Judge whether the current state is outside the normal range
2. Compare against the historical trend and check for sudden changes
3. Estimate the most likely root cause
4. Project the risk for the next hour
5. Recommend actions
";

const RESPONSE_FORMAT: &str = "\
Answer in plain text without Markdown or other markup, in at most 10 lines, using exactly these sections:
[Current state] whether the node is outside the normal range
[Trend] how the current values compare to the recent history
[Workload analysis] which workload is responsible, if workload data is available
[Risk in 1 hour] what is likely to happen if nothing changes
[Recommended action] the single most important next step
";

/// Render the prompt for an [`AnalysisRequest`]
pub fn build_request(request: &AnalysisRequest) -> String {
    build(
        &request.current,
        &request.history,
        &request.workloads,
        &request.alert,
    )
}

/// Render the prompt from its parts.
///
/// At most [`MAX_HISTORY_ENTRIES`] history entries are shown. Workloads are
/// listed in name order.
pub fn build(
    current: &NodeSnapshot,
    history: &[NodeSnapshot],
    workloads: &WorkloadMap,
    alert: &AlertContext,
) -> String {
    let mut prompt = String::from(HEADER);

    prompt.push_str("**Alert information:**\n");
    prompt.push_str(&alert_summary(alert));
    prompt.push_str("\n\n");

    prompt.push_str("**Current state:**\n");
    prompt.push_str(&format!("- Node: {}\n", current.node()));
    prompt.push_str(&format!("- CPU usage: {:.2}%\n", current.cpu_usage_percent()));
    prompt.push_str(&format!(
        "- Memory usage: {:.2}%\n",
        current.memory_usage_percent()
    ));
    prompt.push_str(&format!(
        "- Disk usage: {:.2}%\n\n",
        current.disk_usage_percent()
    ));

    if !workloads.is_empty() {
        prompt.push_str("**Workloads on this node:**\n");
        for workload in sorted_workloads(workloads) {
            prompt.push_str(&format!(
                "- {}: CPU {:.2}%, memory {:.2} MB\n",
                workload.name(),
                workload.cpu_usage_percent(),
                workload.memory_usage_mb()
            ));
        }
        prompt.push('\n');
    }

    let shown = &history[..history.len().min(MAX_HISTORY_ENTRIES)];
    prompt.push_str(&format!(
        "**Historical trend (last {} hours):**\n",
        shown.len()
    ));
    for (i, snapshot) in shown.iter().enumerate() {
        prompt.push_str(&format!(
            "{} - CPU: {:.2}%, memory: {:.2}%, disk: {:.2}%\n",
            hours_ago(i + 1),
            snapshot.cpu_usage_percent(),
            snapshot.memory_usage_percent(),
            snapshot.disk_usage_percent()
        ));
    }

    prompt.push_str("\n**Analysis request:**\n");
    if workloads.is_empty() {
        prompt.push_str(REQUEST_WITHOUT_WORKLOADS);
    } else {
        prompt.push_str(REQUEST_WITH_WORKLOADS);
    }

    prompt.push_str("\n**Response format:**\n");
    prompt.push_str(RESPONSE_FORMAT);

    prompt
}

/// Short human-readable description of the alert
pub fn alert_summary(alert: &AlertContext) -> String {
    let mut lines = vec![
        format!("Alert: {}", alert.alert_name),
        format!("Severity: {}", alert.severity),
    ];
    if let Some(summary) = &alert.summary {
        lines.push(format!("Summary: {}", summary));
    }
    if let Some(description) = &alert.description {
        lines.push(format!("Description: {}", description));
    }
    lines.join("\n")
}

fn sorted_workloads(workloads: &WorkloadMap) -> Vec<&WorkloadSnapshot> {
    let mut entries: Vec<_> = workloads.values().collect();
    entries.sort_by(|a, b| a.name().cmp(b.name()));
    entries
}

fn hours_ago(hours: usize) -> String {
    if hours == 1 {
        "1 hour ago".to_string()
    } else {
        format!("{} hours ago", hours)
    }
}
