//! PromQL query templates
//!
//! Node identifiers are embedded as a fuzzy `instance=~".*<node>.*"` match.
//! Identifiers that could break out of the label matcher are rejected instead
//! of escaped.

use serde::Deserialize;
use thiserror::Error;

const NODE_PLACEHOLDER: &str = "{node}";
const WORKLOAD_PLACEHOLDER: &str = "{workload}";

/// Characters that are never allowed inside an embedded identifier.
/// Control characters are rejected as well.
const FORBIDDEN_CHARS: &[char] = &['"', '\'', '`', '{', '}', '\\'];

/// The query shapes the pipeline knows how to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    CpuUsage,
    MemoryUsage,
    DiskUsage,
    WorkloadCpu,
    WorkloadMemory,
}

impl QueryKind {
    /// Node-level kinds, in the order a snapshot is assembled
    pub const NODE_KINDS: [QueryKind; 3] = [
        QueryKind::CpuUsage,
        QueryKind::MemoryUsage,
        QueryKind::DiskUsage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::CpuUsage => "cpu_usage",
            QueryKind::MemoryUsage => "memory_usage",
            QueryKind::DiskUsage => "disk_usage",
            QueryKind::WorkloadCpu => "workload_cpu",
            QueryKind::WorkloadMemory => "workload_memory",
        }
    }
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while rendering a query
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("{field} must not be empty")]
    EmptyIdentifier { field: &'static str },

    #[error("{field} {value:?} contains a quote, brace, backslash or control character")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("query kind {0} requires a workload name")]
    MissingWorkload(QueryKind),
}

/// Template strings for every [`QueryKind`].
///
/// `{node}` is replaced with the node identifier and `{workload}` with the
/// workload name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueryTemplates {
    pub cpu_usage: String,
    pub memory_usage: String,
    pub disk_usage: String,
    pub workload_cpu: String,
    pub workload_memory: String,
}

impl Default for QueryTemplates {
    fn default() -> Self {
        Self {
            cpu_usage: r#"100 - (avg(rate(node_cpu_seconds_total{mode="idle",instance=~".*{node}.*"}[5m])) * 100)"#
                .to_string(),
            memory_usage: r#"100 - ((node_memory_MemAvailable_bytes{instance=~".*{node}.*"} / node_memory_MemTotal_bytes{instance=~".*{node}.*"}) * 100)"#
                .to_string(),
            disk_usage: r#"100 - ((node_filesystem_avail_bytes{instance=~".*{node}.*",fstype!="tmpfs"} / node_filesystem_size_bytes{instance=~".*{node}.*",fstype!="tmpfs"}) * 100)"#
                .to_string(),
            workload_cpu: r#"sum by (name) (rate(container_cpu_usage_seconds_total{instance=~".*{node}.*",name!=""}[5m])) * 100"#
                .to_string(),
            workload_memory: r#"sum(container_memory_usage_bytes{instance=~".*{node}.*",name="{workload}"}) / 1024 / 1024"#
                .to_string(),
        }
    }
}

impl QueryTemplates {
    fn template(&self, kind: QueryKind) -> &str {
        match kind {
            QueryKind::CpuUsage => &self.cpu_usage,
            QueryKind::MemoryUsage => &self.memory_usage,
            QueryKind::DiskUsage => &self.disk_usage,
            QueryKind::WorkloadCpu => &self.workload_cpu,
            QueryKind::WorkloadMemory => &self.workload_memory,
        }
    }

    /// Render the expression for `kind`.
    ///
    /// `workload` is required for [`QueryKind::WorkloadMemory`] and ignored
    /// otherwise.
    pub fn render(
        &self,
        kind: QueryKind,
        node: &str,
        workload: Option<&str>,
    ) -> Result<String, QueryError> {
        validate_identifier("node identifier", node)?;

        let expression = self.template(kind).replace(NODE_PLACEHOLDER, node);

        match kind {
            QueryKind::WorkloadMemory => {
                let workload = workload.ok_or(QueryError::MissingWorkload(kind))?;
                validate_identifier("workload name", workload)?;
                Ok(expression.replace(WORKLOAD_PLACEHOLDER, workload))
            }
            _ => Ok(expression),
        }
    }
}

/// Check that an identifier can be embedded in a label matcher
pub fn validate_identifier(field: &'static str, value: &str) -> Result<(), QueryError> {
    if value.is_empty() {
        return Err(QueryError::EmptyIdentifier { field });
    }
    if value.contains(FORBIDDEN_CHARS) || value.chars().any(char::is_control) {
        return Err(QueryError::InvalidIdentifier {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Render with the default templates
pub fn render(kind: QueryKind, node: &str, workload: Option<&str>) -> Result<String, QueryError> {
    QueryTemplates::default().render(kind, node, workload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_cpu_embeds_node_as_fuzzy_match() {
        let query = render(QueryKind::CpuUsage, "app-vm-01", None).unwrap();
        assert_eq!(
            query,
            r#"100 - (avg(rate(node_cpu_seconds_total{mode="idle",instance=~".*app-vm-01.*"}[5m])) * 100)"#
        );
    }

    #[test]
    fn test_render_replaces_every_node_placeholder() {
        for kind in QueryKind::NODE_KINDS {
            let query = render(kind, "10.0.0.5", None).unwrap();
            assert!(!query.contains(NODE_PLACEHOLDER), "{kind} left a placeholder");
            assert!(query.contains(r#"instance=~".*10.0.0.5.*""#));
        }
    }

    #[test]
    fn test_render_workload_memory() {
        let query = render(QueryKind::WorkloadMemory, "node-1", Some("billing-api")).unwrap();
        assert!(query.contains(r#"name="billing-api""#));
        assert!(query.contains(r#"instance=~".*node-1.*""#));
    }

    #[test]
    fn test_workload_memory_requires_workload() {
        let err = render(QueryKind::WorkloadMemory, "node-1", None).unwrap_err();
        assert_eq!(err, QueryError::MissingWorkload(QueryKind::WorkloadMemory));
    }

    #[test]
    fn test_workload_ignored_for_node_kinds() {
        let with = render(QueryKind::DiskUsage, "node-1", Some("api")).unwrap();
        let without = render(QueryKind::DiskUsage, "node-1", None).unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn test_rejects_quotes_and_braces() {
        for bad in ["a\"b", "a'b", "a`b", "a{b", "a}b"] {
            let err = render(QueryKind::CpuUsage, bad, None).unwrap_err();
            assert!(matches!(err, QueryError::InvalidIdentifier { .. }), "{bad}");
        }
        let err = render(QueryKind::WorkloadMemory, "node-1", Some("x\"}")).unwrap_err();
        assert!(matches!(
            err,
            QueryError::InvalidIdentifier {
                field: "workload name",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_backslash_and_control_characters() {
        for bad in ["node\\1", "node\n1", "node\t1", "node\u{7f}"] {
            let err = render(QueryKind::DiskUsage, bad, None).unwrap_err();
            assert!(matches!(err, QueryError::InvalidIdentifier { .. }), "{bad:?}");
        }
        assert!(render(QueryKind::DiskUsage, "node-1.example:9100", None).is_ok());
    }

    #[test]
    fn test_rejects_empty_node() {
        let err = render(QueryKind::CpuUsage, "", None).unwrap_err();
        assert_eq!(
            err,
            QueryError::EmptyIdentifier {
                field: "node identifier"
            }
        );
    }

    #[test]
    fn test_node_match_is_case_sensitive() {
        let query = render(QueryKind::MemoryUsage, "App-VM", None).unwrap();
        assert!(query.contains(".*App-VM.*"));
    }

    #[test]
    fn test_custom_templates() {
        let templates = QueryTemplates {
            cpu_usage: "cpu{host=\"{node}\"}".to_string(),
            ..QueryTemplates::default()
        };
        let query = templates.render(QueryKind::CpuUsage, "db-1", None).unwrap();
        assert_eq!(query, "cpu{host=\"db-1\"}");
    }
}
