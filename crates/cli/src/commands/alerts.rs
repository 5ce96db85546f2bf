//! Alert and analysis commands

use crate::client::{AnalysisResponse, ApiClient, TestAlertPayload};
use crate::output::{color_status, print_json, print_success, print_warning, OutputFormat};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

const ALERT_PATH: &str = "v1/monitoring/alert";
const ANALYZE_PATH: &str = "v1/monitoring/analyze";

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn outcome_rows(response: &AnalysisResponse) -> Vec<FieldRow> {
    let mut rows = vec![FieldRow {
        field: "Status",
        value: color_status(&response.status),
    }];
    if let Some(node) = &response.node {
        rows.push(FieldRow {
            field: "Node",
            value: node.clone(),
        });
    }
    if let Some(alert_name) = &response.alert_name {
        rows.push(FieldRow {
            field: "Alert",
            value: alert_name.clone(),
        });
    }
    rows
}

fn print_outcome(response: &AnalysisResponse, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(response),
        OutputFormat::Table => {
            match response.status.as_str() {
                "processed" => print_success(&response.message),
                _ => print_warning(&response.message),
            }
            println!();

            let table = Table::new(outcome_rows(response))
                .with(Style::rounded())
                .to_string();
            println!("{}", table);

            if let Some(analysis) = &response.analysis {
                println!();
                println!("{}", "Analysis".bold().underline());
                println!("{}", analysis);
            }
        }
    }
}

/// Trigger a manual analysis for one node
pub async fn analyze_node(client: &ApiClient, node: &str, format: OutputFormat) -> Result<()> {
    let node = node.trim();
    if node.is_empty() {
        anyhow::bail!("node name must not be empty");
    }

    let response: AnalysisResponse = client
        .post_query(ANALYZE_PATH, &[("nodeName", node)])
        .await?;
    print_outcome(&response, format);
    Ok(())
}

/// Replay a webhook document stored on disk
pub async fn send_webhook(client: &ApiClient, file: &Path, format: OutputFormat) -> Result<()> {
    let body = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    // Catch typos locally rather than relying on the server's parse error
    serde_json::from_str::<serde_json::Value>(&body)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    let response: AnalysisResponse = client.post_raw(ALERT_PATH, body).await?;
    print_outcome(&response, format);
    Ok(())
}

/// Build and send a single-alert webhook
pub async fn send_test_alert(
    client: &ApiClient,
    node: &str,
    alert_name: &str,
    severity: &str,
    summary: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let payload = TestAlertPayload::new(node, alert_name, severity, summary);
    let response: AnalysisResponse = client.post(ALERT_PATH, &payload).await?;
    print_outcome(&response, format);
    Ok(())
}
