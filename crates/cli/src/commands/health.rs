//! Service health commands

use crate::client::{ApiClient, HealthReport};
use crate::output::{color_status, print_info, print_success, print_table, print_warning, OutputFormat};
use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

#[derive(Tabled, Serialize)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Failures")]
    consecutive_failures: u32,
    #[tabled(rename = "Message")]
    message: String,
}

fn component_rows(report: &HealthReport) -> Vec<ComponentRow> {
    let mut rows: Vec<ComponentRow> = report
        .components
        .iter()
        .map(|(name, c)| ComponentRow {
            name: name.clone(),
            status: c.status.clone(),
            consecutive_failures: c.consecutive_failures,
            message: c.message.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

/// Check liveness, then list per-component health
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let liveness = client.get_text("v1/monitoring/health").await?;
    let report: HealthReport = client.get_json_any_status("healthz").await?;

    match format {
        OutputFormat::Json => {
            crate::output::print_json(&serde_json::json!({
                "message": liveness,
                "health": report,
            }));
        }
        OutputFormat::Table => {
            print_success(&liveness);
            println!();
            println!("{} {}", "Overall:".bold(), color_status(&report.status));

            let mut rows = component_rows(&report);
            for row in &mut rows {
                row.status = color_status(&row.status);
            }
            print_table(&rows, format);

            match report.status.as_str() {
                "healthy" => {}
                "degraded" => print_warning("Recent analysis or publish calls have failed"),
                _ => print_info("Service reports unhealthy, check the analyzer logs"),
            }
        }
    }

    Ok(())
}
