//! Alert Analyzer CLI
//!
//! A command-line tool for checking the analyzer, triggering manual node
//! analysis and replaying alert webhooks.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{alerts, health};
use std::path::PathBuf;

/// Alert Analyzer CLI
#[derive(Parser)]
#[command(name = "alertctl")]
#[command(author, version, about = "CLI for the Alert Analyzer", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via ALERTCTL_API_URL env var)
    #[arg(long, env = "ALERTCTL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show service liveness and component health
    Health,

    /// Run an analysis for a node without an alert
    Analyze {
        /// Node identity as reported in the metrics store
        node: String,
    },

    /// Send a webhook payload read from a JSON file
    Send {
        /// Path to the webhook JSON document
        file: PathBuf,
    },

    /// Send a synthetic single-alert webhook
    TestAlert {
        /// Node the alert refers to
        #[arg(long)]
        node: String,

        /// Alert rule name
        #[arg(long, default_value = "HighCPU")]
        alertname: String,

        /// Alert severity
        #[arg(long, default_value = "warning")]
        severity: String,

        /// Optional summary annotation
        #[arg(long)]
        summary: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Health => {
            health::show_health(&client, cli.format).await?;
        }
        Commands::Analyze { node } => {
            alerts::analyze_node(&client, &node, cli.format).await?;
        }
        Commands::Send { file } => {
            alerts::send_webhook(&client, &file, cli.format).await?;
        }
        Commands::TestAlert {
            node,
            alertname,
            severity,
            summary,
        } => {
            alerts::send_test_alert(
                &client,
                &node,
                &alertname,
                &severity,
                summary.as_deref(),
                cli.format,
            )
            .await?;
        }
    }

    Ok(())
}
