//! Service configuration
//!
//! Loaded from an optional TOML file overlaid with `ANALYZER_*` environment
//! variables. Nested keys use a double underscore:
//! `ANALYZER_PROMETHEUS__URL=http://prometheus:9090`.

use analyzer_lib::engine::DEFAULT_SYSTEM_PROMPT;
use analyzer_lib::history::DEFAULT_WORKLOAD_LABEL;
use analyzer_lib::notify::DEFAULT_TOPIC;
use analyzer_lib::pipeline::{PipelineSettings, DEFAULT_HISTORY_HOURS};
use analyzer_lib::query::QueryTemplates;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "ALERT_ANALYZER_CONFIG";

/// Configuration file read when [`CONFIG_PATH_ENV`] is unset
pub const DEFAULT_CONFIG_FILE: &str = "alert-analyzer.toml";

const ENV_PREFIX: &str = "ANALYZER";

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// Port for the webhook, health and metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Hourly snapshots collected per alert
    #[serde(default = "default_history_hours")]
    pub history_hours: usize,

    #[serde(default)]
    pub prometheus: PrometheusConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub notification: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default = "default_prometheus_url")]
    pub url: String,

    #[serde(default = "default_prometheus_timeout")]
    pub timeout_secs: u64,

    /// Result label carrying the workload name
    #[serde(default = "default_workload_label")]
    pub workload_label: String,

    #[serde(default)]
    pub templates: QueryTemplates,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// API root of an OpenAI-compatible endpoint
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Kafka REST proxy base url. Notifications are only logged when unset.
    #[serde(default)]
    pub bus_url: Option<String>,

    #[serde(default = "default_topic")]
    pub topic: String,

    /// Chat user ids every notification is addressed to
    #[serde(default)]
    pub recipients: Vec<String>,

    #[serde(default = "default_publish_timeout")]
    pub timeout_secs: u64,
}

fn default_api_port() -> u16 {
    8080
}

fn default_history_hours() -> usize {
    DEFAULT_HISTORY_HOURS
}

fn default_prometheus_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_prometheus_timeout() -> u64 {
    5
}

fn default_workload_label() -> String {
    DEFAULT_WORKLOAD_LABEL.to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_publish_timeout() -> u64 {
    10
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            url: default_prometheus_url(),
            timeout_secs: default_prometheus_timeout(),
            workload_label: default_workload_label(),
            templates: QueryTemplates::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: String::new(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            max_tokens: None,
            temperature: None,
            system_prompt: default_system_prompt(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            bus_url: None,
            topic: default_topic(),
            recipients: Vec::new(),
            timeout_secs: default_publish_timeout(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            history_hours: default_history_hours(),
            prometheus: PrometheusConfig::default(),
            llm: LlmConfig::default(),
            notification: NotificationConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let file = ::config::File::new(&path, ::config::FileFormat::Toml).required(false);
        Self::from_builder(::config::Config::builder().add_source(file))
            .with_context(|| format!("failed to load configuration (file: {})", path))
    }

    /// Finish a builder with the environment overlay, then deserialize and validate
    pub fn from_builder(
        builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
    ) -> Result<Self> {
        let config = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("notification.recipients")
                    .try_parsing(true),
            )
            .build()?;

        let parsed: AnalyzerConfig = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.prometheus.url.trim().is_empty() {
            bail!("prometheus.url must not be empty");
        }
        if self.history_hours == 0 {
            bail!("history_hours must be greater than zero");
        }
        if self.prometheus.timeout_secs == 0 {
            bail!("prometheus.timeout_secs must be greater than zero");
        }
        if self.llm.timeout_secs == 0 {
            bail!("llm.timeout_secs must be greater than zero");
        }
        if self.notification.timeout_secs == 0 {
            bail!("notification.timeout_secs must be greater than zero");
        }
        if self.notification.topic.trim().is_empty() {
            bail!("notification.topic must not be empty");
        }
        Ok(())
    }

    pub fn prometheus_timeout(&self) -> Duration {
        Duration::from_secs(self.prometheus.timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.notification.timeout_secs)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            history_hours: self.history_hours,
            analysis_timeout: self.llm_timeout(),
            recipients: self.notification.recipients.clone(),
        }
    }
}
