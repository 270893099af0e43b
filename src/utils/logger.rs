use crate::utils::error::{IngressError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "ingress_adapter_jao=info";
const VERBOSE_FILTER: &str = "ingress_adapter_jao=debug,info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Contents of the `[Logging] configuration_file`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub with_target: bool,
}

fn default_filter() -> String {
    DEFAULT_FILTER.to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::Compact,
            with_target: false,
        }
    }
}

impl LogSettings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| IngressError::ConfigError {
            message: format!(
                "cannot read logging configuration {}: {}",
                path.as_ref().display(),
                e
            ),
        })?;
        toml::from_str(&content).map_err(|e| IngressError::ConfigValidationError {
            field: "Logging.configuration_file".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.filter = VERBOSE_FILTER.to_string();
        }
        self
    }
}

/// `RUST_LOG` wins over the configured filter.
pub fn init_logger(settings: &LogSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.filter));

    let registry = tracing_subscriber::registry().with(filter);
    match settings.format {
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(settings.with_target)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact(),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(settings.with_target)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .json(),
            )
            .init(),
    }
}
