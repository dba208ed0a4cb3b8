//! # Configuration
//!
//! Option structs whose `Default` reads the environment.
//!
//! ## Telemetry
//!
//! * `OTEL_ENABLED` - `true` (any case) to export spans (default: disabled)
//! * `OTEL_SERVICE_NAME` - default `HelloTogglebot`
//! * `OTEL_SERVICE_VERSION` - default `1.0.0`
//! * `DT_ENDPOINT` - Dynatrace tenant; traces go to `{endpoint}/api/v2/otlp/v1/traces`
//! * `OTEL_EXPORTER_OTLP_ENDPOINT` - used when `DT_ENDPOINT` is unset
//! * `DT_API_TOKEN` - sent as `Authorization: Api-Token <token>`
//! * `OTEL_EXPORTER_OTLP_HEADERS` - `key=value,key=value`
//! * `RUST_LOG` - log filter (default `info`)
//!
//! ## Client
//!
//! * `TOGGLEBOT_PROJECT_ID`, `TOGGLEBOT_ENVIRONMENT_ID` - evaluation metadata
//! * `TOGGLEBOT_EVALUATION_TIMEOUT_MS` - upper bound for one flag read

use crate::context::EvaluationMetadata;
use crate::error::TelemetryError;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_SERVICE_NAME: &str = "HelloTogglebot";
pub const DEFAULT_SERVICE_VERSION: &str = "1.0.0";
const DYNATRACE_TRACES_PATH: &str = "/api/v2/otlp/v1/traces";
const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Reads an environment variable, treating empty values as unset.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Settings for span export and log output.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryOptions {
    pub enabled: bool,
    pub service_name: String,
    pub service_version: String,
    /// Full OTLP traces endpoint.
    pub otlp_endpoint: Option<String>,
    pub headers: HashMap<String, String>,
    pub export_timeout: Duration,
    pub log_filter: String,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        let enabled = env_var("OTEL_ENABLED")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

        let otlp_endpoint = match env_var("DT_ENDPOINT") {
            Some(endpoint) => Some(format!(
                "{}{}",
                endpoint.trim_end_matches('/'),
                DYNATRACE_TRACES_PATH
            )),
            None => env_var("OTEL_EXPORTER_OTLP_ENDPOINT"),
        };

        let mut headers = HashMap::new();
        if let Some(token) = env_var("DT_API_TOKEN") {
            headers.insert("Authorization".to_string(), format!("Api-Token {}", token));
        }
        if let Some(raw) = env_var("OTEL_EXPORTER_OTLP_HEADERS") {
            headers.extend(parse_headers(&raw));
        }

        Self {
            enabled,
            service_name: env_var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            service_version: env_var("OTEL_SERVICE_VERSION")
                .unwrap_or_else(|| DEFAULT_SERVICE_VERSION.to_string()),
            otlp_endpoint,
            headers,
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
            log_filter: env_var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        }
    }
}

impl TelemetryOptions {
    /// Whether spans should be shipped to an exporter.
    pub fn is_export_configured(&self) -> bool {
        self.enabled && self.otlp_endpoint.is_some()
    }

    pub fn export_endpoint(&self) -> Result<&str, TelemetryError> {
        self.otlp_endpoint.as_deref().ok_or_else(|| {
            TelemetryError::Config(
                "neither DT_ENDPOINT nor OTEL_EXPORTER_OTLP_ENDPOINT is set".to_string(),
            )
        })
    }
}

/// Parses `key=value,key=value`; entries without `=` are skipped.
pub fn parse_headers(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Settings for [`crate::HookedClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    pub metadata: Option<EvaluationMetadata>,
    /// No bound when `None`.
    pub evaluation_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        let project_id = env_var("TOGGLEBOT_PROJECT_ID");
        let environment_id = env_var("TOGGLEBOT_ENVIRONMENT_ID");
        let metadata = (project_id.is_some() || environment_id.is_some()).then_some(
            EvaluationMetadata {
                project_id,
                environment_id,
            },
        );

        let evaluation_timeout = env_var("TOGGLEBOT_EVALUATION_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis);

        Self {
            metadata,
            evaluation_timeout,
        }
    }
}

impl ClientOptions {
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(EvaluationMetadata::default)
            .project_id = Some(project_id.into());
        self
    }

    pub fn with_environment(mut self, environment_id: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(EvaluationMetadata::default)
            .environment_id = Some(environment_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.evaluation_timeout = Some(timeout);
        self
    }
}
