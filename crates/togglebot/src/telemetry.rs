//! # Telemetry
//!
//! Subscriber setup for the demo and for embedding applications.
//!
//! [`init_tracing`] installs an env-filtered `fmt` subscriber that also prints
//! closed spans, so the evaluation spans opened by [`crate::SpanHook`] are
//! visible without a collector. With the `otel` feature, [`tracer_provider`]
//! and [`otel_layer`] bridge the same spans into an OpenTelemetry
//! `SdkTracerProvider`. [`init_telemetry`] wires that bridge to an OTLP/HTTP
//! exporter built from [`TelemetryOptions`]; [`init_tracing_with_exporter`]
//! takes any other span exporter.

use crate::config::TelemetryOptions;
use crate::error::TelemetryError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[cfg(feature = "otel")]
use opentelemetry::KeyValue;
#[cfg(feature = "otel")]
use opentelemetry::trace::TracerProvider as _;
#[cfg(feature = "otel")]
use opentelemetry_otlp::{WithExportConfig, WithHttpConfig};
#[cfg(feature = "otel")]
use opentelemetry_sdk::Resource;
#[cfg(feature = "otel")]
use opentelemetry_sdk::trace::{SdkTracerProvider, SpanExporter};
#[cfg(feature = "otel")]
use tracing::Subscriber;
#[cfg(feature = "otel")]
use tracing_subscriber::Layer;
#[cfg(feature = "otel")]
use tracing_subscriber::registry::LookupSpan;

/// Filter built from `log_filter`, falling back to `info` when it does not parse.
pub fn env_filter(options: &TelemetryOptions) -> EnvFilter {
    EnvFilter::try_new(&options.log_filter).unwrap_or_else(|err| {
        eprintln!("ignoring invalid log filter {:?}: {}", options.log_filter, err);
        EnvFilter::new("info")
    })
}

/// Installs the global log subscriber.
pub fn init_tracing(options: &TelemetryOptions) -> Result<(), TelemetryError> {
    tracing_subscriber::registry()
        .with(env_filter(options))
        .with(tracing_subscriber::fmt::layer().with_span_events(FmtSpan::CLOSE))
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))
}

/// Tracer provider tagged with the service name and version.
#[cfg(feature = "otel")]
pub fn tracer_provider<E>(options: &TelemetryOptions, exporter: E) -> SdkTracerProvider
where
    E: SpanExporter + 'static,
{
    let resource = Resource::builder()
        .with_service_name(options.service_name.clone())
        .with_attribute(KeyValue::new(
            "service.version",
            options.service_version.clone(),
        ))
        .build();

    SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build()
}

/// Layer that exports `tracing` spans through `provider`.
#[cfg(feature = "otel")]
pub fn otel_layer<S>(provider: &SdkTracerProvider, options: &TelemetryOptions) -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    tracing_opentelemetry::layer().with_tracer(provider.tracer(options.service_name.clone()))
}

/// Installs the global subscriber and, when export is enabled, an OpenTelemetry
/// bridge in front of `exporter`.
///
/// Returns the provider so the caller can flush it on shutdown. `None` means
/// export is disabled and only logs are emitted.
#[cfg(feature = "otel")]
pub fn init_tracing_with_exporter<E>(
    options: &TelemetryOptions,
    exporter: E,
) -> Result<Option<SdkTracerProvider>, TelemetryError>
where
    E: SpanExporter + 'static,
{
    if !options.enabled {
        init_tracing(options)?;
        return Ok(None);
    }

    let provider = tracer_provider(options, exporter);
    tracing_subscriber::registry()
        .with(env_filter(options))
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer(&provider, options))
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    tracing::info!(
        service_name = %options.service_name,
        service_version = %options.service_version,
        endpoint = ?options.otlp_endpoint,
        "span export enabled"
    );
    Ok(Some(provider))
}

/// OTLP/HTTP span exporter for the configured endpoint, headers and timeout.
#[cfg(feature = "otel")]
pub fn otlp_exporter(
    options: &TelemetryOptions,
) -> Result<opentelemetry_otlp::SpanExporter, TelemetryError> {
    let endpoint = options.export_endpoint()?;
    opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .with_headers(options.headers.clone())
        .with_timeout(options.export_timeout)
        .build()
        .map_err(|e| TelemetryError::Init(e.to_string()))
}

/// Installs the global subscriber, exporting spans over OTLP when
/// [`TelemetryOptions::is_export_configured`].
///
/// Must be called outside an async runtime: the exporter uses a blocking
/// HTTP client.
#[cfg(feature = "otel")]
pub fn init_telemetry(
    options: &TelemetryOptions,
) -> Result<Option<SdkTracerProvider>, TelemetryError> {
    if !options.is_export_configured() {
        init_tracing(options)?;
        if options.enabled {
            tracing::warn!("OTEL_ENABLED is set but no OTLP endpoint is configured; spans stay local");
        }
        return Ok(None);
    }
    let exporter = otlp_exporter(options)?;
    init_tracing_with_exporter(options, exporter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn options(log_filter: &str) -> TelemetryOptions {
        TelemetryOptions {
            enabled: false,
            service_name: "togglebot-test".to_string(),
            service_version: "0.0.1".to_string(),
            otlp_endpoint: None,
            headers: HashMap::new(),
            export_timeout: Duration::from_secs(1),
            log_filter: log_filter.to_string(),
        }
    }

    #[test]
    fn test_env_filter_accepts_directives() {
        let filter = env_filter(&options("open_feature_togglebot=debug,warn"));
        assert!(filter.to_string().contains("open_feature_togglebot=debug"));
    }

    #[test]
    fn test_env_filter_falls_back_to_info() {
        let filter = env_filter(&options("open_feature_togglebot=loud"));
        assert_eq!(filter.to_string(), "info");
    }

    #[cfg(feature = "otel")]
    #[test]
    fn test_otlp_exporter_requires_an_endpoint() {
        assert!(matches!(
            otlp_exporter(&options("info")),
            Err(TelemetryError::Config(_))
        ));
    }

    #[cfg(feature = "otel")]
    #[test]
    fn test_otlp_exporter_from_options() {
        let mut options = options("info");
        options.enabled = true;
        options.otlp_endpoint = Some("http://127.0.0.1:4318/v1/traces".to_string());
        options
            .headers
            .insert("Authorization".to_string(), "Api-Token secret".to_string());
        assert!(options.is_export_configured());
        assert!(otlp_exporter(&options).is_ok());
    }

    #[cfg(feature = "otel")]
    #[test]
    fn test_provider_exports_bridged_spans() {
        use opentelemetry_sdk::trace::InMemorySpanExporter;
        use tracing_subscriber::Registry;

        let exporter = InMemorySpanExporter::default();
        let provider = tracer_provider(&options("info"), exporter.clone());
        let subscriber = Registry::default().with(otel_layer(&provider, &options("info")));

        tracing::subscriber::with_default(subscriber, || {
            let _span = tracing::info_span!("bridged", otel.name = "bridged.span").entered();
        });

        provider.force_flush().expect("flush ok");
        let spans = exporter.get_finished_spans().expect("spans readable");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "bridged.span");
        provider.shutdown().expect("shutdown ok");
    }
}
