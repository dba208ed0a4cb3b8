//! Serves the togglebot view for a few users with every hook attached.
//!
//! ```sh
//! RUST_LOG=info,open_feature_togglebot=debug cargo run --example togglebot
//! OTEL_ENABLED=true DT_ENDPOINT=https://<tenant> DT_API_TOKEN=<token> \
//!     cargo run --example togglebot --features otel
//! ```

use open_feature::{EvaluationReason, Value};
#[cfg(not(feature = "otel"))]
use open_feature_togglebot::telemetry::init_tracing;
use open_feature_togglebot::{
    AgentSdk, ClientOptions, HookError, HookedClient, Hooks, KeyScheme, LogHook, NativeTracer,
    NativeTracerHook, SpanHook, StaticFlag, StaticProvider, TelemetryOptions, Togglebot, User,
};
use std::sync::Arc;
use std::time::Duration;

/// Agent that writes its tracers to the log.
struct ConsoleAgent;

struct ConsoleTracer {
    endpoint: String,
}

impl NativeTracer for ConsoleTracer {
    fn start(&self) -> Result<(), HookError> {
        tracing::info!(endpoint = %self.endpoint, "agent tracer started");
        Ok(())
    }

    fn add_attribute(&self, key: &str, value: &str) -> Result<(), HookError> {
        tracing::info!(endpoint = %self.endpoint, key, value, "agent attribute");
        Ok(())
    }

    fn end(&self) -> Result<(), HookError> {
        tracing::info!(endpoint = %self.endpoint, "agent tracer ended");
        Ok(())
    }
}

impl AgentSdk for ConsoleAgent {
    fn trace_incoming_remote_call(
        &self,
        method: &str,
        service: &str,
        endpoint: &str,
    ) -> Result<Arc<dyn NativeTracer>, HookError> {
        tracing::debug!(method, service, endpoint, "tracing remote call");
        Ok(Arc::new(ConsoleTracer {
            endpoint: endpoint.to_string(),
        }))
    }

    fn add_custom_request_attribute(&self, key: &str, value: &str) -> Result<(), HookError> {
        tracing::info!(key, value, "request attribute");
        Ok(())
    }
}

fn provider() -> StaticProvider {
    StaticProvider::new()
        .with_flag(
            "togglebot-wink",
            StaticFlag::new(Value::Bool(true))
                .with_reason(EvaluationReason::TargetingMatch)
                .with_variant("wink")
                .with_feature_id("hello-togglebot")
                .with_reason_details("All Users"),
        )
        .with_flag(
            "togglebot-speed",
            StaticFlag::new(Value::String("surprise".to_string()))
                .with_reason(EvaluationReason::Split)
                .with_variant("surprise")
                .with_feature_id("hello-togglebot"),
        )
        .with_failure("example-text", "network timeout")
        .with_latency(Duration::from_millis(20))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let telemetry = TelemetryOptions::default();
    // The OTLP exporter's blocking client is built before the runtime starts.
    #[cfg(feature = "otel")]
    let tracer_provider = open_feature_togglebot::telemetry::init_telemetry(&telemetry)?;
    #[cfg(not(feature = "otel"))]
    init_tracing(&telemetry)?;

    tracing::info!(
        service_name = %telemetry.service_name,
        service_version = %telemetry.service_version,
        export = telemetry.is_export_configured(),
        "togglebot starting"
    );
    tokio::runtime::Runtime::new()?.block_on(serve());

    #[cfg(feature = "otel")]
    if let Some(provider) = tracer_provider {
        provider.shutdown()?;
    }
    Ok(())
}

async fn serve() {
    let hooks = Hooks::builder()
        .with(SpanHook::new().with_key_scheme(KeyScheme::PerEvaluation))
        .with(NativeTracerHook::new(ConsoleAgent))
        .with(LogHook::new())
        .build();
    let options = ClientOptions::default()
        .with_project("togglebot-demo")
        .with_environment("development")
        .with_timeout(Duration::from_millis(500));
    let client = HookedClient::new(Arc::new(provider()), hooks, options);
    tracing::debug!(?client, "client ready");

    for user_id in ["alice", "bob"] {
        let user = User::new(user_id).with_email(format!("{}@example.com", user_id));
        let bot = Togglebot::resolve(&client, &user).await;
        println!("[{}] {} {}", user_id, bot.image, bot.message);
        println!("    {}", bot.header);
        println!("    {}", bot.body);
    }
}
