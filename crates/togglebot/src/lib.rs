//! # Togglebot Evaluation Hooks
//!
//! Instrumentation for OpenFeature flag reads. Every evaluation made through a
//! [`HookedClient`] passes through the registered [`Hooks`]:
//!
//! ```text
//! before ──► resolve ──► after | error ──► finally
//! ```
//!
//! Three hooks ship with the crate:
//!
//! * [`SpanHook`] opens a `tracing` span named `feature_flag_evaluation.<flagKey>`
//!   in `before`, tags it with the outcome and closes it in `finally`
//! * [`NativeTracerHook`] does the same through an APM agent's own tracer API
//! * [`LogHook`] emits one structured event per outcome
//!
//! Hooks that need to carry a handle from `before` to `finally` keep it in a
//! [`CorrelationStore`] under a [`CorrelationKey`] derived from the flag key
//! and the subject id.
//!
//! ## Example
//!
//! ```rust,no_run
//! use open_feature::Value;
//! use open_feature_togglebot::{
//!     ClientOptions, HookedClient, Hooks, LogHook, SpanHook, StaticFlag, StaticProvider, User,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let provider = StaticProvider::new()
//!         .with_flag("togglebot-wink", StaticFlag::new(Value::Bool(true)));
//!     let hooks = Hooks::builder()
//!         .with(SpanHook::new())
//!         .with(LogHook::new())
//!         .build();
//!     let client = HookedClient::new(Arc::new(provider), hooks, ClientOptions::default());
//!
//!     let variable = client
//!         .variable(&User::new("user-1"), "togglebot-wink", Value::Bool(false))
//!         .await;
//!     assert_eq!(variable.as_bool(), Some(true));
//! }
//! ```
//!
//! ## Features
//!
//! * `otel` - bridges hook spans into an OpenTelemetry tracer provider, see
//!   [`telemetry`]

pub mod attributes;
mod client;
pub mod config;
mod context;
mod error;
mod hook;
pub mod hooks;
mod provider;
mod store;
pub mod telemetry;
pub mod togglebot;

pub use client::HookedClient;
pub use config::{ClientOptions, TelemetryOptions};
pub use context::{
    EvalReason, EvaluationMetadata, FEATURE_ID_METADATA_KEY, HookContext,
    REASON_DETAILS_METADATA_KEY, User, Variable, VariableMetadata,
};
pub use error::{HookError, TelemetryError};
pub use hook::{EvalHook, Hooks, HooksBuilder, Lifecycle};
pub use hooks::{
    AgentSdk, CurrentSpan, LogHook, NativeTracer, NativeTracerHook, NoFallback, SpanFallback,
    SpanHook,
};
pub use provider::{StaticFlag, StaticProvider};
pub use store::{CorrelationKey, CorrelationStore, KeyScheme};
pub use togglebot::Togglebot;
