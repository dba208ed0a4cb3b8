//! # Hooked Client
//!
//! Wraps a [`FeatureProvider`] and runs the registered [`Hooks`] around every
//! flag read. The caller always gets a [`Variable`] back; when resolution
//! fails, times out or is cancelled, the default value is served.
//!
//! ## Example
//!
//! ```rust,no_run
//! use open_feature_togglebot::{ClientOptions, Hooks, HookedClient, LogHook, SpanHook, StaticProvider, User};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let hooks = Hooks::builder().with(SpanHook::new()).with(LogHook::new()).build();
//!     let client = HookedClient::new(Arc::new(StaticProvider::new()), hooks, ClientOptions::default());
//!
//!     let wink = client.bool_value(&User::new("user-1"), "togglebot-wink", false).await;
//!     println!("wink: {}", wink);
//! }
//! ```

use crate::config::ClientOptions;
use crate::context::{
    EvalReason, HookContext, REASON_DETAILS_METADATA_KEY, User, Variable, VariableMetadata,
    metadata_string, reason_to_string,
};
use crate::hook::{Hooks, Lifecycle};
use open_feature::provider::{FeatureProvider, ResolutionDetails};
use open_feature::{EvaluationError, EvaluationErrorCode, EvaluationReason, EvaluationResult, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Flag client with the evaluation hook pipeline attached.
#[derive(Clone)]
pub struct HookedClient {
    provider: Arc<dyn FeatureProvider + Send + Sync>,
    hooks: Hooks,
    options: ClientOptions,
}

impl std::fmt::Debug for HookedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookedClient")
            .field("provider", &self.provider.metadata().name)
            .field("hooks", &self.hooks)
            .field("options", &self.options)
            .finish()
    }
}

impl HookedClient {
    pub fn new(
        provider: Arc<dyn FeatureProvider + Send + Sync>,
        hooks: Hooks,
        options: ClientOptions,
    ) -> Self {
        Self {
            provider,
            hooks,
            options,
        }
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Reads `flag_key` for `user`, falling back to `default_value`.
    ///
    /// The type of `default_value` selects the provider resolver. Hooks run
    /// exactly once per stage for this call, whatever the outcome.
    #[instrument(level = "debug", skip(self, user, default_value), fields(user_id = %user.user_id))]
    pub async fn variable(&self, user: &User, flag_key: &str, default_value: Value) -> Variable {
        let context = HookContext::new(flag_key, user, default_value, self.options.metadata.clone());
        let lifecycle = Lifecycle::begin(&self.hooks, context);

        let resolution = self.resolve(lifecycle.context());
        let outcome = match self.options.evaluation_timeout {
            Some(limit) => tokio::time::timeout(limit, resolution)
                .await
                .unwrap_or_else(|_| {
                    debug!(flag_key, ?limit, "evaluation timed out");
                    Err(timed_out())
                }),
            None => resolution.await,
        };

        let flag_key = lifecycle.context().flag_key.clone();
        let default_value = lifecycle.context().default_value.clone();
        lifecycle.complete(outcome.map(|details| into_variable(flag_key, default_value, details)))
    }

    pub async fn bool_value(&self, user: &User, flag_key: &str, default_value: bool) -> bool {
        self.variable(user, flag_key, Value::Bool(default_value))
            .await
            .as_bool()
            .unwrap_or(default_value)
    }

    pub async fn string_value(&self, user: &User, flag_key: &str, default_value: &str) -> String {
        self.variable(user, flag_key, Value::String(default_value.to_string()))
            .await
            .as_str()
            .map_or_else(|| default_value.to_string(), str::to_string)
    }

    pub async fn int_value(&self, user: &User, flag_key: &str, default_value: i64) -> i64 {
        self.variable(user, flag_key, Value::Int(default_value))
            .await
            .as_i64()
            .unwrap_or(default_value)
    }

    pub async fn float_value(&self, user: &User, flag_key: &str, default_value: f64) -> f64 {
        self.variable(user, flag_key, Value::Float(default_value))
            .await
            .as_f64()
            .unwrap_or(default_value)
    }

    async fn resolve(&self, context: &HookContext) -> EvaluationResult<ResolutionDetails<Value>> {
        let key = context.flag_key.as_str();
        let evaluation_context = &context.evaluation_context;
        match &context.default_value {
            Value::Bool(_) => self
                .provider
                .resolve_bool_value(key, evaluation_context)
                .await
                .map(|d| erase(d, Value::Bool)),
            Value::Int(_) => self
                .provider
                .resolve_int_value(key, evaluation_context)
                .await
                .map(|d| erase(d, Value::Int)),
            Value::Float(_) => self
                .provider
                .resolve_float_value(key, evaluation_context)
                .await
                .map(|d| erase(d, Value::Float)),
            Value::String(_) => self
                .provider
                .resolve_string_value(key, evaluation_context)
                .await
                .map(|d| erase(d, Value::String)),
            Value::Struct(_) => self
                .provider
                .resolve_struct_value(key, evaluation_context)
                .await
                .map(|d| erase(d, Value::Struct)),
            Value::Array(_) => Err(EvaluationError {
                code: EvaluationErrorCode::TypeMismatch,
                message: Some("array flags are not supported".to_string()),
            }),
        }
    }
}

fn erase<T>(details: ResolutionDetails<T>, wrap: fn(T) -> Value) -> ResolutionDetails<Value> {
    ResolutionDetails {
        value: wrap(details.value),
        variant: details.variant,
        reason: details.reason,
        flag_metadata: details.flag_metadata,
    }
}

fn into_variable(
    key: String,
    default_value: Value,
    details: ResolutionDetails<Value>,
) -> (Variable, VariableMetadata) {
    let metadata = VariableMetadata::from_flag_metadata(details.flag_metadata.as_ref());
    let eval = details.reason.as_ref().map(|reason| EvalReason {
        reason: reason_to_string(reason),
        details: details
            .flag_metadata
            .as_ref()
            .and_then(|m| metadata_string(m, REASON_DETAILS_METADATA_KEY)),
    });
    let variable = Variable {
        key,
        value: details.value,
        default_value,
        is_defaulted: matches!(details.reason, Some(EvaluationReason::Default)),
        variant: details.variant,
        eval,
    };
    (variable, metadata)
}

fn timed_out() -> EvaluationError {
    EvaluationError {
        code: EvaluationErrorCode::General("evaluation timed out".to_string()),
        message: Some("evaluation timed out".to_string()),
    }
}
