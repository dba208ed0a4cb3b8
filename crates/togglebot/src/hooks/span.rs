use crate::attributes::{self, PROVIDER_NAME};
use crate::context::{
    HookContext, Variable, VariableMetadata, error_message, error_type, value_to_string,
};
use crate::error::HookError;
use crate::hook::EvalHook;
use crate::store::{CorrelationKey, CorrelationStore, KeyScheme};
use open_feature::EvaluationError;
use tracing::{Level, Span, debug, field::Empty};

/// Supplies the span to annotate when a stage cannot find its own.
///
/// The lookup is explicit so tests and callers decide what "current" means.
pub trait SpanFallback: Send + Sync + 'static {
    fn fallback_span(&self) -> Option<Span>;
}

/// Falls back to the span active on the calling thread, if any.
#[derive(Copy, Clone, Default, Debug)]
pub struct CurrentSpan;

impl SpanFallback for CurrentSpan {
    fn fallback_span(&self) -> Option<Span> {
        let span = Span::current();
        (!span.is_disabled()).then_some(span)
    }
}

/// Never falls back; a lookup miss is a no-op.
#[derive(Copy, Clone, Default, Debug)]
pub struct NoFallback;

impl SpanFallback for NoFallback {
    fn fallback_span(&self) -> Option<Span> {
        None
    }
}

impl<F> SpanFallback for F
where
    F: Fn() -> Option<Span> + Send + Sync + 'static,
{
    fn fallback_span(&self) -> Option<Span> {
        (self)()
    }
}

/// Opens a span per evaluation and closes it in `finally`.
///
/// Span fields follow the `feature_flag.*` vocabulary in [`crate::attributes`],
/// and `otel.name` is `feature_flag_evaluation.<flagKey>` so the
/// OpenTelemetry bridge exports it under that name.
#[derive(Debug)]
pub struct SpanHook<F = CurrentSpan> {
    spans: CorrelationStore<Span>,
    fallback: F,
    key_scheme: KeyScheme,
    dashboard_url: String,
}

impl Default for SpanHook {
    fn default() -> Self {
        Self::new()
    }
}

impl SpanHook {
    pub fn new() -> Self {
        Self::with_fallback(CurrentSpan)
    }
}

impl<F: SpanFallback> SpanHook<F> {
    pub fn with_fallback(fallback: F) -> Self {
        Self {
            spans: CorrelationStore::new(),
            fallback,
            key_scheme: KeyScheme::default(),
            dashboard_url: attributes::DEFAULT_DASHBOARD_URL.to_string(),
        }
    }

    pub fn with_key_scheme(mut self, key_scheme: KeyScheme) -> Self {
        self.key_scheme = key_scheme;
        self
    }

    pub fn with_dashboard_url(mut self, dashboard_url: impl Into<String>) -> Self {
        self.dashboard_url = dashboard_url.into();
        self
    }

    /// Number of spans opened but not yet closed.
    pub fn in_flight(&self) -> usize {
        self.spans.len()
    }

    fn key(&self, context: &HookContext) -> CorrelationKey {
        CorrelationKey::for_context(context, self.key_scheme)
    }

    fn record_result(
        &self,
        span: &Span,
        context: &HookContext,
        variable: &Variable,
        metadata: &VariableMetadata,
    ) {
        if let Some(eval) = &variable.eval {
            span.record(attributes::FEATURE_FLAG_RESULT_REASON, eval.reason.as_str());
            if let Some(details) = &eval.details {
                span.record(attributes::FEATURE_FLAG_RESULT_REASON_DETAILS, details.as_str());
            }
        }
        span.record(
            attributes::FEATURE_FLAG_RESULT_VALUE,
            value_to_string(&variable.value).as_str(),
        );
        if !variable.is_defaulted
            && let Some(feature_id) = &metadata.feature_id
        {
            span.record(attributes::FEATURE_FLAG_SET_ID, feature_id.as_str());
            if let Some(project_id) = context.project_id() {
                let url = attributes::feature_url(&self.dashboard_url, project_id, feature_id);
                span.record(attributes::FEATURE_FLAG_URL, url.as_str());
            }
        }
        span.record(attributes::OTEL_STATUS_CODE, "OK");
    }
}

fn open_span(context: &HookContext) -> Span {
    tracing::info_span!(
        "feature_flag_evaluation",
        otel.name = %attributes::span_name(&context.flag_key),
        { attributes::FEATURE_FLAG_KEY } = %context.flag_key,
        { attributes::FEATURE_FLAG_PROVIDER_NAME } = PROVIDER_NAME,
        { attributes::FEATURE_FLAG_CONTEXT_ID } = %context.user_id(),
        { attributes::FEATURE_FLAG_PROJECT } = context.project_id(),
        { attributes::FEATURE_FLAG_ENVIRONMENT } = context.environment_id(),
        { attributes::FEATURE_FLAG_RESULT_VALUE } = Empty,
        { attributes::FEATURE_FLAG_RESULT_REASON } = Empty,
        { attributes::FEATURE_FLAG_RESULT_REASON_DETAILS } = Empty,
        { attributes::FEATURE_FLAG_SET_ID } = Empty,
        { attributes::FEATURE_FLAG_URL } = Empty,
        { attributes::FEATURE_FLAG_ERROR_MESSAGE } = Empty,
        { attributes::ERROR_TYPE } = Empty,
        { attributes::OTEL_STATUS_CODE } = Empty,
    )
}

impl<F: SpanFallback> EvalHook for SpanHook<F> {
    fn name(&self) -> &'static str {
        "SpanHook"
    }

    fn before(&self, context: &HookContext) -> Result<Option<HookContext>, HookError> {
        let span = open_span(context);
        if span.is_disabled() {
            return Ok(None);
        }
        let key = self.key(context);
        debug!(key = %key, "opened flag evaluation span");
        if self.spans.put(key.clone(), span).is_some() {
            // The displaced span closes here, before its own evaluation ends.
            debug!(key = %key, "replaced in-flight span of a colliding evaluation");
        }
        Ok(None)
    }

    fn after(
        &self,
        context: &HookContext,
        variable: &Variable,
        metadata: &VariableMetadata,
    ) -> Result<(), HookError> {
        let key = self.key(context);
        if self
            .spans
            .with(&key, |span| self.record_result(span, context, variable, metadata))
            .is_some()
        {
            return Ok(());
        }
        match self.fallback.fallback_span() {
            Some(span) => {
                debug!(key = %key, "no span in flight; annotating fallback span");
                tracing::event!(
                    parent: &span,
                    Level::INFO,
                    { attributes::FEATURE_FLAG_KEY } = %context.flag_key,
                    { attributes::FEATURE_FLAG_CONTEXT_ID } = %context.user_id(),
                    { attributes::FEATURE_FLAG_RESULT_VALUE } = %value_to_string(&variable.value),
                    { attributes::FEATURE_FLAG_RESULT_REASON } = variable.eval.as_ref().map(|e| e.reason.as_str()),
                    { attributes::FEATURE_FLAG_RESULT_REASON_DETAILS } = variable.eval.as_ref().and_then(|e| e.details.as_deref()),
                    "feature flag evaluated"
                );
            }
            None => debug!(key = %key, "no span in flight; skipping result tags"),
        }
        Ok(())
    }

    fn error(&self, context: &HookContext, error: &EvaluationError) -> Result<(), HookError> {
        let key = self.key(context);
        let message = error_message(error);
        let kind = error_type(error);

        let recorded = self.spans.with(&key, |span| {
            span.record(attributes::FEATURE_FLAG_ERROR_MESSAGE, message.as_str());
            span.record(attributes::ERROR_TYPE, kind);
            span.record(attributes::OTEL_STATUS_CODE, "ERROR");
        });
        if recorded.is_some() {
            return Ok(());
        }
        match self.fallback.fallback_span() {
            Some(span) => {
                debug!(key = %key, "no span in flight; annotating fallback span");
                tracing::event!(
                    parent: &span,
                    Level::WARN,
                    { attributes::FEATURE_FLAG_KEY } = %context.flag_key,
                    { attributes::FEATURE_FLAG_CONTEXT_ID } = %context.user_id(),
                    { attributes::FEATURE_FLAG_ERROR_MESSAGE } = %message,
                    { attributes::ERROR_TYPE } = kind,
                    "feature flag evaluation failed"
                );
            }
            None => debug!(key = %key, "no span in flight; skipping error tags"),
        }
        Ok(())
    }

    fn finally(
        &self,
        context: &HookContext,
        _variable: &Variable,
        _metadata: &VariableMetadata,
    ) -> Result<(), HookError> {
        let key = self.key(context);
        match self.spans.remove(&key) {
            Some(span) => {
                debug!(key = %key, "closing flag evaluation span");
                drop(span);
            }
            None => debug!(key = %key, "no span to close"),
        }
        Ok(())
    }
}
