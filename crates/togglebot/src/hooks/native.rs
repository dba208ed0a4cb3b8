use crate::attributes::{self, PROVIDER_NAME};
use crate::context::{
    HookContext, Variable, VariableMetadata, error_message, error_type, value_to_string,
};
use crate::error::HookError;
use crate::hook::EvalHook;
use crate::store::{CorrelationKey, CorrelationStore, KeyScheme};
use open_feature::EvaluationError;
use std::sync::Arc;
use tracing::debug;

/// Method name reported for the traced remote call.
pub const REMOTE_METHOD: &str = "VariableAsync";
/// Service name reported for the traced remote call.
pub const REMOTE_SERVICE: &str = "DevCycle.SDK";

/// A tracer handle owned by an APM agent.
pub trait NativeTracer: Send + Sync {
    fn start(&self) -> Result<(), HookError>;
    fn add_attribute(&self, key: &str, value: &str) -> Result<(), HookError>;
    fn end(&self) -> Result<(), HookError>;
}

/// The slice of an APM agent SDK the hook needs.
pub trait AgentSdk: Send + Sync + 'static {
    fn trace_incoming_remote_call(
        &self,
        method: &str,
        service: &str,
        endpoint: &str,
    ) -> Result<Arc<dyn NativeTracer>, HookError>;

    /// Attaches an attribute to the request the agent considers current.
    fn add_custom_request_attribute(&self, key: &str, value: &str) -> Result<(), HookError>;
}

type Attributes = Vec<(&'static str, String)>;

/// Traces each evaluation as an incoming remote call through an agent SDK.
///
/// Tracers are correlated per evaluation; when a stage cannot find its tracer
/// the attributes go to the agent's current request instead.
pub struct NativeTracerHook<A> {
    agent: A,
    tracers: CorrelationStore<Arc<dyn NativeTracer>>,
    key_scheme: KeyScheme,
    dashboard_url: String,
}

impl<A: AgentSdk> NativeTracerHook<A> {
    pub fn new(agent: A) -> Self {
        Self {
            agent,
            tracers: CorrelationStore::new(),
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

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn in_flight(&self) -> usize {
        self.tracers.len()
    }

    fn key(&self, context: &HookContext) -> CorrelationKey {
        CorrelationKey::for_context(context, self.key_scheme)
    }

    fn annotate(
        &self,
        key: &CorrelationKey,
        stage: &'static str,
        attributes: &Attributes,
    ) -> Result<(), HookError> {
        let tagged = self.tracers.with(key, |tracer| {
            attributes
                .iter()
                .try_for_each(|(name, value)| tracer.add_attribute(name, value))
        });
        match tagged {
            Some(result) => result,
            None => {
                debug!(key = %key, stage, "no tracer in flight; tagging current request");
                attributes
                    .iter()
                    .try_for_each(|(name, value)| self.agent.add_custom_request_attribute(name, value))
            }
        }
    }
}

fn start_attributes(context: &HookContext) -> Attributes {
    let mut attrs = vec![
        (attributes::FEATURE_FLAG_KEY, context.flag_key.clone()),
        (attributes::FEATURE_FLAG_PROVIDER_NAME, PROVIDER_NAME.to_string()),
        (attributes::FEATURE_FLAG_CONTEXT_ID, context.user_id().to_string()),
    ];
    if let Some(project_id) = context.project_id() {
        attrs.push((attributes::FEATURE_FLAG_PROJECT, project_id.to_string()));
    }
    if let Some(environment_id) = context.environment_id() {
        attrs.push((attributes::FEATURE_FLAG_ENVIRONMENT, environment_id.to_string()));
    }
    attrs
}

fn result_attributes(
    dashboard_url: &str,
    context: &HookContext,
    variable: &Variable,
    metadata: &VariableMetadata,
) -> Attributes {
    let mut attrs = vec![(
        attributes::FEATURE_FLAG_RESULT_VALUE,
        value_to_string(&variable.value),
    )];
    if let Some(eval) = &variable.eval {
        attrs.push((attributes::FEATURE_FLAG_RESULT_REASON, eval.reason.clone()));
        if let Some(details) = &eval.details {
            attrs.push((attributes::FEATURE_FLAG_RESULT_REASON_DETAILS, details.clone()));
        }
    }
    if !variable.is_defaulted
        && let Some(feature_id) = &metadata.feature_id
    {
        attrs.push((attributes::FEATURE_FLAG_SET_ID, feature_id.clone()));
        if let Some(project_id) = context.project_id() {
            attrs.push((
                attributes::FEATURE_FLAG_URL,
                attributes::feature_url(dashboard_url, project_id, feature_id),
            ));
        }
    }
    attrs
}

impl<A: AgentSdk> EvalHook for NativeTracerHook<A> {
    fn name(&self) -> &'static str {
        "NativeTracerHook"
    }

    fn before(&self, context: &HookContext) -> Result<Option<HookContext>, HookError> {
        let tracer = self.agent.trace_incoming_remote_call(
            REMOTE_METHOD,
            REMOTE_SERVICE,
            &attributes::span_name(&context.flag_key),
        )?;
        tracer.start()?;

        let key = self.key(context);
        if let Some(displaced) = self.tracers.put(key.clone(), tracer) {
            debug!(key = %key, "ending tracer of a colliding evaluation");
            displaced.end()?;
        }
        self.annotate(&key, "before", &start_attributes(context))?;
        Ok(None)
    }

    fn after(
        &self,
        context: &HookContext,
        variable: &Variable,
        metadata: &VariableMetadata,
    ) -> Result<(), HookError> {
        let attrs = result_attributes(&self.dashboard_url, context, variable, metadata);
        self.annotate(&self.key(context), "after", &attrs)
    }

    fn error(&self, context: &HookContext, error: &EvaluationError) -> Result<(), HookError> {
        let attrs = vec![
            (attributes::FEATURE_FLAG_ERROR_MESSAGE, error_message(error)),
            (attributes::ERROR_TYPE, error_type(error).to_string()),
        ];
        self.annotate(&self.key(context), "error", &attrs)
    }

    fn finally(
        &self,
        context: &HookContext,
        _variable: &Variable,
        _metadata: &VariableMetadata,
    ) -> Result<(), HookError> {
        let key = self.key(context);
        match self.tracers.remove(&key) {
            Some(tracer) => tracer.end(),
            None => {
                debug!(key = %key, "no tracer to end");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EvalReason, EvaluationMetadata, User};
    use open_feature::{EvaluationErrorCode, Value};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorded {
        started: Vec<String>,
        attributes: Vec<(String, String, String)>,
        ended: Vec<String>,
    }

    #[derive(Default, Clone)]
    struct FakeAgent {
        recorded: Arc<Mutex<Recorded>>,
        fail_attributes: bool,
    }

    struct FakeTracer {
        endpoint: String,
        agent: FakeAgent,
    }

    impl NativeTracer for FakeTracer {
        fn start(&self) -> Result<(), HookError> {
            self.agent
                .recorded
                .lock()
                .unwrap()
                .started
                .push(self.endpoint.clone());
            Ok(())
        }

        fn add_attribute(&self, key: &str, value: &str) -> Result<(), HookError> {
            if self.agent.fail_attributes {
                return Err(HookError::Agent("agent detached".to_string()));
            }
            self.agent.recorded.lock().unwrap().attributes.push((
                self.endpoint.clone(),
                key.to_string(),
                value.to_string(),
            ));
            Ok(())
        }

        fn end(&self) -> Result<(), HookError> {
            self.agent
                .recorded
                .lock()
                .unwrap()
                .ended
                .push(self.endpoint.clone());
            Ok(())
        }
    }

    impl AgentSdk for FakeAgent {
        fn trace_incoming_remote_call(
            &self,
            method: &str,
            service: &str,
            endpoint: &str,
        ) -> Result<Arc<dyn NativeTracer>, HookError> {
            assert_eq!(method, REMOTE_METHOD);
            assert_eq!(service, REMOTE_SERVICE);
            Ok(Arc::new(FakeTracer {
                endpoint: endpoint.to_string(),
                agent: self.clone(),
            }))
        }

        fn add_custom_request_attribute(&self, key: &str, value: &str) -> Result<(), HookError> {
            self.recorded.lock().unwrap().attributes.push((
                "request".to_string(),
                key.to_string(),
                value.to_string(),
            ));
            Ok(())
        }
    }

    fn context() -> HookContext {
        HookContext::new(
            "togglebot-wink",
            &User::new("userId"),
            Value::Bool(false),
            Some(EvaluationMetadata {
                project_id: Some("proj-1".to_string()),
                environment_id: Some("env-1".to_string()),
            }),
        )
    }

    fn served(context: &HookContext, is_defaulted: bool) -> Variable {
        Variable {
            key: context.flag_key.clone(),
            value: Value::Bool(true),
            default_value: Value::Bool(false),
            is_defaulted,
            variant: None,
            eval: Some(EvalReason {
                reason: "TARGETING_MATCH".to_string(),
                details: Some("All Users".to_string()),
            }),
        }
    }

    fn release(hook: &NativeTracerHook<FakeAgent>, context: &HookContext) {
        hook.finally(context, &Variable::defaulted(context, None), &VariableMetadata::default())
            .unwrap();
    }

    fn has(recorded: &Recorded, target: &str, key: &str, value: &str) -> bool {
        recorded
            .attributes
            .iter()
            .any(|(t, k, v)| t == target && k == key && v == value)
    }

    #[test]
    fn test_full_lifecycle_tags_tracer() {
        let agent = FakeAgent::default();
        let hook = NativeTracerHook::new(agent.clone());
        let context = context();
        let metadata = VariableMetadata {
            feature_id: Some("feat-9".to_string()),
        };

        hook.before(&context).unwrap();
        assert_eq!(hook.in_flight(), 1);
        let variable = served(&context, false);
        hook.after(&context, &variable, &metadata).unwrap();
        hook.finally(&context, &variable, &metadata).unwrap();
        assert_eq!(hook.in_flight(), 0);

        let recorded = agent.recorded.lock().unwrap();
        let endpoint = "feature_flag_evaluation.togglebot-wink";
        assert_eq!(recorded.started, vec![endpoint]);
        assert_eq!(recorded.ended, vec![endpoint]);
        assert!(has(&recorded, endpoint, "feature_flag.provider.name", "devcycle"));
        assert!(has(&recorded, endpoint, "feature_flag.environment", "env-1"));
        assert!(has(&recorded, endpoint, "feature_flag.result.reason", "TARGETING_MATCH"));
        assert!(has(&recorded, endpoint, "feature_flag.set.id", "feat-9"));
        assert!(has(
            &recorded,
            endpoint,
            "feature_flag.url",
            "https://app.devcycle.com/r/p/proj-1/f/feat-9"
        ));
    }

    #[test]
    fn test_defaulted_value_has_no_feature_link() {
        let agent = FakeAgent::default();
        let hook = NativeTracerHook::new(agent.clone());
        let context = context();
        let metadata = VariableMetadata {
            feature_id: Some("feat-9".to_string()),
        };

        hook.before(&context).unwrap();
        hook.after(&context, &served(&context, true), &metadata).unwrap();

        let recorded = agent.recorded.lock().unwrap();
        assert!(!recorded.attributes.iter().any(|(_, k, _)| k == "feature_flag.set.id"));
        assert!(!recorded.attributes.iter().any(|(_, k, _)| k == "feature_flag.url"));
    }

    #[test]
    fn test_error_without_tracer_tags_current_request() {
        let agent = FakeAgent::default();
        let hook = NativeTracerHook::new(agent.clone());
        let context = context();
        let error = EvaluationError {
            code: EvaluationErrorCode::General("network timeout".to_string()),
            message: Some("network timeout".to_string()),
        };

        hook.error(&context, &error).unwrap();
        release(&hook, &context);

        let recorded = agent.recorded.lock().unwrap();
        assert!(has(&recorded, "request", "feature_flag.error_message", "network timeout"));
        assert!(has(&recorded, "request", "error.type", "general"));
        assert!(recorded.ended.is_empty());
    }

    #[test]
    fn test_agent_failure_still_stores_tracer_for_finally() {
        let agent = FakeAgent {
            fail_attributes: true,
            ..Default::default()
        };
        let hook = NativeTracerHook::new(agent.clone());
        let context = context();

        assert!(matches!(hook.before(&context), Err(HookError::Agent(_))));
        assert_eq!(hook.in_flight(), 1);

        release(&hook, &context);
        assert_eq!(hook.in_flight(), 0);
        assert_eq!(agent.recorded.lock().unwrap().ended.len(), 1);
    }

    #[test]
    fn test_colliding_evaluations_end_displaced_tracer() {
        let agent = FakeAgent::default();
        let hook = NativeTracerHook::new(agent.clone());
        let first = context();
        let second = context();

        hook.before(&first).unwrap();
        hook.before(&second).unwrap();
        assert_eq!(hook.in_flight(), 1);
        assert_eq!(agent.recorded.lock().unwrap().ended.len(), 1);

        release(&hook, &second);
        release(&hook, &first);
        assert_eq!(agent.recorded.lock().unwrap().ended.len(), 2);
    }

    #[test]
    fn test_per_evaluation_keys_keep_both_tracers() {
        let agent = FakeAgent::default();
        let hook = NativeTracerHook::new(agent.clone()).with_key_scheme(KeyScheme::PerEvaluation);
        let first = context();
        let second = context();

        hook.before(&first).unwrap();
        hook.before(&second).unwrap();
        assert_eq!(hook.in_flight(), 2);
        assert!(agent.recorded.lock().unwrap().ended.is_empty());
    }
}
