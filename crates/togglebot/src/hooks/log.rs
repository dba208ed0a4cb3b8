use crate::attributes::{self, PROVIDER_NAME};
use crate::context::{
    HookContext, Variable, VariableMetadata, error_message, error_type, value_to_string,
};
use crate::error::HookError;
use crate::hook::EvalHook;
use open_feature::EvaluationError;

/// Emits one structured event per evaluation outcome.
///
/// Stateless: `before` and `finally` do nothing. The attribute set is scoped
/// to the single event and uses the same keys as the span tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHook;

impl LogHook {
    pub fn new() -> Self {
        Self
    }
}

impl EvalHook for LogHook {
    fn name(&self) -> &'static str {
        "LogHook"
    }

    fn after(
        &self,
        context: &HookContext,
        variable: &Variable,
        metadata: &VariableMetadata,
    ) -> Result<(), HookError> {
        tracing::info!(
            { attributes::FEATURE_FLAG_KEY } = %context.flag_key,
            { attributes::FEATURE_FLAG_PROVIDER_NAME } = PROVIDER_NAME,
            { attributes::FEATURE_FLAG_CONTEXT_ID } = %context.user_id(),
            { attributes::FEATURE_FLAG_VALUE_TYPE } = context.value_type(),
            { attributes::FEATURE_FLAG_PROJECT } = context.project_id(),
            { attributes::FEATURE_FLAG_ENVIRONMENT } = context.environment_id(),
            { attributes::FEATURE_FLAG_RESULT_VALUE } = %value_to_string(&variable.value),
            { attributes::FEATURE_FLAG_RESULT_REASON } = variable.eval.as_ref().map(|e| e.reason.as_str()),
            { attributes::FEATURE_FLAG_RESULT_REASON_DETAILS } = variable.eval.as_ref().and_then(|e| e.details.as_deref()),
            { attributes::FEATURE_FLAG_RESULT_DEFAULTED } = variable.is_defaulted,
            { attributes::FEATURE_FLAG_SET_ID } = metadata.feature_id.as_deref(),
            "feature flag evaluated"
        );
        Ok(())
    }

    fn error(&self, context: &HookContext, error: &EvaluationError) -> Result<(), HookError> {
        tracing::warn!(
            { attributes::FEATURE_FLAG_KEY } = %context.flag_key,
            { attributes::FEATURE_FLAG_PROVIDER_NAME } = PROVIDER_NAME,
            { attributes::FEATURE_FLAG_CONTEXT_ID } = %context.user_id(),
            { attributes::FEATURE_FLAG_VALUE_TYPE } = context.value_type(),
            { attributes::FEATURE_FLAG_PROJECT } = context.project_id(),
            { attributes::FEATURE_FLAG_ENVIRONMENT } = context.environment_id(),
            { attributes::FEATURE_FLAG_ERROR_MESSAGE } = %error_message(error),
            { attributes::ERROR_TYPE } = error_type(error),
            "feature flag evaluation failed"
        );
        Ok(())
    }
}
