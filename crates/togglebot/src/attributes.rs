//! Attribute keys shared by every hook.
//!
//! Spans, agent attributes and log events all use the same vocabulary so a
//! backend can join them on `feature_flag.key` and `feature_flag.context.id`.

/// Provider name reported on every evaluation.
pub const PROVIDER_NAME: &str = "devcycle";

/// Prefix of the span name; the flag key is appended.
pub const SPAN_NAME_PREFIX: &str = "feature_flag_evaluation";

/// Default dashboard used to build `feature_flag.url`.
pub const DEFAULT_DASHBOARD_URL: &str = "https://app.devcycle.com";

pub const FEATURE_FLAG_KEY: &str = "feature_flag.key";
pub const FEATURE_FLAG_PROVIDER_NAME: &str = "feature_flag.provider.name";
pub const FEATURE_FLAG_CONTEXT_ID: &str = "feature_flag.context.id";
pub const FEATURE_FLAG_PROJECT: &str = "feature_flag.project";
pub const FEATURE_FLAG_ENVIRONMENT: &str = "feature_flag.environment";
pub const FEATURE_FLAG_VALUE_TYPE: &str = "feature_flag.value_type";
pub const FEATURE_FLAG_RESULT_VALUE: &str = "feature_flag.result.value";
pub const FEATURE_FLAG_RESULT_REASON: &str = "feature_flag.result.reason";
pub const FEATURE_FLAG_RESULT_REASON_DETAILS: &str = "feature_flag.result.reason.details";
pub const FEATURE_FLAG_RESULT_DEFAULTED: &str = "feature_flag.result.defaulted";
pub const FEATURE_FLAG_SET_ID: &str = "feature_flag.set.id";
pub const FEATURE_FLAG_URL: &str = "feature_flag.url";
pub const FEATURE_FLAG_ERROR_MESSAGE: &str = "feature_flag.error_message";
pub const ERROR_TYPE: &str = "error.type";
pub const OTEL_STATUS_CODE: &str = "otel.status_code";

/// Builds the dashboard link for a served feature.
#[must_use]
pub fn feature_url(dashboard: &str, project_id: &str, feature_id: &str) -> String {
    format!(
        "{}/r/p/{}/f/{}",
        dashboard.trim_end_matches('/'),
        project_id,
        feature_id
    )
}

/// Span name for one flag read, e.g. `feature_flag_evaluation.togglebot-wink`.
#[must_use]
pub fn span_name(flag_key: &str) -> String {
    format!("{}.{}", SPAN_NAME_PREFIX, flag_key)
}
