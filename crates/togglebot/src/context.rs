//! Data carried through one flag evaluation.

use open_feature::{
    EvaluationContext, EvaluationError, EvaluationErrorCode, EvaluationReason, FlagMetadata,
    FlagMetadataValue, Value,
};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Flag metadata key carrying the feature a variable belongs to.
pub const FEATURE_ID_METADATA_KEY: &str = "featureId";
/// Flag metadata key carrying the human readable reason detail.
pub const REASON_DETAILS_METADATA_KEY: &str = "reasonDetails";

static NEXT_EVALUATION_ID: AtomicU64 = AtomicU64::new(1);

/// The subject a flag is evaluated for.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct User {
    pub user_id: String,
    pub email: Option<String>,
}

impl User {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Context handed to the provider; the user id becomes the targeting key.
    #[must_use]
    pub fn to_evaluation_context(&self) -> EvaluationContext {
        let context = EvaluationContext::default().with_targeting_key(self.user_id.as_str());
        match &self.email {
            Some(email) => context.with_custom_field("email", email.as_str()),
            None => context,
        }
    }
}

/// Project and environment the evaluation runs against.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvaluationMetadata {
    pub project_id: Option<String>,
    pub environment_id: Option<String>,
}

/// One flag read in progress.
///
/// Built once per evaluation and passed by reference to every stage. A hook's
/// `before` may return a replacement, which later stages then observe.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub flag_key: String,
    pub user: User,
    pub default_value: Value,
    pub metadata: Option<EvaluationMetadata>,
    /// Unique per call; used by [`crate::KeyScheme::PerEvaluation`].
    pub evaluation_id: u64,
    pub evaluation_context: EvaluationContext,
}

impl HookContext {
    pub fn new(
        flag_key: impl Into<String>,
        user: &User,
        default_value: Value,
        metadata: Option<EvaluationMetadata>,
    ) -> Self {
        Self {
            flag_key: flag_key.into(),
            evaluation_context: user.to_evaluation_context(),
            user: user.clone(),
            default_value,
            metadata,
            evaluation_id: NEXT_EVALUATION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user.user_id
    }

    pub fn project_id(&self) -> Option<&str> {
        self.metadata.as_ref()?.project_id.as_deref()
    }

    pub fn environment_id(&self) -> Option<&str> {
        self.metadata.as_ref()?.environment_id.as_deref()
    }

    pub fn value_type(&self) -> &'static str {
        value_type_name(&self.default_value)
    }
}

/// Reason code and explanation returned with a value.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalReason {
    pub reason: String,
    pub details: Option<String>,
}

/// Outcome of a flag read as seen by the hooks and the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub key: String,
    pub value: Value,
    pub default_value: Value,
    pub is_defaulted: bool,
    pub variant: Option<String>,
    pub eval: Option<EvalReason>,
}

impl Variable {
    /// Variable served when the provider could not resolve a value.
    pub fn defaulted(context: &HookContext, eval: Option<EvalReason>) -> Self {
        Self {
            key: context.flag_key.clone(),
            value: context.default_value.clone(),
            default_value: context.default_value.clone(),
            is_defaulted: true,
            variant: None,
            eval,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.value {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.value {
            Value::Float(f) => Some(f),
            _ => None,
        }
    }
}

/// Per-variable metadata reported by the provider.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariableMetadata {
    pub feature_id: Option<String>,
}

impl VariableMetadata {
    pub fn from_flag_metadata(flag_metadata: Option<&FlagMetadata>) -> Self {
        Self {
            feature_id: flag_metadata.and_then(|m| metadata_string(m, FEATURE_ID_METADATA_KEY)),
        }
    }
}

#[allow(unreachable_patterns)]
pub(crate) fn metadata_string(metadata: &FlagMetadata, key: &str) -> Option<String> {
    match metadata.values.get(key)? {
        FlagMetadataValue::String(s) => Some(s.clone()),
        FlagMetadataValue::Int(i) => Some(i.to_string()),
        FlagMetadataValue::Float(f) => Some(f.to_string()),
        FlagMetadataValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn reason_to_string(reason: &EvaluationReason) -> String {
    match reason {
        EvaluationReason::Static => "STATIC".to_string(),
        EvaluationReason::Default => "DEFAULT".to_string(),
        EvaluationReason::TargetingMatch => "TARGETING_MATCH".to_string(),
        EvaluationReason::Split => "SPLIT".to_string(),
        EvaluationReason::Cached => "CACHED".to_string(),
        EvaluationReason::Disabled => "DISABLED".to_string(),
        EvaluationReason::Error => "ERROR".to_string(),
        EvaluationReason::Other(s) => s.to_uppercase(),
        _ => "UNKNOWN".to_string(),
    }
}

/// Message recorded as `feature_flag.error_message`.
pub fn error_message(error: &EvaluationError) -> String {
    match (&error.message, &error.code) {
        (Some(message), _) => message.clone(),
        (None, EvaluationErrorCode::General(message)) => message.clone(),
        (None, code) => code.to_string(),
    }
}

/// Classification recorded as `error.type`.
pub fn error_type(error: &EvaluationError) -> &'static str {
    match error.code {
        EvaluationErrorCode::ProviderNotReady => "provider_not_ready",
        EvaluationErrorCode::FlagNotFound => "flag_not_found",
        EvaluationErrorCode::ParseError => "parse_error",
        EvaluationErrorCode::TypeMismatch => "type_mismatch",
        EvaluationErrorCode::TargetingKeyMissing => "targeting_key_missing",
        EvaluationErrorCode::InvalidContext => "invalid_context",
        _ => "general",
    }
}

pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Struct(_) => "struct",
    }
}

/// Renders a flag value for span tags and log fields.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        other => value_to_json(other).to_string(),
    }
}

fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Array(items) => JsonValue::Array(items.iter().map(value_to_json).collect()),
        Value::Struct(s) => JsonValue::Object(
            s.fields
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}
