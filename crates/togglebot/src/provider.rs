//! In-memory flag source for the demo and for tests.

use crate::context::{FEATURE_ID_METADATA_KEY, REASON_DETAILS_METADATA_KEY};
use async_trait::async_trait;
use open_feature::provider::{FeatureProvider, ProviderMetadata, ResolutionDetails};
use open_feature::{
    EvaluationContext, EvaluationError, EvaluationErrorCode, EvaluationReason, EvaluationResult,
    FlagMetadata, FlagMetadataValue, StructValue, Value,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

const METADATA: &str = "Static Provider";

/// One configured flag.
#[derive(Debug, Clone)]
pub struct StaticFlag {
    pub value: Value,
    pub reason: EvaluationReason,
    pub variant: Option<String>,
    pub feature_id: Option<String>,
    pub reason_details: Option<String>,
}

impl StaticFlag {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            reason: EvaluationReason::Static,
            variant: None,
            feature_id: None,
            reason_details: None,
        }
    }

    pub fn with_reason(mut self, reason: EvaluationReason) -> Self {
        self.reason = reason;
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    pub fn with_feature_id(mut self, feature_id: impl Into<String>) -> Self {
        self.feature_id = Some(feature_id.into());
        self
    }

    pub fn with_reason_details(mut self, details: impl Into<String>) -> Self {
        self.reason_details = Some(details.into());
        self
    }

    fn flag_metadata(&self) -> Option<FlagMetadata> {
        if self.feature_id.is_none() && self.reason_details.is_none() {
            return None;
        }
        let mut metadata = FlagMetadata::default();
        if let Some(feature_id) = &self.feature_id {
            metadata = metadata.with_value(
                FEATURE_ID_METADATA_KEY.to_string(),
                FlagMetadataValue::String(feature_id.clone()),
            );
        }
        if let Some(details) = &self.reason_details {
            metadata = metadata.with_value(
                REASON_DETAILS_METADATA_KEY.to_string(),
                FlagMetadataValue::String(details.clone()),
            );
        }
        Some(metadata)
    }
}

/// Resolves flags from a fixed table.
///
/// Flags can also be scripted to fail, and every resolution yields to the
/// runtime (or sleeps for the configured latency) so concurrent evaluations
/// interleave the way they would against a remote engine.
#[derive(Debug)]
pub struct StaticProvider {
    metadata: ProviderMetadata,
    flags: HashMap<String, StaticFlag>,
    failures: HashMap<String, EvaluationError>,
    latency: Option<Duration>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self {
            metadata: ProviderMetadata::new(METADATA),
            flags: HashMap::new(),
            failures: HashMap::new(),
            latency: None,
        }
    }

    pub fn with_flag(mut self, flag_key: impl Into<String>, flag: StaticFlag) -> Self {
        self.flags.insert(flag_key.into(), flag);
        self
    }

    /// Makes every read of `flag_key` fail with a general error.
    pub fn with_failure(mut self, flag_key: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        self.failures.insert(
            flag_key.into(),
            EvaluationError {
                code: EvaluationErrorCode::General(message.clone()),
                message: Some(message),
            },
        );
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    async fn resolve<T>(
        &self,
        flag_key: &str,
        extract: impl Fn(&Value) -> Option<T>,
    ) -> EvaluationResult<ResolutionDetails<T>> {
        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }

        if let Some(error) = self.failures.get(flag_key) {
            debug!(flag_key, "scripted failure");
            return Err(error.clone());
        }
        let flag = self.flags.get(flag_key).ok_or_else(|| EvaluationError {
            code: EvaluationErrorCode::FlagNotFound,
            message: Some(format!("flag {} is not configured", flag_key)),
        })?;
        let value = extract(&flag.value).ok_or_else(|| EvaluationError {
            code: EvaluationErrorCode::TypeMismatch,
            message: Some(format!("flag {} has a different type", flag_key)),
        })?;

        Ok(ResolutionDetails {
            value,
            variant: flag.variant.clone(),
            reason: Some(flag.reason.clone()),
            flag_metadata: flag.flag_metadata(),
        })
    }
}

impl Default for StaticProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeatureProvider for StaticProvider {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    #[instrument(level = "debug", skip(self, _evaluation_context))]
    async fn resolve_bool_value(
        &self,
        flag_key: &str,
        _evaluation_context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<bool>> {
        self.resolve(flag_key, |v| match v {
            Value::Bool(b) => Some(*b),
            _ => None,
        })
        .await
    }

    #[instrument(level = "debug", skip(self, _evaluation_context))]
    async fn resolve_int_value(
        &self,
        flag_key: &str,
        _evaluation_context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<i64>> {
        self.resolve(flag_key, |v| match v {
            Value::Int(i) => Some(*i),
            _ => None,
        })
        .await
    }

    #[instrument(level = "debug", skip(self, _evaluation_context))]
    async fn resolve_float_value(
        &self,
        flag_key: &str,
        _evaluation_context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<f64>> {
        self.resolve(flag_key, |v| match v {
            Value::Float(f) => Some(*f),
            _ => None,
        })
        .await
    }

    #[instrument(level = "debug", skip(self, _evaluation_context))]
    async fn resolve_string_value(
        &self,
        flag_key: &str,
        _evaluation_context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<String>> {
        self.resolve(flag_key, |v| match v {
            Value::String(s) => Some(s.clone()),
            _ => None,
        })
        .await
    }

    #[instrument(level = "debug", skip(self, _evaluation_context))]
    async fn resolve_struct_value(
        &self,
        flag_key: &str,
        _evaluation_context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<StructValue>> {
        self.resolve(flag_key, |v| match v {
            Value::Struct(s) => Some(s.clone()),
            _ => None,
        })
        .await
    }
}
