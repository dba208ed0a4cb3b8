//! # Hook Pipeline
//!
//! [`EvalHook`] is the contract every instrumentation hook implements;
//! [`Hooks`] is the registry built once at startup; [`Lifecycle`] drives one
//! evaluation through the stages and enforces their order.
//!
//! For a single evaluation and a single hook:
//!
//! ```text
//! before ──► after | error ──► finally
//! ```
//!
//! `before` runs in registration order, the other stages in reverse. Hooks
//! must not rely on either; they only see their own state.

use crate::context::{EvalReason, HookContext, Variable, VariableMetadata, error_message};
use crate::error::HookError;
use open_feature::{EvaluationError, EvaluationErrorCode};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle callbacks invoked around every flag read.
///
/// All stages may be called concurrently for different evaluations. Every
/// stage defaults to a no-op, so a hook only implements what it needs.
/// Returned errors are logged by the driver and never affect the flag value.
pub trait EvalHook: Send + Sync + 'static {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Called before the value is resolved. `Some` replaces the context seen
    /// by every later stage and hook.
    fn before(&self, _context: &HookContext) -> Result<Option<HookContext>, HookError> {
        Ok(None)
    }

    /// Called only when the value resolved.
    fn after(
        &self,
        _context: &HookContext,
        _variable: &Variable,
        _metadata: &VariableMetadata,
    ) -> Result<(), HookError> {
        Ok(())
    }

    /// Called only when resolution failed, timed out or was cancelled.
    fn error(&self, _context: &HookContext, _error: &EvaluationError) -> Result<(), HookError> {
        Ok(())
    }

    /// Always called last. Must be a no-op when there is nothing to release.
    fn finally(
        &self,
        _context: &HookContext,
        _variable: &Variable,
        _metadata: &VariableMetadata,
    ) -> Result<(), HookError> {
        Ok(())
    }
}

/// Ordered, immutable list of hooks.
#[derive(Clone)]
pub struct Hooks {
    hooks: Arc<[Arc<dyn EvalHook>]>,
}

impl Default for Hooks {
    fn default() -> Self {
        HooksBuilder::default().build()
    }
}

impl Hooks {
    pub fn builder() -> HooksBuilder {
        HooksBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<dyn EvalHook>> + ExactSizeIterator {
        self.hooks.iter()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|hook| hook.name()))
            .finish()
    }
}

#[derive(Default)]
pub struct HooksBuilder {
    hooks: Vec<Arc<dyn EvalHook>>,
}

impl HooksBuilder {
    pub fn with(self, hook: impl EvalHook) -> Self {
        self.with_shared(Arc::new(hook))
    }

    /// Registers a hook the caller keeps a handle to.
    pub fn with_shared(mut self, hook: Arc<dyn EvalHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn build(self) -> Hooks {
        Hooks {
            hooks: self.hooks.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Started,
    Finished,
}

/// Drives one evaluation through the hook stages.
///
/// [`Lifecycle::begin`] runs `before`; [`Lifecycle::complete`] runs exactly
/// one of `after`/`error` followed by `finally`. Dropping a lifecycle that
/// never completed (the evaluation future was cancelled) runs `error` and
/// `finally` so hooks still release what they hold.
///
/// Each hook is handed, in every later stage, the context it was given in its
/// own `before`, so a replacement returned by another hook never changes how
/// a hook finds its state. A hook that errors or panics is reported and
/// skipped; the remaining hooks and stages still run.
#[must_use = "a lifecycle must be completed or dropped to run finally"]
pub struct Lifecycle<'a> {
    hooks: &'a Hooks,
    /// Context seen by each hook's `before`, in registration order.
    seen: Vec<HookContext>,
    context: HookContext,
    stage: Stage,
}

impl<'a> Lifecycle<'a> {
    pub fn begin(hooks: &'a Hooks, context: HookContext) -> Self {
        let mut context = context;
        let mut seen = Vec::with_capacity(hooks.len());
        for hook in hooks.iter() {
            seen.push(context.clone());
            match guarded(|| hook.before(&context)) {
                Ok(Some(replacement)) => context = replacement,
                Ok(None) => {}
                Err(err) => report(hook.as_ref(), "before", &context, &err),
            }
        }
        Self {
            hooks,
            seen,
            context,
            stage: Stage::Started,
        }
    }

    /// Context after every `before` ran; this is what gets resolved.
    pub fn context(&self) -> &HookContext {
        &self.context
    }

    /// Finishes the evaluation and returns the variable served to the caller.
    pub fn complete(
        mut self,
        outcome: Result<(Variable, VariableMetadata), EvaluationError>,
    ) -> Variable {
        let variable = match outcome {
            Ok((variable, metadata)) => {
                self.after(&variable, &metadata);
                self.finally(&variable, &metadata);
                variable
            }
            Err(error) => self.fail(&error),
        };
        self.stage = Stage::Finished;
        variable
    }

    /// Hooks in unwind order, each with the context it saw in `before`.
    fn unwinding(&self) -> impl Iterator<Item = (&Arc<dyn EvalHook>, &HookContext)> {
        self.hooks.iter().zip(self.seen.iter()).rev()
    }

    fn fail(&self, error: &EvaluationError) -> Variable {
        for (hook, context) in self.unwinding() {
            if let Err(err) = guarded(|| hook.error(context, error)) {
                report(hook.as_ref(), "error", context, &err);
            }
        }
        let variable = Variable::defaulted(
            &self.context,
            Some(EvalReason {
                reason: "ERROR".to_string(),
                details: Some(error_message(error)),
            }),
        );
        self.finally(&variable, &VariableMetadata::default());
        variable
    }

    fn after(&self, variable: &Variable, metadata: &VariableMetadata) {
        for (hook, context) in self.unwinding() {
            if let Err(err) = guarded(|| hook.after(context, variable, metadata)) {
                report(hook.as_ref(), "after", context, &err);
            }
        }
    }

    fn finally(&self, variable: &Variable, metadata: &VariableMetadata) {
        for (hook, context) in self.unwinding() {
            if let Err(err) = guarded(|| hook.finally(context, variable, metadata)) {
                report(hook.as_ref(), "finally", context, &err);
            }
        }
    }
}

impl Drop for Lifecycle<'_> {
    fn drop(&mut self) {
        if self.stage == Stage::Finished {
            return;
        }
        self.stage = Stage::Finished;
        debug!(flag_key = %self.context.flag_key, "evaluation dropped before completion");
        self.fail(&cancelled());
    }
}

/// Runs one hook call, turning a panic into [`HookError::Internal`].
fn guarded<T>(call: impl FnOnce() -> Result<T, HookError>) -> Result<T, HookError> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(HookError::Internal(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match message {
        Some(message) => format!("hook panicked: {}", message),
        None => "hook panicked".to_string(),
    }
}

pub(crate) fn cancelled() -> EvaluationError {
    EvaluationError {
        code: EvaluationErrorCode::General("evaluation cancelled".to_string()),
        message: Some("evaluation cancelled".to_string()),
    }
}

fn report(hook: &dyn EvalHook, stage: &'static str, context: &HookContext, err: &HookError) {
    warn!(
        hook = hook.name(),
        stage,
        flag_key = %context.flag_key,
        error = %err,
        "hook failed; continuing evaluation"
    );
}
