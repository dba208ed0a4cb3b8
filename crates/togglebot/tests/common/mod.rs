#![allow(dead_code)]

use dashmap::DashMap;
use open_feature::{EvaluationError, EvaluationReason, Value};
use open_feature_togglebot::{
    ClientOptions, EvalHook, EvaluationMetadata, HookContext, HookError, HookedClient, Hooks,
    StaticFlag, StaticProvider, Variable, VariableMetadata,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Dispatch, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{Layer, Registry};

pub const EVALUATION_SPAN: &str = "feature_flag_evaluation";

#[derive(Debug, Clone)]
pub struct RecordedSpan {
    pub name: &'static str,
    pub fields: HashMap<String, String>,
    pub closed: bool,
    id: u64,
}

impl RecordedSpan {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub level: Level,
    pub fields: HashMap<String, String>,
    /// Index into [`Recording::spans`] of the span the event belongs to.
    pub span: Option<usize>,
}

impl RecordedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn message(&self) -> Option<&str> {
        self.field("message")
    }
}

#[derive(Debug, Default)]
pub struct Recording {
    pub spans: Vec<RecordedSpan>,
    pub events: Vec<RecordedEvent>,
}

impl Recording {
    fn open_span(&mut self, id: u64) -> Option<usize> {
        self.spans.iter().rposition(|s| s.id == id && !s.closed)
    }
}

/// Layer that keeps every span and event it sees.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    recording: Arc<Mutex<Recording>>,
}

impl Recorder {
    pub fn dispatch(&self) -> Dispatch {
        Dispatch::new(Registry::default().with(self.clone()))
    }

    /// Spans opened by the span hook, in creation order.
    pub fn evaluation_spans(&self) -> Vec<RecordedSpan> {
        self.recording
            .lock()
            .unwrap()
            .spans
            .iter()
            .filter(|s| s.name == EVALUATION_SPAN)
            .cloned()
            .collect()
    }

    pub fn span_named(&self, otel_name: &str) -> Option<RecordedSpan> {
        self.evaluation_spans()
            .into_iter()
            .find(|s| s.field("otel.name") == Some(otel_name))
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.recording.lock().unwrap().events.clone()
    }

    pub fn events_with_message(&self, message: &str) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.message() == Some(message))
            .collect()
    }

    pub fn span_at(&self, index: usize) -> RecordedSpan {
        self.recording.lock().unwrap().spans[index].clone()
    }
}

impl<S> Layer<S> for Recorder
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        self.recording.lock().unwrap().spans.push(RecordedSpan {
            name: attrs.metadata().name(),
            fields: visitor.0,
            closed: false,
            id: id.into_u64(),
        });
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
        let mut recording = self.recording.lock().unwrap();
        if let Some(index) = recording.open_span(id.into_u64()) {
            let mut visitor = FieldVisitor::default();
            values.record(&mut visitor);
            recording.spans[index].fields.extend(visitor.0);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let parent = ctx.event_span(event).map(|span| span.id().into_u64());
        let mut recording = self.recording.lock().unwrap();
        let span = parent.and_then(|id| recording.open_span(id));
        recording.events.push(RecordedEvent {
            level: *event.metadata().level(),
            fields: visitor.0,
            span,
        });
    }

    fn on_close(&self, id: Id, _ctx: Context<'_, S>) {
        let mut recording = self.recording.lock().unwrap();
        if let Some(index) = recording.open_span(id.into_u64()) {
            recording.spans[index].closed = true;
        }
    }
}

#[derive(Default)]
struct FieldVisitor(HashMap<String, String>);

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0
            .insert(field.name().to_string(), format!("{:?}", value));
    }
}

const BEFORE: usize = 0;
const AFTER: usize = 1;
const ERROR: usize = 2;
const FINALLY: usize = 3;

/// Counts stage invocations per evaluation id.
#[derive(Debug, Default)]
pub struct CountingHook {
    calls: DashMap<u64, [usize; 4]>,
}

impl CountingHook {
    fn bump(&self, context: &HookContext, stage: usize) {
        self.calls.entry(context.evaluation_id).or_default()[stage] += 1;
    }

    /// `[before, after, error, finally]` summed over every evaluation.
    pub fn counts(&self) -> [usize; 4] {
        self.calls.iter().fold([0; 4], |mut total, entry| {
            for (sum, n) in total.iter_mut().zip(entry.value()) {
                *sum += n;
            }
            total
        })
    }

    pub fn evaluations(&self) -> usize {
        self.calls.len()
    }

    /// Every evaluation saw one `before`, one of `after`/`error`, one `finally`.
    pub fn assert_each_completed_once(&self) {
        for entry in self.calls.iter() {
            let [before, after, error, finally] = *entry.value();
            assert_eq!(
                (before, after + error, finally),
                (1, 1, 1),
                "evaluation {} saw {:?}",
                entry.key(),
                entry.value()
            );
        }
    }
}

impl EvalHook for CountingHook {
    fn before(&self, context: &HookContext) -> Result<Option<HookContext>, HookError> {
        self.bump(context, BEFORE);
        Ok(None)
    }

    fn after(
        &self,
        context: &HookContext,
        _variable: &Variable,
        _metadata: &VariableMetadata,
    ) -> Result<(), HookError> {
        self.bump(context, AFTER);
        Ok(())
    }

    fn error(&self, context: &HookContext, _error: &EvaluationError) -> Result<(), HookError> {
        self.bump(context, ERROR);
        Ok(())
    }

    fn finally(
        &self,
        context: &HookContext,
        _variable: &Variable,
        _metadata: &VariableMetadata,
    ) -> Result<(), HookError> {
        self.bump(context, FINALLY);
        Ok(())
    }
}

/// Provider holding the three togglebot flags.
pub fn togglebot_provider() -> StaticProvider {
    StaticProvider::new()
        .with_flag(
            "togglebot-wink",
            StaticFlag::new(Value::Bool(true))
                .with_reason(EvaluationReason::TargetingMatch)
                .with_feature_id("feat-wink")
                .with_reason_details("All Users"),
        )
        .with_flag(
            "togglebot-speed",
            StaticFlag::new(Value::String("slow".to_string()))
                .with_reason(EvaluationReason::Default)
                .with_feature_id("feat-speed"),
        )
        .with_flag(
            "example-text",
            StaticFlag::new(Value::String("step-1".to_string()))
                .with_reason(EvaluationReason::Split)
                .with_feature_id("feat-text"),
        )
}

pub fn options(project: Option<&str>) -> ClientOptions {
    ClientOptions {
        metadata: project.map(|p| EvaluationMetadata {
            project_id: Some(p.to_string()),
            environment_id: Some("development".to_string()),
        }),
        evaluation_timeout: None,
    }
}

pub fn client(provider: StaticProvider, hooks: Hooks, options: ClientOptions) -> HookedClient {
    HookedClient::new(Arc::new(provider), hooks, options)
}
