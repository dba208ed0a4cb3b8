//! Concrete evaluation hooks.
//!
//! - [`SpanHook`]: one `tracing` span per evaluation, closed in `finally`
//! - [`NativeTracerHook`]: the same lifecycle through an APM agent SDK
//! - [`LogHook`]: one structured event per outcome, no state

mod log;
mod native;
mod span;

pub use log::LogHook;
pub use native::{AgentSdk, NativeTracer, NativeTracerHook, REMOTE_METHOD, REMOTE_SERVICE};
pub use span::{CurrentSpan, NoFallback, SpanFallback, SpanHook};
