use thiserror::Error;

/// Faults raised inside a hook.
///
/// These never reach the caller of an evaluation: the lifecycle driver logs
/// them and carries on with the remaining stages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HookError {
    #[error("Agent error: {0}")]
    Agent(String),
    #[error("Handle error: {0}")]
    Handle(String),
    #[error("Internal hook error: {0}")]
    Internal(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum TelemetryError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Telemetry initialization failed: {0}")]
    Init(String),
}
