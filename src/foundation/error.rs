/// Convenience result type used across the public API.
pub type FrameschedResult<T> = Result<T, FrameschedError>;

/// Top-level error type for framesched operations.
///
/// Task failures are not represented here: the scheduler isolates them per task and reports them
/// as [`crate::TaskFailure`] records instead of returning an error.
#[derive(thiserror::Error, Debug)]
pub enum FrameschedError {
    /// Invalid options (frame rate, budgets).
    #[error("config error: {0}")]
    Config(String),

    /// An event loop run consumed its event budget before becoming idle.
    #[error("run budget exceeded: {0}")]
    Budget(String),

    /// A replay trace could not be parsed or is inconsistent.
    #[error("trace error: {0}")]
    Trace(String),

    /// Wrapped lower-level error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FrameschedError {
    /// Build a [`FrameschedError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`FrameschedError::Budget`] value.
    pub fn budget(msg: impl Into<String>) -> Self {
        Self::Budget(msg.into())
    }

    /// Build a [`FrameschedError::Trace`] value.
    pub fn trace(msg: impl Into<String>) -> Self {
        Self::Trace(msg.into())
    }
}

impl From<serde_json::Error> for FrameschedError {
    fn from(e: serde_json::Error) -> Self {
        Self::trace(e.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
