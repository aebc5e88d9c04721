use std::time::Duration;

use thiserror::Error;

/// Rejections produced by request validation before anything is forwarded
/// to an upstream service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("messages must not be empty")]
    EmptyMessages,

    #[error("too many messages: {count} (max {max})")]
    TooManyMessages { count: usize, max: usize },

    #[error("message {index} has empty content")]
    EmptyMessageContent { index: usize },

    #[error("temperature must be between 0 and 2, got {0}")]
    TemperatureOutOfRange(f32),

    #[error("max_tokens must be between 1 and {max}, got {value}")]
    MaxTokensOutOfRange { value: u32, max: u32 },

    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("prompt too long: {len} characters (max {max})")]
    PromptTooLong { len: usize, max: usize },

    #[error("user_id must not be blank")]
    BlankUserId,
}

/// Outcome of a single deadline-bounded operation that did not succeed.
#[derive(Error, Debug)]
pub enum TimeoutError<E> {
    #[error("operation timed out after {}ms", .0.as_millis())]
    Elapsed(Duration),

    #[error("{0}")]
    Operation(E),
}

impl<E> TimeoutError<E> {
    pub fn is_elapsed(&self) -> bool {
        matches!(self, TimeoutError::Elapsed(_))
    }
}

/// Every attempt of a retried operation failed and no fallback was given.
#[derive(Error, Debug)]
#[error("{label} failed after {attempts} attempts: {last}")]
pub struct RetryError<E> {
    pub label: String,
    pub attempts: u32,
    /// Failure of the final attempt.
    pub last: TimeoutError<E>,
}
