//! # teacherdesk-shared
//!
//! Types and helpers shared by the teacherdesk backend:
//!
//! - **resilience**: deadline and bounded-retry wrappers for external calls
//! - **envelope**: the `{success, data|error, timestamp}` response shape
//! - **types**: request/response DTOs for the chat and image endpoints
//! - **permissions** / **schema**: declarative InstantDB configuration

pub mod constants;
pub mod envelope;
pub mod error;
pub mod permissions;
pub mod resilience;
pub mod schema;
pub mod types;

pub use envelope::ApiResponse;
pub use error::{RetryError, TimeoutError, ValidationError};
pub use resilience::{with_timeout, with_timeout_and_retry, RetryOptions};
