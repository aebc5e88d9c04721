use std::time::Duration;

/// Application name
pub const APP_NAME: &str = "teacherdesk";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 3006;

/// Default OpenAI-compatible API root
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default InstantDB API root
pub const DEFAULT_INSTANT_API_URL: &str = "https://api.instantdb.com";

/// Chat model used when the request does not name one
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Image generation model
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

/// Models offered when the provider's model list cannot be fetched in time
pub const FALLBACK_CHAT_MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo"];

/// System prompt prepended to chats that do not carry their own
pub const TEACHER_SYSTEM_PROMPT: &str = "You are a helpful assistant for teachers. \
Help with lesson planning, worksheets, differentiated material and classroom communication. \
Answer concisely and in the language the teacher writes in.";

/// Maximum number of messages forwarded in one chat completion
pub const MAX_CHAT_MESSAGES: usize = 100;

/// Upper bound accepted for `max_tokens`
pub const MAX_COMPLETION_TOKENS: u32 = 16_384;

/// DALL-E 3 prompt limit, in characters
pub const MAX_IMAGE_PROMPT_CHARS: usize = 4000;

/// Fixed-window rate limit: requests per window per client IP
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 60;

/// Fixed-window rate limit: window length
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Upstream deadlines
pub const DEFAULT_CHAT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MODELS_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_DATABASE_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry defaults for `with_timeout_and_retry`
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Internal test account that bypasses owner checks in the database rules
pub const TEST_USER_ID: &str = "38eb3d27-dd97-4ed4-9395-a7d8fc9a0c1a";
