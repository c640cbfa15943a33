/// Shared error type used across all ThreadRelay crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// The upstream service answered, but not with success.
    #[error("upstream {operation} failed ({status}): {message}")]
    Upstream {
        operation: String,
        status: u16,
        message: String,
    },

    /// A required request field is missing or malformed.
    #[error("validation: {0}")]
    Validation(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("thread creation failed: {0}")]
    ThreadCreation(String),

    /// The run id cannot be polled (e.g. a placeholder id).
    #[error("invalid run: {0}")]
    InvalidRun(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
