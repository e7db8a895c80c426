//! Error type shared by the TestRail and Qase clients and the importers
//! built on top of them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("http {status}: {body}")]
    Status { status: u16, body: String },

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("session login failed: {0}")]
    SessionLogin(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("circuit open for {0}")]
    CircuitOpen(String),

    #[error("rate limiter misconfigured: {0}")]
    RateLimit(#[from] railmigrate_harness::rate_limiter::RateLimitError),

    #[error("field reconciliation error: {0}")]
    FieldReconciliation(String),

    #[error("attachment io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IntegrationError>;
