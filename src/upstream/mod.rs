//! Everything that talks to a PACS: the shared connection pool, the retry
//! wrapper, per-request target resolution and the Orthanc REST adapter.

pub mod orthanc;
pub mod pool;
pub mod retry;
pub mod target;

pub use orthanc::{OrthancClient, PacsClient};
pub use pool::ConnectionPool;
pub use retry::RetryingFetcher;
pub use target::{ConfigResolver, ResolvedTarget};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PacsError {
    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unexpected upstream response: {0}")]
    Decode(String),

    #[error("HTTP client setup failed: {0}")]
    Setup(String),
}

impl PacsError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PacsError::Transport(e) if e.is_timeout())
    }
}
