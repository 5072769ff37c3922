use std::time::Duration;

/// Bounded retry with linear backoff for network-level failures.
///
/// Only transport errors (refused/reset connections, failures while sending)
/// are retried. HTTP error statuses come back as a normal response, and
/// timeouts are not retried so the per-request bound stays meaningful.
#[derive(Debug, Clone)]
pub struct RetryingFetcher {
    attempts: u32,
    backoff: Duration,
}

impl RetryingFetcher {
    /// `attempts` is the total number of tries, at least one.
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Send the request produced by `build`, rebuilding it for every attempt.
    pub async fn send<F>(&self, build: F) -> Result<reqwest::Response, reqwest::Error>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 1;
        loop {
            match build().send().await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.attempts && is_transient(&e) => {
                    let delay = self.backoff * attempt;
                    tracing::warn!(
                        attempt,
                        max_attempts = self.attempts,
                        "Upstream request failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    !e.is_timeout() && (e.is_connect() || e.is_request())
}
