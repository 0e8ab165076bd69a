//! Shared HTTP runtime and client construction.
//!
//! Requests are issued with async reqwest on a shared tokio runtime, but
//! callers block on them from plain threads.

use std::sync::LazyLock;
use std::time::Duration;

/// Default connect timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for a whole request (connect + response body)
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeouts applied to every request made by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

/// Build an async HTTP client with per-request deadline
pub fn build_client(settings: &HttpSettings) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
        .pool_max_idle_per_host(2)
        .user_agent(concat!("tweetline/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});
