//! Tweetline Core - pipeline infrastructure for search harvesting
//!
//! Shutdown coordination, retry policy, HTTP runtime, logging/progress,
//! and the CSV sink that the search fetcher feeds.

pub mod http;
pub mod logging;
pub mod progress;
pub mod record;
pub mod retry;
pub mod shutdown;
pub mod sink;

// Re-exports for convenience
pub use http::{HttpSettings, SHARED_RUNTIME, build_client};
pub use logging::{IndicatifLogger, Verbosity, init_logging};
pub use progress::{ProgressContext, fmt_num};
pub use record::{Record, ResultPage};
pub use retry::{Backoff, RetryPolicy};
pub use shutdown::{StopFlag, spawn_signal_watcher};
pub use sink::{CsvSink, SinkOutcome, SinkReport, run_sink};
