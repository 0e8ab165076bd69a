//! Tweetline Search - Twitter search harvesting pipeline
//!
//! Validates a search query, polls the v1.1 search API page by page with
//! OAuth1-signed requests, and streams the results into a CSV file.

pub mod api;
pub mod config;
pub mod fetcher;
pub mod oauth;
pub mod query;
pub mod runner;
pub mod schema;
pub mod stats;

// Re-exports
pub use api::{FetchError, SearchApi, SearchOutcome, TwitterClient};
pub use config::{Config, SearchArgs};
pub use fetcher::{FetchReport, FetchSettings, Fetcher, RateLimitWait, StopReason};
pub use oauth::{Credentials, Signer};
pub use query::{QueryArgs, QueryError, ResultType, SearchQuery};
pub use runner::{run, run_pipeline};
pub use stats::{PipelineReport, RunStatus};
