//! Search run configuration

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tweetline_core::{HttpSettings, RetryPolicy};

use crate::api::SEARCH_URL;
use crate::fetcher::{FetchSettings, RateLimitWait};
use crate::oauth::{Credentials, Signer};
use crate::query::{QueryArgs, SearchQuery};

/// Default CSV destination
pub const OUTPUT_FILE: &str = "output.csv";

/// CLI-facing options for a search run (plain struct, no clap derive).
#[derive(Debug, Clone)]
pub struct SearchArgs {
    pub query: QueryArgs,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: Option<String>,
    pub access_secret: Option<String>,
    pub output: PathBuf,
    pub endpoint: String,
    pub throttle_ms: u64,
    pub timeout_secs: u64,
    pub max_failures: u32,
    pub rate_limit_wait: RateLimitWait,
}

impl Default for SearchArgs {
    fn default() -> Self {
        Self {
            query: QueryArgs::default(),
            consumer_key: String::new(),
            consumer_secret: String::new(),
            access_token: None,
            access_secret: None,
            output: PathBuf::from(OUTPUT_FILE),
            endpoint: SEARCH_URL.to_string(),
            throttle_ms: 500,
            timeout_secs: 30,
            max_failures: RetryPolicy::default().max_failures,
            rate_limit_wait: RateLimitWait::default(),
        }
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub query: SearchQuery,
    pub signer: Signer,
    pub output: PathBuf,
    pub endpoint: String,
    pub http: HttpSettings,
    pub fetch: FetchSettings,
}

impl TryFrom<SearchArgs> for Config {
    type Error = anyhow::Error;

    fn try_from(args: SearchArgs) -> Result<Self, Self::Error> {
        let query = SearchQuery::try_from(args.query).context("Invalid search query")?;

        let token = match (args.access_token, args.access_secret) {
            (Some(key), Some(secret)) => Some(Credentials::new(key, secret)),
            (None, None) => None,
            _ => anyhow::bail!("--access-token and --access-secret must be given together"),
        };
        if args.consumer_key.is_empty() || args.consumer_secret.is_empty() {
            log::warn!("Consumer key or secret is empty; the API will likely reject requests");
        }
        let signer = Signer::new(
            Credentials::new(args.consumer_key, args.consumer_secret),
            token,
        );

        anyhow::ensure!(args.timeout_secs > 0, "--timeout must be at least 1 second");
        anyhow::ensure!(args.max_failures > 0, "--max-failures must be at least 1");

        let http = HttpSettings {
            request_timeout: Duration::from_secs(args.timeout_secs),
            ..Default::default()
        };
        let fetch = FetchSettings {
            throttle: Duration::from_millis(args.throttle_ms),
            retry: RetryPolicy {
                max_failures: args.max_failures,
                ..Default::default()
            },
            rate_limit_wait: args.rate_limit_wait,
            ..Default::default()
        };

        Ok(Self {
            query,
            signer,
            output: args.output,
            endpoint: args.endpoint,
            http,
            fetch,
        })
    }
}
