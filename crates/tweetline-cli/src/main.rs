//! tweetline - harvest Twitter search results into a CSV file
//!
//! Polls the v1.1 search API page by page until the results run out or
//! the process is interrupted, writing every tweet as it arrives.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tweetline_core::{ProgressContext, StopFlag, Verbosity, init_logging, spawn_signal_watcher};
use tweetline_search::api::SEARCH_URL;
use tweetline_search::config::OUTPUT_FILE;
use tweetline_search::{Config, QueryArgs, RateLimitWait, SearchArgs, run};

/// Exit code for configuration and startup failures
const EXIT_STARTUP: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "tweetline")]
#[command(about = "Harvest Twitter search results into a CSV file")]
#[command(version)]
struct Cli {
    /// Search for tweets referencing the given query (required, max 500 chars)
    #[arg(short, long, default_value = "")]
    query: String,

    /// Restrict tweets to the given language (ISO 639-1, empty for any)
    #[arg(long, default_value = "en")]
    lang: String,

    /// Restrict tweets to those sent before the given date (YYYY-MM-DD)
    #[arg(long)]
    until: Option<String>,

    /// Restrict tweets to IDs less than or equal to this (0 = unset)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    max_id: i64,

    /// Restrict tweets to IDs greater than this (0 = unset)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    since_id: i64,

    /// Tweets per request (0-100)
    #[arg(long, default_value_t = 15, allow_negative_numbers = true)]
    count: i64,

    /// recent, popular or mixed
    #[arg(long, default_value = "mixed")]
    result_type: String,

    /// Consumer key
    #[arg(long, default_value = "")]
    token: String,

    /// Consumer secret
    #[arg(long, default_value = "")]
    secret: String,

    /// Access token (optional, requires --access-secret)
    #[arg(long)]
    access_token: Option<String>,

    /// Access token secret
    #[arg(long)]
    access_secret: Option<String>,

    /// CSV output file
    #[arg(short, long, default_value = OUTPUT_FILE)]
    output: PathBuf,

    /// Search endpoint URL
    #[arg(long, default_value = SEARCH_URL)]
    endpoint: String,

    /// Milliseconds to wait before each request
    #[arg(long, default_value_t = 500)]
    throttle_ms: u64,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Consecutive failed requests before giving up, first attempt included
    #[arg(long, default_value_t = 5)]
    max_failures: u32,

    /// How to derive the wait after a rate-limit response
    #[arg(long, value_enum, default_value = "until-reset")]
    rate_limit_wait: WaitMode,

    /// Only log warnings and errors
    #[arg(long)]
    quiet: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
enum WaitMode {
    /// Sleep until the reset time
    UntilReset,
    /// Sleep for the time elapsed since the reset time (legacy)
    SinceReset,
}

impl From<WaitMode> for RateLimitWait {
    fn from(mode: WaitMode) -> Self {
        match mode {
            WaitMode::UntilReset => RateLimitWait::UntilReset,
            WaitMode::SinceReset => RateLimitWait::SinceReset,
        }
    }
}

impl From<Cli> for SearchArgs {
    fn from(cli: Cli) -> Self {
        Self {
            query: QueryArgs {
                text: cli.query,
                lang: cli.lang,
                until: cli.until,
                max_id: cli.max_id,
                since_id: cli.since_id,
                count: cli.count,
                result_type: cli.result_type,
            },
            consumer_key: cli.token,
            consumer_secret: cli.secret,
            access_token: cli.access_token,
            access_secret: cli.access_secret,
            output: cli.output,
            endpoint: cli.endpoint,
            throttle_ms: cli.throttle_ms,
            timeout_secs: cli.timeout,
            max_failures: cli.max_failures,
            rate_limit_wait: cli.rate_limit_wait.into(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // TTY: spinner plus colored logs above it; non-TTY: plain log lines
    let progress = ProgressContext::new();
    let multi = progress.is_tty().then(|| progress.multi());
    if let Err(e) = init_logging(Verbosity::from_flags(cli.quiet, cli.debug), multi) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let config = match Config::try_from(SearchArgs::from(cli)) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Configuration error: {e:#}");
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let stop = StopFlag::new();
    if let Err(e) = spawn_signal_watcher(stop.clone()) {
        log::error!("Failed to install signal handlers: {e}");
        return ExitCode::from(EXIT_STARTUP);
    }

    match run(&config, &stop, &progress) {
        Ok(report) => report.status().into(),
        Err(e) => {
            log::error!("Fatal error: {e:#}");
            ExitCode::from(EXIT_STARTUP)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_map_to_args() {
        let cli = Cli::parse_from([
            "tweetline",
            "-q",
            "#rust",
            "--count",
            "150",
            "--result-type",
            "BOGUS",
            "--until",
            "not-a-date",
            "--rate-limit-wait",
            "since-reset",
        ]);
        let args = SearchArgs::from(cli);
        assert_eq!(args.query.text, "#rust");
        assert_eq!(args.query.count, 150);
        assert_eq!(args.rate_limit_wait, RateLimitWait::SinceReset);

        let config = Config::try_from(args).unwrap();
        assert_eq!(config.query.count, 15);
        assert_eq!(config.query.result_type.as_str(), "mixed");
        assert!(config.query.until.is_none());
    }

    #[test]
    fn defaults_match_search_args() {
        let args = SearchArgs::from(Cli::parse_from(["tweetline", "-q", "rust"]));
        let defaults = SearchArgs::default();
        assert_eq!(args.output, defaults.output);
        assert_eq!(args.endpoint, defaults.endpoint);
        assert_eq!(args.throttle_ms, defaults.throttle_ms);
        assert_eq!(args.timeout_secs, defaults.timeout_secs);
        assert_eq!(args.max_failures, defaults.max_failures);
        assert_eq!(args.query.lang, "en");
    }

    #[test]
    fn max_failures_counts_first_attempt() {
        use tweetline_core::Backoff;

        let cli = Cli::parse_from(["tweetline", "-q", "rust", "--max-failures", "2"]);
        let config = Config::try_from(SearchArgs::from(cli)).unwrap();
        assert_eq!(config.fetch.retry.max_failures, 2);

        // One retry after the first failure, then give up
        let mut backoff = Backoff::new(config.fetch.retry);
        assert!(backoff.record_failure().is_some());
        assert!(backoff.record_failure().is_none());
    }

    #[test]
    fn missing_query_is_startup_error() {
        let args = SearchArgs::from(Cli::parse_from(["tweetline"]));
        assert!(Config::try_from(args).is_err());
    }
}
