//! Polling loop: request pages, follow cursors, hand pages to the sink

use std::sync::mpsc::SyncSender;
use std::time::Duration;

use chrono::Utc;
use indicatif::ProgressBar;
use tweetline_core::{Backoff, ResultPage, RetryPolicy, StopFlag, fmt_num};

use crate::api::{FetchError, SearchApi, SearchOutcome};
use crate::query::SearchQuery;

/// Pause before every request to stay under burst limits
pub const THROTTLE: Duration = Duration::from_millis(500);

/// Wait used when a 429 carries no readable reset header
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Upper bound on a single rate-limit wait (one 15-minute window plus slack)
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(16 * 60);

/// How the wait after a 429 is derived from `X-Rate-Limit-Reset`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RateLimitWait {
    /// `reset - now`: sleep until the window reopens
    #[default]
    UntilReset,
    /// `now - reset`: legacy behavior, time elapsed since the reset instant
    SinceReset,
}

impl RateLimitWait {
    /// Wait duration for a reset header value, clamped to `[0, cap]`
    pub fn wait(self, reset: Option<i64>, now: i64, cap: Duration) -> Duration {
        let Some(reset) = reset else {
            return DEFAULT_RATE_LIMIT_WAIT.min(cap);
        };
        let secs = match self {
            Self::UntilReset => reset.saturating_sub(now),
            Self::SinceReset => now.saturating_sub(reset),
        };
        Duration::from_secs(secs.max(0) as u64).min(cap)
    }
}

/// Tunables for the polling loop
#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    pub throttle: Duration,
    pub retry: RetryPolicy,
    pub rate_limit_wait: RateLimitWait,
    pub max_rate_limit_wait: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            throttle: THROTTLE,
            retry: RetryPolicy::default(),
            rate_limit_wait: RateLimitWait::default(),
            max_rate_limit_wait: MAX_RATE_LIMIT_WAIT,
        }
    }
}

/// Why the fetcher stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopReason {
    /// Last page had no cursor
    #[default]
    Exhausted,
    /// Stop flag was set
    Interrupted,
    /// A response body could not be decoded
    DecodeFailed,
    /// Breaker opened after consecutive transient failures
    RetriesExhausted,
    /// Non-retryable HTTP status
    HttpStatus(u16),
    /// The sink stopped receiving
    SinkClosed,
    /// The fetcher thread panicked
    Panicked,
}

impl StopReason {
    /// True for reasons that leave the result set incomplete through an error
    pub fn is_failure(self) -> bool {
        !matches!(self, Self::Exhausted | Self::Interrupted)
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted => write!(f, "no more pages"),
            Self::Interrupted => write!(f, "interrupted"),
            Self::DecodeFailed => write!(f, "undecodable response"),
            Self::RetriesExhausted => write!(f, "too many failed requests"),
            Self::HttpStatus(code) => write!(f, "HTTP {code}"),
            Self::SinkClosed => write!(f, "output closed"),
            Self::Panicked => write!(f, "fetcher panicked"),
        }
    }
}

/// Counters reported by the fetcher when it stops
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub requests: usize,
    pub pages: usize,
    pub records: usize,
    pub rate_limited: usize,
    pub failures: usize,
    pub stop: StopReason,
}

/// Sole producer of the page channel
pub struct Fetcher<'a, A: SearchApi> {
    api: &'a A,
    raw_query: String,
    stop: StopFlag,
    settings: FetchSettings,
    progress: ProgressBar,
}

impl<'a, A: SearchApi> Fetcher<'a, A> {
    pub fn new(api: &'a A, query: &SearchQuery, stop: StopFlag, settings: FetchSettings) -> Self {
        Self {
            api,
            raw_query: query.encode(),
            stop,
            settings,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Poll until the pages run out, a stop is requested or an error ends the run.
    ///
    /// `tx` is dropped on return, which closes the channel for the sink.
    pub fn run(mut self, tx: SyncSender<ResultPage>) -> FetchReport {
        let mut report = FetchReport::default();
        let mut backoff = Backoff::new(self.settings.retry);
        self.progress.set_message("connecting...");

        report.stop = loop {
            if self.stop.is_requested() || !self.stop.sleep(self.settings.throttle) {
                break StopReason::Interrupted;
            }

            report.requests += 1;
            log::debug!("GET ?{}", self.raw_query);
            match self.api.search(&self.raw_query) {
                Ok(SearchOutcome::RateLimited { reset }) => {
                    report.rate_limited += 1;
                    let wait = self.settings.rate_limit_wait.wait(
                        reset,
                        Utc::now().timestamp(),
                        self.settings.max_rate_limit_wait,
                    );
                    log::warn!("Reached rate limit, waiting {}s", wait.as_secs());
                    self.progress
                        .set_message(format!("rate limited, waiting {}s", wait.as_secs()));
                    if !self.stop.sleep(wait) {
                        break StopReason::Interrupted;
                    }
                }
                Ok(SearchOutcome::Page(mut page)) => {
                    backoff.reset();
                    let next = page.next_cursor.take();
                    if !page.is_empty() {
                        let count = page.len();
                        log::info!("Collected {count} tweets");
                        if tx.send(page).is_err() {
                            log::error!("Output closed, dropping remaining pages");
                            break StopReason::SinkClosed;
                        }
                        report.pages += 1;
                        report.records += count;
                        self.progress.set_message(format!(
                            "{} tweets in {} pages",
                            fmt_num(report.records),
                            fmt_num(report.pages)
                        ));
                    }
                    match next {
                        Some(cursor) => self.raw_query = cursor,
                        None => break StopReason::Exhausted,
                    }
                }
                Err(FetchError::Decode(msg)) => {
                    log::error!("Couldn't decode search response: {msg}");
                    break StopReason::DecodeFailed;
                }
                Err(e) => {
                    report.failures += 1;
                    if !e.is_retryable() {
                        log::error!("{e}");
                        break match e {
                            FetchError::Status { code, .. } => StopReason::HttpStatus(code),
                            _ => StopReason::RetriesExhausted,
                        };
                    }
                    match backoff.record_failure() {
                        Some(delay) => {
                            log::warn!(
                                "{e}; attempt {}/{} failed, retrying in {:?}",
                                backoff.failures(),
                                backoff.max_failures(),
                                delay
                            );
                            if !self.stop.sleep(delay) {
                                break StopReason::Interrupted;
                            }
                        }
                        None => {
                            log::error!(
                                "{e}; giving up after {} consecutive failures",
                                backoff.failures()
                            );
                            break StopReason::RetriesExhausted;
                        }
                    }
                }
            }
        };

        self.progress.finish_and_clear();
        log::info!("Stopped collecting tweets: {}", report.stop);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::mpsc::{Receiver, sync_channel};

    use tweetline_core::Record;

    use crate::query::QueryArgs;

    type Reply = Result<SearchOutcome, FetchError>;

    /// Replays canned replies and records every query it was asked for
    struct ScriptedApi {
        replies: Mutex<VecDeque<Reply>>,
        queries: Mutex<Vec<String>>,
        /// Set this flag once the given number of calls were served
        stop_after: Option<(usize, StopFlag)>,
    }

    impl ScriptedApi {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                queries: Mutex::new(Vec::new()),
                stop_after: None,
            }
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    impl SearchApi for ScriptedApi {
        fn search(&self, raw_query: &str) -> Reply {
            let mut queries = self.queries.lock().unwrap();
            queries.push(raw_query.to_string());
            if let Some((n, flag)) = &self.stop_after {
                if queries.len() >= *n {
                    flag.request();
                }
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("fetcher requested more pages than scripted")
        }
    }

    fn query() -> SearchQuery {
        SearchQuery::try_from(QueryArgs {
            text: "rust".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    fn fast_settings() -> FetchSettings {
        FetchSettings {
            throttle: Duration::ZERO,
            retry: RetryPolicy {
                max_failures: 3,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
            },
            ..Default::default()
        }
    }

    fn page(ids: &[i64], cursor: Option<&str>) -> Reply {
        Ok(SearchOutcome::Page(ResultPage {
            records: ids
                .iter()
                .map(|&id| Record {
                    id,
                    created_at: "Mon Sep 24 03:35:21 +0000 2012".to_string(),
                    screen_name: "someone".to_string(),
                    text: format!("tweet {id}"),
                })
                .collect(),
            next_cursor: cursor.map(String::from),
        }))
    }

    fn rate_limited(reset: i64) -> Reply {
        Ok(SearchOutcome::RateLimited { reset: Some(reset) })
    }

    /// Run the fetcher against `api` with a draining consumer; returns (report, ids seen)
    fn run_collect(api: &ScriptedApi, stop: StopFlag) -> (FetchReport, Vec<i64>) {
        let (tx, rx) = sync_channel(0);
        let consumer = std::thread::spawn(move || drain_ids(rx));
        let report = Fetcher::new(api, &query(), stop, fast_settings()).run(tx);
        (report, consumer.join().unwrap())
    }

    fn drain_ids(rx: Receiver<ResultPage>) -> Vec<i64> {
        rx.iter()
            .flat_map(|p| p.records.into_iter().map(|r| r.id))
            .collect()
    }

    #[test]
    fn follows_cursors_until_exhausted() {
        let api = ScriptedApi::new(vec![
            page(&[1, 2], Some("max_id=2&q=rust")),
            page(&[3], Some("max_id=0&q=rust")),
            page(&[4], None),
        ]);

        let (report, ids) = run_collect(&api, StopFlag::new());

        assert_eq!(report.stop, StopReason::Exhausted);
        assert_eq!(report.requests, 3);
        assert_eq!(report.pages, 3);
        assert_eq!(report.records, 4);
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(
            api.queries(),
            vec![
                query().encode(),
                "max_id=2&q=rust".to_string(),
                "max_id=0&q=rust".to_string()
            ]
        );
    }

    #[test]
    fn cursor_free_page_ends_immediately() {
        let api = ScriptedApi::new(vec![page(&[9], None)]);
        let (report, ids) = run_collect(&api, StopFlag::new());
        assert_eq!(report.stop, StopReason::Exhausted);
        assert_eq!(report.requests, 1);
        assert_eq!(ids, vec![9]);
    }

    #[test]
    fn empty_pages_not_forwarded() {
        let api = ScriptedApi::new(vec![page(&[], Some("next=1")), page(&[], None)]);
        let (report, ids) = run_collect(&api, StopFlag::new());
        assert_eq!(report.stop, StopReason::Exhausted);
        assert_eq!(report.requests, 2);
        assert_eq!(report.pages, 0);
        assert!(ids.is_empty());
    }

    #[test]
    fn rate_limits_retry_same_cursor() {
        let api = ScriptedApi::new(vec![
            page(&[1], Some("cursor-a")),
            rate_limited(1_000),
            rate_limited(1_001),
            rate_limited(1_002),
            page(&[2, 3], None),
        ]);

        let (report, ids) = run_collect(&api, StopFlag::new());

        assert_eq!(report.stop, StopReason::Exhausted);
        assert_eq!(report.rate_limited, 3);
        assert_eq!(report.failures, 0);
        assert_eq!(ids, vec![1, 2, 3]);
        let queries = api.queries();
        assert_eq!(queries.len(), 5);
        assert!(queries[1..].iter().all(|q| q == "cursor-a"));
    }

    #[test]
    fn stop_flag_checked_before_next_request() {
        let stop = StopFlag::new();
        let mut api = ScriptedApi::new(vec![page(&[1], Some("more")), page(&[2], Some("more"))]);
        api.stop_after = Some((1, stop.clone()));

        let (report, ids) = run_collect(&api, stop);

        assert_eq!(report.stop, StopReason::Interrupted);
        assert_eq!(report.requests, 1);
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn preset_stop_issues_no_requests() {
        let stop = StopFlag::new();
        stop.request();
        let api = ScriptedApi::new(vec![]);
        let (report, _) = run_collect(&api, stop);
        assert_eq!(report.stop, StopReason::Interrupted);
        assert_eq!(report.requests, 0);
    }

    #[test]
    fn transient_errors_retry_then_succeed() {
        let api = ScriptedApi::new(vec![
            Err(FetchError::Transport("connection reset".into())),
            Err(FetchError::Status {
                code: 503,
                body: "over capacity".into(),
            }),
            page(&[5], None),
        ]);

        let (report, ids) = run_collect(&api, StopFlag::new());

        assert_eq!(report.stop, StopReason::Exhausted);
        assert_eq!(report.failures, 2);
        assert_eq!(ids, vec![5]);
        let queries = api.queries();
        assert!(queries.iter().all(|q| *q == queries[0]));
    }

    #[test]
    fn breaker_opens_after_consecutive_failures() {
        let api = ScriptedApi::new(vec![
            Err(FetchError::Transport("a".into())),
            Err(FetchError::Transport("b".into())),
            Err(FetchError::Transport("c".into())),
        ]);
        let (report, _) = run_collect(&api, StopFlag::new());
        assert_eq!(report.stop, StopReason::RetriesExhausted);
        assert_eq!(report.requests, 3);
    }

    #[test]
    fn success_resets_breaker() {
        let api = ScriptedApi::new(vec![
            Err(FetchError::Transport("a".into())),
            Err(FetchError::Transport("b".into())),
            page(&[1], Some("next")),
            Err(FetchError::Transport("c".into())),
            Err(FetchError::Transport("d".into())),
            page(&[2], None),
        ]);
        let (report, ids) = run_collect(&api, StopFlag::new());
        assert_eq!(report.stop, StopReason::Exhausted);
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn client_error_stops_at_once() {
        let api = ScriptedApi::new(vec![Err(FetchError::Status {
            code: 401,
            body: "Could not authenticate you".into(),
        })]);
        let (report, _) = run_collect(&api, StopFlag::new());
        assert_eq!(report.stop, StopReason::HttpStatus(401));
        assert!(report.stop.is_failure());
    }

    #[test]
    fn decode_failure_ends_run() {
        let api = ScriptedApi::new(vec![
            page(&[1], Some("next")),
            Err(FetchError::Decode("expected value".into())),
        ]);
        let (report, ids) = run_collect(&api, StopFlag::new());
        assert_eq!(report.stop, StopReason::DecodeFailed);
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn closed_channel_stops_fetcher() {
        let api = ScriptedApi::new(vec![page(&[1], Some("next"))]);
        let (tx, rx) = sync_channel(0);
        drop(rx);
        let report = Fetcher::new(&api, &query(), StopFlag::new(), fast_settings()).run(tx);
        assert_eq!(report.stop, StopReason::SinkClosed);
        assert_eq!(report.pages, 0);
    }

    #[test]
    fn wait_until_reset() {
        let cap = MAX_RATE_LIMIT_WAIT;
        let mode = RateLimitWait::UntilReset;
        assert_eq!(mode.wait(Some(1_090), 1_000, cap), Duration::from_secs(90));
        assert_eq!(mode.wait(Some(900), 1_000, cap), Duration::ZERO);
    }

    #[test]
    fn wait_since_reset_is_legacy() {
        let cap = MAX_RATE_LIMIT_WAIT;
        let mode = RateLimitWait::SinceReset;
        assert_eq!(mode.wait(Some(1_090), 1_000, cap), Duration::ZERO);
        assert_eq!(mode.wait(Some(900), 1_000, cap), Duration::from_secs(100));
    }

    #[test]
    fn wait_is_capped() {
        let cap = Duration::from_secs(60);
        assert_eq!(
            RateLimitWait::SinceReset.wait(Some(0), 1_700_000_000, cap),
            cap
        );
        assert_eq!(
            RateLimitWait::UntilReset.wait(Some(i64::MAX), 0, cap),
            cap
        );
    }

    #[test]
    fn wait_without_header() {
        assert_eq!(
            RateLimitWait::UntilReset.wait(None, 0, MAX_RATE_LIMIT_WAIT),
            DEFAULT_RATE_LIMIT_WAIT
        );
    }
}
