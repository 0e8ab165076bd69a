//! Search API client

use reqwest::header::{AUTHORIZATION, HeaderMap};
use reqwest::{StatusCode, Url};
use tweetline_core::{HttpSettings, ResultPage, SHARED_RUNTIME, build_client};

use crate::oauth::Signer;
use crate::schema::parse_page;

/// Standard v1.1 search endpoint
pub const SEARCH_URL: &str = "https://api.twitter.com/1.1/search/tweets.json";

/// Epoch seconds at which the current rate-limit window resets
pub const RATE_LIMIT_RESET: &str = "x-rate-limit-reset";

/// Longest response body kept in an error message
const MAX_ERROR_BODY: usize = 500;

/// Error from a single search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, timeout or body read failure
    Transport(String),
    /// Non-success status other than 429
    Status { code: u16, body: String },
    /// Body is not a search response
    Decode(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "request failed: {msg}"),
            Self::Status { code, body } => write!(f, "HTTP {code}: {body}"),
            Self::Decode(msg) => write!(f, "invalid response: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Strip the URL (it carries the query) from reqwest errors
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        Self::Transport(e.without_url().to_string())
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            // Client errors won't fix themselves, except timeouts and throttling
            Self::Status { code, .. } => !(400..500).contains(code) || matches!(code, 408 | 429),
            Self::Decode(_) => false,
        }
    }
}

/// Result of a search request that reached the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Page(ResultPage),
    /// HTTP 429, with the reset time if the header was readable
    RateLimited { reset: Option<i64> },
}

/// One page request against the search API.
///
/// `raw_query` is an already-encoded query string without the leading `?`.
pub trait SearchApi {
    fn search(&self, raw_query: &str) -> Result<SearchOutcome, FetchError>;
}

/// Signed HTTP client for the search endpoint
#[derive(Debug)]
pub struct TwitterClient {
    endpoint: Url,
    signer: Signer,
    client: reqwest::Client,
}

impl TwitterClient {
    pub fn new(endpoint: &str, signer: Signer, settings: &HttpSettings) -> anyhow::Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| anyhow::anyhow!("Invalid search endpoint {endpoint:?}: {e}"))?;
        let client = build_client(settings)?;
        Ok(Self {
            endpoint,
            signer,
            client,
        })
    }

    /// Full request URL for an encoded query
    pub fn request_url(&self, raw_query: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.set_query(Some(raw_query));
        url
    }
}

/// Reset time from a rate-limit response, if present and numeric
fn rate_limit_reset(headers: &HeaderMap) -> Option<i64> {
    headers
        .get(RATE_LIMIT_RESET)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
}

impl SearchApi for TwitterClient {
    fn search(&self, raw_query: &str) -> Result<SearchOutcome, FetchError> {
        let url = self.request_url(raw_query);
        let auth = self.signer.authorization_header("GET", &url);

        let (status, reset, body) = SHARED_RUNTIME
            .handle()
            .block_on(async {
                let resp = self
                    .client
                    .get(url)
                    .header(AUTHORIZATION, auth)
                    .send()
                    .await?;
                let status = resp.status();
                // The 429 body is never read
                if status == StatusCode::TOO_MANY_REQUESTS {
                    let reset = rate_limit_reset(resp.headers());
                    return Ok::<_, reqwest::Error>((status, reset, None));
                }
                let body = resp.text().await?;
                Ok::<_, reqwest::Error>((status, None, Some(body)))
            })
            .map_err(FetchError::from_reqwest)?;

        let Some(body) = body else {
            return Ok(SearchOutcome::RateLimited { reset });
        };
        if !status.is_success() {
            return Err(FetchError::Status {
                code: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        parse_page(&body)
            .map(SearchOutcome::Page)
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}
