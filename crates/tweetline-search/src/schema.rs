//! Search API response schema (only the consumed fields)

use serde::Deserialize;
use tweetline_core::{Record, ResultPage};

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub statuses: Vec<Status>,
    #[serde(default)]
    pub search_metadata: SearchMetadata,
}

#[derive(Debug, Deserialize)]
pub struct Status {
    pub id: i64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct User {
    #[serde(default)]
    pub screen_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchMetadata {
    /// Query string for the next page, e.g. `?max_id=...&q=...`
    #[serde(default)]
    pub next_results: Option<String>,
}

impl From<Status> for Record {
    fn from(status: Status) -> Self {
        Self {
            id: status.id,
            created_at: status.created_at,
            screen_name: status.user.screen_name,
            text: status.text,
        }
    }
}

impl From<SearchResponse> for ResultPage {
    fn from(resp: SearchResponse) -> Self {
        let next_cursor = resp
            .search_metadata
            .next_results
            .as_deref()
            .map(|raw| raw.strip_prefix('?').unwrap_or(raw))
            .filter(|cursor| !cursor.is_empty())
            .map(String::from);
        Self {
            records: resp.statuses.into_iter().map(Record::from).collect(),
            next_cursor,
        }
    }
}

/// Decode a response body into a page
pub fn parse_page(body: &str) -> Result<ResultPage, serde_json::Error> {
    serde_json::from_str::<SearchResponse>(body).map(ResultPage::from)
}
