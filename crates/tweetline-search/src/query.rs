//! Search query validation and encoding

use chrono::NaiveDate;

use crate::oauth::percent_encode;

/// Longest query text the search API accepts
pub const MAX_QUERY_LEN: usize = 500;

/// Tweets per page when `count` is out of range
pub const DEFAULT_COUNT: u32 = 15;

const MAX_COUNT: i64 = 100;

/// Ordering of search results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultType {
    Recent,
    Popular,
    #[default]
    Mixed,
}

impl ResultType {
    /// Case-insensitive lookup
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "recent" => Some(Self::Recent),
            "popular" => Some(Self::Popular),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recent => "recent",
            Self::Popular => "popular",
            Self::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for ResultType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw, unvalidated query options (plain struct, no clap derive).
#[derive(Debug, Clone)]
pub struct QueryArgs {
    pub text: String,
    pub lang: String,
    pub until: Option<String>,
    pub max_id: i64,
    pub since_id: i64,
    pub count: i64,
    pub result_type: String,
}

impl Default for QueryArgs {
    fn default() -> Self {
        Self {
            text: String::new(),
            lang: "en".to_string(),
            until: None,
            max_id: 0,
            since_id: 0,
            count: DEFAULT_COUNT as i64,
            result_type: ResultType::Mixed.as_str().to_string(),
        }
    }
}

/// Fatal query problems, reported before any request is made
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    MissingText,
    TextTooLong(usize),
    BadLanguage(usize),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingText => write!(f, "query text is required"),
            Self::TextTooLong(n) => {
                write!(f, "query has too many characters: {n} (max {MAX_QUERY_LEN})")
            }
            Self::BadLanguage(n) => {
                write!(f, "lang must be a 2-letter ISO 639-1 code, got {n} characters")
            }
        }
    }
}

impl std::error::Error for QueryError {}

/// Validated search parameters, fixed for the whole run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub lang: Option<String>,
    pub until: Option<NaiveDate>,
    pub max_id: Option<i64>,
    pub since_id: Option<i64>,
    pub count: u32,
    pub result_type: ResultType,
}

impl TryFrom<QueryArgs> for SearchQuery {
    type Error = QueryError;

    fn try_from(args: QueryArgs) -> Result<Self, Self::Error> {
        if args.text.is_empty() {
            return Err(QueryError::MissingText);
        }
        let text_len = args.text.chars().count();
        if text_len > MAX_QUERY_LEN {
            return Err(QueryError::TextTooLong(text_len));
        }

        let lang_len = args.lang.chars().count();
        let lang = match lang_len {
            0 => None,
            2 => Some(args.lang.to_ascii_lowercase()),
            n => return Err(QueryError::BadLanguage(n)),
        };

        let until = match args.until.as_deref() {
            None | Some("") => None,
            Some(raw) => {
                let parsed = parse_until(raw);
                if parsed.is_none() {
                    log::warn!("until couldn't be parsed: {raw:?}; ignoring until");
                }
                parsed
            }
        };

        let count = if (0..=MAX_COUNT).contains(&args.count) {
            args.count as u32
        } else {
            log::warn!(
                "count is not between 0 and {MAX_COUNT}: {}; using default {DEFAULT_COUNT}",
                args.count
            );
            DEFAULT_COUNT
        };

        let result_type = ResultType::from_name(&args.result_type).unwrap_or_else(|| {
            log::warn!(
                "result_type is invalid: {}; using default {}",
                args.result_type,
                ResultType::Mixed
            );
            ResultType::Mixed
        });

        Ok(Self {
            text: args.text,
            lang,
            until,
            max_id: (args.max_id != 0).then_some(args.max_id),
            since_id: (args.since_id != 0).then_some(args.since_id),
            count,
            result_type,
        })
    }
}

impl SearchQuery {
    /// Request parameters, sorted by key
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("count", self.count.to_string()),
            ("q", self.text.clone()),
            ("result_type", self.result_type.as_str().to_string()),
        ];
        if let Some(lang) = &self.lang {
            params.push(("lang", lang.clone()));
        }
        if let Some(until) = self.until {
            params.push(("until", until.format("%Y-%m-%d").to_string()));
        }
        if let Some(max_id) = self.max_id {
            params.push(("max_id", max_id.to_string()));
        }
        if let Some(since_id) = self.since_id {
            params.push(("since_id", since_id.to_string()));
        }
        params.sort_by(|a, b| a.0.cmp(b.0));
        params
    }

    /// Encoded query string for the first request
    pub fn encode(&self) -> String {
        self.params()
            .iter()
            .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Strict `YYYY-MM-DD`
fn parse_until(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(text: &str) -> QueryArgs {
        QueryArgs {
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults() {
        let query = SearchQuery::try_from(args("rust")).unwrap();
        assert_eq!(query.lang.as_deref(), Some("en"));
        assert_eq!(query.count, 15);
        assert_eq!(query.result_type, ResultType::Mixed);
        assert!(query.until.is_none());
        assert!(query.max_id.is_none());
        assert!(query.since_id.is_none());
    }

    #[test]
    fn missing_text_is_fatal() {
        assert_eq!(
            SearchQuery::try_from(args("")),
            Err(QueryError::MissingText)
        );
    }

    #[test]
    fn long_text_is_fatal() {
        let text = "a".repeat(501);
        assert_eq!(
            SearchQuery::try_from(args(&text)),
            Err(QueryError::TextTooLong(501))
        );
        assert!(SearchQuery::try_from(args(&"a".repeat(500))).is_ok());
    }

    #[test]
    fn bad_language_is_fatal() {
        let mut a = args("rust");
        a.lang = "eng".to_string();
        assert_eq!(SearchQuery::try_from(a), Err(QueryError::BadLanguage(3)));
    }

    #[test]
    fn empty_language_is_omitted() {
        let mut a = args("rust");
        a.lang = String::new();
        let query = SearchQuery::try_from(a).unwrap();
        assert!(query.lang.is_none());
        assert!(!query.encode().contains("lang="));
    }

    #[test]
    fn invalid_until_is_dropped() {
        let mut a = args("rust");
        a.until = Some("not-a-date".to_string());
        let query = SearchQuery::try_from(a).unwrap();
        assert!(query.until.is_none());
        assert!(!query.encode().contains("until"));
    }

    #[test]
    fn unpadded_until_is_dropped() {
        let mut a = args("rust");
        a.until = Some("2015-1-5".to_string());
        assert!(SearchQuery::try_from(a).unwrap().until.is_none());
    }

    #[test]
    fn valid_until_is_kept() {
        let mut a = args("rust");
        a.until = Some("2015-07-04".to_string());
        let query = SearchQuery::try_from(a).unwrap();
        assert_eq!(query.until, NaiveDate::from_ymd_opt(2015, 7, 4));
        assert!(query.encode().contains("until=2015-07-04"));
    }

    #[test]
    fn out_of_range_count_resets() {
        let mut a = args("rust");
        a.count = 150;
        assert_eq!(SearchQuery::try_from(a).unwrap().count, 15);

        let mut a = args("rust");
        a.count = -1;
        assert_eq!(SearchQuery::try_from(a).unwrap().count, 15);

        let mut a = args("rust");
        a.count = 100;
        assert_eq!(SearchQuery::try_from(a).unwrap().count, 100);
    }

    #[test]
    fn unknown_result_type_resets() {
        let mut a = args("rust");
        a.result_type = "BOGUS".to_string();
        assert_eq!(
            SearchQuery::try_from(a).unwrap().result_type,
            ResultType::Mixed
        );
    }

    #[test]
    fn result_type_case_insensitive() {
        let mut a = args("rust");
        a.result_type = "Recent".to_string();
        assert_eq!(
            SearchQuery::try_from(a).unwrap().result_type,
            ResultType::Recent
        );
    }

    #[test]
    fn ids_only_when_nonzero() {
        let mut a = args("rust");
        a.max_id = 250126199840518145;
        let query = SearchQuery::try_from(a).unwrap();
        assert_eq!(query.max_id, Some(250126199840518145));
        assert!(query.since_id.is_none());
        assert!(query.encode().contains("max_id=250126199840518145"));
        assert!(!query.encode().contains("since_id"));
    }

    #[test]
    fn encode_sorted_and_escaped() {
        let query = SearchQuery::try_from(args("#rust lang")).unwrap();
        assert_eq!(
            query.encode(),
            "count=15&lang=en&q=%23rust%20lang&result_type=mixed"
        );
    }
}
