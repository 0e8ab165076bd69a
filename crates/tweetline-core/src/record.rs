//! Records and pages flowing from the fetcher to the sink

/// One retrieved tweet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: i64,
    /// Creation timestamp, verbatim from the API
    pub created_at: String,
    pub screen_name: String,
    pub text: String,
}

impl Record {
    /// CSV column names, in row order
    pub const HEADER: [&'static str; 4] = ["ID", "Created at", "Screen Name", "Tweet"];

    /// Fields in `HEADER` order
    pub fn to_row(&self) -> [String; 4] {
        [
            self.id.to_string(),
            self.created_at.clone(),
            self.screen_name.clone(),
            self.text.clone(),
        ]
    }
}

/// A batch of records from a single search response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultPage {
    pub records: Vec<Record>,
    /// Raw query string for the next page, already stripped of its leading `?`
    pub next_cursor: Option<String>,
}

impl ResultPage {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
