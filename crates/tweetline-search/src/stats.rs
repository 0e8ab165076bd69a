//! Run summary and exit status

use std::process::ExitCode;
use std::time::Duration;

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};
use tweetline_core::{SinkOutcome, SinkReport, fmt_num};

use crate::fetcher::{FetchReport, StopReason};

/// Overall result of a run, mapped to the process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// All pages fetched and written
    Clean,
    /// Stopped by a signal; everything received was written
    Interrupted,
    /// Fetching or writing ended on an error
    Partial,
}

impl RunStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::Partial => 1,
            Self::Interrupted => 130,
        }
    }
}

impl From<RunStatus> for ExitCode {
    fn from(status: RunStatus) -> Self {
        ExitCode::from(status.code())
    }
}

/// Combined fetcher and sink reports
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub fetch: FetchReport,
    pub sink: SinkReport,
    pub elapsed: Duration,
}

impl PipelineReport {
    pub fn status(&self) -> RunStatus {
        if !self.sink.is_clean() || self.fetch.stop.is_failure() {
            RunStatus::Partial
        } else if self.fetch.stop == StopReason::Interrupted {
            RunStatus::Interrupted
        } else {
            RunStatus::Clean
        }
    }

    /// Format summary table as a string.
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Search")
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
            ]);

        table.add_row(vec![
            Cell::new("Requests"),
            Cell::new(format!(
                "{} ({} rate limited, {} failed)",
                fmt_num(self.fetch.requests),
                self.fetch.rate_limited,
                self.fetch.failures
            )),
        ]);
        table.add_row(vec![
            Cell::new("Pages"),
            Cell::new(fmt_num(self.fetch.pages)),
        ]);
        table.add_row(vec![
            Cell::new("Tweets written").fg(Color::Green),
            Cell::new(fmt_num(self.sink.rows_written)).fg(Color::Green),
        ]);
        if self.sink.rows_skipped > 0 {
            table.add_row(vec![
                Cell::new("Tweets skipped").fg(Color::Red),
                Cell::new(fmt_num(self.sink.rows_skipped)).fg(Color::Red),
            ]);
        }
        table.add_row(vec![
            Cell::new("Stopped"),
            Cell::new(self.fetch.stop.to_string()),
        ]);
        if self.sink.outcome != SinkOutcome::Completed {
            table.add_row(vec![
                Cell::new("Output").fg(Color::Red),
                Cell::new(format!("{:?}", self.sink.outcome)).fg(Color::Red),
            ]);
        }
        table.add_row(vec![
            Cell::new("Time"),
            Cell::new(format!("{:.1}s", self.elapsed.as_secs_f64())),
        ]);

        format!("\n{table}")
    }

    /// Log minimal summary (non-TTY mode).
    pub fn log(&self) {
        log::info!(
            "Search complete: {} tweets in {} pages, {} requests ({} rate limited) [{:.1}s]",
            fmt_num(self.sink.rows_written),
            fmt_num(self.fetch.pages),
            fmt_num(self.fetch.requests),
            self.fetch.rate_limited,
            self.elapsed.as_secs_f64()
        );
        if self.sink.rows_skipped > 0 {
            log::warn!("{} tweets could not be written", self.sink.rows_skipped);
        }
        match self.status() {
            RunStatus::Clean => {}
            RunStatus::Interrupted => log::warn!("Stopped early: {}", self.fetch.stop),
            RunStatus::Partial => log::error!(
                "Run incomplete: fetcher {}, output {:?}",
                self.fetch.stop,
                self.sink.outcome
            ),
        }
    }
}
