//! CSV output sink fed by the fetcher over a bounded channel

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::mpsc::Receiver;

use crate::record::{Record, ResultPage};
use crate::shutdown::StopFlag;

/// Consecutive flush failures tolerated before the sink gives up
pub const MAX_FLUSH_FAILURES: usize = 3;

/// How the sink finished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SinkOutcome {
    /// Channel closed and everything was flushed
    #[default]
    Completed,
    /// Destination could not be created; no input consumed
    OpenFailed,
    /// Output stopped flushing; sink stopped early
    FlushFailed,
}

/// Counters reported by the sink after it closes
#[derive(Debug, Clone, Default)]
pub struct SinkReport {
    pub pages: usize,
    pub rows_written: usize,
    pub rows_skipped: usize,
    pub flush_failures: usize,
    pub outcome: SinkOutcome,
}

impl SinkReport {
    /// True if every received row reached the destination
    pub fn is_clean(&self) -> bool {
        self.outcome == SinkOutcome::Completed
            && self.rows_skipped == 0
            && self.flush_failures == 0
    }
}

/// Encode one record as a complete CSV line
fn encode_row<I, T>(fields: I) -> csv::Result<Vec<u8>>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut encoder = csv::Writer::from_writer(Vec::new());
    encoder.write_record(fields)?;
    encoder
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Buffered CSV writer that always starts with the header row.
///
/// Rows are encoded one at a time and only complete lines enter the
/// buffer. A failed flush keeps the unwritten tail for the next attempt.
pub struct CsvSink<W: Write> {
    out: W,
    pending: Vec<u8>,
    report: SinkReport,
}

impl<W: Write> std::fmt::Debug for CsvSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSink")
            .field("pending", &self.pending.len())
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

impl CsvSink<File> {
    /// Create (truncate) the output file and write the header
    pub fn create(path: &Path) -> io::Result<Self> {
        Self::new(File::create(path)?)
    }
}

impl<W: Write> CsvSink<W> {
    /// Wrap a writer; the header is written and flushed immediately
    pub fn new(out: W) -> io::Result<Self> {
        let mut sink = Self {
            out,
            pending: encode_row(Record::HEADER).map_err(io::Error::from)?,
            report: SinkReport::default(),
        };
        sink.flush()?;
        Ok(sink)
    }

    /// Queue every record of a page in order. Rows that fail to encode are logged and skipped.
    pub fn write_page(&mut self, page: &ResultPage) {
        self.report.pages += 1;
        for record in &page.records {
            match encode_row(record.to_row()) {
                Ok(line) => {
                    self.pending.extend_from_slice(&line);
                    self.report.rows_written += 1;
                }
                Err(e) => {
                    self.report.rows_skipped += 1;
                    log::warn!("Couldn't write tweet {}: {e}", record.id);
                }
            }
        }
    }

    /// Write out queued rows. On error the bytes not yet accepted stay queued.
    pub fn flush(&mut self) -> io::Result<()> {
        let mut written = 0;
        let result = loop {
            if written == self.pending.len() {
                break self.out.flush();
            }
            match self.out.write(&self.pending[written..]) {
                Ok(0) => {
                    break Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "output accepted no bytes",
                    ));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => break Err(e),
            }
        };
        self.pending.drain(..written);
        result
    }

    pub fn report(&self) -> &SinkReport {
        &self.report
    }

    /// Consume pages until the channel closes, flushing after each page.
    ///
    /// On a terminal flush failure the receiver is dropped and `stop` is set,
    /// so a producer blocked in `send` wakes up with an error.
    pub fn drain(mut self, rx: Receiver<ResultPage>, stop: &StopFlag) -> SinkReport {
        let mut consecutive_failures = 0;

        for page in rx.iter() {
            if page.is_empty() {
                continue;
            }
            self.write_page(&page);
            match self.flush() {
                Ok(()) => consecutive_failures = 0,
                Err(e) => {
                    self.report.flush_failures += 1;
                    consecutive_failures += 1;
                    log::error!("Couldn't flush CSV output: {e}");
                    if consecutive_failures >= MAX_FLUSH_FAILURES {
                        log::error!("Giving up after {consecutive_failures} failed flushes");
                        self.report.outcome = SinkOutcome::FlushFailed;
                        stop.request();
                        break;
                    }
                }
            }
        }
        drop(rx);

        if let Err(e) = self.flush() {
            self.report.flush_failures += 1;
            self.report.outcome = SinkOutcome::FlushFailed;
            log::error!("Final flush failed: {e}");
        }

        log::info!("Stopped writing to CSV.");
        self.report
    }
}

/// Sink entry point: open `path`, then drain `rx` into it.
///
/// An open failure requests a stop and drops `rx` without consuming anything.
pub fn run_sink(rx: Receiver<ResultPage>, path: &Path, stop: &StopFlag) -> SinkReport {
    match CsvSink::create(path) {
        Ok(sink) => sink.drain(rx, stop),
        Err(e) => {
            log::error!("Couldn't create {}: {e}", path.display());
            stop.request();
            SinkReport {
                outcome: SinkOutcome::OpenFailed,
                ..Default::default()
            }
        }
    }
}
