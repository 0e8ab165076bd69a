//! Main execution logic: wire fetcher and sink, wait for both

use std::path::Path;
use std::sync::mpsc::sync_channel;
use std::time::Instant;

use tweetline_core::{ProgressContext, ResultPage, SinkOutcome, SinkReport, StopFlag, run_sink};

use crate::api::{SearchApi, TwitterClient};
use crate::config::Config;
use crate::fetcher::{FetchReport, FetchSettings, Fetcher, StopReason};
use crate::query::SearchQuery;
use crate::stats::PipelineReport;

/// Run the fetch → channel → CSV pipeline to completion.
///
/// The channel is a rendezvous (zero capacity): the fetcher blocks in `send`
/// until the sink takes the page. The fetcher thread owns the only sender,
/// so the channel closes exactly when the fetcher finishes; the sink is
/// joined only after that.
pub fn run_pipeline<A: SearchApi + Sync>(
    api: &A,
    query: &SearchQuery,
    output: &Path,
    stop: &StopFlag,
    settings: FetchSettings,
    progress: &ProgressContext,
) -> PipelineReport {
    let start = Instant::now();
    let (tx, rx) = sync_channel::<ResultPage>(0);

    let (fetch, sink) = std::thread::scope(|s| {
        let sink_stop = stop.clone();
        let sink_handle = std::thread::Builder::new()
            .name("csv-sink".into())
            .spawn_scoped(s, move || run_sink(rx, output, &sink_stop));

        let fetcher = Fetcher::new(api, query, stop.clone(), settings)
            .with_progress(progress.stage_line("search"));
        let fetch_handle = std::thread::Builder::new()
            .name("fetcher".into())
            .spawn_scoped(s, move || fetcher.run(tx));

        let fetch = match fetch_handle {
            Ok(handle) => handle.join().unwrap_or_else(|_| {
                log::error!("Fetcher panicked");
                stop.request();
                FetchReport {
                    stop: StopReason::Panicked,
                    ..Default::default()
                }
            }),
            Err(e) => {
                // Sender was dropped with the closure, so the sink sees end-of-stream
                log::error!("Failed to spawn fetcher: {e}");
                FetchReport {
                    stop: StopReason::Panicked,
                    ..Default::default()
                }
            }
        };

        let sink = match sink_handle {
            Ok(handle) => handle.join().unwrap_or_else(|_| {
                log::error!("CSV sink panicked");
                SinkReport {
                    outcome: SinkOutcome::FlushFailed,
                    ..Default::default()
                }
            }),
            Err(e) => {
                log::error!("Failed to spawn CSV sink: {e}");
                SinkReport {
                    outcome: SinkOutcome::OpenFailed,
                    ..Default::default()
                }
            }
        };

        (fetch, sink)
    });

    PipelineReport {
        fetch,
        sink,
        elapsed: start.elapsed(),
    }
}

/// Main entry point for a search run
pub fn run(
    config: &Config,
    stop: &StopFlag,
    progress: &ProgressContext,
) -> anyhow::Result<PipelineReport> {
    let client = TwitterClient::new(&config.endpoint, config.signer.clone(), &config.http)?;

    log::info!(
        "tweetline starting: q={:?}, result_type={}, count={}, output={}",
        config.query.text,
        config.query.result_type,
        config.query.count,
        config.output.display()
    );

    let report = run_pipeline(
        &client,
        &config.query,
        &config.output,
        stop,
        config.fetch,
        progress,
    );

    if progress.is_tty() {
        progress.println(report.format_table());
    } else {
        report.log();
    }

    Ok(report)
}
