//! Graceful shutdown support via a shared atomic flag

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

/// Granularity of interruptible sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Exit code used when a second signal forces the process down
pub const FORCED_EXIT_CODE: i32 = 130;

/// Shared stop flag: set by the signal watcher or a failing sink, polled by the fetcher
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a stop was requested
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Request a stop; returns whether one was already pending
    pub fn request(&self) -> bool {
        self.0.swap(true, Ordering::Relaxed)
    }

    /// Sleep for `duration`, waking early if a stop is requested.
    ///
    /// Returns `false` if the sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Spawn a thread that flips `stop` on SIGINT/SIGTERM.
///
/// First signal: graceful stop. Second signal: immediate exit with code 130.
pub fn spawn_signal_watcher(stop: StopFlag) -> io::Result<JoinHandle<()>> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::Builder::new()
        .name("signal-watcher".into())
        .spawn(move || {
            for sig in signals.forever() {
                if on_signal(&stop, sig) {
                    std::process::exit(FORCED_EXIT_CODE);
                }
            }
        })
}

/// Handle one delivered signal; returns true when the process must exit now
fn on_signal(stop: &StopFlag, sig: i32) -> bool {
    if stop.request() {
        log::warn!("Received signal {sig} again, exiting immediately");
        return true;
    }
    log::info!("Stopping...");
    false
}
