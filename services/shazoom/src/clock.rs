//!
//! src/clock.rs  Oct 16th, 2026
//!
//! Whole-second elapsed counter shown while a clip uploads or is being
//! identified. Presentation only; the workflow never reads it back
//!

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct ElapsedClock {
    secs: Arc<AtomicU64>,
    ticker: Option<(CancellationToken, JoinHandle<()>)>
}

impl ElapsedClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart from zero. Must be called inside a tokio runtime.
    pub fn start(&mut self) {
        self.stop();
        self.secs.store(0, Ordering::Relaxed);

        let token = CancellationToken::new();
        let secs = self.secs.clone();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticks.tick() => { secs.fetch_add(1, Ordering::Relaxed); }
                }
            }
        });
        self.ticker = Some((token, handle));
    }

    /// Stop ticking and keep the last value
    pub fn stop(&mut self) {
        if let Some((token, handle)) = self.ticker.take() {
            token.cancel();
            handle.abort();
        }
    }

    /// Stop and zero
    pub fn reset(&mut self) {
        self.stop();
        self.secs.store(0, Ordering::Relaxed);
    }

    pub fn seconds(&self) -> u64 {
        self.secs.load(Ordering::Relaxed)
    }
}

impl Drop for ElapsedClock {
    fn drop(&mut self) {
        self.stop();
    }
}
