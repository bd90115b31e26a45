//! Seeder progress: a single-owner aggregator fed by delta messages.
//!
//! Batch tasks never touch the running total. They send the number of rows
//! they committed over an `mpsc` channel; [`ProgressAggregator`] owns the
//! total and drives a [`ProgressSink`] after every delta.

use std::io::Write;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

/// Channel capacity between batch tasks and the aggregator.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 100;

/// Width of the terminal progress bar in columns, brackets excluded.
pub const PROGRESS_BAR_WIDTH: usize = 40;

/// Point-in-time view of seeder progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub processed: u64,
    pub total: u64,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Completion in percent, 0.0 to 100.0.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.processed as f64 / self.total as f64 * 100.0
        }
    }

    /// Records per second since the start.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Receives progress updates from the aggregator.
pub trait ProgressSink: Send + 'static {
    /// Called after every applied delta.
    fn update(&mut self, snapshot: &ProgressSnapshot);

    /// Called once after the last delta.
    fn finish(&mut self, _snapshot: &ProgressSnapshot) {}
}

impl<P: ProgressSink + ?Sized> ProgressSink for Box<P> {
    fn update(&mut self, snapshot: &ProgressSnapshot) {
        (**self).update(snapshot)
    }

    fn finish(&mut self, snapshot: &ProgressSnapshot) {
        (**self).finish(snapshot)
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

/// Sole owner of the running total.
pub struct ProgressAggregator<P: ProgressSink> {
    total: u64,
    processed: u64,
    started: Instant,
    sink: P,
}

impl<P: ProgressSink> ProgressAggregator<P> {
    pub fn new(total: u64, sink: P) -> Self {
        Self {
            total,
            processed: 0,
            started: Instant::now(),
            sink,
        }
    }

    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            processed: self.processed,
            total: self.total,
            elapsed: self.started.elapsed(),
        }
    }

    /// Apply deltas until every sender is dropped. Returns the final total.
    pub async fn run(mut self, mut deltas: mpsc::Receiver<u64>) -> u64 {
        while let Some(delta) = deltas.recv().await {
            self.processed += delta;
            let snapshot = self.snapshot();
            self.sink.update(&snapshot);
        }
        let snapshot = self.snapshot();
        self.sink.finish(&snapshot);
        self.processed
    }
}

// ============================================================================
// SINKS
// ============================================================================

/// Render `[=====>    ]` for `percent` over `width` columns.
pub fn render_bar(percent: f64, width: usize) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64) as usize;
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');
    for i in 0..width {
        bar.push(match i.cmp(&filled) {
            std::cmp::Ordering::Less => '=',
            std::cmp::Ordering::Equal => '>',
            std::cmp::Ordering::Greater => ' ',
        });
    }
    bar.push(']');
    bar
}

/// Format one progress line without the leading carriage return.
pub fn render_line(snapshot: &ProgressSnapshot) -> String {
    format!(
        "{} {:.1}% ({}/{}) {:.0} users/sec",
        render_bar(snapshot.percent(), PROGRESS_BAR_WIDTH),
        snapshot.percent(),
        snapshot.processed,
        snapshot.total,
        snapshot.rate()
    )
}

/// Redraws a single progress line on stderr.
#[derive(Debug, Default)]
pub struct TerminalProgressSink;

impl ProgressSink for TerminalProgressSink {
    fn update(&mut self, snapshot: &ProgressSnapshot) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r{}", render_line(snapshot));
        let _ = stderr.flush();
    }

    fn finish(&mut self, _snapshot: &ProgressSnapshot) {
        let _ = writeln!(std::io::stderr());
    }
}

/// Emits progress as tracing events, at most once per interval.
#[derive(Debug)]
pub struct LogProgressSink {
    min_interval: Duration,
    last_emit: Option<Instant>,
}

impl LogProgressSink {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_emit: None,
        }
    }
}

impl Default for LogProgressSink {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl ProgressSink for LogProgressSink {
    fn update(&mut self, snapshot: &ProgressSnapshot) {
        let now = Instant::now();
        if self
            .last_emit
            .is_some_and(|last| now.duration_since(last) < self.min_interval)
        {
            return;
        }
        self.last_emit = Some(now);
        tracing::info!(
            processed = snapshot.processed,
            total = snapshot.total,
            percent = %format!("{:.1}", snapshot.percent()),
            rate = %format!("{:.0}", snapshot.rate()),
            "Seeding progress"
        );
    }

    fn finish(&mut self, snapshot: &ProgressSnapshot) {
        tracing::info!(
            processed = snapshot.processed,
            total = snapshot.total,
            "Seeding progress final"
        );
    }
}
