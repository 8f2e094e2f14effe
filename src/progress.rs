use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregation target for per-chunk byte counts from every transfer unit of
/// one download. Called concurrently from all units; implementations must
/// not assume any cross-unit ordering.
pub trait ProgressSink: Send + Sync {
    fn update(&self, unit_index: usize, bytes: u64);
}

/// Indicatif-backed sink: one bar for the whole file, advanced by whichever
/// unit wrote last, plus an atomic running total.
pub struct TransferProgress {
    bar: ProgressBar,
    total_written: AtomicU64,
}

impl TransferProgress {
    pub fn new(multi: &MultiProgress, total_bytes: u64, filename: &str) -> Self {
        let bar = multi.add(ProgressBar::new(total_bytes));
        bar.set_style(ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes:>12}/{total_bytes:<12} {bytes_per_sec:>12} {eta:>4} {msg}")
            .unwrap()
            .progress_chars("=>-"));
        bar.set_message(format!("Downloading {}", filename));
        Self {
            bar,
            total_written: AtomicU64::new(0),
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.total_written.load(Ordering::Relaxed)
    }

    pub fn finish_complete(&self, filename: &str) {
        self.bar
            .finish_with_message(format!("Completed   {}", filename));
    }

    pub fn finish_stopped(&self, filename: &str) {
        self.bar.abandon_with_message(format!(
            "Stopped     {} ({} written)",
            filename,
            HumanBytes(self.bytes_written())
        ));
    }

    pub fn finish_failed(&self, filename: &str) {
        self.bar
            .abandon_with_message(format!("Failed      {}", filename));
    }
}

impl ProgressSink for TransferProgress {
    fn update(&self, _unit_index: usize, bytes: u64) {
        self.total_written.fetch_add(bytes, Ordering::Relaxed);
        self.bar.inc(bytes);
    }
}

/// Sink that discards all updates.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn update(&self, _unit_index: usize, _bytes: u64) {}
}
