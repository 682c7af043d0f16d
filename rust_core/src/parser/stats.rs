use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for classified lines.
///
/// Totals only grow. The window counters back the per-minute log line and
/// are reset by `take_window`.
#[derive(Debug, Default)]
pub struct ParseStats {
    pub lines_total: AtomicU64,
    pub matched_total: AtomicU64,
    pub unmatched_total: AtomicU64,
    window_lines: AtomicU64,
    window_matched: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParseStatsSnapshot {
    pub lines_total: u64,
    pub matched_total: u64,
    pub unmatched_total: u64,
}

impl ParseStats {
    pub fn record_line(&self) {
        self.lines_total.fetch_add(1, Ordering::Relaxed);
        self.window_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_match(&self) {
        self.matched_total.fetch_add(1, Ordering::Relaxed);
        self.window_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unmatched(&self) {
        self.unmatched_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ParseStatsSnapshot {
        ParseStatsSnapshot {
            lines_total: self.lines_total.load(Ordering::Relaxed),
            matched_total: self.matched_total.load(Ordering::Relaxed),
            unmatched_total: self.unmatched_total.load(Ordering::Relaxed),
        }
    }

    /// Return `(lines, matched)` since the last call and reset the window.
    pub fn take_window(&self) -> (u64, u64) {
        (
            self.window_lines.swap(0, Ordering::Relaxed),
            self.window_matched.swap(0, Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_resets_but_totals_do_not() {
        let stats = ParseStats::default();
        stats.record_line();
        stats.record_match();
        stats.record_line();
        stats.record_unmatched();

        assert_eq!(stats.take_window(), (2, 1));
        assert_eq!(stats.take_window(), (0, 0));

        let snap = stats.snapshot();
        assert_eq!(snap.lines_total, 2);
        assert_eq!(snap.matched_total, 1);
        assert_eq!(snap.unmatched_total, 1);
    }
}
