//! Progress reporting passed into each transfer
//!
//! Downloads report bytes received with no known total. Uploads report rows
//! sent out of the table's row count.

use diagnostics::*;

pub trait ProgressReporter {
    fn on_progress(&self, current: u64, total: Option<u64>);

    /// A partitioned download is starting part `index` (1-based) of `count`.
    fn on_part(&self, _index: usize, _count: usize) {}
}

/// Discards all progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn on_progress(&self, _current: u64, _total: Option<u64>) {}
}

impl<F: Fn(u64, Option<u64>)> ProgressReporter for F {
    fn on_progress(&self, current: u64, total: Option<u64>) {
        self(current, total)
    }
}

/// Writes progress to the diagnostics log at info level
#[derive(Debug, Clone)]
pub struct LogProgress {
    label: String,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ProgressReporter for LogProgress {
    fn on_progress(&self, current: u64, total: Option<u64>) {
        let label = self.label.as_str();
        match total {
            Some(total) => info!("{label}: {current} of {total}", label: label, current: current, total: total),
            None => info!("{label}: {current}", label: label, current: current),
        }
    }

    fn on_part(&self, index: usize, count: usize) {
        let label = self.label.as_str();
        info!("{label}: part {index} of {count}", label: label, index: index, count: count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_closure_reporter() {
        let seen = RefCell::new(Vec::new());
        let reporter = |current: u64, total: Option<u64>| seen.borrow_mut().push((current, total));
        reporter.on_progress(10, Some(20));
        reporter.on_part(1, 2);
        assert_eq!(*seen.borrow(), vec![(10, Some(20))]);
    }

    #[test]
    fn test_log_reporter_does_not_panic() {
        let reporter = LogProgress::new("upload /x.csv");
        reporter.on_progress(1, None);
        reporter.on_part(1, 3);
        NoProgress.on_progress(1, Some(1));
    }
}
