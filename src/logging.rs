//! Mirror of session logs into the in-page console
//!
//! Useful when watching a headed browser: the agent's own narration shows up
//! in devtools next to the page's output. Records enqueue unconditionally;
//! a drain cycle snapshots the queue at entry and writes that snapshot, and
//! only one cycle runs at a time — records arriving mid-drain wait for the
//! next one.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::driver::PageDriver;

#[derive(Debug, Clone)]
pub struct LogLine {
    pub category: String,
    pub message: String,
    /// 0 = always, 1 = info, 2 = debug; mirrored when `<= verbose`
    pub level: u8,
    pub timestamp: DateTime<Utc>,
}

impl LogLine {
    pub fn new(category: &str, message: impl Into<String>, level: u8) -> Self {
        Self {
            category: category.to_string(),
            message: message.into(),
            level,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Default)]
pub struct ConsoleMirror {
    verbose: u8,
    pending: Mutex<VecDeque<LogLine>>,
    draining: AtomicBool,
}

impl ConsoleMirror {
    pub fn new(verbose: u8) -> Self {
        Self {
            verbose,
            pending: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    /// Queue a record for mirroring. Records above the configured verbosity
    /// are dropped here rather than at drain time.
    pub fn enqueue(&self, line: LogLine) {
        if line.level > self.verbose {
            return;
        }
        self.pending.lock().push_back(line);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Write queued records into the page console. Single-flight: a call that
    /// finds a cycle already running returns immediately.
    pub async fn drain(&self, driver: &Arc<dyn PageDriver>) {
        if self.draining.swap(true, Ordering::AcqRel) {
            return;
        }

        let snapshot: Vec<LogLine> = {
            let mut pending = self.pending.lock();
            pending.drain(..).collect()
        };

        for line in snapshot {
            let text = format!(
                "[{}] {}: {}",
                line.timestamp.format("%H:%M:%S%.3f"),
                line.category,
                line.message
            );
            let expression = match serde_json::to_string(&text) {
                Ok(quoted) => format!("console.log({quoted})"),
                Err(_) => continue,
            };
            // Mirroring is cosmetic; a dead page must not fail the session
            let _ = driver.evaluate(&expression).await;
        }

        self.draining.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_above_verbosity_are_dropped() {
        let mirror = ConsoleMirror::new(1);
        mirror.enqueue(LogLine::new("act", "shown", 1));
        mirror.enqueue(LogLine::new("act", "hidden", 2));
        assert_eq!(mirror.pending_len(), 1);
    }

    #[test]
    fn level_zero_always_queues() {
        let mirror = ConsoleMirror::new(0);
        mirror.enqueue(LogLine::new("init", "hello", 0));
        assert_eq!(mirror.pending_len(), 1);
    }
}
