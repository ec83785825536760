// src/dev_utils.rs

use std::time::{Duration, Instant};

/// Walks slower than this are reported at debug level instead of trace.
const SLOW_BLOCK: Duration = Duration::from_millis(250);

/// Scope timer for walks. Logs the elapsed time when dropped.
#[derive(Debug)]
pub struct BlockTimer {
    label: String,
    start: Instant,
}

impl BlockTimer {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for BlockTimer {
    fn drop(&mut self) {
        let elapsed = self.elapsed();
        if elapsed >= SLOW_BLOCK {
            log::debug!("Slow {}: {} ms", self.label, elapsed.as_millis());
        } else {
            log::trace!("{} took {} µs", self.label, elapsed.as_micros());
        }
    }
}
