//! Injectable sleeping

use std::time::Duration;

/// Source of blocking sleeps
pub trait Clock: Send + Sync + 'static {
    fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeps
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
