//! Process-wide shutdown signal

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Shared shutdown flag
///
/// Checked by every worker at its next wait boundary: the hot-plug source after each event
/// poll, the monitor between notifications, sessions between bulk reads.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown
    pub fn trigger(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            debug!("Shutdown requested");
        }
    }

    /// Whether shutdown was requested
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
