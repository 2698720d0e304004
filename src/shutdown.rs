//! Cooperative cancellation for harvest runs.
//!
//! The CLI installs one [`ShutdownCoordinator`] and trips it on Ctrl+C. The
//! pagination driver checks it between pages and the harvester between
//! targets, so a run stops at a page boundary and buffered tables collected
//! so far are still flushed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared handle to a shutdown coordinator.
pub type SharedShutdown = Arc<ShutdownCoordinator>;

/// Sticky shutdown flag shared by the CLI and the harvester.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    is_shutdown: AtomicBool,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self {
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Create a new coordinator wrapped in [`Arc`].
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::new())
    }

    /// Request shutdown. Later calls have no effect.
    pub fn request_shutdown(&self) {
        self.is_shutdown.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }
}
