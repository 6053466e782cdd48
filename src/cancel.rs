use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic run counter that invalidates every outstanding guard when a
/// new run is issued. Scans, monitors, and settle timers all hold a guard
/// and check it before acting, so stale timers silently expire instead of
/// racing the run that replaced them.
#[derive(Debug, Default)]
pub struct RunToken {
    current: Arc<AtomicU64>,
}

impl RunToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new run, invalidating all previously issued guards.
    pub fn issue(&self) -> RunGuard {
        let run = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        RunGuard {
            current: self.current.clone(),
            run,
        }
    }

    /// Invalidates every outstanding guard without starting a new run.
    pub fn cancel_all(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct RunGuard {
    current: Arc<AtomicU64>,
    run: u64,
}

impl RunGuard {
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.run
    }
}
