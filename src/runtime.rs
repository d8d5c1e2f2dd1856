use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::scene::ProgressCallback;

/// Shared flag checked at every recursive step of an import.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Host-side memory pressure check. Returning `Err` aborts the run with
/// `ImportError::OutOfMemory` carrying the message.
pub trait MemoryMonitor: Send + Sync {
    fn check(&self) -> Result<(), String>;
}

/// Lets the host bound how long one import step holds its executor.
pub trait YieldHelper: Send + Sync {
    fn yield_now(&self) -> BoxFuture<'_, ()>;
}

/// Optional collaborators consulted while an import runs.
#[derive(Clone, Default)]
pub struct ImportHooks {
    pub memory_monitor: Option<Arc<dyn MemoryMonitor>>,
    pub yield_helper: Option<Arc<dyn YieldHelper>>,
    pub progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for ImportHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportHooks")
            .field("memory_monitor", &self.memory_monitor.is_some())
            .field("yield_helper", &self.yield_helper.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}
