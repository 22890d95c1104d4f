//! Periodic delta garbage collection.

use crate::optimizer::CrdtSyncOptimizer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a running sweep task. Dropping it stops the sweep.
pub struct GcHandle {
    task: JoinHandle<()>,
}

impl GcHandle {
    pub fn stop(self) {
        // Drop aborts.
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for GcHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Sweep expired deltas every `interval` until the handle is dropped.
///
/// The first sweep happens one full interval after spawning.
pub fn spawn_gc(optimizer: Arc<Mutex<CrdtSyncOptimizer>>, interval: Duration) -> GcHandle {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = optimizer.lock().await.run_garbage_collection();
            debug!(removed, "periodic delta sweep");
        }
    });
    GcHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfigBuilder;
    use weave_core::Crdt;

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_drops_expired() {
        let config = SyncConfigBuilder::new().gc_ttl(0).build();
        let mut opt = CrdtSyncOptimizer::with_config("a", config);
        opt.register("hits", Crdt::counter()).unwrap();
        opt.get_mut("hits")
            .and_then(Crdt::as_counter_mut)
            .unwrap()
            .increment("a", 1);
        opt.generate_deltas("hits").unwrap();

        let opt = Arc::new(Mutex::new(opt));
        let handle = spawn_gc(opt.clone(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;

        assert!(opt.lock().await.retained_deltas("hits").is_empty());
        handle.stop();
    }
}
