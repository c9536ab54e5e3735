//! Bounded pool for CPU-bound work.
//!
//! Document parsing and language scoring are synchronous and can take
//! hundreds of milliseconds on large files. Running them on a Tokio worker
//! thread would stall every other document's network I/O, so they go through
//! `spawn_blocking`. Tokio's blocking pool is sized for blocking *I/O* (512
//! threads by default), which is far too many for CPU work; the semaphore
//! caps how many of these jobs run at once.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Run `job` on the blocking pool once a slot is free.
    ///
    /// A panic inside `job` surfaces as `Err(JoinError)`.
    pub async fn run<F, T>(&self, job: F) -> Result<T, JoinError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        // The semaphore is never closed, so acquire cannot fail.
        let permit = Arc::clone(&self.permits).acquire_owned().await.ok();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
    }
}
