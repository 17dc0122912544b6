//! Detached background work.
//!
//! Revalidation fetches are spawned here and never joined by the request that
//! triggered them. Finished tasks are reaped on every spawn; hosts can drain
//! the remainder on shutdown.

use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinSet;

#[derive(Default)]
pub(crate) struct BackgroundTasks {
    tasks: Mutex<JoinSet<()>>,
}

impl BackgroundTasks {
    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                tracing::warn!("background task failed: {e}");
            }
        }
        tasks.spawn(task);
    }

    /// Await every pending task, including ones spawned while draining.
    pub(crate) async fn drain(&self) -> usize {
        let mut awaited = 0;
        loop {
            let mut batch = {
                let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                std::mem::take(&mut *tasks)
            };
            if batch.is_empty() {
                return awaited;
            }
            while let Some(finished) = batch.join_next().await {
                awaited += 1;
                if let Err(e) = finished {
                    tracing::warn!("background task failed: {e}");
                }
            }
        }
    }
}
