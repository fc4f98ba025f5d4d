use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("work unit {index} panicked: {message}")]
    Panicked { index: usize, message: String },
    #[error("work unit {index} produced no result")]
    Lost { index: usize },
}

/// Runs indexed CPU-bound work on blocking threads, at most `size` at a time.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Calls `f(i)` for every `i` in `0..count` and returns the results in
    /// index order. Submission waits while every worker is busy; the call
    /// returns only after all units finished. A unit that panics yields
    /// `PoolError::Panicked` at its index without affecting the others.
    pub async fn map<T, F>(&self, count: usize, f: F) -> Vec<Result<T, PoolError>>
    where
        T: Send + 'static,
        F: Fn(usize) -> T + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let mut tasks = JoinSet::new();

        for index in 0..count {
            let Ok(permit) = self.permits.clone().acquire_owned().await else {
                break;
            };
            let f = Arc::clone(&f);
            tasks.spawn_blocking(move || {
                let _permit = permit;
                let outcome = catch_unwind(AssertUnwindSafe(|| f(index)));
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<Result<T, PoolError>>> = (0..count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(value))) => slots[index] = Some(Ok(value)),
                Ok((index, Err(payload))) => {
                    let message = panic_message(payload.as_ref());
                    error!(index, %message, "worker unit panicked");
                    slots[index] = Some(Err(PoolError::Panicked { index, message }));
                }
                Err(e) => error!(error = %e, "worker task failed to join"),
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.unwrap_or(Err(PoolError::Lost { index })))
            .collect()
    }
}
