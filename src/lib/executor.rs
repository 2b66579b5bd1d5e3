//! Bounded concurrency for remote calls.
//!
//! An [`Executor`] runs any number of independent fallible tasks with at most
//! `limit` of them in flight. The first failure closes the admission gate: tasks
//! still waiting for a slot, and tasks spawned afterwards, finish with
//! [`Cancelled`] without running. Tasks already running are left to complete.
//! [`Executor::wait`] joins everything and returns the first error.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

/// Returned by tasks that were not started because an earlier task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cancelled after an earlier failure")]
pub struct Cancelled;

pub struct Executor<E> {
  gate: Arc<Semaphore>,
  first_error: Arc<Mutex<Option<E>>>,
  tasks: JoinSet<()>,
}

impl<E> Executor<E>
where
  E: From<Cancelled> + Send + 'static,
{
  /// Creates an executor admitting at most `limit` concurrent tasks. A limit
  /// of zero is treated as one.
  pub fn new(limit: usize) -> Self {
    #[cfg(feature = "tracing")]
    debug!(limit, "Creating executor");

    Self {
      gate: Arc::new(Semaphore::new(limit.max(1))),
      first_error: Arc::new(Mutex::new(None)),
      tasks: JoinSet::new(),
    }
  }

  /// Admits `task`. It starts once a slot is free, unless the executor has
  /// been cancelled by then.
  pub fn spawn<F>(&mut self, task: F)
  where
    F: Future<Output = Result<(), E>> + Send + 'static,
  {
    let gate = Arc::clone(&self.gate);
    let first_error = Arc::clone(&self.first_error);

    self.tasks.spawn(async move {
      // The permit is held until the outcome is recorded, so no queued task
      // can start between a failure and the gate closing.
      let permit = gate.acquire().await;
      let result = match &permit {
        // The gate may close between admission and start.
        Ok(_) if !gate.is_closed() => task.await,
        _ => Err(Cancelled.into()),
      };

      if let Err(error) = result {
        let mut first = first_error.lock().unwrap_or_else(PoisonError::into_inner);
        if first.is_none() {
          #[cfg(feature = "tracing")]
          debug!("Task failed, cancelling pending tasks");

          *first = Some(error);
          gate.close();
        } else {
          #[cfg(feature = "tracing")]
          trace!("Discarding error after cancellation");
        }
      }
      drop(permit);
    });
  }

  /// Waits for every admitted task and returns the first error, if any.
  ///
  /// A panicking task is resumed on the caller.
  pub async fn wait(mut self) -> Result<(), E> {
    while let Some(joined) = self.tasks.join_next().await {
      if let Err(error) = joined
        && error.is_panic()
      {
        std::panic::resume_unwind(error.into_panic());
      }
    }

    let first = self
      .first_error
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take();

    match first {
      Some(error) => Err(error),
      None => Ok(()),
    }
  }
}
