//! Execution service.
//!
//! The [`ExecutionService`] owns a fixed pool of workers and runs one lane per
//! worker. Lanes pull task indices from a shared atomic cursor, so every task
//! is claimed exactly once, and each outcome is placed at the index of the
//! task it came from.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use crate::error::ExecutionError;
use crate::worker::Worker;

/// Outcomes recorded by a single lane as `(task index, worker slot, outcome)`.
type LaneRecords<O, E> = Vec<(usize, usize, Result<O, E>)>;

/// What a lane does when a job fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailurePolicy {
  /// Stop every lane and fail the whole call.
  FailFast,
  /// Record the failure in place and keep going.
  Collect,
}

/// A fixed pool of workers that processes batches of tasks.
///
/// The service never creates tasks or inspects outcomes. Workers are held as
/// `Arc<W>` so each lane can own a handle for the duration of a call; a given
/// worker is only ever handed to its own lane.
pub struct ExecutionService<W> {
  workers: Vec<Arc<W>>,
}

impl<W: Worker> ExecutionService<W> {
  /// Create a service over already-booted workers.
  pub fn new(workers: Vec<W>) -> Self {
    Self {
      workers: workers.into_iter().map(Arc::new).collect(),
    }
  }

  /// Boot `size` workers concurrently, passing each its slot index.
  ///
  /// If any worker fails to boot, the ones that did boot are closed and the
  /// first boot error is returned.
  pub async fn boot<F, Fut>(size: usize, factory: F) -> Result<Self, W::Error>
  where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<W, W::Error>>,
  {
    info!(size, "booting worker pool");

    let booted = futures::future::join_all((0..size).map(factory)).await;

    let mut workers = Vec::with_capacity(size);
    let mut first_error = None;
    for (slot, result) in booted.into_iter().enumerate() {
      match result {
        Ok(worker) => workers.push(Arc::new(worker)),
        Err(e) => {
          error!(slot, error = %e, "worker boot failed");
          first_error.get_or_insert(e);
        }
      }
    }

    let service = Self { workers };
    match first_error {
      Some(e) => {
        service.close_all().await;
        Err(e)
      }
      None => {
        info!(size, "worker pool booted");
        Ok(service)
      }
    }
  }

  /// Workers in slot order.
  pub fn workers(&self) -> &[Arc<W>] {
    &self.workers
  }

  /// Number of workers (and therefore lanes) in the pool.
  pub fn size(&self) -> usize {
    self.workers.len()
  }

  /// Run `apply` for every task and return the outcomes in task order.
  ///
  /// `apply` is called once per task to bind it; the job it returns is then
  /// run against the worker of whichever lane claimed the task. The first job
  /// failure cancels the remaining lanes and is returned as
  /// [`ExecutionError::Task`]; outcomes that had already completed are
  /// discarded.
  ///
  /// Dropping the returned future aborts every lane.
  pub async fn execute<T, O, E, F, J, Fut>(
    &self,
    tasks: impl Into<Arc<[T]>>,
    apply: F,
    cancel: CancellationToken,
  ) -> Result<Vec<O>, ExecutionError<E>>
  where
    T: Send + Sync + 'static,
    O: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    F: Fn(&T) -> J + Send + Sync + 'static,
    J: FnOnce(Arc<W>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
  {
    self
      .run(tasks.into(), apply, FailurePolicy::FailFast, cancel)
      .await?
      .into_iter()
      .enumerate()
      .map(|(index, (slot, outcome))| {
        outcome.map_err(|source| ExecutionError::Task {
          index,
          slot,
          source,
        })
      })
      .collect()
  }

  /// Like [`execute`](Self::execute), but a failing job does not stop the
  /// batch. Every task gets an entry, `Ok` or `Err`, at its own index.
  ///
  /// The call itself still fails on cancellation, an empty pool, or a lane
  /// that panics.
  pub async fn execute_collect<T, O, E, F, J, Fut>(
    &self,
    tasks: impl Into<Arc<[T]>>,
    apply: F,
    cancel: CancellationToken,
  ) -> Result<Vec<Result<O, E>>, ExecutionError<E>>
  where
    T: Send + Sync + 'static,
    O: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    F: Fn(&T) -> J + Send + Sync + 'static,
    J: FnOnce(Arc<W>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
  {
    let outcomes = self
      .run(tasks.into(), apply, FailurePolicy::Collect, cancel)
      .await?;

    Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
  }

  /// Close every worker. All workers are attempted; the first error is
  /// returned.
  pub async fn shutdown(self) -> Result<(), W::Error> {
    let mut errors = self.close_all().await;
    if errors.is_empty() {
      info!(size = self.workers.len(), "worker pool closed");
      Ok(())
    } else {
      Err(errors.swap_remove(0))
    }
  }

  async fn close_all(&self) -> Vec<W::Error> {
    let closes = self
      .workers
      .iter()
      .map(|worker| async move { (worker.slot(), worker.close().await) });

    let mut errors = Vec::new();
    for (slot, result) in futures::future::join_all(closes).await {
      match result {
        Ok(()) => debug!(slot, "worker closed"),
        Err(e) => {
          warn!(slot, error = %e, "worker close failed");
          errors.push(e);
        }
      }
    }
    errors
  }

  /// Spawn one lane per worker and wait for all of them.
  ///
  /// Returns `(slot, outcome)` per task, in task order.
  #[instrument(
    name = "pool_execute",
    skip_all,
    fields(workers = self.workers.len(), policy = ?policy)
  )]
  async fn run<T, O, E, F, J, Fut>(
    &self,
    tasks: Arc<[T]>,
    apply: F,
    policy: FailurePolicy,
    cancel: CancellationToken,
  ) -> Result<Vec<(usize, Result<O, E>)>, ExecutionError<E>>
  where
    T: Send + Sync + 'static,
    O: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    F: Fn(&T) -> J + Send + Sync + 'static,
    J: FnOnce(Arc<W>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
  {
    let total = tasks.len();
    if total == 0 {
      debug!("no tasks submitted");
      return Ok(Vec::new());
    }
    if self.workers.is_empty() {
      return Err(ExecutionError::EmptyPool { tasks: total });
    }

    info!(tasks = total, "execution_started");

    let cursor = Arc::new(AtomicUsize::new(0));
    let apply = Arc::new(apply);
    // Cancelled by the caller, or by us when a lane fails under fail-fast.
    let abort = cancel.child_token();

    let mut lanes = JoinSet::new();
    let mut lane_slots = HashMap::with_capacity(self.workers.len());
    for worker in &self.workers {
      let slot = worker.slot();
      let lane = run_lane(
        Arc::clone(worker),
        Arc::clone(&tasks),
        Arc::clone(&cursor),
        Arc::clone(&apply),
        policy,
        abort.clone(),
      );
      let handle = lanes.spawn(lane.instrument(info_span!("lane", slot)));
      lane_slots.insert(handle.id(), slot);
    }

    let mut outcomes: Vec<Option<(usize, Result<O, E>)>> =
      std::iter::repeat_with(|| None).take(total).collect();
    let mut failure = None;
    let mut cancelled = false;

    while let Some(joined) = lanes.join_next().await {
      match joined {
        Ok(Ok(records)) => {
          for (index, slot, outcome) in records {
            if let Some(entry) = outcomes.get_mut(index) {
              *entry = Some((slot, outcome));
            }
          }
        }
        Ok(Err(ExecutionError::Cancelled)) => cancelled = true,
        Ok(Err(e)) => {
          abort.cancel();
          failure.get_or_insert(e);
        }
        Err(join_error) => {
          abort.cancel();
          let slot = lane_slots
            .get(&join_error.id())
            .copied()
            .unwrap_or_default();
          failure.get_or_insert(ExecutionError::LanePanicked {
            slot,
            message: join_error.to_string(),
          });
        }
      }
    }

    if let Some(e) = failure {
      error!(error = %e, "execution_failed");
      return Err(e);
    }
    if cancelled {
      warn!("execution_cancelled");
      return Err(ExecutionError::Cancelled);
    }

    let outcomes = outcomes
      .into_iter()
      .enumerate()
      .map(|(index, entry)| entry.ok_or(ExecutionError::MissingOutcome { index }))
      .collect::<Result<Vec<_>, _>>()?;

    info!(tasks = total, "execution_completed");
    Ok(outcomes)
  }
}

/// Body of one lane: claim, apply, record, until the cursor runs past the end.
async fn run_lane<W, T, O, E, F, J, Fut>(
  worker: Arc<W>,
  tasks: Arc<[T]>,
  cursor: Arc<AtomicUsize>,
  apply: Arc<F>,
  policy: FailurePolicy,
  abort: CancellationToken,
) -> Result<LaneRecords<O, E>, ExecutionError<E>>
where
  W: Worker,
  E: std::error::Error,
  F: Fn(&T) -> J,
  J: FnOnce(Arc<W>) -> Fut,
  Fut: Future<Output = Result<O, E>>,
{
  let slot = worker.slot();
  let mut records = Vec::new();

  loop {
    if abort.is_cancelled() {
      debug!(slot, "lane stopping on cancellation");
      return Err(ExecutionError::Cancelled);
    }

    let index = cursor.fetch_add(1, Ordering::AcqRel);
    let Some(task) = tasks.get(index) else {
      break;
    };

    debug!(slot, index, "task_claimed");
    let job = apply(task);

    let outcome = tokio::select! {
      biased;
      _ = abort.cancelled() => {
        debug!(slot, index, "lane cancelled during task");
        return Err(ExecutionError::Cancelled);
      }
      outcome = job(Arc::clone(&worker)) => outcome,
    };

    match outcome {
      Ok(outcome) => {
        debug!(slot, index, "task_completed");
        records.push((index, slot, Ok(outcome)));
      }
      Err(e) => match policy {
        FailurePolicy::FailFast => {
          error!(slot, index, error = %e, "task_failed");
          abort.cancel();
          return Err(ExecutionError::Task {
            index,
            slot,
            source: e,
          });
        }
        FailurePolicy::Collect => {
          warn!(slot, index, error = %e, "task_failed");
          records.push((index, slot, Err(e)));
        }
      },
    }
  }

  debug!(slot, processed = records.len(), "lane exhausted");
  Ok(records)
}
