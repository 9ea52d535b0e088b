use crate::error::PoolError;
use crate::results::ResultStream;
use crate::task::{TaskToExecute, UnitBody, UnitId, UnitOutcome};

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// Largest result buffer a pool allocates; larger requests are lowered to it.
/// The buffer is allocated up front when the pool is created.
pub const MAX_RESULT_BUFFER: usize = 1 << 16;

/// A pool that caps how many submitted units execute at once and funnels
/// every unit's outcome into one shared [`ResultStream`].
///
/// Lifecycle: construct with [`new`](Self::new), submit any number of units,
/// call [`wait`](Self::wait) exactly once after the last submission, then
/// drain [`results`](Self::results) until it closes.
///
/// The result stream closes only after `wait` has been called *and* every
/// submitted unit has finished. A unit that never finishes keeps the stream
/// open forever; the pool does not time out or cancel anything.
pub struct BoundedPool<R: Send + 'static> {
  pool_name: Arc<String>,
  concurrency_limit: usize,
  result_buffer: usize,
  semaphore: Arc<Semaphore>,
  tracker: TaskTracker,
  // `None` once no further submissions are accepted. The waiter owns the
  // taken sender and drops it after the tracker drains.
  results_tx: Mutex<Option<kanal::AsyncSender<UnitOutcome<R>>>>,
  results_rx: kanal::AsyncReceiver<UnitOutcome<R>>,
  next_unit_id: AtomicU64,
  closed: Arc<AtomicBool>,
  tokio_handle: TokioHandle,
}

impl<R: Send + 'static> BoundedPool<R> {
  /// Creates a pool allowing at most `concurrency_limit` unit bodies to run at once.
  ///
  /// `result_buffer` is the number of outcomes the result stream holds before
  /// finishing units suspend on delivery; `0` makes every delivery a hand-off
  /// to a draining consumer. The buffer is allocated up front.
  ///
  /// A `concurrency_limit` of `0` is raised to `1` and one above
  /// [`Semaphore::MAX_PERMITS`] is lowered to it. A `result_buffer` above
  /// [`MAX_RESULT_BUFFER`] is lowered to it.
  pub fn new(concurrency_limit: usize, result_buffer: usize, tokio_handle: TokioHandle, pool_name: &str) -> Arc<Self> {
    if concurrency_limit == 0 {
      warn!(pool_name, "Concurrency limit of 0 would never admit a unit; using 1.");
    } else if concurrency_limit > Semaphore::MAX_PERMITS {
      warn!(
        pool_name,
        concurrency_limit,
        "Concurrency limit exceeds the semaphore maximum; using {}.",
        Semaphore::MAX_PERMITS
      );
    }
    let concurrency_limit = concurrency_limit.clamp(1, Semaphore::MAX_PERMITS);

    if result_buffer > MAX_RESULT_BUFFER {
      warn!(pool_name, result_buffer, "Result buffer too large; using {}.", MAX_RESULT_BUFFER);
    }
    let result_buffer = result_buffer.min(MAX_RESULT_BUFFER);
    let (results_tx, results_rx) = kanal::bounded_async(result_buffer);

    info!(pool_name, concurrency_limit, result_buffer, "Bounded pool created.");

    Arc::new(Self {
      pool_name: Arc::new(pool_name.to_string()),
      concurrency_limit,
      result_buffer,
      semaphore: Arc::new(Semaphore::new(concurrency_limit)),
      tracker: TaskTracker::new(),
      results_tx: Mutex::new(Some(results_tx)),
      results_rx,
      next_unit_id: AtomicU64::new(0),
      closed: Arc::new(AtomicBool::new(false)),
      tokio_handle,
    })
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  pub fn concurrency_limit(&self) -> usize {
    self.concurrency_limit
  }

  pub fn result_buffer(&self) -> usize {
    self.result_buffer
  }

  /// Units submitted and not yet finished, whether running or waiting for a permit.
  pub fn outstanding_count(&self) -> usize {
    self.tracker.len()
  }

  /// Units currently holding a permit.
  pub fn running_count(&self) -> usize {
    if self.semaphore.is_closed() {
      return 0;
    }
    self.concurrency_limit.saturating_sub(self.semaphore.available_permits())
  }

  /// Returns `true` once [`wait`](Self::wait) has been called (or the pool was dropped).
  pub fn is_waiting(&self) -> bool {
    self.results_tx.lock().is_none()
  }

  /// Returns `true` once the waiter has closed the result stream and released the permits.
  pub fn is_closed(&self) -> bool {
    self.closed.load(AtomicOrdering::Acquire)
  }

  /// Returns a handle to the shared result stream. Handles may be taken at any time.
  pub fn results(&self) -> ResultStream<R> {
    ResultStream {
      pool_name: self.pool_name.clone(),
      rx: self.results_rx.clone(),
    }
  }

  /// Submits a unit without blocking the caller.
  ///
  /// The unit is counted as outstanding immediately and spawned right away;
  /// the spawned activity then waits for a permit before running the unit.
  /// Nothing bounds how many activities may be left waiting for a permit.
  ///
  /// # Errors
  /// Returns `PoolError::PoolClosed` if [`wait`](Self::wait) was already called.
  pub fn submit(&self, unit: TaskToExecute<R>) -> Result<UnitId, PoolError> {
    self.spawn_unit(Self::catch_panics(unit), None)
  }

  /// Submits a unit after first waiting for a permit.
  ///
  /// Unlike [`submit`](Self::submit) the caller is held back while all
  /// permits are taken, so at most `concurrency_limit` activities exist.
  ///
  /// # Errors
  /// Returns `PoolError::PoolClosed` if [`wait`](Self::wait) was called before
  /// or while waiting for the permit, and `PoolError::SemaphoreClosed` if the
  /// permits were released while waiting.
  pub async fn submit_admitted(&self, unit: TaskToExecute<R>) -> Result<UnitId, PoolError> {
    if self.is_waiting() {
      warn!(pool_name = %*self.pool_name, "Submit: pool no longer accepts units.");
      return Err(PoolError::PoolClosed);
    }
    let permit = self
      .semaphore
      .clone()
      .acquire_owned()
      .await
      .map_err(|_| PoolError::SemaphoreClosed)?;
    trace!(pool_name = %*self.pool_name, "Permit acquired ahead of spawn. Available: {}", self.semaphore.available_permits());
    self.spawn_unit(Self::catch_panics(unit), Some(permit))
  }

  /// Submits a synchronous unit; its body runs on the runtime's blocking pool
  /// while holding a permit.
  ///
  /// # Errors
  /// Returns `PoolError::PoolClosed` if [`wait`](Self::wait) was already called.
  pub fn submit_blocking<F>(&self, unit: F) -> Result<UnitId, PoolError>
  where
    F: FnOnce() -> R + Send + 'static,
  {
    let tokio_handle = self.tokio_handle.clone();
    let body: UnitBody<R> = Box::pin(async move {
      match tokio_handle.spawn_blocking(unit).await {
        Ok(result) => Ok(result),
        Err(join_error) if join_error.is_panic() => Err(PoolError::TaskPanicked),
        Err(_) => Err(PoolError::TaskCancelled),
      }
    });
    self.spawn_unit(body, None)
  }

  /// Signals that no further units will be submitted.
  ///
  /// Does not block. A background waiter is spawned which, once every
  /// outstanding unit has finished, closes the result stream and releases
  /// the permits.
  ///
  /// # Errors
  /// Returns `PoolError::AlreadyWaiting` on any call after the first.
  pub fn wait(&self) -> Result<(), PoolError> {
    let results_tx = match self.results_tx.lock().take() {
      Some(tx) => tx,
      None => {
        warn!(pool_name = %*self.pool_name, "Wait: completion-and-close already requested.");
        return Err(PoolError::AlreadyWaiting);
      }
    };
    self.tracker.close();
    info!(
      pool_name = %*self.pool_name,
      outstanding = self.tracker.len(),
      "No more submissions. Spawning completion waiter."
    );

    let tracker = self.tracker.clone();
    let semaphore = self.semaphore.clone();
    let closed = self.closed.clone();
    let pool_name = self.pool_name.clone();

    self.tokio_handle.spawn(
      async move {
        tracker.wait().await;
        drop(results_tx);
        semaphore.close();
        closed.store(true, AtomicOrdering::Release);
        info!(name = %*pool_name, "All units finished. Result stream closed and permits released.");
      }
      .instrument(info_span!("pool_waiter", pool_name = %*self.pool_name)),
    );
    Ok(())
  }

  fn catch_panics(unit: TaskToExecute<R>) -> UnitBody<R> {
    Box::pin(AssertUnwindSafe(unit).catch_unwind().map(|result| result.map_err(|_| PoolError::TaskPanicked)))
  }

  fn spawn_unit(&self, body: UnitBody<R>, admitted: Option<OwnedSemaphorePermit>) -> Result<UnitId, PoolError> {
    // Held across the spawn so that `wait` cannot slip in between the check
    // and the tracker registration.
    let results_tx_guard = self.results_tx.lock();
    let Some(results_tx) = results_tx_guard.as_ref() else {
      warn!(pool_name = %*self.pool_name, "Submit: pool no longer accepts units.");
      return Err(PoolError::PoolClosed);
    };

    let unit_id = self.next_unit_id.fetch_add(1, AtomicOrdering::Relaxed);
    debug!(
      pool_name = %*self.pool_name,
      %unit_id,
      admitted = admitted.is_some(),
      "Submitting unit."
    );

    self.tracker.spawn_on(
      Self::run_unit(
        self.pool_name.clone(),
        self.semaphore.clone(),
        admitted,
        body,
        results_tx.clone(),
        unit_id,
      )
      .instrument(info_span!("pool_unit", pool_name = %*self.pool_name, %unit_id)),
      &self.tokio_handle,
    );
    Ok(unit_id)
  }

  async fn run_unit(
    pool_name: Arc<String>,
    semaphore: Arc<Semaphore>,
    admitted: Option<OwnedSemaphorePermit>,
    body: UnitBody<R>,
    results_tx: kanal::AsyncSender<UnitOutcome<R>>,
    unit_id: UnitId,
  ) {
    let permit = match admitted {
      Some(permit) => Some(permit),
      None => match semaphore.clone().acquire_owned().await {
        Ok(permit) => {
          trace!(name = %*pool_name, "Acquired semaphore permit. Available: {}", semaphore.available_permits());
          Some(permit)
        }
        // Unreachable while this unit is tracked: the waiter closes the
        // semaphore only after the tracker drains. Still answers with one outcome.
        Err(_) => {
          error!(name = %*pool_name, %unit_id, "Semaphore closed before unit was admitted.");
          None
        }
      },
    };

    let outcome = match permit {
      Some(_) => body.await,
      None => Err(PoolError::SemaphoreClosed),
    };
    if matches!(outcome, Err(PoolError::TaskPanicked)) {
      error!(name = %*pool_name, %unit_id, "Unit panicked during execution.");
    }

    // Delivery happens while the permit is still held.
    if results_tx.send(outcome).await.is_err() {
      warn!(name = %*pool_name, %unit_id, "Result stream has no receivers left. Outcome dropped.");
    }
    drop(permit);
    drop(results_tx);
    trace!(name = %*pool_name, %unit_id, "Unit finished, permit released.");
  }
}

impl<R: Send + 'static> fmt::Debug for BoundedPool<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BoundedPool")
      .field("pool_name", &self.pool_name)
      .field("concurrency_limit", &self.concurrency_limit)
      .field("outstanding", &self.tracker.len())
      .field("running", &self.running_count())
      .field("waiting", &self.is_waiting())
      .field("closed", &self.is_closed())
      .finish()
  }
}

impl<R: Send + 'static> Drop for BoundedPool<R> {
  fn drop(&mut self) {
    if self.results_tx.get_mut().take().is_some() {
      // The pool's sender goes away here, so the stream still closes once
      // the in-flight units drop theirs.
      self.tracker.close();
      info!(
        pool_name = %*self.pool_name,
        outstanding = self.tracker.len(),
        "BoundedPool dropped without wait(). No further submissions; stream closes after in-flight units."
      );
    } else {
      trace!(pool_name = %*self.pool_name, "Drop: completion-and-close already requested.");
    }
  }
}
