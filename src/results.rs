use crate::error::PoolError;

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, Stream};
use tracing::trace;

/// The consumer side of a pool's shared result stream.
///
/// Every submitted unit leaves exactly one value on this stream: `Ok(r)` with
/// the unit's own result, or `Err(PoolError::TaskPanicked)` if the unit
/// panicked. Values arrive in completion order, not submission order.
///
/// The stream closes once the pool has been told no more units are coming
/// (see [`BoundedPool::wait`](crate::BoundedPool::wait)) and every unit has
/// finished. Handles are cheap to clone; clones compete for values.
pub struct ResultStream<R: Send + 'static> {
  pub(crate) pool_name: Arc<String>,
  pub(crate) rx: kanal::AsyncReceiver<Result<R, PoolError>>,
}

impl<R: Send + 'static> Clone for ResultStream<R> {
  fn clone(&self) -> Self {
    Self {
      pool_name: self.pool_name.clone(),
      rx: self.rx.clone(),
    }
  }
}

impl<R: Send + 'static> fmt::Debug for ResultStream<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResultStream")
      .field("pool_name", &self.pool_name)
      .field("buffered", &self.rx.len())
      .finish_non_exhaustive()
  }
}

impl<R: Send + 'static> ResultStream<R> {
  /// Receives the next unit outcome.
  ///
  /// Returns `None` once the stream is closed and empty. Suspends while units
  /// are still outstanding and nothing is ready.
  pub async fn recv(&self) -> Option<Result<R, PoolError>> {
    match self.rx.recv().await {
      Ok(outcome) => Some(outcome),
      Err(receive_error) => {
        trace!(pool_name = %*self.pool_name, "Result stream closed: {:?}", receive_error);
        None
      }
    }
  }

  /// Consumes values until the stream closes and returns them in arrival order.
  pub async fn drain(self) -> Vec<Result<R, PoolError>> {
    let mut drained = Vec::new();
    while let Some(outcome) = self.recv().await {
      drained.push(outcome);
    }
    trace!(pool_name = %*self.pool_name, count = drained.len(), "Result stream drained.");
    drained
  }

  /// Adapts this handle into a [`Stream`] that ends when the result stream closes.
  pub fn into_stream(self) -> impl Stream<Item = Result<R, PoolError>> + Send + 'static {
    stream::unfold(self, |results| async move {
      let next = results.recv().await?;
      Some((next, results))
    })
  }

  /// Number of outcomes buffered and not yet received.
  pub fn len(&self) -> usize {
    self.rx.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
