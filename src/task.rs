use std::future::Future;
use std::pin::Pin;

/// Identifier of a submitted unit, unique within the pool that issued it.
pub type UnitId = u64;

/// The type of future that the pool executes.
/// It must be `Send` and `'static`, and produce a result of type `R`.
pub type TaskToExecute<R> = Pin<Box<dyn Future<Output = R> + Send + 'static>>;

/// The value a unit leaves on the result stream.
pub(crate) type UnitOutcome<R> = Result<R, crate::error::PoolError>;

/// A unit wrapped so that it always yields exactly one outcome.
pub(crate) type UnitBody<R> = Pin<Box<dyn Future<Output = UnitOutcome<R>> + Send + 'static>>;
