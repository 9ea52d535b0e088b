//! A Tokio-based bounded-concurrency pool: submit any number of units, at most
//! N run at once, and every unit's outcome arrives on one shared result stream
//! that closes itself after the last unit finishes.

mod error;
mod pool;
mod results;
mod task;

pub use error::PoolError;
pub use pool::{BoundedPool, MAX_RESULT_BUFFER};
pub use results::ResultStream;
pub use task::{TaskToExecute, UnitId};
