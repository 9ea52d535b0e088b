use cc_pool::BoundedPool;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::info;

async fn long_task_fn(id: usize) -> String {
  info!("Task {} starting (concurrency test - should take 1s)", id);
  tokio::time::sleep(Duration::from_secs(1)).await;
  let result = format!("Task {} finished", id);
  info!("{}", result);
  result
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Concurrency Limit Example (Limit: 2) ---");

  let concurrency_limit = 2;
  let pool = BoundedPool::<String>::new(concurrency_limit, 0, Handle::current(), "concurrency_pool");

  let num_tasks = 5;
  info!(
    "Submitting {} tasks, each takes 1 sec. With concurrency {}, this should take ~{} secs.",
    num_tasks,
    concurrency_limit,
    (num_tasks as f32 / concurrency_limit as f32).ceil()
  );

  let started = Instant::now();
  for i in 0..num_tasks {
    match pool.submit(Box::pin(long_task_fn(i))) {
      Ok(unit_id) => info!("Submitted task {} as unit {}", i, unit_id),
      Err(e) => tracing::error!("Failed to submit task {}: {:?}", i, e),
    }
  }
  pool.wait().expect("wait called once");

  for outcome in pool.results().drain().await {
    match outcome {
      Ok(result) => info!("Received result: {}", result),
      Err(e) => info!("Received error: {:?}", e),
    }
  }

  info!("All tasks processed in {:?}.", started.elapsed());
  info!("--- Concurrency Limit Example End ---");
}
