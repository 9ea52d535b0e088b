use cc_pool::BoundedPool;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{info, warn};

#[derive(Debug)]
struct CheckError {
  host: String,
}

async fn check_host(host: String) -> Result<(), CheckError> {
  tokio::time::sleep(Duration::from_millis(100)).await;
  if host.ends_with(".invalid") {
    return Err(CheckError { host });
  }
  info!("{} is reachable", host);
  Ok(())
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Basic Usage Example ---");

  let pool = BoundedPool::<Result<(), CheckError>>::new(4, 0, Handle::current(), "basic_pool");

  let hosts = ["alpha.example", "beta.example", "gamma.invalid", "delta.example", "eps.invalid"];
  for host in hosts {
    if let Err(e) = pool.submit(Box::pin(check_host(host.to_string()))) {
      warn!("Failed to submit check for {}: {:?}", host, e);
    }
  }

  // No more submissions; the stream closes once every check is done.
  pool.wait().expect("wait called once");

  let results = pool.results();
  let mut failures = 0;
  while let Some(outcome) = results.recv().await {
    match outcome {
      Ok(Ok(())) => {}
      Ok(Err(e)) => {
        failures += 1;
        warn!("Check failed for {}", e.host);
      }
      Err(pool_error) => warn!("Unit did not complete: {}", pool_error),
    }
  }

  info!("All checks finished with {} failures.", failures);
  info!("--- Basic Usage Example End ---");
}
