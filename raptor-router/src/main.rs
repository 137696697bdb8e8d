use std::error::Error;
use std::time::Duration;

use raptor_router::RaptorConfig;
use raptor_router::schedule::load_router;
use raptor_router::service::{DEFAULT_TIMEOUT, RoutingRequest, RoutingService};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Reads a schedule and a list of routing requests (JSON files named by
/// `RAPTOR_SCHEDULE` and `RAPTOR_QUERY`) and prints one result per request.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let schedule_path = std::env::var("RAPTOR_SCHEDULE").map_err(|_| "RAPTOR_SCHEDULE not set")?;
    let query_path = std::env::var("RAPTOR_QUERY").map_err(|_| "RAPTOR_QUERY not set")?;
    let timeout = std::env::var("RAPTOR_TIMEOUT_SECS")
        .ok()
        .and_then(|secs| secs.parse().ok())
        .map_or(DEFAULT_TIMEOUT, Duration::from_secs);

    let router = load_router(&schedule_path, RaptorConfig::default())?;
    let service = RoutingService::new(router).with_timeout(timeout);

    let requests: Vec<RoutingRequest> = serde_json::from_str(&std::fs::read_to_string(&query_path)?)?;
    info!(requests = requests.len(), timeout = ?timeout, "Running queries");

    let results: Vec<_> = service
        .route_batch(requests)
        .await
        .into_iter()
        .map(|result| match result {
            Ok(response) => json!({ "result": response }),
            Err(e) => json!({ "error": e.to_string() }),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
