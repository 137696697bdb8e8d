//! Async routing service.
//!
//! Queries are CPU bound and cannot be interrupted, so each one runs on the
//! blocking thread pool. A query that exceeds the timeout is abandoned: the
//! caller gets [`ServiceError::Timeout`] while the worker finishes in the
//! background and its result is dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{QueryConfig, TimeType};
use crate::connection::Connection;
use crate::error::RoutingError;
use crate::router::RaptorRouter;

/// Default time a single query may take.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when running a query through the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Query did not finish in time
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// Worker task panicked or was cancelled
    #[error("query task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Query was rejected by the router
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

/// One routing request, as read from JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoutingRequest {
    EarliestArrival {
        sources: HashMap<String, DateTime<FixedOffset>>,
        /// Walk duration (seconds) from each target to the destination.
        targets: HashMap<String, i32>,
        #[serde(default)]
        config: QueryConfig,
    },
    LatestDeparture {
        /// Walk duration (seconds) from the origin to each source.
        sources: HashMap<String, i32>,
        targets: HashMap<String, DateTime<FixedOffset>>,
        #[serde(default)]
        config: QueryConfig,
    },
    Isolines {
        sources: HashMap<String, DateTime<FixedOffset>>,
        #[serde(default = "default_time_type")]
        time_type: TimeType,
        #[serde(default)]
        config: QueryConfig,
    },
}

fn default_time_type() -> TimeType {
    TimeType::Departure
}

/// Result of a [`RoutingRequest`].
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RoutingResponse {
    Connections(Vec<Connection>),
    /// Keyed by stop id.
    Isolines(BTreeMap<String, Connection>),
}

impl RoutingResponse {
    /// Number of connections in the response.
    pub fn len(&self) -> usize {
        match self {
            RoutingResponse::Connections(connections) => connections.len(),
            RoutingResponse::Isolines(isolines) => isolines.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared router with a per-query timeout.
#[derive(Clone)]
pub struct RoutingService {
    router: Arc<RaptorRouter>,
    timeout: Duration,
}

impl RoutingService {
    pub fn new(router: RaptorRouter) -> Self {
        Self {
            router: Arc::new(router),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the time after which a query is abandoned.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn router(&self) -> &RaptorRouter {
        &self.router
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one request.
    pub async fn route(&self, request: RoutingRequest) -> Result<RoutingResponse, ServiceError> {
        self.run(move |router| match request {
            RoutingRequest::EarliestArrival {
                sources,
                targets,
                config,
            } => router
                .route_earliest_arrival(&sources, &targets, &config)
                .map(RoutingResponse::Connections),
            RoutingRequest::LatestDeparture {
                sources,
                targets,
                config,
            } => router
                .route_latest_departure(&sources, &targets, &config)
                .map(RoutingResponse::Connections),
            RoutingRequest::Isolines {
                sources,
                time_type,
                config,
            } => router
                .route_isolines(&sources, time_type, &config)
                .map(|isolines| RoutingResponse::Isolines(isolines.into_iter().collect())),
        })
        .await
    }

    /// Run several requests concurrently. Results are in request order; a
    /// failing request does not affect the others.
    pub async fn route_batch(&self, requests: Vec<RoutingRequest>) -> Vec<Result<RoutingResponse, ServiceError>> {
        debug!(requests = requests.len(), "Routing batch");
        let futures: Vec<_> = requests
            .into_iter()
            .map(|request| self.route(request))
            .collect();
        join_all(futures).await
    }

    async fn run<T, F>(&self, query: F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce(&RaptorRouter) -> Result<T, RoutingError> + Send + 'static,
    {
        let router = Arc::clone(&self.router);
        let task = tokio::task::spawn_blocking(move || query(&router));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => Ok(joined??),
            Err(_) => {
                warn!(timeout = ?self.timeout, "Query timed out");
                Err(ServiceError::Timeout(self.timeout))
            }
        }
    }
}
